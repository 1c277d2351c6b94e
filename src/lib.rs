//! # modelmux
//!
//! A unified client over multiple AI provider HTTP APIs. Callers generate
//! embeddings and text completions through one interface while the concrete
//! backend (a local Ollama daemon, OpenAI, Anthropic or Gemini) stays
//! swappable via configuration.
//!
//! The crate is built around three pieces:
//!
//! - the [`traits::Provider`] contract every backend adapter satisfies,
//!   together with shared helpers for text cleaning, embedding dimension
//!   normalization and prompt building;
//! - the [`client::Client`] facade, which layers a retry policy for
//!   transient errors and a fallback policy across providers on top of every
//!   public operation;
//! - the [`context`] engine, which turns arbitrary structured records into
//!   prompt text and embedding text with zero hardcoded schemas.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use modelmux::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ProviderError> {
//!     let registry = Arc::new(Registry::new());
//!     registry.add_provider(
//!         "ollama",
//!         BackendKind::Ollama,
//!         ProviderOptions::new().with("model", "llama3.1"),
//!     );
//!
//!     let client = Client::new(registry)?;
//!     let reply = client
//!         .generate_response("What is Rust?", &[], &RequestOptions::default())
//!         .await?;
//!     println!("{}", reply.response);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod context;
pub mod error;
pub mod prompt;
pub mod providers;
pub mod registry;
pub mod traits;
pub mod types;
pub mod utils;

pub use client::{Client, ProviderInfo};
pub use error::ProviderError;
pub use registry::{BackendKind, ClientConfig, ProviderFactory, Registry};
pub use traits::{ModelManagement, Provider};
pub use types::{
    CompletionResponse, ContextConfig, ContextItem, HealthState, HealthStatus, ModelInfo,
    ProviderOptions, RequestOptions, SharedOptions,
};

/// Convenience re-exports for the common path.
pub mod prelude {
    pub use crate::client::{Client, ProviderInfo};
    pub use crate::error::ProviderError;
    pub use crate::registry::{BackendKind, ClientConfig, Registry};
    pub use crate::traits::{ModelManagement, Provider};
    pub use crate::types::{
        CompletionResponse, ContextConfig, ContextItem, HealthState, HealthStatus, ModelInfo,
        ProviderOptions, RequestOptions,
    };
}
