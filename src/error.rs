//! Error Handling Module
//!
//! A single closed error taxonomy shared by every backend adapter. Adapters
//! must classify any failure crossing the backend boundary into one of these
//! kinds; the retry and fallback layers reason only about this enum and never
//! inspect backend-specific details.

use thiserror::Error;

/// Errors produced by provider backends and the client facade.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Network failure or timeout while talking to a backend.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend rejected the configured credentials.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The backend is throttling requests.
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// The requested model is absent on the backend.
    #[error("model not available: {0}")]
    ModelNotAvailable(String),

    /// The backend payload was malformed or carried no usable content.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Generic provider failure wrapping an unclassified message.
    #[error("provider error: {0}")]
    Provider(String),
}

impl ProviderError {
    /// Stable machine-readable name for the error kind, used in health
    /// reports and structured logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_error",
            Self::Authentication(_) => "authentication_error",
            Self::RateLimit(_) => "rate_limit_error",
            Self::ModelNotAvailable(_) => "model_not_available",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Provider(_) => "provider_error",
        }
    }

    /// Whether the retry policy may attempt the same provider again.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::RateLimit(_))
    }

    /// Classify an HTTP error status into the taxonomy.
    ///
    /// Every adapter routes non-success responses through here so that the
    /// facade sees a uniform vocabulary regardless of the backend.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = summarize_body(body);
        let code = status.as_u16();
        match code {
            401 | 403 => Self::Authentication(format!("HTTP {code}: {detail}")),
            404 => Self::ModelNotAvailable(format!("HTTP {code}: {detail}")),
            408 | 504 => Self::Connection(format!("HTTP {code}: {detail}")),
            429 => Self::RateLimit(format!("HTTP {code}: {detail}")),
            _ => Self::Provider(format!("HTTP {code}: {detail}")),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status, &err.to_string())
        } else {
            Self::Provider(err.to_string())
        }
    }
}

/// Keep error bodies short enough for logs and error chains.
fn summarize_body(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "(empty body)".to_string();
    }
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let mut out: String = trimmed.chars().take(MAX).collect();
        out.push_str("...");
        out
    }
}
