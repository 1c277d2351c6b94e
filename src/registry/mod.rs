//! Configuration registry: named provider registrations plus the client
//! policy object.
//!
//! The registry stores a constructor function per provider name and builds a
//! fresh backend instance on every lookup, so no mutable backend state is
//! ever shared across lookups. There is no global singleton: callers hold an
//! explicit `Arc<Registry>` handle and pass it into the facade.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::error::ProviderError;
use crate::providers::{AnthropicProvider, GeminiProvider, OllamaProvider, OpenAiProvider};
use crate::traits::Provider;
use crate::types::ProviderOptions;

/// Constructor stored per provider name. Construction must be cheap and
/// side-effect-free; the registry invokes it on every lookup.
pub type ProviderFactory =
    Arc<dyn Fn(&str, &ProviderOptions) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync>;

/// Built-in backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Ollama,
    OpenAi,
    Anthropic,
    Gemini,
}

impl BackendKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    fn factory(&self) -> ProviderFactory {
        match self {
            Self::Ollama => Arc::new(|name: &str, options: &ProviderOptions| {
                let provider: Arc<dyn Provider> = Arc::new(OllamaProvider::new(name, options)?);
                Ok(provider)
            }),
            Self::OpenAi => Arc::new(|name: &str, options: &ProviderOptions| {
                let provider: Arc<dyn Provider> = Arc::new(OpenAiProvider::new(name, options)?);
                Ok(provider)
            }),
            Self::Anthropic => Arc::new(|name: &str, options: &ProviderOptions| {
                let provider: Arc<dyn Provider> = Arc::new(AnthropicProvider::new(name, options)?);
                Ok(provider)
            }),
            Self::Gemini => Arc::new(|name: &str, options: &ProviderOptions| {
                let provider: Arc<dyn Provider> = Arc::new(GeminiProvider::new(name, options)?);
                Ok(provider)
            }),
        }
    }
}

/// Process-wide call policy: which provider is bound by default and how the
/// facade retries and falls back. Plain mutable settings; mutating them
/// concurrently with in-flight operations is last-writer-wins.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Provider bound when the caller does not pick one.
    pub default_provider: String,
    /// Transport timeout handed to backends that do not set their own.
    pub timeout: Duration,
    /// Total attempts per provider, including the first.
    pub retry_attempts: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Explicit fallback order. Empty means "every currently-available
    /// registered provider".
    pub fallback_providers: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_provider: "ollama".to_string(),
            timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
            fallback_providers: Vec::new(),
        }
    }
}

struct Registration {
    backend: String,
    factory: ProviderFactory,
    options: ProviderOptions,
}

struct RegistryState {
    /// Registrations in insertion order; order drives implicit fallback.
    providers: Vec<(String, Registration)>,
    config: ClientConfig,
}

/// Owner of provider registrations and the client policy.
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                providers: Vec::new(),
                config,
            }),
        }
    }

    /// Register (or overwrite) a named provider backed by a built-in kind.
    pub fn add_provider(&self, name: &str, backend: BackendKind, options: ProviderOptions) {
        self.add_provider_with_factory(name, backend.as_str(), backend.factory(), options);
    }

    /// Register (or overwrite) a named provider with a caller-supplied
    /// constructor. Overwriting keeps the original registration position.
    pub fn add_provider_with_factory(
        &self,
        name: &str,
        backend: impl Into<String>,
        factory: ProviderFactory,
        options: ProviderOptions,
    ) {
        let key = normalize_name(name);
        let registration = Registration {
            backend: backend.into(),
            factory,
            options,
        };
        let mut state = self.write_state();
        if let Some(entry) = state.providers.iter_mut().find(|(n, _)| *n == key) {
            entry.1 = registration;
        } else {
            state.providers.push((key, registration));
        }
    }

    /// Construct a fresh backend instance for `name`.
    ///
    /// The policy `timeout` is injected into the options when the
    /// registration does not set its own, so backends always see an
    /// effective transport timeout.
    pub fn provider(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        let key = normalize_name(name);
        let (factory, options) = {
            let state = self.read_state();
            let registration = state
                .providers
                .iter()
                .find(|(n, _)| *n == key)
                .map(|(_, registration)| registration)
                .ok_or_else(|| {
                    ProviderError::Provider(format!("provider '{key}' is not registered"))
                })?;
            let mut options = registration.options.clone();
            if !options.contains("timeout") {
                options.insert("timeout", state.config.timeout.as_secs_f64());
            }
            (registration.factory.clone(), options)
        };
        factory(&key, &options)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        let key = normalize_name(name);
        self.read_state().providers.iter().any(|(n, _)| *n == key)
    }

    /// Registered names in insertion order.
    pub fn provider_names(&self) -> Vec<String> {
        self.read_state()
            .providers
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names whose freshly constructed instance reports available right now.
    pub async fn available_providers(&self) -> Vec<String> {
        let names = self.provider_names();
        let mut available = Vec::new();
        for name in names {
            if let Ok(provider) = self.provider(&name)
                && provider.available().await
            {
                available.push(name);
            }
        }
        available
    }

    /// Backend label and raw options for a registration, for introspection.
    pub fn registration(&self, name: &str) -> Option<(String, ProviderOptions)> {
        let key = normalize_name(name);
        self.read_state()
            .providers
            .iter()
            .find(|(n, _)| *n == key)
            .map(|(_, registration)| (registration.backend.clone(), registration.options.clone()))
    }

    /// Snapshot of the current policy.
    pub fn config(&self) -> ClientConfig {
        self.read_state().config.clone()
    }

    /// Mutate the policy in place. Last-writer-wins with respect to
    /// in-flight operations.
    pub fn update_config(&self, update: impl FnOnce(&mut ClientConfig)) {
        update(&mut self.write_state().config);
    }

    /// Drop all registrations and restore the default policy. Intended for
    /// test isolation.
    pub fn reset(&self) {
        let mut state = self.write_state();
        state.providers.clear();
        state.config = ClientConfig::default();
    }

    // A poisoned lock only means another thread panicked mid-write; the
    // registration list itself stays structurally valid, so recover it.
    fn read_state(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Canonical symbolic form for provider names.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::types::{CompletionResponse, ContextItem, HealthStatus, RequestOptions,
        SharedOptions};

    struct CountingProvider {
        name: String,
        shared: SharedOptions,
    }

    #[async_trait]
    impl Provider for CountingProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn backend(&self) -> &'static str {
            "counting"
        }

        fn shared(&self) -> &SharedOptions {
            &self.shared
        }

        async fn generate_embedding(
            &self,
            _text: &str,
            _options: &RequestOptions,
        ) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![0.0])
        }

        async fn generate_response(
            &self,
            _prompt: &str,
            _context: &[ContextItem],
            _options: &RequestOptions,
        ) -> Result<CompletionResponse, ProviderError> {
            Err(ProviderError::Provider("unused".into()))
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::healthy(&self.name)
        }
    }

    fn counting_factory(constructions: Arc<AtomicU32>) -> ProviderFactory {
        Arc::new(move |name: &str, options: &ProviderOptions| {
            constructions.fetch_add(1, Ordering::SeqCst);
            let provider: Arc<dyn Provider> = Arc::new(CountingProvider {
                name: name.to_string(),
                shared: SharedOptions::parse(options),
            });
            Ok(provider)
        })
    }

    #[test]
    fn names_are_normalized() {
        let registry = Registry::new();
        let constructions = Arc::new(AtomicU32::new(0));
        registry.add_provider_with_factory(
            "  OpenAI ",
            "counting",
            counting_factory(constructions),
            ProviderOptions::new(),
        );
        assert!(registry.contains("openai"));
        assert!(registry.contains("OPENAI"));
        assert_eq!(registry.provider_names(), vec!["openai"]);
    }

    #[test]
    fn lookup_constructs_a_fresh_instance_every_time() {
        let registry = Registry::new();
        let constructions = Arc::new(AtomicU32::new(0));
        registry.add_provider_with_factory(
            "local",
            "counting",
            counting_factory(constructions.clone()),
            ProviderOptions::new(),
        );
        registry.provider("local").unwrap();
        registry.provider("local").unwrap();
        registry.provider("local").unwrap();
        assert_eq!(constructions.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let registry = Registry::new();
        let err = match registry.provider("ghost") {
            Ok(_) => panic!("lookup of an unregistered name must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, ProviderError::Provider(_)));
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn overwriting_keeps_registration_order() {
        let registry = Registry::new();
        let constructions = Arc::new(AtomicU32::new(0));
        registry.add_provider_with_factory(
            "a",
            "counting",
            counting_factory(constructions.clone()),
            ProviderOptions::new(),
        );
        registry.add_provider_with_factory(
            "b",
            "counting",
            counting_factory(constructions.clone()),
            ProviderOptions::new(),
        );
        registry.add_provider_with_factory(
            "a",
            "counting",
            counting_factory(constructions),
            ProviderOptions::new().with("model", "other"),
        );
        assert_eq!(registry.provider_names(), vec!["a", "b"]);
        let (_, options) = registry.registration("a").unwrap();
        assert_eq!(options.get_str("model"), Some("other"));
    }

    #[test]
    fn policy_timeout_is_injected_when_options_lack_one() {
        let registry = Registry::new();
        registry.update_config(|config| config.timeout = Duration::from_secs(7));
        let seen = Arc::new(RwLock::new(None));
        let seen_in = seen.clone();
        registry.add_provider_with_factory(
            "local",
            "counting",
            Arc::new(move |name: &str, options: &ProviderOptions| {
                *seen_in.write().unwrap() = options.get_f64("timeout");
                let provider: Arc<dyn Provider> = Arc::new(CountingProvider {
                    name: name.to_string(),
                    shared: SharedOptions::parse(options),
                });
                Ok(provider)
            }),
            ProviderOptions::new(),
        );
        registry.provider("local").unwrap();
        assert_eq!(*seen.read().unwrap(), Some(7.0));
    }

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.default_provider, "ollama");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert!(config.fallback_providers.is_empty());
    }

    #[test]
    fn reset_restores_defaults_and_clears_registrations() {
        let registry = Registry::new();
        let constructions = Arc::new(AtomicU32::new(0));
        registry.add_provider_with_factory(
            "local",
            "counting",
            counting_factory(constructions),
            ProviderOptions::new(),
        );
        registry.update_config(|config| {
            config.retry_attempts = 9;
            config.default_provider = "local".to_string();
        });
        registry.reset();
        assert!(registry.provider_names().is_empty());
        assert_eq!(registry.config().retry_attempts, 3);
        assert_eq!(registry.config().default_provider, "ollama");
    }
}
