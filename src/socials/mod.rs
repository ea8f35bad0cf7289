//! Social-login federation contract.
//!
//! Providers are external collaborators: each adapter turns a provider
//! callback code into a normalized [`ExternalIdentity`], and the session
//! engine handles the rest (`SessionEngine::social_login`). The registry is
//! an explicit dependency object built at startup; there is no ambient
//! provider state.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Normalized identity record returned by every provider adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Provider name, lowercase (`google`, `yandex`, `vk`).
    pub provider: String,
    /// Subject id in the provider's namespace.
    pub external_id: String,
    /// Username hint for first-time provisioning.
    pub username: String,
    /// Email hint for first-time provisioning.
    pub email: String,
}

/// Capability implemented by each social provider adapter.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Where to send the user to start the provider's OAuth flow.
    fn redirect_url(&self) -> String;

    /// Exchange a provider callback code for a normalized identity.
    async fn exchange(&self, code: &str) -> Result<ExternalIdentity>;
}

/// Provider lookup table, constructed once at startup and passed explicitly.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers
            .insert(provider.name().to_lowercase(), provider);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(&name.to_lowercase()).cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider;

    #[async_trait]
    impl IdentityProvider for StubProvider {
        fn name(&self) -> &str {
            "Google"
        }

        fn redirect_url(&self) -> String {
            "https://accounts.example.com/o/oauth2/auth".to_string()
        }

        async fn exchange(&self, code: &str) -> Result<ExternalIdentity> {
            Ok(ExternalIdentity {
                provider: "google".to_string(),
                external_id: format!("sub-{code}"),
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn registry_is_case_insensitive() {
        let registry = ProviderRegistry::new().with_provider(Arc::new(StubProvider));

        let provider = registry.get("GOOGLE").expect("provider registered");
        assert_eq!(provider.name(), "Google");
        assert!(registry.get("vk").is_none());

        let identity = provider.exchange("abc").await.unwrap();
        assert_eq!(identity.external_id, "sub-abc");
    }

    #[test]
    fn empty_registry_reports_empty() {
        assert!(ProviderRegistry::new().is_empty());
    }
}
