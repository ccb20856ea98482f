use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use strata_core::prelude::{AccountInfo, Credentials, GatewayError, VenueClient, VenueName};

/// A strategy's venue binding. The account exclusively owns its client;
/// the registry exclusively owns accounts.
pub struct Account {
    pub strategy_id: Option<String>,
    pub venue: VenueName,
    pub credentials: Credentials,
    pub client: Arc<dyn VenueClient>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("strategy_id", &self.strategy_id)
            .field("venue", &self.venue)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

type ClientFactory = Box<dyn Fn(VenueName, &Credentials) -> Arc<dyn VenueClient> + Send + Sync>;

#[derive(Default)]
struct RegistryInner {
    accounts: HashMap<VenueName, HashMap<String, Arc<Account>>>,
    defaults: HashMap<VenueName, Arc<Account>>,
}

/// Per-venue strategy-to-credential map with one default slot per venue.
/// Read on every order and query; written only by register/unregister.
pub struct AccountRegistry {
    inner: RwLock<RegistryInner>,
    factory: ClientFactory,
}

impl AccountRegistry {
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            factory,
        }
    }

    pub async fn register_default(&self, venue: VenueName, credentials: Credentials) {
        let client = (self.factory)(venue, &credentials);
        let account = Arc::new(Account {
            strategy_id: None,
            venue,
            credentials,
            client,
        });
        info!(target: "gateway", "registered default account for {}", venue);
        self.inner.write().await.defaults.insert(venue, account);
    }

    pub async fn register(&self, strategy_id: &str, venue: VenueName, credentials: Credentials) {
        let client = (self.factory)(venue, &credentials);
        let account = Arc::new(Account {
            strategy_id: Some(strategy_id.to_string()),
            venue,
            credentials,
            client,
        });
        info!(target: "gateway", "registered account {} on {}", strategy_id, venue);
        self.inner
            .write()
            .await
            .accounts
            .entry(venue)
            .or_default()
            .insert(strategy_id.to_string(), account);
    }

    pub async fn unregister(&self, strategy_id: &str, venue: VenueName) -> bool {
        let removed = self
            .inner
            .write()
            .await
            .accounts
            .get_mut(&venue)
            .and_then(|m| m.remove(strategy_id))
            .is_some();
        if removed {
            info!(target: "gateway", "unregistered account {} on {}", strategy_id, venue);
        }
        removed
    }

    /// The routing rule: the strategy's own binding, else the venue
    /// default (logged), else `NoAccountBound`.
    pub async fn resolve(&self, strategy_id: &str, venue: VenueName) -> Result<Arc<Account>, GatewayError> {
        let inner = self.inner.read().await;
        if let Some(account) = inner.accounts.get(&venue).and_then(|m| m.get(strategy_id)) {
            return Ok(account.clone());
        }
        if let Some(default) = inner.defaults.get(&venue) {
            debug!(target: "gateway", "strategy {} falling back to the {} default account", strategy_id, venue);
            return Ok(default.clone());
        }
        Err(GatewayError::NoAccountBound {
            strategy_id: strategy_id.to_string(),
            venue,
        })
    }

    pub async fn default_client(&self, venue: VenueName) -> Option<Arc<dyn VenueClient>> {
        self.inner.read().await.defaults.get(&venue).map(|a| a.client.clone())
    }

    pub async fn list(&self) -> Vec<AccountInfo> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        for (venue, account) in &inner.defaults {
            out.push(AccountInfo {
                strategy_id: "default".to_string(),
                venue: *venue,
                api_key_tail: key_tail(&account.credentials.api_key),
                is_default: true,
            });
        }
        for (venue, accounts) in &inner.accounts {
            for (strategy_id, account) in accounts {
                out.push(AccountInfo {
                    strategy_id: strategy_id.clone(),
                    venue: *venue,
                    api_key_tail: key_tail(&account.credentials.api_key),
                    is_default: false,
                });
            }
        }
        out.sort_by(|a, b| (a.venue.to_string(), &a.strategy_id).cmp(&(b.venue.to_string(), &b.strategy_id)));
        out
    }
}

fn key_tail(api_key: &str) -> String {
    let tail: String = api_key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("...{}", tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockVenueClient;

    fn registry() -> AccountRegistry {
        AccountRegistry::new(Box::new(|venue, _creds| MockVenueClient::shared(venue)))
    }

    #[test_log::test(tokio::test)]
    async fn test_resolve_prefers_strategy_binding_over_default() {
        let registry = registry();
        registry
            .register_default(VenueName::Okx, Credentials::new("default-key", "s", Some("p"), false))
            .await;

        // No binding for s1 yet: the default account answers.
        let resolved = registry.resolve("s1", VenueName::Okx).await.unwrap();
        assert!(resolved.strategy_id.is_none());

        // Bind s1 and the same call routes to its own account.
        registry
            .register("s1", VenueName::Okx, Credentials::new("s1-key", "s", Some("p"), false))
            .await;
        let resolved = registry.resolve("s1", VenueName::Okx).await.unwrap();
        assert_eq!(resolved.strategy_id.as_deref(), Some("s1"));
        assert_eq!(resolved.credentials.api_key, "s1-key");
    }

    #[test_log::test(tokio::test)]
    async fn test_resolve_without_any_binding_fails() {
        let registry = registry();
        let err = registry.resolve("s1", VenueName::Binance).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoAccountBound { .. }));
        assert!(err.to_string().contains("NoAccountBound"));
    }

    #[test_log::test(tokio::test)]
    async fn test_unregister_falls_back_to_default() {
        let registry = registry();
        registry
            .register_default(VenueName::Okx, Credentials::new("default-key", "s", Some("p"), false))
            .await;
        registry
            .register("s1", VenueName::Okx, Credentials::new("s1-key", "s", Some("p"), false))
            .await;

        assert!(registry.unregister("s1", VenueName::Okx).await);
        assert!(!registry.unregister("s1", VenueName::Okx).await);
        let resolved = registry.resolve("s1", VenueName::Okx).await.unwrap();
        assert!(resolved.strategy_id.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_list_marks_defaults() {
        let registry = registry();
        registry
            .register_default(VenueName::Okx, Credentials::new("abcdef1234", "s", Some("p"), false))
            .await;
        registry
            .register("s1", VenueName::Binance, Credentials::new("xyz9876543", "s", None, false))
            .await;
        let accounts = registry.list().await;
        assert_eq!(accounts.len(), 2);
        let default = accounts.iter().find(|a| a.is_default).unwrap();
        assert_eq!(default.api_key_tail, "...1234");
        let bound = accounts.iter().find(|a| !a.is_default).unwrap();
        assert_eq!(bound.strategy_id, "s1");
    }
}
