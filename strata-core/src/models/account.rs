use std::fmt;

use serde::{Deserialize, Serialize};

use super::{RegisterAccount, VenueName};

/// Venue credentials. Debug intentionally elides the secret material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: Option<String>,
    pub testnet: bool,
}

impl Credentials {
    pub fn new(api_key: &str, api_secret: &str, passphrase: Option<&str>, testnet: bool) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            passphrase: passphrase.map(str::to_string),
            testnet,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"***")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("testnet", &self.testnet)
            .finish()
    }
}

impl From<&RegisterAccount> for Credentials {
    fn from(msg: &RegisterAccount) -> Self {
        Self {
            api_key: msg.api_key.clone(),
            api_secret: msg.secret_key.clone(),
            passphrase: msg.passphrase.clone(),
            testnet: msg.is_testnet,
        }
    }
}

/// Summary of one registry binding, safe to hand back on `list_accounts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub strategy_id: String,
    pub venue: VenueName,
    pub api_key_tail: String,
    pub is_default: bool,
}
