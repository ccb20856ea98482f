use std::collections::HashMap;
use std::env;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::models::{Credentials, MarketChannel, VenueName};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

impl RedisSettings {
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub prefix: String,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            prefix: "strata".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Subscribe every live USDT perpetual discovered at startup.
    pub subscribe_all: bool,
    pub okx_symbols: Vec<String>,
    pub binance_symbols: Vec<String>,
    pub channels: Vec<MarketChannel>,
    pub ping_interval_secs: u64,
    /// Reconnect when a session delivers nothing for this long.
    pub stale_timeout_secs: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            subscribe_all: false,
            okx_symbols: vec![],
            binance_symbols: vec![],
            channels: vec![MarketChannel::Trades, MarketChannel::Tickers, MarketChannel::Klines],
            ping_interval_secs: 25,
            stale_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OkxSettings {
    pub rest_url: String,
    pub ws_public_url: String,
    pub ws_business_url: String,
    pub ws_private_url: String,
    pub rest_min_interval_ms: u64,
}

impl Default for OkxSettings {
    fn default() -> Self {
        Self {
            rest_url: "https://www.okx.com".to_string(),
            ws_public_url: "wss://ws.okx.com:8443/ws/v5/public".to_string(),
            ws_business_url: "wss://ws.okx.com:8443/ws/v5/business".to_string(),
            ws_private_url: "wss://ws.okx.com:8443/ws/v5/private".to_string(),
            rest_min_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinanceSettings {
    pub rest_url: String,
    pub ws_url: String,
    pub rest_min_interval_ms: u64,
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            rest_url: "https://fapi.binance.com".to_string(),
            ws_url: "wss://fstream.binance.com".to_string(),
            rest_min_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueSettings {
    pub okx: OkxSettings,
    pub binance: BinanceSettings,
}

/// One credential entry from the accounts file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub venue: VenueName,
    pub api_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub is_testnet: bool,
}

impl AccountEntry {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            &self.api_key,
            &self.secret_key,
            self.passphrase.as_deref(),
            self.is_testnet,
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsSettings {
    pub default: Option<AccountEntry>,
    pub strategies: HashMap<String, AccountEntry>,
}

impl AccountsSettings {
    /// Per-venue default credentials: the configured default plus any
    /// environment override (env wins for its venue). Entries with blank
    /// key material are placeholders and are skipped.
    pub fn defaults(&self) -> HashMap<VenueName, AccountEntry> {
        let mut out = HashMap::new();
        if let Some(default) = &self.default
            && !default.api_key.is_empty()
            && !default.secret_key.is_empty()
        {
            out.insert(default.venue, default.clone());
        }
        if let Some(entry) = account_from_env(VenueName::Okx) {
            out.insert(VenueName::Okx, entry);
        }
        if let Some(entry) = account_from_env(VenueName::Binance) {
            out.insert(VenueName::Binance, entry);
        }
        out
    }
}

fn account_from_env(venue: VenueName) -> Option<AccountEntry> {
    let prefix = match venue {
        VenueName::Okx => "OKX",
        VenueName::Binance => "BINANCE",
    };
    let api_key = env::var(format!("{}_API_KEY", prefix)).ok()?;
    let secret_key = env::var(format!("{}_SECRET_KEY", prefix)).ok()?;
    let passphrase = env::var(format!("{}_PASSPHRASE", prefix)).ok();
    let is_testnet = env::var(format!("{}_TESTNET", prefix))
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE"))
        .unwrap_or(false);
    Some(AccountEntry {
        venue,
        api_key,
        secret_key,
        passphrase,
        is_testnet,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairSettings {
    /// Run the gap repair pass on startup before going live.
    pub run_on_startup: bool,
    /// Re-run the sweep on this cadence while live.
    pub interval_hours: Option<u64>,
    /// Give up on a gap after this many consecutive empty REST windows.
    pub empty_window_limit: u32,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            run_on_startup: false,
            interval_hours: None,
            empty_window_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    pub redis: RedisSettings,
    pub bus: BusSettings,
    pub ingest: IngestSettings,
    pub venues: VenueSettings,
    pub accounts: AccountsSettings,
    pub repair: RepairSettings,
    pub status_interval_secs: Option<u64>,
}

/// Load configuration from `CONFIG_DIR/{RUN_MODE}.json` (default `./live.json`)
/// with `STRATA_*` environment overrides, then the venue/redis env
/// variables on top.
pub fn load() -> StrataConfig {
    let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "live".into());
    let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| ".".into());

    let config = Config::builder()
        .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
        .add_source(File::with_name(&format!("{}/{}_accounts", config_dir, run_mode)).required(false))
        .add_source(Environment::with_prefix("STRATA").separator("__"))
        .build()
        .expect("failed to build configuration");

    debug!("loading configuration from: {}", config_dir);

    let mut cfg = match config.try_deserialize::<StrataConfig>() {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {:?}", e);
            panic!("failed to load configuration");
        }
    };

    apply_redis_env(&mut cfg.redis);
    cfg
}

fn apply_redis_env(redis: &mut RedisSettings) {
    if let Ok(host) = env::var("REDIS_HOST") {
        redis.host = host;
    }
    if let Ok(port) = env::var("REDIS_PORT")
        && let Ok(port) = port.parse()
    {
        redis.port = port;
    }
    if let Ok(password) = env::var("REDIS_PASSWORD") {
        redis.password = Some(password);
    }
    if let Ok(db) = env::var("REDIS_DB")
        && let Ok(db) = db.parse()
    {
        redis.db = db;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url() {
        let settings = RedisSettings::default();
        assert_eq!(settings.url(), "redis://127.0.0.1:6379/0");

        let with_auth = RedisSettings {
            password: Some("hunter2".into()),
            db: 3,
            ..RedisSettings::default()
        };
        assert_eq!(with_auth.url(), "redis://:hunter2@127.0.0.1:6379/3");
    }

    #[test]
    fn test_accounts_file_shape() {
        let json = r#"{
            "default": {
                "venue": "okx",
                "api_key": "k",
                "secret_key": "s",
                "passphrase": "p",
                "is_testnet": false
            },
            "strategies": {
                "s1": { "venue": "binance", "api_key": "k1", "secret_key": "s1" }
            }
        }"#;
        let accounts: AccountsSettings = serde_json::from_str(json).unwrap();
        assert_eq!(accounts.default.as_ref().unwrap().venue, VenueName::Okx);
        assert_eq!(accounts.strategies["s1"].venue, VenueName::Binance);
        assert!(!accounts.strategies["s1"].is_testnet);
    }
}
