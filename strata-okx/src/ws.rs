use serde::{Deserialize, Serialize};

use strata_core::prelude::{Credentials, Interval, MarketChannel, VenueError};

use crate::auth;
use crate::model::interval_to_bar_param;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkxWsArg {
    pub channel: String,
    #[serde(rename = "instId", skip_serializing_if = "Option::is_none")]
    pub inst_id: Option<String>,
    #[serde(rename = "instType", skip_serializing_if = "Option::is_none")]
    pub inst_type: Option<String>,
}

impl OkxWsArg {
    pub fn instrument(channel: &str, inst_id: &str) -> Self {
        Self {
            channel: channel.to_string(),
            inst_id: Some(inst_id.to_string()),
            inst_type: None,
        }
    }

    pub fn inst_type(channel: &str, inst_type: &str) -> Self {
        Self {
            channel: channel.to_string(),
            inst_id: None,
            inst_type: Some(inst_type.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkxWsRequest {
    pub op: String,
    pub args: Vec<serde_json::Value>,
}

/// Public/business channel name for a market channel. Klines go over the
/// business endpoint as `candle{bar}`.
pub fn channel_name(channel: MarketChannel, interval: Option<Interval>) -> String {
    match channel {
        MarketChannel::Trades => "trades".to_string(),
        MarketChannel::Tickers => "tickers".to_string(),
        MarketChannel::OrderBooks => "books5".to_string(),
        MarketChannel::Klines => format!("candle{}", interval_to_bar_param(interval.unwrap_or(Interval::M1))),
        MarketChannel::Funding => "funding-rate".to_string(),
        MarketChannel::MarkPrice => "mark-price".to_string(),
    }
}

pub fn subscribe_frame(args: &[OkxWsArg]) -> String {
    build_frame("subscribe", args)
}

pub fn unsubscribe_frame(args: &[OkxWsArg]) -> String {
    build_frame("unsubscribe", args)
}

fn build_frame(op: &str, args: &[OkxWsArg]) -> String {
    let request = OkxWsRequest {
        op: op.to_string(),
        args: args.iter().map(|a| serde_json::to_value(a).expect("arg serializes")).collect(),
    };
    serde_json::to_string(&request).expect("frame serializes")
}

/// Login op for the private endpoint.
pub fn login_frame(credentials: &Credentials) -> Result<String, VenueError> {
    let passphrase = credentials
        .passphrase
        .as_deref()
        .ok_or_else(|| VenueError::Auth("okx credentials need a passphrase".to_string()))?;
    let timestamp = auth::ws_timestamp();
    let sign = auth::sign_ws_login(&credentials.api_secret, &timestamp);
    let request = OkxWsRequest {
        op: "login".to_string(),
        args: vec![serde_json::json!({
            "apiKey": credentials.api_key,
            "passphrase": passphrase,
            "timestamp": timestamp,
            "sign": sign,
        })],
    };
    Ok(serde_json::to_string(&request).expect("frame serializes"))
}

/// Default private subscriptions: orders, account, positions over SWAP.
pub fn private_args() -> Vec<OkxWsArg> {
    vec![
        OkxWsArg::inst_type("orders", "SWAP"),
        OkxWsArg {
            channel: "account".to_string(),
            inst_id: None,
            inst_type: None,
        },
        OkxWsArg::inst_type("positions", "SWAP"),
    ]
}
