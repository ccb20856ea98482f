use serde::{Deserialize, Serialize};
use strum::Display;

use super::{MarketSide, VenueName};

/// Order lifecycle update from a venue private stream, already normalized.
/// The status string stays venue-native; strategies correlate on the
/// client order id they chose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdateFrame {
    pub venue: VenueName,
    pub symbol: String,
    pub timestamp_ms: i64,
    pub timestamp_ns: u64,
    pub exchange_order_id: String,
    pub client_order_id: Option<String>,
    pub status: String,
    pub side: Option<MarketSide>,
    pub price: f64,
    pub quantity: f64,
    pub filled_quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub total: f64,
    pub available: f64,
}

/// Account (wallet) snapshot from a venue private stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceFrame {
    pub venue: VenueName,
    pub timestamp_ms: i64,
    pub timestamp_ns: u64,
    pub balances: Vec<AssetBalance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFrame {
    pub venue: VenueName,
    pub symbol: String,
    pub timestamp_ms: i64,
    pub timestamp_ns: u64,
    pub position_side: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VenueStatus {
    Degraded,
    Restored,
}

/// Emitted after N consecutive reconnect failures, and again once the
/// session is back with its subscriptions replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueStatusFrame {
    pub venue: VenueName,
    pub role: super::SessionRole,
    pub timestamp_ms: i64,
    pub status: VenueStatus,
    pub detail: String,
}
