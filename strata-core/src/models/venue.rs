use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VenueName {
    Okx,
    Binance,
}

/// Connection role of a venue WebSocket session.
///
/// OKX splits public market data, candle streams and the private user
/// stream over three endpoints; Binance gets the same split so both venues
/// stay under their per-connection channel limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    PublicMarket,
    BusinessKline,
    PrivateUser,
}

/// Canonical archive key for a bar stream.
pub fn stream_key(venue: VenueName, symbol: &str, interval: Interval) -> String {
    format!("kline:{}:{}:{}", venue, symbol, interval)
}

/// Parse a `kline:{venue}:{symbol}:{interval}` key back into its parts.
pub fn parse_stream_key(key: &str) -> Option<(VenueName, String, Interval)> {
    let mut parts = key.splitn(4, ':');
    if parts.next()? != "kline" {
        return None;
    }
    let venue = parts.next()?.parse::<VenueName>().ok()?;
    let symbol = parts.next()?.to_string();
    let interval = parts.next()?.parse::<Interval>().ok()?;
    Some((venue, symbol, interval))
}

/// Derive the owning venue from the symbol form.
///
/// OKX swaps are dashed (`BTC-USDT-SWAP`); Binance USDT perpetuals are
/// fused (`BTCUSDT`). Only USDT-quoted contracts qualify; anything else is
/// not ours to repair.
pub fn venue_for_symbol(symbol: &str) -> Option<VenueName> {
    if symbol.contains("-USDT-SWAP") {
        Some(VenueName::Okx)
    } else if symbol.ends_with("USDT") && !symbol.contains('-') {
        Some(VenueName::Binance)
    } else {
        None
    }
}
