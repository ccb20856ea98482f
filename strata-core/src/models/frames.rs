use std::fmt;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::{Bar, Interval, VenueName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MarketSide {
    Buy,
    Sell,
}

/// A single trade print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFrame {
    pub venue: VenueName,
    pub symbol: String,
    pub timestamp_ms: i64,
    pub timestamp_ns: u64,
    pub price: f64,
    pub quantity: f64,
    pub side: MarketSide,
    pub trade_id: String,
}

/// Best bid/ask plus last price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerFrame {
    pub venue: VenueName,
    pub symbol: String,
    pub timestamp_ms: i64,
    pub timestamp_ns: u64,
    pub last: f64,
    pub bid: f64,
    pub bid_quantity: f64,
    pub ask: f64,
    pub ask_quantity: f64,
}

/// Top levels of the book, price/quantity pairs best-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookFrame {
    pub venue: VenueName,
    pub symbol: String,
    pub timestamp_ms: i64,
    pub timestamp_ns: u64,
    pub bids: Vec<[f64; 2]>,
    pub asks: Vec<[f64; 2]>,
}

/// A kline frame. `closed` carries the venue's confirm flag; only closed
/// frames reach the aggregator and the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineFrame {
    pub venue: VenueName,
    pub symbol: String,
    pub interval: Interval,
    pub timestamp_ms: i64,
    pub timestamp_ns: u64,
    #[serde(flatten)]
    pub bar: Bar,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingFrame {
    pub venue: VenueName,
    pub symbol: String,
    pub timestamp_ms: i64,
    pub timestamp_ns: u64,
    pub funding_rate: f64,
    pub next_funding_time_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPriceFrame {
    pub venue: VenueName,
    pub symbol: String,
    pub timestamp_ms: i64,
    pub timestamp_ns: u64,
    pub mark_price: f64,
}

impl fmt::Display for TradeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}@{}",
            self.venue, self.symbol, self.side, self.quantity, self.price
        )
    }
}

impl fmt::Display for KlineFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} closed:{}",
            self.venue, self.symbol, self.interval, self.bar, self.closed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kline_frame_flattens_bar() {
        let frame = KlineFrame {
            venue: VenueName::Okx,
            symbol: "BTC-USDT-SWAP".into(),
            interval: Interval::M1,
            timestamp_ms: 1_735_689_660_123,
            timestamp_ns: 42,
            bar: Bar::new(1_735_689_600_000, 1.0, 2.0, 0.5, 1.5, 9.0),
            closed: true,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["timestamp"], 1_735_689_600_000i64);
        assert_eq!(json["timestamp_ms"], 1_735_689_660_123i64);
        assert_eq!(json["open"], 1.0);
        assert_eq!(json["closed"], true);
    }
}
