use serde::{Deserialize, Serialize};

use strata_core::prelude::{Interval, MarketChannel};

/// Stream name for one (symbol, channel). Klines ride the continuous-
/// contract stream so index-price products never leak in.
pub fn stream_name(symbol: &str, channel: MarketChannel, interval: Option<Interval>) -> String {
    let symbol = symbol.to_lowercase();
    match channel {
        MarketChannel::Trades => format!("{}@aggTrade", symbol),
        MarketChannel::Tickers => format!("{}@bookTicker", symbol),
        MarketChannel::OrderBooks => format!("{}@depth5@100ms", symbol),
        MarketChannel::Klines => {
            format!("{}_perpetual@continuousKline_{}", symbol, interval.unwrap_or(Interval::M1))
        }
        MarketChannel::Funding | MarketChannel::MarkPrice => format!("{}@markPrice", symbol),
    }
}

/// Combined-stream connection URL.
pub fn combined_stream_url(ws_base: &str, streams: &[String]) -> String {
    format!("{}/stream?streams={}", ws_base.trim_end_matches('/'), streams.join("/"))
}

/// User-data stream URL for a listen key.
pub fn user_stream_url(ws_base: &str, listen_key: &str) -> String {
    format!("{}/ws/{}", ws_base.trim_end_matches('/'), listen_key)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceWsRequest {
    pub method: String,
    pub params: Vec<String>,
    pub id: u64,
}

pub fn subscribe_frame(streams: &[String], id: u64) -> String {
    serde_json::to_string(&BinanceWsRequest {
        method: "SUBSCRIBE".to_string(),
        params: streams.to_vec(),
        id,
    })
    .expect("frame serializes")
}

pub fn unsubscribe_frame(streams: &[String], id: u64) -> String {
    serde_json::to_string(&BinanceWsRequest {
        method: "UNSUBSCRIBE".to_string(),
        params: streams.to_vec(),
        id,
    })
    .expect("frame serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_names() {
        assert_eq!(stream_name("BTCUSDT", MarketChannel::Trades, None), "btcusdt@aggTrade");
        assert_eq!(
            stream_name("BTCUSDT", MarketChannel::Klines, Some(Interval::M1)),
            "btcusdt_perpetual@continuousKline_1m"
        );
        assert_eq!(stream_name("ethusdt", MarketChannel::Tickers, None), "ethusdt@bookTicker");
        assert_eq!(stream_name("BTCUSDT", MarketChannel::MarkPrice, None), "btcusdt@markPrice");
    }

    #[test]
    fn test_combined_url() {
        let streams = vec!["btcusdt@aggTrade".to_string(), "ethusdt@aggTrade".to_string()];
        assert_eq!(
            combined_stream_url("wss://fstream.binance.com", &streams),
            "wss://fstream.binance.com/stream?streams=btcusdt@aggTrade/ethusdt@aggTrade"
        );
    }

    #[test]
    fn test_subscribe_frame() {
        let frame = subscribe_frame(&["btcusdt@aggTrade".to_string()], 7);
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(value["params"][0], "btcusdt@aggTrade");
        assert_eq!(value["id"], 7);
    }
}
