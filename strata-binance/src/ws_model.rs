use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};

/// Combined-stream wrapper; raw `/ws` connections deliver the payload
/// bare, so both shapes funnel through [`BinanceWsEnvelope::payload`].
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceWsEnvelope {
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl BinanceWsEnvelope {
    pub fn payload(self, fallback: serde_json::Value) -> serde_json::Value {
        self.data.unwrap_or(fallback)
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAggTrade {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "a")]
    pub agg_trade_id: u64,
    #[serde(rename = "p")]
    #[serde_as(as = "DisplayFromStr")]
    pub price: f64,
    #[serde(rename = "q")]
    #[serde_as(as = "DisplayFromStr")]
    pub quantity: f64,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceBookTicker {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    #[serde_as(as = "DisplayFromStr")]
    pub bid_price: f64,
    #[serde(rename = "B")]
    #[serde_as(as = "DisplayFromStr")]
    pub bid_quantity: f64,
    #[serde(rename = "a")]
    #[serde_as(as = "DisplayFromStr")]
    pub ask_price: f64,
    #[serde(rename = "A")]
    #[serde_as(as = "DisplayFromStr")]
    pub ask_quantity: f64,
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
    #[serde(rename = "T", default)]
    pub transaction_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceDepthUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "b", default)]
    pub bids: Vec<[String; 2]>,
    #[serde(rename = "a", default)]
    pub asks: Vec<[String; 2]>,
}

impl BinanceDepthUpdate {
    pub fn levels(rows: &[[String; 2]]) -> Vec<[f64; 2]> {
        rows.iter()
            .filter_map(|row| {
                let price = row[0].parse::<f64>().ok()?;
                let quantity = row[1].parse::<f64>().ok()?;
                Some([price, quantity])
            })
            .take(5)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceContinuousKline {
    #[serde(rename = "ps")]
    pub pair: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "k")]
    pub kline: BinanceKlinePayload,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceKlinePayload {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    #[serde_as(as = "DisplayFromStr")]
    pub open: f64,
    #[serde(rename = "h")]
    #[serde_as(as = "DisplayFromStr")]
    pub high: f64,
    #[serde(rename = "l")]
    #[serde_as(as = "DisplayFromStr")]
    pub low: f64,
    #[serde(rename = "c")]
    #[serde_as(as = "DisplayFromStr")]
    pub close: f64,
    #[serde(rename = "v")]
    #[serde_as(as = "DisplayFromStr")]
    pub volume: f64,
    #[serde(rename = "x")]
    pub closed: bool,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceMarkPrice {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "p")]
    #[serde_as(as = "DisplayFromStr")]
    pub mark_price: f64,
    #[serde(rename = "r", default)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub funding_rate: Option<f64>,
    #[serde(rename = "T", default)]
    pub next_funding_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceOrderTradeUpdate {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "o")]
    pub order: BinanceOrderPayload,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceOrderPayload {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c", default)]
    pub client_order_id: String,
    #[serde(rename = "S", default)]
    pub side: Option<String>,
    #[serde(rename = "q")]
    #[serde_as(as = "DisplayFromStr")]
    pub quantity: f64,
    #[serde(rename = "p")]
    #[serde_as(as = "DisplayFromStr")]
    pub price: f64,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "z")]
    #[serde_as(as = "DisplayFromStr")]
    pub filled_quantity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAccountUpdate {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "a")]
    pub account: BinanceAccountPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceAccountPayload {
    #[serde(rename = "B", default)]
    pub balances: Vec<BinanceWalletBalance>,
    #[serde(rename = "P", default)]
    pub positions: Vec<BinanceWalletPosition>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceWalletBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "wb")]
    #[serde_as(as = "DisplayFromStr")]
    pub wallet_balance: f64,
    #[serde(rename = "cw")]
    #[serde_as(as = "DisplayFromStr")]
    pub cross_wallet: f64,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceWalletPosition {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "pa")]
    #[serde_as(as = "DisplayFromStr")]
    pub position_amount: f64,
    #[serde(rename = "ep")]
    #[serde_as(as = "DisplayFromStr")]
    pub entry_price: f64,
    #[serde(rename = "up")]
    #[serde_as(as = "DisplayFromStr")]
    pub unrealized_pnl: f64,
    #[serde(rename = "ps", default)]
    pub position_side: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agg_trade_payload() {
        let trade: BinanceAggTrade = serde_json::from_str(
            r#"{"e":"aggTrade","E":1735689659701,"s":"BTCUSDT","a":26129,"p":"93630.10","q":"0.5","f":1,"l":2,"T":1735689659690,"m":true}"#,
        )
        .unwrap();
        assert_eq!(trade.price, 93630.1);
        assert!(trade.buyer_is_maker);
    }

    #[test]
    fn test_kline_payload_close_flag() {
        let kline: BinanceContinuousKline = serde_json::from_str(
            r#"{"e":"continuous_kline","E":1735689660002,"ps":"BTCUSDT","ct":"PERPETUAL","k":{"t":1735689600000,"T":1735689659999,"i":"1m","o":"1","h":"2","l":"0.5","c":"1.5","v":"9","x":true}}"#,
        )
        .unwrap();
        assert!(kline.kline.closed);
        assert_eq!(kline.kline.open_time, 1_735_689_600_000);
        assert_eq!(kline.kline.interval, "1m");
    }

    #[test]
    fn test_mark_price_funding_optional() {
        let mark: BinanceMarkPrice = serde_json::from_str(
            r#"{"e":"markPriceUpdate","E":1735689659701,"s":"BTCUSDT","p":"93640.00"}"#,
        )
        .unwrap();
        assert!(mark.funding_rate.is_none());
        assert!(mark.next_funding_time.is_none());
    }

    #[test]
    fn test_depth_levels_cap_at_five() {
        let rows: Vec<[String; 2]> = (0..8).map(|i| [format!("{}", 100 + i), "1".to_string()]).collect();
        assert_eq!(BinanceDepthUpdate::levels(&rows).len(), 5);
    }
}
