use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};

/// Deserializers for the venue's numeric-string quirks.
pub mod de {
    use serde::{Deserialize, Deserializer};

    /// Numeric string that may be empty (market orders carry `px: ""`).
    pub fn f64_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(0.0),
            Some(s) => s.parse::<f64>().map_err(serde::de::Error::custom),
        }
    }

    /// Millisecond timestamp carried as a decimal string.
    pub fn ms_from_str<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<i64>().map_err(serde::de::Error::custom)
    }

    /// Optional millisecond timestamp, absent or empty-string.
    pub fn opt_ms_from_str<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(None),
            Some(s) => s.parse::<i64>().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

/// Envelope of every push on the v5 WebSocket: acks carry `event`, data
/// pushes carry `arg` + `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct OkxWsEnvelope {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub arg: Option<OkxWsChannelArg>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OkxWsChannelArg {
    pub channel: String,
    #[serde(rename = "instId", default)]
    pub inst_id: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct OkxWsTrade {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "tradeId")]
    pub trade_id: String,
    #[serde_as(as = "DisplayFromStr")]
    pub px: f64,
    #[serde_as(as = "DisplayFromStr")]
    pub sz: f64,
    pub side: String,
    #[serde(deserialize_with = "de::ms_from_str")]
    pub ts: i64,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct OkxWsTicker {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde_as(as = "DisplayFromStr")]
    pub last: f64,
    #[serde(rename = "bidPx", default, deserialize_with = "de::f64_or_zero")]
    pub bid_px: f64,
    #[serde(rename = "bidSz", default, deserialize_with = "de::f64_or_zero")]
    pub bid_sz: f64,
    #[serde(rename = "askPx", default, deserialize_with = "de::f64_or_zero")]
    pub ask_px: f64,
    #[serde(rename = "askSz", default, deserialize_with = "de::f64_or_zero")]
    pub ask_sz: f64,
    #[serde(deserialize_with = "de::ms_from_str")]
    pub ts: i64,
}

/// Book levels arrive as `[px, sz, liquidated, orders]` string arrays.
#[derive(Debug, Clone, Deserialize)]
pub struct OkxWsBookSnapshot {
    #[serde(default)]
    pub asks: Vec<Vec<String>>,
    #[serde(default)]
    pub bids: Vec<Vec<String>>,
    #[serde(deserialize_with = "de::ms_from_str")]
    pub ts: i64,
}

impl OkxWsBookSnapshot {
    pub fn levels(rows: &[Vec<String>]) -> Vec<[f64; 2]> {
        rows.iter()
            .filter_map(|row| {
                let px = row.first()?.parse::<f64>().ok()?;
                let sz = row.get(1)?.parse::<f64>().ok()?;
                Some([px, sz])
            })
            .collect()
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct OkxWsFundingRate {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "fundingRate")]
    #[serde_as(as = "DisplayFromStr")]
    pub funding_rate: f64,
    #[serde(rename = "nextFundingTime", default, deserialize_with = "de::opt_ms_from_str")]
    pub next_funding_time: Option<i64>,
    #[serde(deserialize_with = "de::ms_from_str")]
    pub ts: i64,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct OkxWsMarkPrice {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "markPx")]
    #[serde_as(as = "DisplayFromStr")]
    pub mark_px: f64,
    #[serde(deserialize_with = "de::ms_from_str")]
    pub ts: i64,
}

/// Order push from the private `orders` channel. Price and sizes may be
/// empty strings depending on the order shape.
#[derive(Debug, Clone, Deserialize)]
pub struct OkxWsOrder {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "ordId")]
    pub ord_id: String,
    #[serde(rename = "clOrdId", default)]
    pub cl_ord_id: String,
    pub state: String,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "de::f64_or_zero")]
    pub px: f64,
    #[serde(default, deserialize_with = "de::f64_or_zero")]
    pub sz: f64,
    #[serde(rename = "accFillSz", default, deserialize_with = "de::f64_or_zero")]
    pub acc_fill_sz: f64,
    #[serde(rename = "uTime", deserialize_with = "de::ms_from_str")]
    pub u_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OkxWsAccount {
    #[serde(default)]
    pub details: Vec<OkxWsBalanceDetail>,
    #[serde(rename = "uTime", deserialize_with = "de::ms_from_str")]
    pub u_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OkxWsBalanceDetail {
    pub ccy: String,
    #[serde(rename = "cashBal", default, deserialize_with = "de::f64_or_zero")]
    pub cash_bal: f64,
    #[serde(rename = "availBal", default, deserialize_with = "de::f64_or_zero")]
    pub avail_bal: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OkxWsPosition {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "posSide", default)]
    pub pos_side: Option<String>,
    #[serde(default, deserialize_with = "de::f64_or_zero")]
    pub pos: f64,
    #[serde(rename = "avgPx", default, deserialize_with = "de::f64_or_zero")]
    pub avg_px: f64,
    #[serde(default, deserialize_with = "de::f64_or_zero")]
    pub upl: f64,
    #[serde(rename = "uTime", deserialize_with = "de::ms_from_str")]
    pub u_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_splits_acks_from_data() {
        let ack: OkxWsEnvelope =
            serde_json::from_str(r#"{"event":"subscribe","arg":{"channel":"trades","instId":"BTC-USDT-SWAP"}}"#)
                .unwrap();
        assert_eq!(ack.event.as_deref(), Some("subscribe"));
        assert!(ack.data.is_none());

        let push: OkxWsEnvelope = serde_json::from_str(
            r#"{"arg":{"channel":"trades","instId":"BTC-USDT-SWAP"},"data":[{"instId":"BTC-USDT-SWAP","tradeId":"1","px":"1","sz":"1","side":"buy","ts":"1735689659701"}]}"#,
        )
        .unwrap();
        assert!(push.event.is_none());
        assert_eq!(push.arg.unwrap().channel, "trades");
        assert!(push.data.unwrap().is_array());
    }

    #[test]
    fn test_trade_numeric_strings() {
        let trade: OkxWsTrade = serde_json::from_str(
            r#"{"instId":"BTC-USDT-SWAP","tradeId":"1216801608","px":"93630","sz":"2.1","side":"buy","ts":"1735689659701","count":"1"}"#,
        )
        .unwrap();
        assert_eq!(trade.px, 93630.0);
        assert_eq!(trade.ts, 1_735_689_659_701);
    }

    #[test]
    fn test_order_with_empty_price() {
        let order: OkxWsOrder = serde_json::from_str(
            r#"{"instId":"BTC-USDT-SWAP","ordId":"312","clOrdId":"","state":"filled","side":"buy","px":"","sz":"1","accFillSz":"1","uTime":"1735689659701"}"#,
        )
        .unwrap();
        assert_eq!(order.px, 0.0);
        assert_eq!(order.acc_fill_sz, 1.0);
        assert!(order.cl_ord_id.is_empty());
    }

    #[test]
    fn test_book_levels() {
        let book: OkxWsBookSnapshot = serde_json::from_str(
            r#"{"asks":[["93650.5","5","0","2"]],"bids":[["93650","3","0","1"],["bad","x"]],"ts":"1735689659701"}"#,
        )
        .unwrap();
        assert_eq!(OkxWsBookSnapshot::levels(&book.asks), vec![[93650.5, 5.0]]);
        // Unparseable rows are skipped, not fatal.
        assert_eq!(OkxWsBookSnapshot::levels(&book.bids), vec![[93650.0, 3.0]]);
    }

    #[test]
    fn test_funding_without_next_time() {
        let funding: OkxWsFundingRate =
            serde_json::from_str(r#"{"instId":"BTC-USDT-SWAP","fundingRate":"0.0001","ts":"1735689659701"}"#).unwrap();
        assert_eq!(funding.funding_rate, 0.0001);
        assert!(funding.next_funding_time.is_none());
    }
}
