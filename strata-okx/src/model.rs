use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use strata_core::prelude::{
    AmendRequest, Bar, CancelRequest, Instrument, Interval, OrderAck, OrderRequest, OrderType, PositionSide, TdMode,
    VenueError, VenueName,
};

/// Every OKX v5 REST reply shares this envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct OkxResponse<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> OkxResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.code == "0"
    }

    pub fn into_result(self) -> Result<Vec<T>, VenueError> {
        if self.is_ok() {
            Ok(self.data)
        } else if self.code == "50111" || self.code == "50113" {
            // Invalid api key / signature.
            Err(VenueError::Auth(format!("{}: {}", self.code, self.msg)))
        } else {
            Err(VenueError::Rejected(format!("{}: {}", self.code, self.msg)))
        }
    }
}

/// Candle rows come back as arrays of strings:
/// `[ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm]`.
pub type OkxCandleRow = Vec<String>;

pub fn candle_to_bar(row: &[String]) -> Result<Bar, VenueError> {
    if row.len() < 6 {
        return Err(VenueError::Decode(format!("short candle row: {:?}", row)));
    }
    let parse = |i: usize| -> Result<f64, VenueError> {
        row[i]
            .parse::<f64>()
            .map_err(|e| VenueError::Decode(format!("candle field {}: {}", i, e)))
    };
    let timestamp_ms = row[0]
        .parse::<i64>()
        .map_err(|e| VenueError::Decode(format!("candle ts: {}", e)))?;
    Ok(Bar::new(timestamp_ms, parse(1)?, parse(2)?, parse(3)?, parse(4)?, parse(5)?))
}

/// The `bar` parameter OKX expects; hours are uppercase.
pub fn interval_to_bar_param(interval: Interval) -> &'static str {
    match interval {
        Interval::M1 => "1m",
        Interval::M5 => "5m",
        Interval::M15 => "15m",
        Interval::M30 => "30m",
        Interval::H1 => "1H",
        Interval::H4 => "4H",
        Interval::H8 => "8H",
    }
}

/// Inverse of [`interval_to_bar_param`], for candle channel suffixes.
pub fn bar_param_to_interval(param: &str) -> Option<Interval> {
    match param {
        "1m" => Some(Interval::M1),
        "5m" => Some(Interval::M5),
        "15m" => Some(Interval::M15),
        "30m" => Some(Interval::M30),
        "1H" => Some(Interval::H1),
        "4H" => Some(Interval::H4),
        "8H" => Some(Interval::H8),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OkxInstrument {
    #[serde(rename = "instId")]
    pub inst_id: String,
    pub state: String,
    #[serde(rename = "settleCcy", default)]
    pub settle_ccy: String,
    #[serde(rename = "ctValCcy", default)]
    pub ct_val_ccy: String,
    #[serde(rename = "tickSz", default)]
    pub tick_sz: String,
    #[serde(rename = "lotSz", default)]
    pub lot_sz: String,
}

impl OkxInstrument {
    pub fn is_live_usdt_swap(&self) -> bool {
        self.state == "live" && self.settle_ccy == "USDT"
    }

    pub fn to_instrument(&self) -> Instrument {
        let base = self.inst_id.split('-').next().unwrap_or_default();
        Instrument::new(
            VenueName::Okx,
            &self.inst_id,
            base,
            "USDT",
            self.tick_sz.parse().unwrap_or(0.0),
            self.lot_sz.parse().unwrap_or(0.0),
        )
    }
}

fn order_type_param(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "market",
        OrderType::Limit => "limit",
        OrderType::PostOnly => "post_only",
        OrderType::Fok => "fok",
        OrderType::Ioc => "ioc",
    }
}

fn td_mode_param(td_mode: TdMode) -> &'static str {
    match td_mode {
        TdMode::Cross => "cross",
        TdMode::Isolated => "isolated",
        TdMode::Cash => "cash",
    }
}

fn pos_side_param(pos_side: PositionSide) -> &'static str {
    match pos_side {
        PositionSide::Long => "long",
        PositionSide::Short => "short",
        PositionSide::Net => "net",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderBody {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "tdMode")]
    pub td_mode: String,
    pub side: String,
    #[serde(rename = "ordType")]
    pub ord_type: String,
    pub sz: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px: Option<String>,
    #[serde(rename = "posSide", skip_serializing_if = "Option::is_none")]
    pub pos_side: Option<String>,
    #[serde(rename = "clOrdId", skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
}

impl PlaceOrderBody {
    pub fn from_request(req: &OrderRequest) -> Self {
        Self {
            inst_id: req.symbol.clone(),
            td_mode: td_mode_param(req.td_mode).to_string(),
            side: req.side.to_string(),
            ord_type: order_type_param(req.order_type).to_string(),
            sz: req.quantity.normalize().to_string(),
            px: req.price.map(|p: Decimal| p.normalize().to_string()),
            pos_side: req.pos_side.map(|p| pos_side_param(p).to_string()),
            cl_ord_id: req.client_order_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderBody {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "ordId", skip_serializing_if = "Option::is_none")]
    pub ord_id: Option<String>,
    #[serde(rename = "clOrdId", skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
}

impl CancelOrderBody {
    pub fn from_request(req: &CancelRequest) -> Self {
        Self {
            inst_id: req.symbol.clone(),
            ord_id: req.exchange_order_id.clone(),
            cl_ord_id: req.client_order_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AmendOrderBody {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "ordId", skip_serializing_if = "Option::is_none")]
    pub ord_id: Option<String>,
    #[serde(rename = "clOrdId", skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
    #[serde(rename = "newPx", skip_serializing_if = "Option::is_none")]
    pub new_px: Option<String>,
    #[serde(rename = "newSz", skip_serializing_if = "Option::is_none")]
    pub new_sz: Option<String>,
}

impl AmendOrderBody {
    pub fn from_request(req: &AmendRequest) -> Self {
        Self {
            inst_id: req.symbol.clone(),
            ord_id: req.exchange_order_id.clone(),
            cl_ord_id: req.client_order_id.clone(),
            new_px: req.new_price.map(|p| p.normalize().to_string()),
            new_sz: req.new_quantity.map(|q| q.normalize().to_string()),
        }
    }
}

/// GET /api/v5/account/balance reply row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkxBalance {
    #[serde(rename = "totalEq", default)]
    pub total_eq: String,
    #[serde(default)]
    pub details: Vec<OkxBalanceDetail>,
    #[serde(rename = "uTime", default)]
    pub u_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkxBalanceDetail {
    pub ccy: String,
    #[serde(rename = "cashBal", default)]
    pub cash_bal: String,
    #[serde(rename = "availBal", default)]
    pub avail_bal: String,
    #[serde(rename = "frozenBal", default)]
    pub frozen_bal: String,
}

/// GET /api/v5/account/positions reply row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkxPosition {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "posSide", default)]
    pub pos_side: String,
    #[serde(default)]
    pub pos: String,
    #[serde(rename = "avgPx", default)]
    pub avg_px: String,
    #[serde(default)]
    pub upl: String,
    #[serde(default)]
    pub lever: String,
    #[serde(rename = "mgnMode", default)]
    pub mgn_mode: String,
    #[serde(rename = "uTime", default)]
    pub u_time: String,
}

/// GET /api/v5/trade/orders-pending and /api/v5/trade/order reply row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkxOrderDetail {
    #[serde(rename = "instId")]
    pub inst_id: String,
    #[serde(rename = "ordId")]
    pub ord_id: String,
    #[serde(rename = "clOrdId", default)]
    pub cl_ord_id: String,
    #[serde(default)]
    pub px: String,
    #[serde(default)]
    pub sz: String,
    pub state: String,
    #[serde(default)]
    pub side: String,
    #[serde(rename = "ordType", default)]
    pub ord_type: String,
    #[serde(rename = "accFillSz", default)]
    pub acc_fill_sz: String,
    #[serde(rename = "avgPx", default)]
    pub avg_px: String,
    #[serde(rename = "cTime", default)]
    pub c_time: String,
    #[serde(rename = "uTime", default)]
    pub u_time: String,
}

/// Per-order result inside trade endpoint replies.
#[derive(Debug, Clone, Deserialize)]
pub struct OkxOrderResult {
    #[serde(rename = "ordId", default)]
    pub ord_id: String,
    #[serde(rename = "clOrdId", default)]
    pub cl_ord_id: String,
    #[serde(rename = "sCode", default)]
    pub s_code: String,
    #[serde(rename = "sMsg", default)]
    pub s_msg: String,
}

impl OkxOrderResult {
    pub fn to_ack(&self) -> OrderAck {
        let ok = self.s_code == "0";
        OrderAck {
            exchange_order_id: if self.ord_id.is_empty() { None } else { Some(self.ord_id.clone()) },
            client_order_id: if self.cl_ord_id.is_empty() { None } else { Some(self.cl_ord_id.clone()) },
            code: if ok { 0 } else { self.s_code.parse().unwrap_or(-1) },
            message: self.s_msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;
    use strata_core::prelude::OrderSide;

    #[test]
    fn test_candle_parsing() {
        let json = r#"{"code":"0","msg":"","data":[["1735689600000","93630.1","93700","93500","93650.5","2100.5","196.7","18421000","1"]]}"#;
        let resp: OkxResponse<OkxCandleRow> = serde_json::from_str(json).unwrap();
        assert!(resp.is_ok());
        let bar = candle_to_bar(&resp.data[0]).unwrap();
        assert_eq!(bar.timestamp_ms, 1_735_689_600_000);
        assert_eq!(bar.open, 93630.1);
        assert_eq!(bar.volume, 2100.5);
        assert!(bar.is_valid());
    }

    #[test]
    fn test_error_envelope() {
        let json = r#"{"code":"50111","msg":"Invalid OK-ACCESS-KEY","data":[]}"#;
        let resp: OkxResponse<OkxCandleRow> = serde_json::from_str(json).unwrap();
        assert!(matches!(resp.into_result(), Err(VenueError::Auth(_))));
    }

    #[test]
    fn test_instrument_filter() {
        let json = r#"{"instId":"BTC-USDT-SWAP","state":"live","settleCcy":"USDT","ctValCcy":"BTC","tickSz":"0.1","lotSz":"1"}"#;
        let inst: OkxInstrument = serde_json::from_str(json).unwrap();
        assert!(inst.is_live_usdt_swap());
        let converted = inst.to_instrument();
        assert_eq!(converted.base, "BTC");
        assert_eq!(converted.tick_size, 0.1);

        let json = r#"{"instId":"BTC-USD-SWAP","state":"live","settleCcy":"BTC"}"#;
        let inst: OkxInstrument = serde_json::from_str(json).unwrap();
        assert!(!inst.is_live_usdt_swap());
    }

    #[test]
    fn test_place_order_body() {
        let req = OrderRequest {
            strategy_id: "s1".into(),
            venue: None,
            symbol: "BTC-USDT-SWAP".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: Decimal::from_f64(42000.5),
            quantity: Decimal::from_f64(0.10).unwrap(),
            td_mode: TdMode::Cross,
            pos_side: Some(PositionSide::Long),
            client_order_id: Some("abc123".into()),
        };
        let body = PlaceOrderBody::from_request(&req);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["instId"], "BTC-USDT-SWAP");
        assert_eq!(json["tdMode"], "cross");
        assert_eq!(json["side"], "buy");
        assert_eq!(json["ordType"], "limit");
        assert_eq!(json["px"], "42000.5");
        assert_eq!(json["sz"], "0.1");
        assert_eq!(json["posSide"], "long");
        assert_eq!(json["clOrdId"], "abc123");
    }

    #[test]
    fn test_balance_reply() {
        let json = r#"{"totalEq":"91.8","details":[{"ccy":"USDT","cashBal":"91.8","availBal":"90.1","frozenBal":"1.7"}],"uTime":"1735689659701"}"#;
        let balance: OkxBalance = serde_json::from_str(json).unwrap();
        assert_eq!(balance.details.len(), 1);
        assert_eq!(balance.details[0].ccy, "USDT");
        assert_eq!(balance.details[0].avail_bal, "90.1");
    }

    #[test]
    fn test_pending_order_reply() {
        let json = r#"{"instId":"BTC-USDT-SWAP","ordId":"312269865356374016","clOrdId":"b1","px":"93000","sz":"1","state":"live","side":"buy","ordType":"limit","accFillSz":"0","avgPx":"","cTime":"1735689600000","uTime":"1735689610000"}"#;
        let order: OkxOrderDetail = serde_json::from_str(json).unwrap();
        assert_eq!(order.state, "live");
        assert_eq!(order.ord_type, "limit");
        assert!(order.avg_px.is_empty());
    }

    #[test]
    fn test_order_result_ack() {
        let json = r#"{"ordId":"312269865356374016","clOrdId":"abc123","sCode":"0","sMsg":""}"#;
        let result: OkxOrderResult = serde_json::from_str(json).unwrap();
        let ack = result.to_ack();
        assert!(ack.is_ok());
        assert_eq!(ack.exchange_order_id.as_deref(), Some("312269865356374016"));

        let json = r#"{"ordId":"","clOrdId":"abc123","sCode":"51008","sMsg":"Insufficient balance"}"#;
        let result: OkxOrderResult = serde_json::from_str(json).unwrap();
        let ack = result.to_ack();
        assert!(!ack.is_ok());
        assert_eq!(ack.code, 51008);
        assert!(ack.exchange_order_id.is_none());
    }
}
