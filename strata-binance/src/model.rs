use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use strata_core::prelude::{
    AmendRequest, Bar, Instrument, Interval, OrderAck, OrderRequest, OrderSide, OrderType, PositionSide, VenueError,
    VenueName,
};

/// Kline rows are heterogeneous arrays:
/// `[openTime, "o", "h", "l", "c", "v", closeTime, ...]`.
pub type BinanceKlineRow = Vec<Value>;

pub fn kline_to_bar(row: &[Value]) -> Result<Bar, VenueError> {
    if row.len() < 6 {
        return Err(VenueError::Decode(format!("short kline row: {:?}", row)));
    }
    let timestamp_ms = row[0]
        .as_i64()
        .ok_or_else(|| VenueError::Decode("kline open time is not a number".to_string()))?;
    let parse = |i: usize| -> Result<f64, VenueError> {
        row[i]
            .as_str()
            .ok_or_else(|| VenueError::Decode(format!("kline field {} is not a string", i)))?
            .parse::<f64>()
            .map_err(|e| VenueError::Decode(format!("kline field {}: {}", i, e)))
    };
    Ok(Bar::new(timestamp_ms, parse(1)?, parse(2)?, parse(3)?, parse(4)?, parse(5)?))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSymbol {
    pub symbol: String,
    pub status: String,
    #[serde(rename = "contractType", default)]
    pub contract_type: String,
    #[serde(rename = "baseAsset", default)]
    pub base_asset: String,
    #[serde(rename = "quoteAsset", default)]
    pub quote_asset: String,
    #[serde(rename = "pricePrecision", default)]
    pub price_precision: i32,
    #[serde(rename = "quantityPrecision", default)]
    pub quantity_precision: i32,
}

impl ExchangeSymbol {
    pub fn is_trading_perpetual(&self) -> bool {
        self.contract_type == "PERPETUAL" && self.status == "TRADING"
    }

    pub fn to_instrument(&self) -> Instrument {
        Instrument::new(
            VenueName::Binance,
            &self.symbol,
            &self.base_asset,
            &self.quote_asset,
            10f64.powi(-self.price_precision),
            10f64.powi(-self.quantity_precision),
        )
    }
}

/// `interval` path parameter; same spellings as ours.
pub fn interval_param(interval: Interval) -> String {
    interval.to_string()
}

fn side_param(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn position_side_param(pos_side: PositionSide) -> &'static str {
    match pos_side {
        PositionSide::Long => "LONG",
        PositionSide::Short => "SHORT",
        PositionSide::Net => "BOTH",
    }
}

/// Order type maps onto (type, timeInForce).
fn order_type_params(order_type: OrderType) -> (&'static str, Option<&'static str>) {
    match order_type {
        OrderType::Market => ("MARKET", None),
        OrderType::Limit => ("LIMIT", Some("GTC")),
        OrderType::PostOnly => ("LIMIT", Some("GTX")),
        OrderType::Fok => ("LIMIT", Some("FOK")),
        OrderType::Ioc => ("LIMIT", Some("IOC")),
    }
}

/// Query parameters for POST /fapi/v1/order.
pub fn order_params(req: &OrderRequest) -> Result<Vec<(&'static str, String)>, VenueError> {
    let (order_type, time_in_force) = order_type_params(req.order_type);
    let mut params: Vec<(&'static str, String)> = vec![
        ("symbol", req.symbol.clone()),
        ("side", side_param(req.side).to_string()),
        ("type", order_type.to_string()),
        ("quantity", req.quantity.normalize().to_string()),
    ];
    if let Some(tif) = time_in_force {
        params.push(("timeInForce", tif.to_string()));
    }
    if order_type != "MARKET" {
        let price: Decimal = req
            .price
            .ok_or_else(|| VenueError::BadRequest("limit order without a price".to_string()))?;
        params.push(("price", price.normalize().to_string()));
    }
    if let Some(pos_side) = req.pos_side {
        params.push(("positionSide", position_side_param(pos_side).to_string()));
    }
    if let Some(client_order_id) = &req.client_order_id {
        params.push(("newClientOrderId", client_order_id.clone()));
    }
    Ok(params)
}

/// Query parameters for PUT /fapi/v1/order (amend keeps side mandatory).
pub fn amend_params(req: &AmendRequest, side: OrderSide) -> Vec<(&'static str, String)> {
    let mut params: Vec<(&'static str, String)> = vec![
        ("symbol", req.symbol.clone()),
        ("side", side_param(side).to_string()),
    ];
    if let Some(order_id) = &req.exchange_order_id {
        params.push(("orderId", order_id.clone()));
    } else if let Some(client_order_id) = &req.client_order_id {
        params.push(("origClientOrderId", client_order_id.clone()));
    }
    if let Some(price) = req.new_price {
        params.push(("price", price.normalize().to_string()));
    }
    if let Some(quantity) = req.new_quantity {
        params.push(("quantity", quantity.normalize().to_string()));
    }
    params
}

/// Reply to order placement/cancel/amend calls.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceOrderReply {
    #[serde(rename = "orderId", default)]
    pub order_id: i64,
    #[serde(rename = "clientOrderId", default)]
    pub client_order_id: String,
    #[serde(default)]
    pub status: String,
    // Error shape, when the row inside a batch reply failed.
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl BinanceOrderReply {
    pub fn to_ack(&self) -> OrderAck {
        match self.code {
            Some(code) if code != 0 => OrderAck {
                exchange_order_id: None,
                client_order_id: if self.client_order_id.is_empty() {
                    None
                } else {
                    Some(self.client_order_id.clone())
                },
                code,
                message: self.msg.clone().unwrap_or_default(),
            },
            _ => OrderAck {
                exchange_order_id: Some(self.order_id.to_string()),
                client_order_id: if self.client_order_id.is_empty() {
                    None
                } else {
                    Some(self.client_order_id.clone())
                },
                code: 0,
                message: self.status.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenKeyReply {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}

/// GET /fapi/v2/balance reply row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceBalance {
    #[serde(rename = "accountAlias", default)]
    pub account_alias: String,
    pub asset: String,
    #[serde(default)]
    pub balance: String,
    #[serde(rename = "crossWalletBalance", default)]
    pub cross_wallet_balance: String,
    #[serde(rename = "availableBalance", default)]
    pub available_balance: String,
    #[serde(rename = "updateTime", default)]
    pub update_time: i64,
}

/// GET /fapi/v2/positionRisk reply row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinancePositionRisk {
    pub symbol: String,
    #[serde(rename = "positionAmt", default)]
    pub position_amt: String,
    #[serde(rename = "entryPrice", default)]
    pub entry_price: String,
    #[serde(rename = "markPrice", default)]
    pub mark_price: String,
    #[serde(rename = "unRealizedProfit", default)]
    pub unrealized_profit: String,
    #[serde(rename = "liquidationPrice", default)]
    pub liquidation_price: String,
    #[serde(default)]
    pub leverage: String,
    #[serde(rename = "positionSide", default)]
    pub position_side: String,
    #[serde(rename = "updateTime", default)]
    pub update_time: i64,
}

/// GET /fapi/v1/openOrders and /fapi/v1/order reply row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceOrderDetail {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: i64,
    #[serde(rename = "clientOrderId", default)]
    pub client_order_id: String,
    #[serde(default)]
    pub price: String,
    #[serde(rename = "origQty", default)]
    pub orig_qty: String,
    #[serde(rename = "executedQty", default)]
    pub executed_qty: String,
    pub status: String,
    #[serde(default)]
    pub side: String,
    #[serde(rename = "type", default)]
    pub order_type: String,
    #[serde(rename = "timeInForce", default)]
    pub time_in_force: String,
    #[serde(default)]
    pub time: i64,
    #[serde(rename = "updateTime", default)]
    pub update_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;
    use strata_core::prelude::TdMode;

    #[test]
    fn test_kline_row_parsing() {
        let json = r#"[1735689600000,"93630.10","93700.00","93500.00","93650.50","2100.500",1735689659999,"196700000.0",4500,"1050.2","98350000.0","0"]"#;
        let row: BinanceKlineRow = serde_json::from_str(json).unwrap();
        let bar = kline_to_bar(&row).unwrap();
        assert_eq!(bar.timestamp_ms, 1_735_689_600_000);
        assert_eq!(bar.open, 93630.1);
        assert_eq!(bar.close, 93650.5);
        assert_eq!(bar.volume, 2100.5);
    }

    #[test]
    fn test_kline_row_rejects_garbage() {
        let row: BinanceKlineRow = serde_json::from_str(r#"["not-a-time","1","2","0.5","1.5","3"]"#).unwrap();
        assert!(kline_to_bar(&row).is_err());
    }

    #[test]
    fn test_exchange_symbol_filter() {
        let json = r#"{"symbol":"BTCUSDT","status":"TRADING","contractType":"PERPETUAL","baseAsset":"BTC","quoteAsset":"USDT","pricePrecision":2,"quantityPrecision":3}"#;
        let symbol: ExchangeSymbol = serde_json::from_str(json).unwrap();
        assert!(symbol.is_trading_perpetual());
        assert_eq!(symbol.to_instrument().tick_size, 0.01);

        let json = r#"{"symbol":"BTCUSDT_250328","status":"TRADING","contractType":"CURRENT_QUARTER"}"#;
        let symbol: ExchangeSymbol = serde_json::from_str(json).unwrap();
        assert!(!symbol.is_trading_perpetual());
    }

    #[test]
    fn test_order_params_limit() {
        let req = OrderRequest {
            strategy_id: "s1".into(),
            venue: None,
            symbol: "BTCUSDT".into(),
            side: OrderSide::Sell,
            order_type: OrderType::PostOnly,
            price: Decimal::from_f64(97000.5),
            quantity: Decimal::from_f64(0.25).unwrap(),
            td_mode: TdMode::Cross,
            pos_side: None,
            client_order_id: Some("x1".into()),
        };
        let params = order_params(&req).unwrap();
        let find = |k: &str| params.iter().find(|(pk, _)| *pk == k).map(|(_, v)| v.as_str());
        assert_eq!(find("side"), Some("SELL"));
        assert_eq!(find("type"), Some("LIMIT"));
        assert_eq!(find("timeInForce"), Some("GTX"));
        assert_eq!(find("price"), Some("97000.5"));
        assert_eq!(find("newClientOrderId"), Some("x1"));
    }

    #[test]
    fn test_order_params_market_needs_no_price() {
        let req = OrderRequest {
            strategy_id: "s1".into(),
            venue: None,
            symbol: "BTCUSDT".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            price: None,
            quantity: Decimal::ONE,
            td_mode: TdMode::Cross,
            pos_side: None,
            client_order_id: None,
        };
        let params = order_params(&req).unwrap();
        assert!(!params.iter().any(|(k, _)| *k == "price"));
        assert!(!params.iter().any(|(k, _)| *k == "timeInForce"));
    }

    #[test]
    fn test_balance_row() {
        let json = r#"{"accountAlias":"SgsR","asset":"USDT","balance":"122607.35137903","crossWalletBalance":"23.72469206","crossUnPnl":"0.00000000","availableBalance":"23.72469206","maxWithdrawAmount":"23.72469206","marginAvailable":true,"updateTime":1617939110373}"#;
        let balance: BinanceBalance = serde_json::from_str(json).unwrap();
        assert_eq!(balance.asset, "USDT");
        assert_eq!(balance.update_time, 1_617_939_110_373);
    }

    #[test]
    fn test_position_risk_row() {
        let json = r#"{"symbol":"BTCUSDT","positionAmt":"0.500","entryPrice":"93000.0","markPrice":"93650.00","unRealizedProfit":"325.00","liquidationPrice":"45000.0","leverage":"10","positionSide":"LONG","updateTime":1735689659701}"#;
        let position: BinancePositionRisk = serde_json::from_str(json).unwrap();
        assert_eq!(position.position_side, "LONG");
        assert_eq!(position.position_amt, "0.500");
    }

    #[test]
    fn test_order_detail_row() {
        let json = r#"{"symbol":"BTCUSDT","orderId":123456,"clientOrderId":"x1","price":"93000","origQty":"0.5","executedQty":"0.1","status":"PARTIALLY_FILLED","side":"BUY","type":"LIMIT","timeInForce":"GTC","time":1735689600000,"updateTime":1735689659701}"#;
        let order: BinanceOrderDetail = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_id, 123456);
        assert_eq!(order.status, "PARTIALLY_FILLED");
        assert_eq!(order.order_type, "LIMIT");
    }

    #[test]
    fn test_order_reply_ack() {
        let json = r#"{"orderId":123456,"clientOrderId":"x1","status":"NEW"}"#;
        let reply: BinanceOrderReply = serde_json::from_str(json).unwrap();
        let ack = reply.to_ack();
        assert!(ack.is_ok());
        assert_eq!(ack.exchange_order_id.as_deref(), Some("123456"));

        let json = r#"{"code":-2019,"msg":"Margin is insufficient."}"#;
        let reply: BinanceOrderReply = serde_json::from_str(json).unwrap();
        let ack = reply.to_ack();
        assert!(!ack.is_ok());
        assert_eq!(ack.code, -2019);
    }
}
