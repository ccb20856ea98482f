use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::{Interval, VenueName, venue_for_symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    PostOnly,
    Fok,
    Ioc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TdMode {
    Cross,
    Isolated,
    Cash,
}

impl Default for TdMode {
    fn default() -> Self {
        TdMode::Cross
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
    Net,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub strategy_id: String,
    #[serde(default)]
    pub venue: Option<VenueName>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    #[serde(default)]
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    #[serde(default)]
    pub td_mode: TdMode,
    #[serde(default)]
    pub pos_side: Option<PositionSide>,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// Venue is explicit or implied by the symbol form.
    pub fn resolve_venue(&self) -> Option<VenueName> {
        self.venue.or_else(|| venue_for_symbol(&self.symbol))
    }

    /// Shape checks the gateway runs before touching a venue.
    pub fn validate(&self) -> Result<(), String> {
        if self.quantity <= Decimal::ZERO {
            return Err("quantity must be positive".to_string());
        }
        match self.price {
            Some(price) if price <= Decimal::ZERO => {
                return Err("price must be positive".to_string());
            }
            None if self.order_type != OrderType::Market => {
                return Err(format!("{} order needs a price", self.order_type));
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOrderRequest {
    pub strategy_id: String,
    #[serde(default)]
    pub venue: Option<VenueName>,
    pub orders: Vec<OrderRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub strategy_id: String,
    #[serde(default)]
    pub venue: Option<VenueName>,
    pub symbol: String,
    #[serde(default)]
    pub exchange_order_id: Option<String>,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

impl CancelRequest {
    pub fn resolve_venue(&self) -> Option<VenueName> {
        self.venue.or_else(|| venue_for_symbol(&self.symbol))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.exchange_order_id.is_none() && self.client_order_id.is_none() {
            return Err("cancel needs an exchange or client order id".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCancelRequest {
    pub strategy_id: String,
    #[serde(default)]
    pub venue: Option<VenueName>,
    pub cancels: Vec<CancelRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmendRequest {
    pub strategy_id: String,
    #[serde(default)]
    pub venue: Option<VenueName>,
    pub symbol: String,
    #[serde(default)]
    pub exchange_order_id: Option<String>,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub new_price: Option<Decimal>,
    #[serde(default)]
    pub new_quantity: Option<Decimal>,
}

impl AmendRequest {
    pub fn resolve_venue(&self) -> Option<VenueName> {
        self.venue.or_else(|| venue_for_symbol(&self.symbol))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.exchange_order_id.is_none() && self.client_order_id.is_none() {
            return Err("amend needs an exchange or client order id".to_string());
        }
        if self.new_price.is_none() && self.new_quantity.is_none() {
            return Err("amend needs a new price or a new quantity".to_string());
        }
        if matches!(self.new_price, Some(price) if price <= Decimal::ZERO) {
            return Err("price must be positive".to_string());
        }
        if matches!(self.new_quantity, Some(quantity) if quantity <= Decimal::ZERO) {
            return Err("quantity must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterAccount {
    pub strategy_id: String,
    pub venue: VenueName,
    pub api_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub is_testnet: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnregisterAccount {
    pub strategy_id: String,
    pub venue: VenueName,
}

/// Everything a strategy can push onto the order channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    PlaceOrder(OrderRequest),
    PlaceBatchOrders(BatchOrderRequest),
    CancelOrder(CancelRequest),
    CancelBatchOrders(BatchCancelRequest),
    AmendOrder(AmendRequest),
    RegisterAccount(RegisterAccount),
    UnregisterAccount(UnregisterAccount),
    ListAccounts { strategy_id: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionOp {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MarketChannel {
    Trades,
    Tickers,
    OrderBooks,
    Klines,
    Funding,
    MarkPrice,
}

/// Subscription management message from the `subscribe` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionCommand {
    pub op: SubscriptionOp,
    pub venue: VenueName,
    pub channel: MarketChannel,
    pub symbols: Vec<String>,
    #[serde(default)]
    pub interval: Option<Interval>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_tagging() {
        let json = r#"{
            "type": "place_order",
            "strategy_id": "s1",
            "symbol": "BTC-USDT-SWAP",
            "side": "buy",
            "order_type": "limit",
            "price": "42000.5",
            "quantity": "0.1"
        }"#;
        let msg: ControlMessage = serde_json::from_str(json).unwrap();
        match msg {
            ControlMessage::PlaceOrder(req) => {
                assert_eq!(req.strategy_id, "s1");
                assert_eq!(req.resolve_venue(), Some(VenueName::Okx));
                assert_eq!(req.td_mode, TdMode::Cross);
                assert!(req.client_order_id.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_explicit_venue_wins_over_symbol() {
        let json = r#"{
            "type": "cancel_order",
            "strategy_id": "s1",
            "venue": "binance",
            "symbol": "BTCUSDT",
            "exchange_order_id": "123"
        }"#;
        let msg: ControlMessage = serde_json::from_str(json).unwrap();
        match msg {
            ControlMessage::CancelOrder(req) => {
                assert_eq!(req.resolve_venue(), Some(VenueName::Binance));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_order_validation() {
        let json = r#"{
            "type": "place_order",
            "strategy_id": "s1",
            "symbol": "BTCUSDT",
            "side": "sell",
            "order_type": "limit",
            "quantity": "0.5"
        }"#;
        let ControlMessage::PlaceOrder(mut req) = serde_json::from_str(json).unwrap() else {
            panic!("expected place_order");
        };
        // Limit without a price is malformed.
        assert!(req.validate().unwrap_err().contains("needs a price"));

        req.order_type = OrderType::Market;
        assert!(req.validate().is_ok());

        req.quantity = rust_decimal::Decimal::ZERO;
        assert!(req.validate().unwrap_err().contains("quantity"));
    }

    #[test]
    fn test_amend_validation() {
        let base = AmendRequest {
            strategy_id: "s1".into(),
            venue: None,
            symbol: "BTC-USDT-SWAP".into(),
            exchange_order_id: Some("1".into()),
            client_order_id: None,
            new_price: None,
            new_quantity: None,
        };
        assert!(base.validate().unwrap_err().contains("new price"));

        let amend = AmendRequest {
            new_quantity: Some(rust_decimal::Decimal::ONE),
            ..base.clone()
        };
        assert!(amend.validate().is_ok());

        let no_id = AmendRequest {
            exchange_order_id: None,
            ..amend
        };
        assert!(no_id.validate().unwrap_err().contains("order id"));
    }

    #[test]
    fn test_subscription_command() {
        let json = r#"{
            "op": "subscribe",
            "venue": "okx",
            "channel": "klines",
            "symbols": ["BTC-USDT-SWAP", "ETH-USDT-SWAP"],
            "interval": "1m"
        }"#;
        let cmd: SubscriptionCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.op, SubscriptionOp::Subscribe);
        assert_eq!(cmd.symbols.len(), 2);
        assert_eq!(cmd.interval, Some(Interval::M1));
    }
}
