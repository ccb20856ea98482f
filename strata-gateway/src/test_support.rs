use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use serde_json::{Value, json};

use strata_core::prelude::{
    AmendRequest, Bar, CancelRequest, Instrument, Interval, OrderAck, OrderRequest, VenueClient, VenueError, VenueName,
};

static CALLS: OnceLock<Mutex<HashMap<String, Vec<String>>>> = OnceLock::new();
static BATCH_FAILURES: OnceLock<Mutex<HashMap<String, usize>>> = OnceLock::new();

fn calls() -> &'static Mutex<HashMap<String, Vec<String>>> {
    CALLS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn batch_failures() -> &'static Mutex<HashMap<String, usize>> {
    BATCH_FAILURES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Recording stand-in for a venue connector. Instances are named (tests
/// use the api key as the name) so assertions can tell which account's
/// client a call was routed to.
pub struct MockVenueClient {
    venue: VenueName,
    name: String,
}

impl MockVenueClient {
    pub fn shared(venue: VenueName) -> Arc<dyn VenueClient> {
        Self::shared_named(venue, "mock")
    }

    pub fn shared_named(venue: VenueName, name: &str) -> Arc<dyn VenueClient> {
        Arc::new(Self {
            venue,
            name: name.to_string(),
        })
    }

    pub fn calls_for(name: &str) -> Vec<String> {
        calls().lock().unwrap().get(name).cloned().unwrap_or_default()
    }

    /// Make the n-th order (1-based) of the next batch call on this
    /// client come back rejected.
    pub fn fail_nth(name: &str, n: usize) {
        batch_failures().lock().unwrap().insert(name.to_string(), n);
    }

    fn record(&self, call: String) {
        calls().lock().unwrap().entry(self.name.clone()).or_default().push(call);
    }

    fn ok_ack(client_order_id: Option<String>) -> OrderAck {
        OrderAck {
            exchange_order_id: Some("1".to_string()),
            client_order_id,
            code: 0,
            message: "NEW".to_string(),
        }
    }
}

#[async_trait]
impl VenueClient for MockVenueClient {
    fn venue(&self) -> VenueName {
        self.venue
    }

    async fn list_instruments(&self) -> Result<Vec<Instrument>, VenueError> {
        self.record("list_instruments".to_string());
        Ok(vec![Instrument::new(self.venue, "BTCUSDT", "BTC", "USDT", 0.1, 0.001)])
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        _interval: Interval,
        _start_ms: i64,
        _end_ms: i64,
    ) -> Result<Vec<Bar>, VenueError> {
        self.record(format!("fetch_history {}", symbol));
        Ok(vec![])
    }

    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, VenueError> {
        self.record(format!("place_order {}", req.symbol));
        Ok(Self::ok_ack(req.client_order_id.clone()))
    }

    async fn place_batch_orders(&self, reqs: &[OrderRequest]) -> Result<Vec<OrderAck>, VenueError> {
        self.record(format!("place_batch_orders {}", reqs.len()));
        let failing = batch_failures().lock().unwrap().remove(&self.name);
        Ok(reqs
            .iter()
            .enumerate()
            .map(|(i, req)| {
                if failing == Some(i + 1) {
                    OrderAck {
                        exchange_order_id: None,
                        client_order_id: req.client_order_id.clone(),
                        code: -2019,
                        message: "Margin is insufficient.".to_string(),
                    }
                } else {
                    Self::ok_ack(req.client_order_id.clone())
                }
            })
            .collect())
    }

    async fn cancel_order(&self, req: &CancelRequest) -> Result<OrderAck, VenueError> {
        self.record(format!("cancel_order {}", req.symbol));
        Ok(Self::ok_ack(req.client_order_id.clone()))
    }

    async fn cancel_batch_orders(&self, reqs: &[CancelRequest]) -> Result<Vec<OrderAck>, VenueError> {
        self.record(format!("cancel_batch_orders {}", reqs.len()));
        Ok(reqs.iter().map(|req| Self::ok_ack(req.client_order_id.clone())).collect())
    }

    async fn amend_order(&self, req: &AmendRequest) -> Result<OrderAck, VenueError> {
        self.record(format!("amend_order {}", req.symbol));
        Ok(Self::ok_ack(req.client_order_id.clone()))
    }

    async fn query_balance(&self) -> Result<Value, VenueError> {
        self.record("query_balance".to_string());
        Ok(json!([{"asset": "USDT", "balance": "10000"}]))
    }

    async fn query_positions(&self, _symbol: Option<&str>) -> Result<Value, VenueError> {
        self.record("query_positions".to_string());
        Ok(json!([]))
    }

    async fn query_open_orders(&self, _symbol: Option<&str>) -> Result<Value, VenueError> {
        self.record("query_open_orders".to_string());
        Ok(json!([]))
    }

    async fn query_order(
        &self,
        symbol: &str,
        _exchange_order_id: Option<&str>,
        _client_order_id: Option<&str>,
    ) -> Result<Value, VenueError> {
        self.record(format!("query_order {}", symbol));
        Ok(json!([{"symbol": symbol, "status": "FILLED"}]))
    }
}
