use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use strata_core::prelude::{
    AmendRequest, BINANCE_HISTORY_PAGE, Bar, CancelRequest, Credentials, Instrument, Interval, MAX_BATCH_ORDERS,
    OrderAck, OrderRequest, OrderSide, VenueClient, VenueError, VenueName,
};

use crate::http::BinanceHttpClient;
use crate::model::{
    BinanceBalance, BinanceKlineRow, BinanceOrderDetail, BinanceOrderReply, BinancePositionRisk, ExchangeInfo,
    ListenKeyReply, amend_params, interval_param, kline_to_bar, order_params,
};

/// Binance USDT-M futures implementation of the venue capability set.
pub struct BinanceClient {
    http: BinanceHttpClient,
}

impl BinanceClient {
    pub fn new(base_url: &str, credentials: Option<Credentials>, rest_min_interval: Duration) -> Self {
        Self {
            http: BinanceHttpClient::new(base_url, credentials, rest_min_interval),
        }
    }

    /// Align signed timestamps with the venue clock.
    pub async fn sync_time(&self) -> Result<i64, VenueError> {
        self.http.sync_time().await
    }

    /// Listen-key lifecycle for the user-data stream.
    pub async fn create_listen_key(&self) -> Result<String, VenueError> {
        let reply: ListenKeyReply = self.http.send_keyed(Method::POST, "/fapi/v1/listenKey", &[]).await?;
        Ok(reply.listen_key)
    }

    pub async fn keepalive_listen_key(&self) -> Result<(), VenueError> {
        let _: Value = self.http.send_keyed(Method::PUT, "/fapi/v1/listenKey", &[]).await?;
        Ok(())
    }
}

#[async_trait]
impl VenueClient for BinanceClient {
    fn venue(&self) -> VenueName {
        VenueName::Binance
    }

    async fn list_instruments(&self) -> Result<Vec<Instrument>, VenueError> {
        let info: ExchangeInfo = self.http.get_public("/fapi/v1/exchangeInfo", &[]).await?;
        Ok(info
            .symbols
            .iter()
            .filter(|s| s.is_trading_perpetual())
            .map(|s| s.to_instrument())
            .collect())
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Bar>, VenueError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval_param(interval)),
            ("startTime", start_ms.to_string()),
            ("endTime", end_ms.to_string()),
            ("limit", BINANCE_HISTORY_PAGE.to_string()),
        ];
        let rows: Vec<BinanceKlineRow> = self.http.get_public("/fapi/v1/klines", &params).await?;
        debug!(target: "binance", "history {} {}: {} rows", symbol, interval, rows.len());

        // Already ascending; the last row may still be in progress, so
        // drop anything not aligned fully inside the window.
        let mut bars = Vec::with_capacity(rows.len());
        for row in &rows {
            let bar = kline_to_bar(row)?;
            if bar.timestamp_ms >= start_ms && bar.timestamp_ms <= end_ms {
                bars.push(bar);
            }
        }
        Ok(bars)
    }

    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, VenueError> {
        let params = order_params(req)?;
        let reply: BinanceOrderReply = self.http.send_signed(Method::POST, "/fapi/v1/order", &params).await?;
        Ok(reply.to_ack())
    }

    async fn place_batch_orders(&self, reqs: &[OrderRequest]) -> Result<Vec<OrderAck>, VenueError> {
        if reqs.len() > MAX_BATCH_ORDERS {
            return Err(VenueError::BadRequest(format!(
                "batch of {} exceeds the venue limit of {}",
                reqs.len(),
                MAX_BATCH_ORDERS
            )));
        }
        let mut batch = Vec::with_capacity(reqs.len());
        for req in reqs {
            let params = order_params(req)?;
            let obj: serde_json::Map<String, Value> = params
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v)))
                .collect();
            batch.push(Value::Object(obj));
        }
        let encoded =
            serde_json::to_string(&batch).map_err(|e| VenueError::BadRequest(e.to_string()))?;
        let params = [("batchOrders", encoded)];
        let replies: Vec<BinanceOrderReply> = self
            .http
            .send_signed(Method::POST, "/fapi/v1/batchOrders", &params)
            .await?;
        Ok(replies.iter().map(|r| r.to_ack()).collect())
    }

    async fn cancel_order(&self, req: &CancelRequest) -> Result<OrderAck, VenueError> {
        let mut params = vec![("symbol", req.symbol.clone())];
        if let Some(order_id) = &req.exchange_order_id {
            params.push(("orderId", order_id.clone()));
        } else if let Some(client_order_id) = &req.client_order_id {
            params.push(("origClientOrderId", client_order_id.clone()));
        } else {
            return Err(VenueError::BadRequest("cancel needs an order id".to_string()));
        }
        let reply: BinanceOrderReply = self.http.send_signed(Method::DELETE, "/fapi/v1/order", &params).await?;
        Ok(reply.to_ack())
    }

    async fn cancel_batch_orders(&self, reqs: &[CancelRequest]) -> Result<Vec<OrderAck>, VenueError> {
        // The venue cancels batches per symbol; requests are grouped and
        // issued symbol by symbol.
        let mut acks = Vec::with_capacity(reqs.len());
        for req in reqs {
            acks.push(self.cancel_order(req).await?);
        }
        Ok(acks)
    }

    async fn amend_order(&self, req: &AmendRequest) -> Result<OrderAck, VenueError> {
        // The modify endpoint requires the original side; fetch it first.
        let current = self
            .query_order(&req.symbol, req.exchange_order_id.as_deref(), req.client_order_id.as_deref())
            .await?;
        let side = current
            .get(0)
            .and_then(|o| o.get("side"))
            .and_then(|s| s.as_str())
            .map(|s| if s == "SELL" { OrderSide::Sell } else { OrderSide::Buy })
            .ok_or_else(|| VenueError::Rejected("order to amend not found".to_string()))?;

        let params = amend_params(req, side);
        let reply: BinanceOrderReply = self.http.send_signed(Method::PUT, "/fapi/v1/order", &params).await?;
        Ok(reply.to_ack())
    }

    async fn query_balance(&self) -> Result<Value, VenueError> {
        let rows: Vec<BinanceBalance> = self.http.send_signed(Method::GET, "/fapi/v2/balance", &[]).await?;
        to_value(rows)
    }

    async fn query_positions(&self, symbol: Option<&str>) -> Result<Value, VenueError> {
        let mut params = Vec::new();
        if let Some(symbol) = symbol {
            params.push(("symbol", symbol.to_string()));
        }
        let rows: Vec<BinancePositionRisk> =
            self.http.send_signed(Method::GET, "/fapi/v2/positionRisk", &params).await?;
        to_value(rows)
    }

    async fn query_open_orders(&self, symbol: Option<&str>) -> Result<Value, VenueError> {
        let mut params = Vec::new();
        if let Some(symbol) = symbol {
            params.push(("symbol", symbol.to_string()));
        }
        let rows: Vec<BinanceOrderDetail> =
            self.http.send_signed(Method::GET, "/fapi/v1/openOrders", &params).await?;
        to_value(rows)
    }

    async fn query_order(
        &self,
        symbol: &str,
        exchange_order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Result<Value, VenueError> {
        let mut params = vec![("symbol", symbol.to_string())];
        match (exchange_order_id, client_order_id) {
            (Some(order_id), _) => params.push(("orderId", order_id.to_string())),
            (None, Some(client_order_id)) => params.push(("origClientOrderId", client_order_id.to_string())),
            (None, None) => {
                return Err(VenueError::BadRequest("order query needs an order id".to_string()));
            }
        }
        let reply: BinanceOrderDetail = self.http.send_signed(Method::GET, "/fapi/v1/order", &params).await?;
        // Normalized to an array so both venues answer the same shape.
        to_value(vec![reply])
    }
}

fn to_value<T: serde::Serialize>(rows: Vec<T>) -> Result<Value, VenueError> {
    serde_json::to_value(rows).map_err(|e| VenueError::Decode(e.to_string()))
}
