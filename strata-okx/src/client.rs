use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use strata_core::prelude::{
    AmendRequest, Bar, CancelRequest, Credentials, Instrument, Interval, MAX_BATCH_ORDERS, OKX_HISTORY_PAGE, OrderAck,
    OrderRequest, VenueClient, VenueError, VenueName,
};

use crate::http::OkxHttpClient;
use crate::model::{
    AmendOrderBody, CancelOrderBody, OkxBalance, OkxCandleRow, OkxInstrument, OkxOrderDetail, OkxOrderResult,
    OkxPosition, PlaceOrderBody, candle_to_bar, interval_to_bar_param,
};

/// OKX v5 implementation of the venue capability set.
pub struct OkxClient {
    http: OkxHttpClient,
}

impl OkxClient {
    pub fn new(base_url: &str, credentials: Option<Credentials>, rest_min_interval: Duration) -> Self {
        Self {
            http: OkxHttpClient::new(base_url, credentials, rest_min_interval),
        }
    }

    fn ack_from_reply(code: &str, msg: &str, results: Vec<OkxOrderResult>) -> Result<OrderAck, VenueError> {
        match results.into_iter().next() {
            Some(result) => Ok(result.to_ack()),
            None if code == "0" => Ok(OrderAck::default()),
            None => Err(VenueError::Rejected(format!("{}: {}", code, msg))),
        }
    }
}

#[async_trait]
impl VenueClient for OkxClient {
    fn venue(&self) -> VenueName {
        VenueName::Okx
    }

    async fn list_instruments(&self) -> Result<Vec<Instrument>, VenueError> {
        let resp = self
            .http
            .get::<OkxInstrument>("/api/v5/public/instruments", &[("instType", "SWAP".to_string())], false)
            .await?;
        let instruments = resp
            .into_result()?
            .iter()
            .filter(|i| i.is_live_usdt_swap())
            .map(|i| i.to_instrument())
            .collect();
        Ok(instruments)
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Bar>, VenueError> {
        // `after` pages backwards: rows strictly older than the cursor,
        // newest first.
        let after = end_ms + interval.ms();
        let query = [
            ("instId", symbol.to_string()),
            ("bar", interval_to_bar_param(interval).to_string()),
            ("after", after.to_string()),
            ("limit", OKX_HISTORY_PAGE.to_string()),
        ];
        let resp = self
            .http
            .get::<OkxCandleRow>("/api/v5/market/history-candles", &query, false)
            .await?;
        let rows = resp.into_result()?;
        debug!(target: "okx", "history {} {}: {} rows", symbol, interval, rows.len());

        let mut bars = Vec::with_capacity(rows.len());
        for row in &rows {
            let bar = candle_to_bar(row)?;
            if bar.timestamp_ms >= start_ms && bar.timestamp_ms <= end_ms {
                bars.push(bar);
            }
        }
        bars.reverse();
        Ok(bars)
    }

    async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, VenueError> {
        let body = PlaceOrderBody::from_request(req);
        let resp = self.http.post::<_, OkxOrderResult>("/api/v5/trade/order", &body).await?;
        Self::ack_from_reply(&resp.code, &resp.msg, resp.data)
    }

    async fn place_batch_orders(&self, reqs: &[OrderRequest]) -> Result<Vec<OrderAck>, VenueError> {
        if reqs.len() > MAX_BATCH_ORDERS {
            return Err(VenueError::BadRequest(format!(
                "batch of {} exceeds the venue limit of {}",
                reqs.len(),
                MAX_BATCH_ORDERS
            )));
        }
        let bodies: Vec<PlaceOrderBody> = reqs.iter().map(PlaceOrderBody::from_request).collect();
        let resp = self
            .http
            .post::<_, OkxOrderResult>("/api/v5/trade/batch-orders", &bodies)
            .await?;
        Ok(resp.data.iter().map(|r| r.to_ack()).collect())
    }

    async fn cancel_order(&self, req: &CancelRequest) -> Result<OrderAck, VenueError> {
        let body = CancelOrderBody::from_request(req);
        let resp = self
            .http
            .post::<_, OkxOrderResult>("/api/v5/trade/cancel-order", &body)
            .await?;
        Self::ack_from_reply(&resp.code, &resp.msg, resp.data)
    }

    async fn cancel_batch_orders(&self, reqs: &[CancelRequest]) -> Result<Vec<OrderAck>, VenueError> {
        if reqs.len() > MAX_BATCH_ORDERS {
            return Err(VenueError::BadRequest(format!(
                "batch of {} exceeds the venue limit of {}",
                reqs.len(),
                MAX_BATCH_ORDERS
            )));
        }
        let bodies: Vec<CancelOrderBody> = reqs.iter().map(CancelOrderBody::from_request).collect();
        let resp = self
            .http
            .post::<_, OkxOrderResult>("/api/v5/trade/cancel-batch-orders", &bodies)
            .await?;
        Ok(resp.data.iter().map(|r| r.to_ack()).collect())
    }

    async fn amend_order(&self, req: &AmendRequest) -> Result<OrderAck, VenueError> {
        let body = AmendOrderBody::from_request(req);
        let resp = self
            .http
            .post::<_, OkxOrderResult>("/api/v5/trade/amend-order", &body)
            .await?;
        Self::ack_from_reply(&resp.code, &resp.msg, resp.data)
    }

    async fn query_balance(&self) -> Result<Value, VenueError> {
        let resp = self.http.get::<OkxBalance>("/api/v5/account/balance", &[], true).await?;
        to_value(resp.into_result()?)
    }

    async fn query_positions(&self, symbol: Option<&str>) -> Result<Value, VenueError> {
        let mut query = Vec::new();
        if let Some(symbol) = symbol {
            query.push(("instId", symbol.to_string()));
        }
        let resp = self
            .http
            .get::<OkxPosition>("/api/v5/account/positions", &query, true)
            .await?;
        to_value(resp.into_result()?)
    }

    async fn query_open_orders(&self, symbol: Option<&str>) -> Result<Value, VenueError> {
        let mut query = vec![("instType", "SWAP".to_string())];
        if let Some(symbol) = symbol {
            query.push(("instId", symbol.to_string()));
        }
        let resp = self
            .http
            .get::<OkxOrderDetail>("/api/v5/trade/orders-pending", &query, true)
            .await?;
        to_value(resp.into_result()?)
    }

    async fn query_order(
        &self,
        symbol: &str,
        exchange_order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Result<Value, VenueError> {
        let mut query = vec![("instId", symbol.to_string())];
        match (exchange_order_id, client_order_id) {
            (Some(ord_id), _) => query.push(("ordId", ord_id.to_string())),
            (None, Some(cl_ord_id)) => query.push(("clOrdId", cl_ord_id.to_string())),
            (None, None) => {
                return Err(VenueError::BadRequest("order query needs an order id".to_string()));
            }
        }
        let resp = self.http.get::<OkxOrderDetail>("/api/v5/trade/order", &query, true).await?;
        to_value(resp.into_result()?)
    }
}

fn to_value<T: serde::Serialize>(rows: Vec<T>) -> Result<Value, VenueError> {
    serde_json::to_value(rows).map_err(|e| VenueError::Decode(e.to_string()))
}
