use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use strata_core::prelude::{
    BatchReport, ControlMessage, ExecutionReport, MAX_BATCH_ORDERS, OrderAck, QueryMessage, QueryReply, QueryType,
    VenueClient, VenueError, VenueName, now_ms,
};

use crate::registry::AccountRegistry;

/// What the order worker publishes after one control message.
#[derive(Debug)]
pub enum ControlOutcome {
    Report(ExecutionReport),
    Batch(BatchReport),
    Accounts(Vec<strata_core::prelude::AccountInfo>),
    None,
}

fn rejected(strategy_id: &str, client_order_id: Option<String>, error: &str, ts_request_ms: i64) -> ControlOutcome {
    ControlOutcome::Report(ExecutionReport::rejected(
        strategy_id,
        client_order_id,
        error,
        ts_request_ms,
        now_ms(),
    ))
}

fn report_from_ack(strategy_id: &str, ack: &OrderAck, ts_request_ms: i64) -> ExecutionReport {
    if ack.is_ok() {
        ExecutionReport::accepted(strategy_id, ack, ts_request_ms, now_ms())
    } else {
        let mut report = ExecutionReport::rejected(
            strategy_id,
            ack.client_order_id.clone(),
            &format!("{}: {}", ack.code, ack.message),
            ts_request_ms,
            now_ms(),
        );
        report.exchange_order_id = ack.exchange_order_id.clone();
        report
    }
}

fn venue_error_report(strategy_id: &str, client_order_id: Option<String>, e: &VenueError, ts: i64) -> ControlOutcome {
    rejected(strategy_id, client_order_id, &e.to_string(), ts)
}

/// Dispatch one control message. REST failures become rejected reports;
/// nothing here ever kills the worker.
pub async fn handle_control(registry: &AccountRegistry, msg: ControlMessage) -> ControlOutcome {
    let ts_request_ms = now_ms();
    match msg {
        ControlMessage::PlaceOrder(req) => {
            if let Err(e) = req.validate() {
                return rejected(
                    &req.strategy_id,
                    req.client_order_id.clone(),
                    &format!("BadRequest: {}", e),
                    ts_request_ms,
                );
            }
            let Some(venue) = req.resolve_venue() else {
                return rejected(&req.strategy_id, req.client_order_id.clone(), "BadRequest: unroutable symbol", ts_request_ms);
            };
            let account = match registry.resolve(&req.strategy_id, venue).await {
                Ok(account) => account,
                Err(e) => return rejected(&req.strategy_id, req.client_order_id.clone(), &e.to_string(), ts_request_ms),
            };
            match account.client.place_order(&req).await {
                Ok(ack) => ControlOutcome::Report(report_from_ack(&req.strategy_id, &ack, ts_request_ms)),
                Err(e) => venue_error_report(&req.strategy_id, req.client_order_id.clone(), &e, ts_request_ms),
            }
        }

        ControlMessage::PlaceBatchOrders(batch) => {
            let strategy_id = batch.strategy_id.clone();
            if batch.orders.is_empty() || batch.orders.len() > MAX_BATCH_ORDERS {
                return rejected(
                    &strategy_id,
                    None,
                    &format!("BadRequest: batch size {} outside 1..={}", batch.orders.len(), MAX_BATCH_ORDERS),
                    ts_request_ms,
                );
            }
            if let Some((i, e)) = batch
                .orders
                .iter()
                .enumerate()
                .find_map(|(i, order)| order.validate().err().map(|e| (i, e)))
            {
                return rejected(&strategy_id, None, &format!("BadRequest: order {}: {}", i, e), ts_request_ms);
            }
            let Some(venue) = batch.venue.or_else(|| batch.orders[0].resolve_venue()) else {
                return rejected(&strategy_id, None, "BadRequest: unroutable batch", ts_request_ms);
            };
            let account = match registry.resolve(&strategy_id, venue).await {
                Ok(account) => account,
                Err(e) => return rejected(&strategy_id, None, &e.to_string(), ts_request_ms),
            };
            match account.client.place_batch_orders(&batch.orders).await {
                Ok(acks) => {
                    let results: Vec<ExecutionReport> = acks
                        .iter()
                        .map(|ack| report_from_ack(&strategy_id, ack, ts_request_ms))
                        .collect();
                    ControlOutcome::Batch(BatchReport::from_results(&strategy_id, results, now_ms()))
                }
                Err(e) => {
                    let results = vec![ExecutionReport::rejected(
                        &strategy_id,
                        None,
                        &e.to_string(),
                        ts_request_ms,
                        now_ms(),
                    )];
                    ControlOutcome::Batch(BatchReport::from_results(&strategy_id, results, now_ms()))
                }
            }
        }

        ControlMessage::CancelOrder(req) => {
            if let Err(e) = req.validate() {
                return rejected(
                    &req.strategy_id,
                    req.client_order_id.clone(),
                    &format!("BadRequest: {}", e),
                    ts_request_ms,
                );
            }
            let Some(venue) = req.resolve_venue() else {
                return rejected(&req.strategy_id, req.client_order_id.clone(), "BadRequest: unroutable symbol", ts_request_ms);
            };
            let account = match registry.resolve(&req.strategy_id, venue).await {
                Ok(account) => account,
                Err(e) => return rejected(&req.strategy_id, req.client_order_id.clone(), &e.to_string(), ts_request_ms),
            };
            match account.client.cancel_order(&req).await {
                Ok(ack) => ControlOutcome::Report(report_from_ack(&req.strategy_id, &ack, ts_request_ms)),
                Err(e) => venue_error_report(&req.strategy_id, req.client_order_id.clone(), &e, ts_request_ms),
            }
        }

        ControlMessage::CancelBatchOrders(batch) => {
            let strategy_id = batch.strategy_id.clone();
            if batch.cancels.is_empty() || batch.cancels.len() > MAX_BATCH_ORDERS {
                return rejected(
                    &strategy_id,
                    None,
                    &format!("BadRequest: batch size {} outside 1..={}", batch.cancels.len(), MAX_BATCH_ORDERS),
                    ts_request_ms,
                );
            }
            let Some(venue) = batch.venue.or_else(|| batch.cancels[0].resolve_venue()) else {
                return rejected(&strategy_id, None, "BadRequest: unroutable batch", ts_request_ms);
            };
            let account = match registry.resolve(&strategy_id, venue).await {
                Ok(account) => account,
                Err(e) => return rejected(&strategy_id, None, &e.to_string(), ts_request_ms),
            };
            match account.client.cancel_batch_orders(&batch.cancels).await {
                Ok(acks) => {
                    let results: Vec<ExecutionReport> = acks
                        .iter()
                        .map(|ack| report_from_ack(&strategy_id, ack, ts_request_ms))
                        .collect();
                    ControlOutcome::Batch(BatchReport::from_results(&strategy_id, results, now_ms()))
                }
                Err(e) => {
                    let results = vec![ExecutionReport::rejected(
                        &strategy_id,
                        None,
                        &e.to_string(),
                        ts_request_ms,
                        now_ms(),
                    )];
                    ControlOutcome::Batch(BatchReport::from_results(&strategy_id, results, now_ms()))
                }
            }
        }

        ControlMessage::AmendOrder(req) => {
            if let Err(e) = req.validate() {
                return rejected(
                    &req.strategy_id,
                    req.client_order_id.clone(),
                    &format!("BadRequest: {}", e),
                    ts_request_ms,
                );
            }
            let Some(venue) = req.resolve_venue() else {
                return rejected(&req.strategy_id, req.client_order_id.clone(), "BadRequest: unroutable symbol", ts_request_ms);
            };
            let account = match registry.resolve(&req.strategy_id, venue).await {
                Ok(account) => account,
                Err(e) => return rejected(&req.strategy_id, req.client_order_id.clone(), &e.to_string(), ts_request_ms),
            };
            match account.client.amend_order(&req).await {
                Ok(ack) => ControlOutcome::Report(report_from_ack(&req.strategy_id, &ack, ts_request_ms)),
                Err(e) => venue_error_report(&req.strategy_id, req.client_order_id.clone(), &e, ts_request_ms),
            }
        }

        ControlMessage::RegisterAccount(msg) => {
            let credentials = strata_core::prelude::Credentials::from(&msg);
            registry.register(&msg.strategy_id, msg.venue, credentials).await;
            ControlOutcome::None
        }

        ControlMessage::UnregisterAccount(msg) => {
            if !registry.unregister(&msg.strategy_id, msg.venue).await {
                warn!(target: "gateway", "unregister of unknown account {} on {}", msg.strategy_id, msg.venue);
            }
            ControlOutcome::None
        }

        ControlMessage::ListAccounts { .. } => ControlOutcome::Accounts(registry.list().await),
    }
}

/// Dispatch one query. Failures answer `{code: -1, error}` instead of
/// silence so the requester's blocking pop always returns.
pub async fn handle_query(
    registry: &AccountRegistry,
    public_client: impl Fn(VenueName) -> Option<Arc<dyn VenueClient>>,
    msg: &QueryMessage,
) -> QueryReply {
    if msg.query_type == QueryType::RegisteredAccounts {
        let accounts = registry.list().await;
        return QueryReply::ok(msg.query_type, json!(accounts));
    }

    let Some(venue) = msg
        .venue
        .or_else(|| msg.symbol.as_deref().and_then(strata_core::prelude::venue_for_symbol))
    else {
        return QueryReply::err("BadRequest: query needs a venue or a routable symbol");
    };

    // Instruments are public: any client for the venue will do.
    let client: Arc<dyn VenueClient> = if msg.query_type == QueryType::Instruments {
        match registry.default_client(venue).await.or_else(|| public_client(venue)) {
            Some(client) => client,
            None => return QueryReply::err(format!("no client available for {}", venue)),
        }
    } else {
        let strategy_id = msg.strategy_id.as_deref().unwrap_or_default();
        match registry.resolve(strategy_id, venue).await {
            Ok(account) => account.client.clone(),
            Err(e) => return QueryReply::err(e.to_string()),
        }
    };

    let result = match msg.query_type {
        QueryType::Balance => client.query_balance().await,
        QueryType::Positions => client.query_positions(msg.symbol.as_deref()).await,
        QueryType::PendingOrders => client.query_open_orders(msg.symbol.as_deref()).await,
        QueryType::Order => match &msg.symbol {
            Some(symbol) => {
                client
                    .query_order(symbol, msg.exchange_order_id.as_deref(), msg.client_order_id.as_deref())
                    .await
            }
            None => Err(VenueError::BadRequest("order query needs a symbol".to_string())),
        },
        QueryType::Instruments => client.list_instruments().await.map(|instruments| json!(instruments)),
        QueryType::RegisteredAccounts => unreachable!("handled above"),
    };

    match result {
        Ok(data) => QueryReply::ok(msg.query_type, data),
        Err(e) => QueryReply::err(e.to_string()),
    }
}
