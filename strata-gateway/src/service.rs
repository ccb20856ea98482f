use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use strata_core::prelude::{
    BusChannel, BusQueue, ControlMessage, CoreCtx, ExecutionReport, QueryMessage, QueryReply, Runnable, ServiceCtx,
    VenueClient, VenueName, now_ms,
};

use crate::handlers::{ControlOutcome, handle_control, handle_query};
use crate::registry::AccountRegistry;

const QUEUE_POLL: Duration = Duration::from_secs(1);

/// C6: consumes the order and query queues, routes through the account
/// registry, and publishes execution reports.
pub struct GatewayService {
    registry: Arc<AccountRegistry>,
    public_clients: HashMap<VenueName, Arc<dyn VenueClient>>,
}

impl GatewayService {
    pub fn new(registry: Arc<AccountRegistry>, public_clients: HashMap<VenueName, Arc<dyn VenueClient>>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            public_clients,
        })
    }

    pub fn registry(&self) -> Arc<AccountRegistry> {
        self.registry.clone()
    }
}

async fn order_worker(service: Arc<GatewayService>, service_ctx: Arc<ServiceCtx>, core_ctx: Arc<CoreCtx>) {
    let shutdown = service_ctx.get_shutdown_token();
    let mut puller = match core_ctx.bus.puller(BusQueue::Order).await {
        Ok(puller) => puller,
        Err(e) => {
            error!(target: "gateway", "order queue unavailable: {}", e);
            return;
        }
    };

    info!(target: "gateway", "order worker started");
    loop {
        let payload = tokio::select! {
            result = puller.pop(QUEUE_POLL) => match result {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(target: "gateway", "order queue error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            },
            _ = shutdown.cancelled() => break,
        };

        let msg: ControlMessage = match serde_json::from_str(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                // Best effort: a malformed payload still earns a
                // rejected report when the strategy tag survives.
                warn!(target: "gateway", "malformed control message: {} ({})", e, payload);
                if let Some(strategy_id) = extract_strategy_id(&payload) {
                    let report = ExecutionReport::rejected(
                        &strategy_id,
                        None,
                        &format!("BadRequest: {}", e),
                        now_ms(),
                        now_ms(),
                    );
                    core_ctx.bus.publish_json(BusChannel::Report, "report", &report);
                }
                continue;
            }
        };

        let outcome = handle_control(&service.registry, msg).await;
        core_ctx.stats.orders_handled.fetch_add(1, Ordering::Relaxed);
        match outcome {
            ControlOutcome::Report(report) => {
                core_ctx.bus.publish_json(BusChannel::Report, "report", &report);
            }
            ControlOutcome::Batch(report) => {
                core_ctx.bus.publish_json(BusChannel::Report, "batch_report", &report);
            }
            ControlOutcome::Accounts(accounts) => {
                core_ctx.bus.publish_json(BusChannel::Report, "accounts", &accounts);
            }
            ControlOutcome::None => {}
        }
    }
    info!(target: "gateway", "order worker stopped");
}

async fn query_worker(service: Arc<GatewayService>, service_ctx: Arc<ServiceCtx>, core_ctx: Arc<CoreCtx>) {
    let shutdown = service_ctx.get_shutdown_token();
    let mut puller = match core_ctx.bus.puller(BusQueue::Query).await {
        Ok(puller) => puller,
        Err(e) => {
            error!(target: "gateway", "query queue unavailable: {}", e);
            return;
        }
    };
    let mut pusher = match core_ctx.bus.reply_pusher().await {
        Ok(pusher) => pusher,
        Err(e) => {
            error!(target: "gateway", "query reply connection unavailable: {}", e);
            return;
        }
    };

    info!(target: "gateway", "query worker started");
    loop {
        let payload = tokio::select! {
            result = puller.pop(QUEUE_POLL) => match result {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(target: "gateway", "query queue error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            },
            _ = shutdown.cancelled() => break,
        };

        let (reply_to, reply) = match serde_json::from_str::<QueryMessage>(&payload) {
            Ok(msg) => {
                let public = &service.public_clients;
                let reply = handle_query(&service.registry, |venue| public.get(&venue).cloned(), &msg).await;
                core_ctx.stats.queries_handled.fetch_add(1, Ordering::Relaxed);
                (msg.reply_to, reply)
            }
            Err(e) => {
                warn!(target: "gateway", "malformed query: {} ({})", e, payload);
                // The requester is blocked on its reply list; answer if
                // the reply_to field survived.
                match extract_reply_to(&payload) {
                    Some(reply_to) => (reply_to, QueryReply::err(format!("BadRequest: {}", e))),
                    None => continue,
                }
            }
        };

        let encoded = match serde_json::to_string(&reply) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(target: "gateway", "reply serialization failed: {}", e);
                continue;
            }
        };
        if let Err(e) = pusher.push(&reply_to, encoded).await {
            warn!(target: "gateway", "reply push to {} failed: {}", reply_to, e);
        }
    }
    info!(target: "gateway", "query worker stopped");
}

fn extract_strategy_id(payload: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()?
        .get("strategy_id")?
        .as_str()
        .map(str::to_string)
}

fn extract_reply_to(payload: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()?
        .get("reply_to")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl Runnable for GatewayService {
    async fn get_tasks(
        self: Arc<Self>,
        service_ctx: Arc<ServiceCtx>,
        core_ctx: Arc<CoreCtx>,
    ) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
        vec![
            Box::pin(order_worker(self.clone(), service_ctx.clone(), core_ctx.clone())),
            Box::pin(query_worker(self.clone(), service_ctx, core_ctx)),
        ]
    }
}
