use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use strata_core::prelude::{CoreCtx, Runnable, ServiceCtx};

use crate::runner::RepairRunner;

/// Scheduled reconciliation: re-runs the repair sweep on an interval so
/// holes from venue outages close without an operator.
pub struct RepairService {
    runner: Arc<RepairRunner>,
    interval: Duration,
}

impl RepairService {
    pub fn new(runner: Arc<RepairRunner>, interval: Duration) -> Arc<Self> {
        Arc::new(Self { runner, interval })
    }
}

async fn repair_task(service: Arc<RepairService>, service_ctx: Arc<ServiceCtx>, _core_ctx: Arc<CoreCtx>) {
    let shutdown = service_ctx.get_shutdown_token();
    let mut timer = tokio::time::interval(service.interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The immediate first tick is skipped; startup repair is its own pass.
    timer.tick().await;

    loop {
        tokio::select! {
            _ = timer.tick() => {
                info!(target: "repair", "scheduled sweep starting");
                match service.runner.run_once().await {
                    Ok(report) => info!(
                        target: "repair",
                        "scheduled sweep done: {} gaps, {} bars backfilled",
                        report.gaps_found, report.bars_backfilled
                    ),
                    Err(e) => warn!(target: "repair", "scheduled sweep failed: {}", e),
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

#[async_trait]
impl Runnable for RepairService {
    async fn get_tasks(
        self: Arc<Self>,
        service_ctx: Arc<ServiceCtx>,
        core_ctx: Arc<CoreCtx>,
    ) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
        vec![Box::pin(repair_task(self.clone(), service_ctx, core_ctx))]
    }
}
