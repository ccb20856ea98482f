use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::events::EventType;
use crate::service::{CoreCtx, ServiceCtx};
use crate::traits::Runnable;

/// Lock-free per-message-type counters shared across the process.
#[derive(Debug, Default)]
pub struct StatCounters {
    trades: AtomicU64,
    tickers: AtomicU64,
    books: AtomicU64,
    klines: AtomicU64,
    klines_closed: AtomicU64,
    funding: AtomicU64,
    mark_price: AtomicU64,
    order_updates: AtomicU64,
    balance_updates: AtomicU64,
    position_updates: AtomicU64,
    pub archive_write_errors: AtomicU64,
    pub bus_dropped: AtomicU64,
    pub ws_reconnects: AtomicU64,
    pub orders_handled: AtomicU64,
    pub queries_handled: AtomicU64,
}

impl StatCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, event_type: EventType) {
        let counter = match event_type {
            EventType::TradeUpdate => &self.trades,
            EventType::TickerUpdate => &self.tickers,
            EventType::BookUpdate => &self.books,
            EventType::KlineUpdate => &self.klines,
            EventType::KlineClosed => &self.klines_closed,
            EventType::FundingUpdate => &self.funding,
            EventType::MarkPriceUpdate => &self.mark_price,
            EventType::OrderUpdate => &self.order_updates,
            EventType::BalanceUpdate => &self.balance_updates,
            EventType::PositionUpdate => &self.position_updates,
            EventType::VenueStatus => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let mut out = vec![
            ("trades", self.trades.load(Ordering::Relaxed)),
            ("tickers", self.tickers.load(Ordering::Relaxed)),
            ("books", self.books.load(Ordering::Relaxed)),
            ("klines", self.klines.load(Ordering::Relaxed)),
            ("klines_closed", self.klines_closed.load(Ordering::Relaxed)),
            ("funding", self.funding.load(Ordering::Relaxed)),
            ("mark_price", self.mark_price.load(Ordering::Relaxed)),
            ("order_updates", self.order_updates.load(Ordering::Relaxed)),
            ("balance_updates", self.balance_updates.load(Ordering::Relaxed)),
            ("position_updates", self.position_updates.load(Ordering::Relaxed)),
            ("archive_write_errors", self.archive_write_errors.load(Ordering::Relaxed)),
            ("bus_dropped", self.bus_dropped.load(Ordering::Relaxed)),
            ("ws_reconnects", self.ws_reconnects.load(Ordering::Relaxed)),
            ("orders_handled", self.orders_handled.load(Ordering::Relaxed)),
            ("queries_handled", self.queries_handled.load(Ordering::Relaxed)),
        ];
        out.retain(|(_, count)| *count > 0);
        out
    }
}

impl fmt::Display for StatCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .snapshot()
            .iter()
            .map(|(name, count)| format!("{}: {}", name, count))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Periodic status line, the middleware's heartbeat in the logs.
pub struct StatusService {
    interval: Duration,
}

impl StatusService {
    pub fn new(interval: Duration) -> Arc<Self> {
        Arc::new(Self { interval })
    }
}

async fn status_task(service: Arc<StatusService>, service_ctx: Arc<ServiceCtx>, core_ctx: Arc<CoreCtx>) {
    let shutdown = service_ctx.get_shutdown_token();
    let mut timer = tokio::time::interval(service.interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = timer.tick() => {
                let stats = core_ctx.stats.clone();
                // The bus keeps its own drop counter; fold it in before
                // printing.
                stats.bus_dropped.store(core_ctx.bus.dropped(), Ordering::Relaxed);
                if stats.snapshot().is_empty() {
                    info!(target: "status", "idle, no messages yet");
                } else {
                    info!(target: "status", "{}", stats);
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

#[async_trait]
impl Runnable for StatusService {
    async fn get_tasks(
        self: Arc<Self>,
        service_ctx: Arc<ServiceCtx>,
        core_ctx: Arc<CoreCtx>,
    ) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
        vec![Box::pin(status_task(self.clone(), service_ctx, core_ctx))]
    }
}
