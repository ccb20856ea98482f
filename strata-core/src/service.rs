use std::sync::Arc;
use std::time::Duration;

use strum::Display;
use tokio::{select, sync::RwLock};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, instrument};

use crate::bus::StrategyBus;
use crate::clock::{SteadyClock, now_ms};
use crate::events::Event;
use crate::pubsub::{PubSubTrait, Subscriber};
use crate::stats::StatCounters;
use crate::traits::Runnable;

#[derive(PartialEq, Debug, Copy, Clone, Default, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ServiceState {
    Starting,
    Running,
    Stopping,
    #[default]
    Stopped,
}

pub struct ServiceCtx {
    state: RwLock<ServiceState>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Default for ServiceCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceCtx {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ServiceState::Stopped),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn get_state(&self) -> ServiceState {
        *self.state.read().await
    }

    pub async fn is_running(&self) -> bool {
        matches!(self.get_state().await, ServiceState::Starting | ServiceState::Running)
    }

    pub fn get_shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn starting(&self) {
        *self.state.write().await = ServiceState::Starting
    }

    pub async fn started(&self) {
        self.tracker.reopen();
        *self.state.write().await = ServiceState::Running
    }

    pub async fn stopping(&self) {
        *self.state.write().await = ServiceState::Stopping
    }

    pub async fn stopped(&self) {
        *self.state.write().await = ServiceState::Stopped;
    }

    pub fn signal_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(future);
    }

    pub async fn wait(&self) {
        self.tracker.close();
        while !self.tracker.is_empty() {
            info!("waiting for {} tasks to stop", self.tracker.len());
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        self.tracker.wait().await;
    }
}

/// Shared process context handed to every service: the internal pubsub,
/// the outward strategy bus, the steady clock and the counters.
pub struct CoreCtx {
    pub pubsub: Arc<dyn PubSubTrait>,
    pub bus: Arc<StrategyBus>,
    pub clock: SteadyClock,
    pub stats: Arc<StatCounters>,
}

impl CoreCtx {
    pub fn new(pubsub: Arc<dyn PubSubTrait>, bus: Arc<StrategyBus>, stats: Arc<StatCounters>) -> Self {
        Self {
            pubsub,
            bus,
            clock: SteadyClock::new(),
            stats,
        }
    }

    pub fn now_ms(&self) -> i64 {
        now_ms()
    }

    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    pub async fn publish(&self, event: Event) {
        self.stats.record(event.event_type());
        self.pubsub.publish(event).await
    }
}

pub struct Service {
    service_ctx: Arc<ServiceCtx>,
    core_ctx: Arc<CoreCtx>,
    identifier: String,
    subscriber: Option<Arc<dyn Subscriber>>,
    service: Arc<dyn Runnable>,
}

impl Service {
    pub fn new(
        identifier: &str,
        service: Arc<dyn Runnable>,
        core_ctx: Arc<CoreCtx>,
        subscriber: Option<Arc<dyn Subscriber>>,
    ) -> Arc<Self> {
        Self {
            service_ctx: Arc::new(ServiceCtx::new()),
            core_ctx,
            identifier: identifier.to_owned(),
            subscriber,
            service,
        }
        .into()
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[instrument(parent = None, skip_all, fields(service = %self.identifier()))]
    async fn event_loop(&self) {
        let core_ctx = self.core_ctx.clone();
        let service = self.service.clone();
        let token = self.service_ctx.get_shutdown_token();
        let subscriber = self.subscriber.as_ref().expect("event loop needs a subscriber").clone();
        self.service_ctx.spawn(async move {
            loop {
                select! {
                    Some(event) = subscriber.recv() => {
                        service.handle_event(core_ctx.clone(), event).await;
                    },
                    _ = token.cancelled() => {
                        break
                    }
                }
            }
        });
    }

    #[instrument(parent = None, skip_all, fields(service = %self.identifier()))]
    pub async fn start(&self) {
        info!(target: "service", "starting");

        self.service_ctx.starting().await;

        if self.subscriber.is_some() {
            self.event_loop().await;
        }

        self.service.setup(self.service_ctx.to_owned(), self.core_ctx.to_owned()).await;

        let tasks = self
            .service
            .clone()
            .get_tasks(self.service_ctx.clone(), self.core_ctx.clone())
            .await;
        for task in tasks {
            self.service_ctx.spawn(task);
        }

        self.service_ctx.started().await;
        info!(target: "service", "started");
    }

    #[instrument(parent = None, skip_all, fields(service = %self.identifier()))]
    pub async fn stop(&self) {
        info!(target: "service", "stopping");
        self.service_ctx.stopping().await;

        self.service
            .teardown(self.service_ctx.to_owned(), self.core_ctx.to_owned())
            .await;

        self.service_ctx.signal_shutdown();
        self.service_ctx.wait().await;

        self.service_ctx.stopped().await;
        info!(target: "service", "stopped");
    }
}
