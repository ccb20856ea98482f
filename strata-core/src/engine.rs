use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, instrument};

use crate::bus::StrategyBus;
use crate::events::EventFilter;
use crate::pubsub::{PubSubTrait, Subscriber};
use crate::service::{CoreCtx, Service};
use crate::stats::StatCounters;
use crate::traits::Runnable;

#[derive(Clone)]
struct ServiceEntry {
    service: Arc<Service>,
    start_priority: u64,
    stop_priority: u64,
}

/// Owns every service in the process and drives startup in priority order
/// and shutdown in reverse. Startup priorities put the archive and bus
/// before the fan-out, the fan-out before the venue sessions; stop
/// priorities join the gateway workers first and tear the sessions down
/// last, mirroring the order the data flows.
pub struct Engine {
    core_ctx: Arc<CoreCtx>,
    services: Vec<ServiceEntry>,
}

impl Engine {
    pub fn new(pubsub: Arc<dyn PubSubTrait>, bus: Arc<StrategyBus>, stats: Arc<StatCounters>) -> Self {
        Self {
            core_ctx: Arc::new(CoreCtx::new(pubsub, bus, stats)),
            services: Vec::new(),
        }
    }

    pub fn core_ctx(&self) -> Arc<CoreCtx> {
        self.core_ctx.clone()
    }

    pub fn register(&mut self, identifier: &str, service: Arc<dyn Runnable>, start_priority: u64, stop_priority: u64) {
        let subscriber: Option<Arc<dyn Subscriber>> = if matches!(service.event_filter(), EventFilter::None) {
            None
        } else {
            Some(self.core_ctx.pubsub.subscribe(service.event_filter()))
        };

        let svc = Service::new(identifier, service, self.core_ctx.clone(), subscriber);
        info!(target: "engine", "registered service {}", identifier);

        self.services.push(ServiceEntry {
            service: svc,
            start_priority,
            stop_priority,
        });
    }

    #[instrument(parent = None, skip_all)]
    pub async fn start(&self) {
        info!(target: "engine", "starting services");
        let mut sorted = self.services.clone();
        sorted.sort_by_key(|e| e.start_priority);

        let mut priority_groups: BTreeMap<u64, Vec<&ServiceEntry>> = BTreeMap::new();
        for entry in &sorted {
            priority_groups.entry(entry.start_priority).or_default().push(entry);
        }

        for (_priority, entries) in priority_groups.iter() {
            let handles: Vec<_> = entries.iter().map(|e| e.service.start()).collect();
            if !handles.is_empty() {
                join_all(handles).await;
            }
        }
        info!(target: "engine", "started services");
    }

    pub async fn wait_for_shutdown(&self) {
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("received terminate signal, starting graceful shutdown...");
            },
            _ = sigint.recv() => {
                info!("received interrupt signal, starting graceful shutdown...");
            },
        }

        // Second interrupt forces exit.
        tokio::select! {
            _ = self.stop() => {
                info!("graceful shutdown completed");
            },
            _ = sigint.recv() => {
                info!("received second interrupt signal, forcing exit...");
                std::process::exit(130);
            },
        }
    }

    #[instrument(parent = None, skip_all)]
    pub async fn stop(&self) {
        info!(target: "engine", "stopping services");
        let mut sorted = self.services.clone();
        sorted.sort_by_key(|e| std::cmp::Reverse(e.stop_priority));

        let mut priority_groups: BTreeMap<std::cmp::Reverse<u64>, Vec<&ServiceEntry>> = BTreeMap::new();
        for entry in &sorted {
            priority_groups
                .entry(std::cmp::Reverse(entry.stop_priority))
                .or_default()
                .push(entry);
        }

        for (_priority, entries) in priority_groups.iter() {
            let handles: Vec<_> = entries.iter().map(|e| e.service.stop()).collect();
            if !handles.is_empty() {
                join_all(handles).await;
            }
        }
        info!(target: "engine", "stopped services");
    }
}
