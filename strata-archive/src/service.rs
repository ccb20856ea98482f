use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tracing::warn;

use strata_core::prelude::{CoreCtx, Event, EventFilter, EventType, Runnable};

use crate::store::ArchiveStore;

/// Persists every closed bar, venue-delivered or aggregator-produced.
/// A failing write is counted and skipped; ingestion never stalls on the
/// archive.
pub struct ArchiveService {
    store: ArchiveStore,
}

impl ArchiveService {
    pub fn new(store: ArchiveStore) -> Arc<Self> {
        Arc::new(Self { store })
    }
}

#[async_trait]
impl Runnable for ArchiveService {
    fn event_filter(&self) -> EventFilter {
        EventFilter::Events(vec![EventType::KlineClosed])
    }

    async fn handle_event(&self, ctx: Arc<CoreCtx>, event: Event) {
        let Event::KlineClosed(frame) = &event else {
            return;
        };
        if let Err(e) = self
            .store
            .write_bar(frame.venue, &frame.symbol, frame.interval, &frame.bar)
            .await
        {
            ctx.stats.archive_write_errors.fetch_add(1, Ordering::Relaxed);
            warn!(
                target: "archive",
                "write failed for {} {} {}: {}",
                frame.venue, frame.symbol, frame.interval, e
            );
        }
    }
}
