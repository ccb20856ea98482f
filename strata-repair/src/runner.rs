use std::sync::Arc;

use tracing::{info, warn};

use strata_archive::{ArchiveError, ArchiveStore};
use strata_core::prelude::{
    AGGREGATED_INTERVALS, BINANCE_HISTORY_PAGE, Interval, OKX_HISTORY_PAGE, VenueClient, VenueName, now_ms,
    parse_stream_key, stream_key,
};

use crate::gaps::{dedup_plan, fetch_windows, find_gaps};

/// Counters for one repair sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    pub streams_scanned: usize,
    pub duplicates_removed: usize,
    pub gaps_found: usize,
    pub bars_backfilled: usize,
    pub bars_regenerated: usize,
}

/// C5: reconciles the archive against venue REST history.
///
/// Per 1m stream, in order: dedup, gap backfill, higher-interval dedup,
/// higher-interval regeneration. Runs against a live archive; only
/// public history endpoints are touched, so credentials are optional.
pub struct RepairRunner {
    store: ArchiveStore,
    okx: Arc<dyn VenueClient>,
    binance: Arc<dyn VenueClient>,
    empty_window_limit: u32,
}

impl RepairRunner {
    pub fn new(
        store: ArchiveStore,
        okx: Arc<dyn VenueClient>,
        binance: Arc<dyn VenueClient>,
        empty_window_limit: u32,
    ) -> Self {
        Self {
            store,
            okx,
            binance,
            empty_window_limit,
        }
    }

    pub async fn run_once(&self) -> Result<RepairReport, ArchiveError> {
        let mut report = RepairReport::default();
        let keys = self.store.discover_minute_keys().await?;
        info!(target: "repair", "scanning {} 1m streams", keys.len());

        for key in keys {
            let Some((venue, symbol, _)) = parse_stream_key(&key) else {
                warn!(target: "repair", "unparseable stream key {}", key);
                continue;
            };
            // Only USDT-quoted contracts are ours to repair; the key's
            // venue tag must agree with the symbol form.
            if strata_core::prelude::venue_for_symbol(&symbol) != Some(venue) {
                continue;
            }
            report.streams_scanned += 1;
            if let Err(e) = self.repair_stream(venue, &symbol, &mut report).await {
                warn!(target: "repair", "repair of {} failed: {}", key, e);
            }
        }

        info!(
            target: "repair",
            "sweep done: {} streams, {} duplicates removed, {} gaps, {} bars backfilled, {} bars regenerated",
            report.streams_scanned,
            report.duplicates_removed,
            report.gaps_found,
            report.bars_backfilled,
            report.bars_regenerated
        );
        Ok(report)
    }

    fn client_for(&self, venue: VenueName) -> &Arc<dyn VenueClient> {
        match venue {
            VenueName::Okx => &self.okx,
            VenueName::Binance => &self.binance,
        }
    }

    fn page_size(venue: VenueName) -> usize {
        match venue {
            VenueName::Okx => OKX_HISTORY_PAGE,
            VenueName::Binance => BINANCE_HISTORY_PAGE,
        }
    }

    async fn repair_stream(
        &self,
        venue: VenueName,
        symbol: &str,
        report: &mut RepairReport,
    ) -> Result<(), ArchiveError> {
        // 1. 1m dedup.
        report.duplicates_removed += self.dedup_key(&stream_key(venue, symbol, Interval::M1), Interval::M1).await?;

        // 2. 1m gap backfill.
        self.backfill(venue, symbol, report).await?;

        // 3. Aggregated-interval dedup.
        for interval in AGGREGATED_INTERVALS {
            report.duplicates_removed += self.dedup_key(&stream_key(venue, symbol, interval), interval).await?;
        }

        // 4. Aggregated-interval regeneration from the repaired base.
        self.regenerate(venue, symbol, report).await?;
        Ok(())
    }

    async fn dedup_key(&self, key: &str, interval: Interval) -> Result<usize, ArchiveError> {
        let rows = self.store.load_members(key).await?;
        let Some(plan) = dedup_plan(&rows) else {
            return Ok(0);
        };
        let removed = rows.len() - plan.len();
        info!(target: "repair", "{}: collapsing {} duplicate members", key, removed);
        self.store.delete_key(key).await?;
        for (score, member) in plan {
            self.store.write_member(key, interval, score, &member).await?;
        }
        Ok(removed)
    }

    async fn backfill(
        &self,
        venue: VenueName,
        symbol: &str,
        report: &mut RepairReport,
    ) -> Result<(), ArchiveError> {
        let bars = self
            .store
            .get_bars(venue, symbol, Interval::M1, 0, i64::MAX)
            .await?;
        let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp_ms).collect();
        let gaps = find_gaps(&timestamps, Interval::M1.ms(), now_ms());
        if gaps.is_empty() {
            return Ok(());
        }
        report.gaps_found += gaps.len();
        let client = self.client_for(venue);

        for gap in gaps {
            info!(
                target: "repair",
                "{} {}: backfilling {} bars from {}",
                venue, symbol, gap.len_bars(Interval::M1.ms()), gap.start_ms
            );
            let mut empty_windows = 0u32;
            for (start, end) in fetch_windows(gap, Self::page_size(venue), Interval::M1.ms()) {
                match client.fetch_history(symbol, Interval::M1, start, end).await {
                    Ok(fetched) if fetched.is_empty() => {
                        // The venue may simply never have listed this
                        // range; give up after a few dry windows.
                        empty_windows += 1;
                        if empty_windows >= self.empty_window_limit {
                            warn!(target: "repair", "{} {}: {} empty windows, advancing", venue, symbol, empty_windows);
                            break;
                        }
                    }
                    Ok(fetched) => {
                        empty_windows = 0;
                        self.store.write_bars(venue, symbol, Interval::M1, &fetched).await?;
                        report.bars_backfilled += fetched.len();
                    }
                    Err(e) => {
                        warn!(target: "repair", "{} {}: history fetch failed: {}", venue, symbol, e);
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn regenerate(
        &self,
        venue: VenueName,
        symbol: &str,
        report: &mut RepairReport,
    ) -> Result<(), ArchiveError> {
        let minute_bars = self
            .store
            .get_bars(venue, symbol, Interval::M1, 0, i64::MAX)
            .await?;
        if minute_bars.is_empty() {
            return Ok(());
        }

        for interval in AGGREGATED_INTERVALS {
            let target_key = stream_key(venue, symbol, interval);
            for (period_start, members) in strata_core::prelude::bucket_by_period(&minute_bars, interval) {
                // Under-populated buckets stay holes until the base
                // stream fills in; existing aggregates are never
                // overwritten.
                if members.len() < interval.multiplier() {
                    continue;
                }
                if self.store.has_timestamp(&target_key, period_start).await? {
                    continue;
                }
                if let Some(aggregate) = strata_core::prelude::aggregate_window(&members, period_start) {
                    self.store.write_bar(venue, symbol, interval, &aggregate).await?;
                    report.bars_regenerated += 1;
                }
            }
        }
        Ok(())
    }
}
