use std::collections::HashMap;

use tracing::debug;

use strata_core::prelude::{AGGREGATED_INTERVALS, Bar, Interval, align};

/// Accumulation state for one target interval.
#[derive(Debug, Clone)]
struct AggState {
    period_start: i64,
    bar: Bar,
    count: usize,
}

/// Rolls the closed 1m stream of one (venue, symbol) into every higher
/// interval, under the strict-completeness rule: a bucket is emitted only
/// when every one of its 1m bars was observed. Buckets with holes are
/// dropped on boundary crossing; the gap-repair pass owns those.
#[derive(Debug, Default)]
pub struct SymbolAggregator {
    states: HashMap<Interval, AggState>,
}

impl SymbolAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one closed 1m bar; returns the aggregates that completed.
    pub fn on_closed_minute(&mut self, bar: &Bar) -> Vec<(Interval, Bar)> {
        let mut emitted = Vec::new();
        for target in AGGREGATED_INTERVALS {
            let period_start = align(bar.timestamp_ms, target.ms());
            match self.states.get_mut(&target) {
                None => {
                    self.states.insert(target, AggState::seed(period_start, bar));
                }
                Some(state) if state.period_start == period_start => {
                    state.merge(bar);
                }
                Some(state) => {
                    // Boundary crossed; settle the previous bucket.
                    if state.count == target.multiplier() {
                        emitted.push((target, state.bar));
                    } else {
                        debug!(
                            target: "aggregator",
                            "dropping incomplete {} bucket at {} ({}/{} bars)",
                            target, state.period_start, state.count, target.multiplier()
                        );
                    }
                    *state = AggState::seed(period_start, bar);
                }
            }
        }
        emitted
    }
}

impl AggState {
    fn seed(period_start: i64, bar: &Bar) -> Self {
        Self {
            period_start,
            bar: Bar::new(period_start, bar.open, bar.high, bar.low, bar.close, bar.volume),
            count: 1,
        }
    }

    fn merge(&mut self, bar: &Bar) {
        self.bar.high = self.bar.high.max(bar.high);
        self.bar.low = self.bar.low.min(bar.low);
        self.bar.close = bar.close;
        self.bar.volume += bar.volume;
        self.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::prelude::MINUTE_MS;

    const T0: i64 = 1_735_689_600_000; // aligned to every interval up to 8h

    fn minute_bar(index: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        Bar::new(T0 + index * MINUTE_MS, open, high, low, close, volume)
    }

    /// Five aligned 1m bars then one in the next bucket: exactly one 5m
    /// aggregate with the window formula applied.
    #[test]
    fn test_five_minute_happy_path() {
        let mut agg = SymbolAggregator::new();
        let opens = [100.0, 101.0, 102.0, 103.0, 104.0];
        for (i, open) in opens.iter().enumerate() {
            let bar = minute_bar(i as i64, *open, open + 10.0, open - 10.0, open + 1.0, i as f64 + 1.0);
            assert!(agg.on_closed_minute(&bar).is_empty());
        }
        // Sixth bar crosses the 5m boundary.
        let emitted = agg.on_closed_minute(&minute_bar(5, 105.0, 115.0, 95.0, 106.0, 6.0));
        assert_eq!(emitted.len(), 1);
        let (interval, bar) = emitted[0];
        assert_eq!(interval, Interval::M5);
        assert_eq!(bar.timestamp_ms, T0);
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 114.0);
        assert_eq!(bar.low, 90.0);
        assert_eq!(bar.close, 105.0);
        assert_eq!(bar.volume, 15.0);
        assert!(bar.is_aligned(Interval::M5));
    }

    /// Three of five bars then a boundary crossing: nothing emitted, and
    /// the next complete bucket emits normally.
    #[test]
    fn test_incomplete_bucket_is_dropped() {
        let mut agg = SymbolAggregator::new();
        for i in [0, 1, 2] {
            agg.on_closed_minute(&minute_bar(i, 100.0, 110.0, 90.0, 101.0, 1.0));
        }
        // Crossing into the second bucket discards the first.
        let emitted = agg.on_closed_minute(&minute_bar(5, 200.0, 210.0, 190.0, 201.0, 1.0));
        assert!(emitted.is_empty());

        // Fill the second bucket completely.
        for i in [6, 7, 8, 9] {
            assert!(agg.on_closed_minute(&minute_bar(i, 200.0, 210.0, 190.0, 201.0, 1.0)).is_empty());
        }
        let emitted = agg.on_closed_minute(&minute_bar(10, 300.0, 310.0, 290.0, 301.0, 1.0));
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].0, Interval::M5);
        assert_eq!(emitted[0].1.timestamp_ms, T0 + 5 * MINUTE_MS);
        assert_eq!(emitted[0].1.volume, 5.0);
    }

    /// An hour of 1m bars settles 5m/15m/30m buckets along the way and
    /// the 1h bucket at the boundary.
    #[test]
    fn test_hour_settles_all_shorter_intervals() {
        let mut agg = SymbolAggregator::new();
        let mut emitted = Vec::new();
        for i in 0..=60 {
            let bar = minute_bar(i, 100.0 + i as f64, 110.0 + i as f64, 90.0 + i as f64, 101.0 + i as f64, 1.0);
            emitted.extend(agg.on_closed_minute(&bar));
        }
        let count_for = |interval: Interval| emitted.iter().filter(|(i, _)| *i == interval).count();
        assert_eq!(count_for(Interval::M5), 12);
        assert_eq!(count_for(Interval::M15), 4);
        assert_eq!(count_for(Interval::M30), 2);
        assert_eq!(count_for(Interval::H1), 1);
        assert_eq!(count_for(Interval::H4), 0);

        let hour = emitted
            .iter()
            .find(|(interval, _)| *interval == Interval::H1)
            .map(|(_, bar)| bar)
            .unwrap();
        assert_eq!(hour.timestamp_ms, T0);
        assert_eq!(hour.open, 100.0);
        assert_eq!(hour.close, 160.0);
        assert_eq!(hour.volume, 60.0);
    }

    /// Late seeding mid-bucket means the bucket can never complete and is
    /// silently discarded at the boundary.
    #[test]
    fn test_mid_bucket_seed_never_emits() {
        let mut agg = SymbolAggregator::new();
        // First observed bar is minute 2 of its 5m bucket.
        for i in [2, 3, 4] {
            assert!(agg.on_closed_minute(&minute_bar(i, 1.0, 2.0, 0.5, 1.5, 1.0)).is_empty());
        }
        let emitted = agg.on_closed_minute(&minute_bar(5, 1.0, 2.0, 0.5, 1.5, 1.0));
        assert!(emitted.is_empty());
    }
}
