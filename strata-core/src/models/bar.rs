use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::now_ms;

use super::{Interval, VenueName, align};

/// One OHLCV bar. The timestamp is the bar-open instant, aligned to the
/// interval grid; the bar covers `[timestamp, timestamp + interval)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp_ms: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp_ms,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn is_aligned(&self, interval: Interval) -> bool {
        self.timestamp_ms % interval.ms() == 0
    }

    pub fn is_valid(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
            && self.volume >= 0.0
    }
}

impl fmt::Display for Bar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} o:{} h:{} l:{} c:{} v:{}",
            self.timestamp_ms, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

/// Roll a window of bars into one bar opening at `period_start`.
///
/// first open, max high, min low, last close, summed volume. The window
/// must already be sorted ascending by timestamp; completeness gating is
/// the caller's business.
pub fn aggregate_window(window: &[Bar], period_start: i64) -> Option<Bar> {
    let first = window.first()?;
    let last = window.last()?;
    let mut high = first.high;
    let mut low = first.low;
    let mut volume = 0.0;
    for bar in window {
        high = high.max(bar.high);
        low = low.min(bar.low);
        volume += bar.volume;
    }
    Some(Bar::new(period_start, first.open, high, low, last.close, volume))
}

/// Wire form of an archived bar: the JSON member stored in the sorted set
/// and mirrored on the `kline-closed` bus channel.
///
/// `written_at` stamps encode time. Redis orders equal-score members
/// lexicographically, so it is the only reliable recency signal when two
/// members land on the same timestamp; dedup keeps the freshest stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub venue: VenueName,
    pub symbol: String,
    pub interval: Interval,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub written_at: i64,
}

impl BarRecord {
    pub fn new(venue: VenueName, symbol: &str, interval: Interval, bar: &Bar) -> Self {
        Self {
            kind: "kline".to_string(),
            venue,
            symbol: symbol.to_string(),
            interval,
            timestamp: bar.timestamp_ms,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            written_at: now_ms(),
        }
    }

    pub fn bar(&self) -> Bar {
        Bar::new(self.timestamp, self.open, self.high, self.low, self.close, self.volume)
    }
}

/// Write-recency stamp of an encoded member. Unparseable or pre-stamp
/// members read as zero, which sorts them behind any stamped write.
pub fn member_written_at(member: &str) -> i64 {
    serde_json::from_str::<BarRecord>(member)
        .map(|record| record.written_at)
        .unwrap_or(0)
}

/// Bucket a 1m window by the target interval grid, preserving order within
/// each bucket. Used by the read-time fallback and the regeneration pass.
pub fn bucket_by_period(bars: &[Bar], interval: Interval) -> Vec<(i64, Vec<Bar>)> {
    let mut buckets: Vec<(i64, Vec<Bar>)> = Vec::new();
    for bar in bars {
        let period = align(bar.timestamp_ms, interval.ms());
        match buckets.last_mut() {
            Some((start, members)) if *start == period => members.push(*bar),
            _ => buckets.push((period, vec![*bar])),
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MINUTE_MS;

    fn minute_bars(start: i64, opens: &[f64]) -> Vec<Bar> {
        opens
            .iter()
            .enumerate()
            .map(|(i, o)| Bar::new(start + i as i64 * MINUTE_MS, *o, o + 10.0, o - 10.0, o + 1.0, i as f64 + 1.0))
            .collect()
    }

    #[test]
    fn test_aggregate_window_formula() {
        let start = 1_735_689_600_000;
        let bars = minute_bars(start, &[100.0, 101.0, 102.0, 103.0, 104.0]);
        let agg = aggregate_window(&bars, start).unwrap();
        assert_eq!(agg.timestamp_ms, start);
        assert_eq!(agg.open, 100.0);
        assert_eq!(agg.high, 114.0);
        assert_eq!(agg.low, 90.0);
        assert_eq!(agg.close, 105.0);
        assert_eq!(agg.volume, 15.0);
    }

    #[test]
    fn test_aggregate_empty_window() {
        assert!(aggregate_window(&[], 0).is_none());
    }

    #[test]
    fn test_bar_record_wire_format() {
        let bar = Bar::new(1_735_689_600_000, 1.0, 2.0, 0.5, 1.5, 3.0);
        let record = BarRecord::new(VenueName::Binance, "BTCUSDT", Interval::M1, &bar);
        assert!(record.written_at > 0);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "kline");
        assert_eq!(json["venue"], "binance");
        assert_eq!(json["interval"], "1m");
        assert_eq!(json["timestamp"], 1_735_689_600_000i64);
        let back: BarRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.bar(), bar);
        assert_eq!(back.written_at, record.written_at);
    }

    #[test]
    fn test_member_written_at_tolerates_legacy_members() {
        // Members written before the stamp existed carry no field.
        let legacy = r#"{"type":"kline","venue":"okx","symbol":"BTC-USDT-SWAP","interval":"1m","timestamp":0,"open":1.0,"high":1.0,"low":1.0,"close":1.0,"volume":0.0}"#;
        assert_eq!(member_written_at(legacy), 0);
        assert_eq!(member_written_at("not json"), 0);

        let bar = Bar::new(0, 1.0, 1.0, 1.0, 1.0, 0.0);
        let record = BarRecord::new(VenueName::Okx, "BTC-USDT-SWAP", Interval::M1, &bar);
        let member = serde_json::to_string(&record).unwrap();
        assert_eq!(member_written_at(&member), record.written_at);
    }

    #[test]
    fn test_bucket_by_period() {
        let start = 1_735_689_600_000;
        let bars = minute_bars(start, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let buckets = bucket_by_period(&bars, Interval::M5);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].0, start);
        assert_eq!(buckets[0].1.len(), 5);
        assert_eq!(buckets[1].0, start + Interval::M5.ms());
        assert_eq!(buckets[1].1.len(), 2);
    }
}
