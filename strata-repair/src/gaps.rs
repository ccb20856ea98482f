use std::collections::BTreeMap;

use strata_core::prelude::{align, member_written_at};

/// An inclusive range of missing bar-open timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl Gap {
    pub fn len_bars(&self, interval_ms: i64) -> usize {
        ((self.end_ms - self.start_ms) / interval_ms + 1) as usize
    }
}

/// Find every hole in a sorted ascending timestamp list, plus the
/// trailing hole up to the last fully-closed minute of `now_ms`.
pub fn find_gaps(timestamps: &[i64], interval_ms: i64, now_ms: i64) -> Vec<Gap> {
    let mut gaps = Vec::new();
    for pair in timestamps.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if next - prev > interval_ms {
            gaps.push(Gap {
                start_ms: prev + interval_ms,
                end_ms: next - interval_ms,
            });
        }
    }
    if let Some(&last) = timestamps.last() {
        // The bar at align(now) is still open; the newest closed bar
        // opened one interval earlier.
        let newest_closed = align(now_ms, interval_ms) - interval_ms;
        if newest_closed > last {
            gaps.push(Gap {
                start_ms: last + interval_ms,
                end_ms: newest_closed,
            });
        }
    }
    gaps
}

/// Split one gap into REST-sized fetch windows.
pub fn fetch_windows(gap: Gap, page_bars: usize, interval_ms: i64) -> Vec<(i64, i64)> {
    let span = interval_ms * page_bars as i64;
    let mut windows = Vec::new();
    let mut start = gap.start_ms;
    while start <= gap.end_ms {
        let end = (start + span - interval_ms).min(gap.end_ms);
        windows.push((start, end));
        start = end + interval_ms;
    }
    windows
}

/// Group raw members by score; `Some` carries the rebuilt member list
/// (one per timestamp, freshest write stamp wins) when duplicates exist,
/// `None` means the stream is already clean.
///
/// ZRANGE returns equal-score members in lexicographic order, which says
/// nothing about which write happened last; the stamp embedded in the
/// record is the recency signal.
pub fn dedup_plan(rows: &[(String, i64)]) -> Option<Vec<(i64, String)>> {
    let mut by_score: BTreeMap<i64, Vec<&String>> = BTreeMap::new();
    for (member, score) in rows {
        by_score.entry(*score).or_default().push(member);
    }
    if by_score.values().all(|members| members.len() == 1) {
        return None;
    }
    Some(
        by_score
            .into_iter()
            .map(|(score, members)| {
                let freshest = members
                    .into_iter()
                    .max_by_key(|member| member_written_at(member))
                    .expect("group is non-empty");
                (score, freshest.clone())
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::prelude::MINUTE_MS;

    const T0: i64 = 1_735_689_600_000;

    #[test]
    fn test_single_missing_minute() {
        // [t, t+1m, t+3m, t+4m] -> one gap [t+2m, t+2m].
        let timestamps = [T0, T0 + MINUTE_MS, T0 + 3 * MINUTE_MS, T0 + 4 * MINUTE_MS];
        let gaps = find_gaps(&timestamps, MINUTE_MS, T0 + 5 * MINUTE_MS);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start_ms, T0 + 2 * MINUTE_MS);
        assert_eq!(gaps[0].end_ms, T0 + 2 * MINUTE_MS);
        assert_eq!(gaps[0].len_bars(MINUTE_MS), 1);
    }

    #[test]
    fn test_trailing_gap_to_last_closed_minute() {
        let timestamps = [T0];
        // Wall clock sits 10m30s past T0; the minute at +10m is open, so
        // the trailing gap runs [T0+1m, T0+9m].
        let now = T0 + 10 * MINUTE_MS + 30_000;
        let gaps = find_gaps(&timestamps, MINUTE_MS, now);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start_ms, T0 + MINUTE_MS);
        assert_eq!(gaps[0].end_ms, T0 + 9 * MINUTE_MS);
        assert_eq!(gaps[0].len_bars(MINUTE_MS), 9);
    }

    #[test]
    fn test_contiguous_stream_has_no_gaps() {
        let timestamps: Vec<i64> = (0..10).map(|i| T0 + i * MINUTE_MS).collect();
        let gaps = find_gaps(&timestamps, MINUTE_MS, T0 + 10 * MINUTE_MS + 1);
        assert!(gaps.is_empty());
    }

    #[test]
    fn test_empty_stream_has_no_gaps() {
        assert!(find_gaps(&[], MINUTE_MS, T0).is_empty());
    }

    #[test]
    fn test_multiple_gaps() {
        let timestamps = [T0, T0 + 3 * MINUTE_MS, T0 + 4 * MINUTE_MS, T0 + 8 * MINUTE_MS];
        let gaps = find_gaps(&timestamps, MINUTE_MS, T0 + 9 * MINUTE_MS);
        assert_eq!(
            gaps,
            vec![
                Gap {
                    start_ms: T0 + MINUTE_MS,
                    end_ms: T0 + 2 * MINUTE_MS
                },
                Gap {
                    start_ms: T0 + 5 * MINUTE_MS,
                    end_ms: T0 + 7 * MINUTE_MS
                },
            ]
        );
    }

    #[test]
    fn test_fetch_windows_split() {
        let gap = Gap {
            start_ms: T0,
            end_ms: T0 + 249 * MINUTE_MS,
        };
        // 250 bars in pages of 100.
        let windows = fetch_windows(gap, 100, MINUTE_MS);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0], (T0, T0 + 99 * MINUTE_MS));
        assert_eq!(windows[1], (T0 + 100 * MINUTE_MS, T0 + 199 * MINUTE_MS));
        assert_eq!(windows[2], (T0 + 200 * MINUTE_MS, T0 + 249 * MINUTE_MS));
    }

    #[test]
    fn test_dedup_plan_clean_stream() {
        let rows = vec![("a".to_string(), 1), ("b".to_string(), 2)];
        assert!(dedup_plan(&rows).is_none());
    }

    fn member(timestamp_ms: i64, volume: f64, written_at: i64) -> String {
        use strata_core::prelude::{Bar, BarRecord, Interval, VenueName};
        let bar = Bar::new(timestamp_ms, 100.0, 110.0, 90.0, 101.0, volume);
        let mut record = BarRecord::new(VenueName::Okx, "BTC-USDT-SWAP", Interval::M1, &bar);
        record.written_at = written_at;
        serde_json::to_string(&record).unwrap()
    }

    #[test]
    fn test_dedup_plan_keeps_freshest_write() {
        let stale = member(T0, 1.0, 100);
        let fresh = member(T0, 2.0, 200);
        let only = member(T0 + MINUTE_MS, 3.0, 150);

        // The survivor is picked by write stamp, not by the position the
        // tie-ordered ZRANGE reply happens to put it in.
        for rows in [
            vec![(stale.clone(), T0), (fresh.clone(), T0), (only.clone(), T0 + MINUTE_MS)],
            vec![(fresh.clone(), T0), (stale.clone(), T0), (only.clone(), T0 + MINUTE_MS)],
        ] {
            let plan = dedup_plan(&rows).unwrap();
            assert_eq!(plan, vec![(T0, fresh.clone()), (T0 + MINUTE_MS, only.clone())]);
        }
    }

    #[test]
    fn test_dedup_plan_legacy_members_lose_to_stamped() {
        // Pre-stamp members read as written_at 0 and always lose to a
        // stamped rewrite.
        let legacy = r#"{"type":"kline","venue":"okx","symbol":"BTC-USDT-SWAP","interval":"1m","timestamp":1735689600000,"open":1.0,"high":1.0,"low":1.0,"close":1.0,"volume":9.0}"#.to_string();
        let stamped = member(T0, 2.0, 50);
        let plan = dedup_plan(&[(stamped.clone(), T0), (legacy, T0)]).unwrap();
        assert_eq!(plan, vec![(T0, stamped)]);
    }
}
