use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use thiserror::Error;
use tracing::debug;

use strata_core::prelude::{
    Bar, BarRecord, Interval, VenueName, aggregate_window, bucket_by_period, stream_key,
};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("decode: {0}")]
    Decode(String),
}

/// Newest timestamp per stream, computed server-side so a 500-symbol
/// sweep costs one round trip. Scores come back as integer strings.
const LATEST_TIMESTAMPS_LUA: &str = r#"
local out = {}
for i, key in ipairs(KEYS) do
    local row = redis.call('ZRANGE', key, -1, -1, 'WITHSCORES')
    if row[2] then
        out[i] = row[2]
    else
        out[i] = '-1'
    end
end
return out
"#;

/// C4: the sorted-set-per-stream bar archive.
///
/// Every stream lives at `kline:{venue}:{symbol}:{interval}` with
/// score = bar-open millis and member = the JSON bar record. Writes are
/// one pipeline: ZADD, rank-cap trim, TTL refresh.
#[derive(Clone)]
pub struct ArchiveStore {
    conn: ConnectionManager,
    latest_script: Script,
}

impl ArchiveStore {
    pub async fn connect(url: &str) -> Result<Self, ArchiveError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            latest_script: Script::new(LATEST_TIMESTAMPS_LUA),
        })
    }

    /// Write one closed bar: ZADD under its timestamp, trim the stream to
    /// its interval cap, refresh the TTL.
    pub async fn write_bar(
        &self,
        venue: VenueName,
        symbol: &str,
        interval: Interval,
        bar: &Bar,
    ) -> Result<(), ArchiveError> {
        let key = stream_key(venue, symbol, interval);
        let record = BarRecord::new(venue, symbol, interval, bar);
        let member = serde_json::to_string(&record).map_err(|e| ArchiveError::Decode(e.to_string()))?;
        self.write_member(&key, interval, bar.timestamp_ms, &member).await
    }

    /// Backfill path: many bars for one stream in a single pipeline, one
    /// trim and one TTL refresh at the end.
    pub async fn write_bars(
        &self,
        venue: VenueName,
        symbol: &str,
        interval: Interval,
        bars: &[Bar],
    ) -> Result<(), ArchiveError> {
        if bars.is_empty() {
            return Ok(());
        }
        let key = stream_key(venue, symbol, interval);
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for bar in bars {
            let record = BarRecord::new(venue, symbol, interval, bar);
            let member = serde_json::to_string(&record).map_err(|e| ArchiveError::Decode(e.to_string()))?;
            pipe.zadd(&key, member, bar.timestamp_ms).ignore();
        }
        pipe.zremrangebyrank(&key, 0, -(interval.max_count() as isize) - 1).ignore();
        pipe.expire(&key, interval.ttl_secs()).ignore();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Raw member write through the same capped write path; the repair
    /// pass uses this when re-inserting deduplicated members.
    pub async fn write_member(
        &self,
        key: &str,
        interval: Interval,
        score: i64,
        member: &str,
    ) -> Result<(), ArchiveError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.zadd(key, member, score).ignore();
        pipe.zremrangebyrank(key, 0, -(interval.max_count() as isize) - 1).ignore();
        pipe.expire(key, interval.ttl_secs()).ignore();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Bars in `[t0, t1]` ascending, deduplicated by timestamp (the
    /// freshest write stamp wins). An empty aggregated stream falls back to rolling up
    /// the 1m stream on the fly, permissively: whatever bars exist in a
    /// bucket aggregate, with no completeness gate.
    pub async fn get_bars(
        &self,
        venue: VenueName,
        symbol: &str,
        interval: Interval,
        t0: i64,
        t1: i64,
    ) -> Result<Vec<Bar>, ArchiveError> {
        let bars = self.range(&stream_key(venue, symbol, interval), t0, t1).await?;
        if !bars.is_empty() || interval == Interval::M1 {
            return Ok(bars);
        }
        debug!(target: "archive", "empty {} stream for {} {}, aggregating from 1m", interval, venue, symbol);
        let minute_bars = self.range(&stream_key(venue, symbol, Interval::M1), t0, t1).await?;
        Ok(aggregate_permissive(&minute_bars, interval))
    }

    /// The `n` newest bars, returned ascending.
    pub async fn get_latest(
        &self,
        venue: VenueName,
        symbol: &str,
        interval: Interval,
        n: usize,
    ) -> Result<Vec<Bar>, ArchiveError> {
        let key = stream_key(venue, symbol, interval);
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrange(&key, -(n as isize), -1).await?;
        decode_members(&members)
    }

    /// Newest timestamp per symbol, one server-side call; `None` marks a
    /// stream with no bars. The result is parallel to `symbols`.
    pub async fn batch_latest_timestamps(
        &self,
        symbols: &[String],
        venue: VenueName,
        interval: Interval,
    ) -> Result<Vec<Option<i64>>, ArchiveError> {
        if symbols.is_empty() {
            return Ok(vec![]);
        }
        let mut conn = self.conn.clone();
        let mut invocation = self.latest_script.prepare_invoke();
        for symbol in symbols {
            invocation.key(stream_key(venue, symbol, interval));
        }
        let raw: Vec<i64> = invocation.invoke_async(&mut conn).await?;
        Ok(raw.into_iter().map(|ts| if ts < 0 { None } else { Some(ts) }).collect())
    }

    /// Every 1m stream key currently in the archive.
    pub async fn discover_minute_keys(&self) -> Result<Vec<String>, ArchiveError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut iter = conn.scan_match::<_, String>("kline:*:*:1m").await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    /// Full stream dump with scores, for the repair pass.
    pub async fn load_members(&self, key: &str) -> Result<Vec<(String, i64)>, ArchiveError> {
        let mut conn = self.conn.clone();
        let rows: Vec<(String, i64)> = conn.zrange_withscores(key, 0, -1).await?;
        Ok(rows)
    }

    pub async fn delete_key(&self, key: &str) -> Result<(), ArchiveError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    /// True when the stream already holds a bar at this timestamp.
    pub async fn has_timestamp(&self, key: &str, timestamp_ms: i64) -> Result<bool, ArchiveError> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.zcount(key, timestamp_ms, timestamp_ms).await?;
        Ok(count > 0)
    }

    async fn range(&self, key: &str, t0: i64, t1: i64) -> Result<Vec<Bar>, ArchiveError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrangebyscore(key, t0, t1).await?;
        decode_members(&members)
    }
}

fn decode_members(members: &[String]) -> Result<Vec<Bar>, ArchiveError> {
    let mut bars: Vec<(Bar, i64)> = Vec::with_capacity(members.len());
    for member in members {
        let record: BarRecord =
            serde_json::from_str(member).map_err(|e| ArchiveError::Decode(format!("{}: {}", e, member)))?;
        let bar = record.bar();
        // Monotone-read contract: one bar per timestamp. Equal-score
        // members come back in lexicographic order, not write order, so
        // the write stamp decides which revision survives.
        match bars.last_mut() {
            Some((prev, prev_written)) if prev.timestamp_ms == bar.timestamp_ms => {
                if record.written_at >= *prev_written {
                    *prev = bar;
                    *prev_written = record.written_at;
                }
            }
            _ => bars.push((bar, record.written_at)),
        }
    }
    Ok(bars.into_iter().map(|(bar, _)| bar).collect())
}

/// Read-time rollup used when an aggregated stream is empty. This is
/// presentation, not archive write; holes aggregate from whatever 1m
/// bars exist.
pub fn aggregate_permissive(minute_bars: &[Bar], interval: Interval) -> Vec<Bar> {
    bucket_by_period(minute_bars, interval)
        .into_iter()
        .filter_map(|(period_start, members)| aggregate_window(&members, period_start))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::prelude::MINUTE_MS;

    const T0: i64 = 1_735_689_600_000;

    fn minute_bar(index: i64, volume: f64) -> Bar {
        Bar::new(T0 + index * MINUTE_MS, 100.0, 110.0, 90.0, 101.0, volume)
    }

    #[test]
    fn test_aggregate_permissive_tolerates_holes() {
        // Bucket one has all five bars, bucket two only three.
        let bars: Vec<Bar> = [0, 1, 2, 3, 4, 5, 7, 9].iter().map(|i| minute_bar(*i, 1.0)).collect();
        let aggregated = aggregate_permissive(&bars, Interval::M5);
        assert_eq!(aggregated.len(), 2);
        assert_eq!(aggregated[0].timestamp_ms, T0);
        assert_eq!(aggregated[0].volume, 5.0);
        assert_eq!(aggregated[1].timestamp_ms, T0 + 5 * MINUTE_MS);
        assert_eq!(aggregated[1].volume, 3.0);
    }

    #[test]
    fn test_aggregate_permissive_empty() {
        assert!(aggregate_permissive(&[], Interval::M5).is_empty());
    }

    fn record_with_stamp(index: i64, volume: f64, written_at: i64) -> String {
        let mut record = BarRecord::new(VenueName::Okx, "BTC-USDT-SWAP", Interval::M1, &minute_bar(index, volume));
        record.written_at = written_at;
        serde_json::to_string(&record).unwrap()
    }

    #[test]
    fn test_decode_members_keeps_freshest_write_per_timestamp() {
        // Redis hands equal scores back in lexicographic member order,
        // which is unrelated to write order; the freshest stamp must win
        // no matter which side of the tie it lands on.
        let newer = record_with_stamp(0, 2.0, 200);
        let older = record_with_stamp(0, 1.0, 100);
        let other = record_with_stamp(1, 3.0, 150);

        for members in [
            [newer.clone(), older.clone(), other.clone()],
            [older, newer, other],
        ] {
            let bars = decode_members(&members).unwrap();
            assert_eq!(bars.len(), 2);
            assert_eq!(bars[0].volume, 2.0);
            assert_eq!(bars[1].volume, 3.0);
        }
    }

    #[test]
    fn test_decode_members_rejects_garbage() {
        assert!(decode_members(&["not json".to_string()]).is_err());
    }
}
