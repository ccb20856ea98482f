use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use kanal::AsyncSender;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client};
use serde::Serialize;
use strum::Display;
use tracing::{error, warn};

const PUBLISH_BUFFER: usize = 16384;
const PUBLISH_BATCH: usize = 512;

/// PUB channels on the strategy bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum BusChannel {
    MarketOkx,
    MarketBinance,
    MarketUnified,
    KlineClosed,
    Report,
}

/// PULL/REP queues on the strategy bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum BusQueue {
    Order,
    Query,
    Subscribe,
}

/// The outward strategy bus, carried over Redis: PUBLISH channels for
/// market/report fan-out, lists for order/query/subscribe ingestion.
/// Publishing is fire-and-forget through a bounded channel into one
/// pipelining writer task; a slow Redis never blocks market callbacks.
pub struct StrategyBus {
    client: Client,
    prefix: String,
    tx: AsyncSender<(String, String)>,
    dropped: Arc<AtomicU64>,
}

impl StrategyBus {
    pub fn new(url: &str, prefix: &str) -> Result<Arc<Self>> {
        let client = Client::open(url)?;

        let (tx, rx) = kanal::bounded_async::<(String, String)>(PUBLISH_BUFFER);

        let client_clone = client.clone();
        tokio::spawn(async move {
            let mut manager = match ConnectionManager::new(client_clone).await {
                Ok(m) => m,
                Err(e) => {
                    error!(target: "bus", "initial bus connection failed: {}", e);
                    return;
                }
            };

            let mut buffer = Vec::with_capacity(PUBLISH_BATCH);
            loop {
                match rx.recv().await {
                    Ok(item) => buffer.push(item),
                    Err(_) => break, // channel closed
                }

                while buffer.len() < PUBLISH_BATCH {
                    match rx.try_recv() {
                        Ok(Some(item)) => buffer.push(item),
                        Ok(None) => break,
                        Err(_) => break,
                    }
                }

                let mut pipe = redis::pipe();
                for (channel, payload) in buffer.drain(..) {
                    pipe.publish(channel, payload).ignore();
                }
                if let Err(e) = pipe.query_async::<()>(&mut manager).await {
                    warn!(target: "bus", "bus pipeline publish error: {}", e);
                }
            }
        });

        Ok(Arc::new(Self {
            client,
            prefix: prefix.to_string(),
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }))
    }

    pub fn channel_name(&self, channel: BusChannel) -> String {
        format!("{}:{}", self.prefix, channel)
    }

    pub fn queue_name(&self, queue: BusQueue) -> String {
        format!("{}:{}", self.prefix, queue)
    }

    /// Publish one frame as `topic|{json}` on a PUB channel.
    pub fn publish_json<T: Serialize>(&self, channel: BusChannel, topic: &str, payload: &T) {
        let json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                warn!(target: "bus", "failed to serialize bus frame: {}", e);
                return;
            }
        };
        self.publish_raw(channel, topic, json);
    }

    pub fn publish_raw(&self, channel: BusChannel, topic: &str, json: String) {
        let frame = format!("{}|{}", topic, json);
        match self.tx.try_send((self.channel_name(channel), frame)) {
            Ok(true) => {}
            Ok(false) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(target: "bus", "publish buffer full, dropping frame on {}", channel);
            }
            Err(e) => {
                warn!(target: "bus", "publish channel closed: {}", e);
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Dedicated consumer for one PULL queue. BRPOP blocks its connection,
    /// so every worker owns its own.
    pub async fn puller(&self, queue: BusQueue) -> Result<BusPuller> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(BusPuller {
            conn,
            key: self.queue_name(queue),
        })
    }

    /// Connection for RPUSHing query replies to their `reply_to` lists.
    pub async fn reply_pusher(&self) -> Result<BusPusher> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(BusPusher { conn })
    }
}

pub struct BusPuller {
    conn: MultiplexedConnection,
    key: String,
}

impl BusPuller {
    /// Pop the next message, or None on timeout.
    pub async fn pop(&mut self, timeout: Duration) -> Result<Option<String>, redis::RedisError> {
        let res: Option<(String, String)> = self.conn.brpop(&self.key, timeout.as_secs_f64()).await?;
        Ok(res.map(|(_, payload)| payload))
    }
}

pub struct BusPusher {
    conn: MultiplexedConnection,
}

impl BusPusher {
    pub async fn push(&mut self, key: &str, payload: String) -> Result<(), redis::RedisError> {
        let _: i64 = self.conn.rpush(key, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        assert_eq!(BusChannel::MarketOkx.to_string(), "market-okx");
        assert_eq!(BusChannel::MarketUnified.to_string(), "market-unified");
        assert_eq!(BusChannel::KlineClosed.to_string(), "kline-closed");
        assert_eq!(BusQueue::Order.to_string(), "order");
        assert_eq!(BusQueue::Subscribe.to_string(), "subscribe");
    }
}
