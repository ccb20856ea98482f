use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use strata_core::prelude::{
    CoreCtx, Event, EventFilter, EventType, Interval, KlineFrame, Runnable, VenueName,
};

use crate::rollup::SymbolAggregator;

/// C3: listens for closed 1m bars and republishes completed higher-
/// interval bars as closed klines. The archive picks those up exactly
/// like venue-closed minute bars.
pub struct AggregatorService {
    streams: DashMap<(VenueName, String), SymbolAggregator>,
}

impl AggregatorService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            streams: DashMap::new(),
        })
    }
}

#[async_trait]
impl Runnable for AggregatorService {
    fn event_filter(&self) -> EventFilter {
        EventFilter::Events(vec![EventType::KlineClosed])
    }

    async fn handle_event(&self, ctx: Arc<CoreCtx>, event: Event) {
        let Event::KlineClosed(frame) = &event else {
            return;
        };
        // Only the base stream rolls up; aggregates of aggregates would
        // double-count.
        if frame.interval != Interval::M1 {
            return;
        }

        let emitted = {
            let mut aggregator = self
                .streams
                .entry((frame.venue, frame.symbol.clone()))
                .or_default();
            aggregator.on_closed_minute(&frame.bar)
        };

        for (interval, bar) in emitted {
            let aggregate = KlineFrame {
                venue: frame.venue,
                symbol: frame.symbol.clone(),
                interval,
                timestamp_ms: frame.timestamp_ms,
                timestamp_ns: ctx.now_ns(),
                bar,
                closed: true,
            };
            ctx.publish(Event::KlineClosed(aggregate.into())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::prelude::{Bar, ChannelPubSub, MINUTE_MS, StatCounters, StrategyBus, Subscriber};

    fn kline_closed(symbol: &str, minute: i64, volume: f64) -> Event {
        let timestamp_ms = 1_735_689_600_000 + minute * MINUTE_MS;
        Event::KlineClosed(
            KlineFrame {
                venue: VenueName::Okx,
                symbol: symbol.into(),
                interval: Interval::M1,
                timestamp_ms,
                timestamp_ns: 0,
                bar: Bar::new(timestamp_ms, 1.0, 2.0, 0.5, 1.5, volume),
                closed: true,
            }
            .into(),
        )
    }

    #[test_log::test(tokio::test)]
    async fn test_emits_five_minute_aggregate_per_symbol() {
        let pubsub = ChannelPubSub::new();
        let bus = StrategyBus::new("redis://127.0.0.1:1/0", "test").unwrap();
        let ctx = Arc::new(CoreCtx::new(pubsub.clone(), bus, StatCounters::new()));
        let subscriber = pubsub.subscribe(EventFilter::Events(vec![EventType::KlineClosed]));

        let service = AggregatorService::new();
        // Two interleaved symbols must keep independent state.
        for minute in 0..=5 {
            service.handle_event(ctx.clone(), kline_closed("BTC-USDT-SWAP", minute, 1.0)).await;
            service.handle_event(ctx.clone(), kline_closed("ETH-USDT-SWAP", minute, 2.0)).await;
        }

        let mut aggregates = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(std::time::Duration::from_millis(100), subscriber.recv()).await
        {
            if let Event::KlineClosed(frame) = event
                && frame.interval == Interval::M5
            {
                aggregates.push(frame);
            }
        }
        assert_eq!(aggregates.len(), 2);
        let volumes: Vec<f64> = aggregates.iter().map(|f| f.bar.volume).collect();
        assert!(volumes.contains(&5.0));
        assert!(volumes.contains(&10.0));
    }
}
