use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use strata_core::prelude::{
    BarRecord, BusChannel, CoreCtx, Event, EventFilter, Runnable, VenueName,
};

/// Canonical bus envelope: `{type, venue, symbol, ...}` with the frame's
/// own fields flattened in.
#[derive(Serialize)]
struct BusFrame<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

fn venue_channel(venue: VenueName) -> BusChannel {
    match venue {
        VenueName::Okx => BusChannel::MarketOkx,
        VenueName::Binance => BusChannel::MarketBinance,
    }
}

/// C2's back half: mirrors normalized events onto the strategy bus.
///
/// Market frames go to the venue channel and to `market-unified` (the
/// historical duplicate delivery subscribers rely on); in-progress bars
/// go to the unified channel only; closed bars additionally feed the
/// `kline-closed` side channel; private frames and session lifecycle go
/// to `report`.
pub struct FanoutService;

impl FanoutService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }

    fn publish_market<T: Serialize>(&self, ctx: &CoreCtx, venue: VenueName, kind: &str, body: &T) {
        let frame = BusFrame { kind, body };
        ctx.bus.publish_json(venue_channel(venue), kind, &frame);
        ctx.bus.publish_json(BusChannel::MarketUnified, kind, &frame);
    }

    fn publish_unified_only<T: Serialize>(&self, ctx: &CoreCtx, kind: &str, body: &T) {
        let frame = BusFrame { kind, body };
        ctx.bus.publish_json(BusChannel::MarketUnified, kind, &frame);
    }

    fn publish_report<T: Serialize>(&self, ctx: &CoreCtx, kind: &str, body: &T) {
        let frame = BusFrame { kind, body };
        ctx.bus.publish_json(BusChannel::Report, kind, &frame);
    }
}

#[async_trait]
impl Runnable for FanoutService {
    fn event_filter(&self) -> EventFilter {
        EventFilter::All
    }

    async fn handle_event(&self, ctx: Arc<CoreCtx>, event: Event) {
        match &event {
            Event::TradeUpdate(f) => self.publish_market(&ctx, f.venue, "trade", f.as_ref()),
            Event::TickerUpdate(f) => self.publish_market(&ctx, f.venue, "ticker", f.as_ref()),
            Event::BookUpdate(f) => self.publish_market(&ctx, f.venue, "orderbook", f.as_ref()),
            Event::FundingUpdate(f) => self.publish_market(&ctx, f.venue, "funding_rate", f.as_ref()),
            Event::MarkPriceUpdate(f) => self.publish_market(&ctx, f.venue, "mark_price", f.as_ref()),
            Event::KlineUpdate(f) => self.publish_unified_only(&ctx, "kline", f.as_ref()),
            Event::KlineClosed(f) => {
                self.publish_market(&ctx, f.venue, "kline", f.as_ref());
                let record = BarRecord::new(f.venue, &f.symbol, f.interval, &f.bar);
                ctx.bus.publish_json(BusChannel::KlineClosed, "kline", &record);
            }
            Event::OrderUpdate(f) => self.publish_report(&ctx, "order_update", f.as_ref()),
            Event::BalanceUpdate(f) => self.publish_report(&ctx, "account", f.as_ref()),
            Event::PositionUpdate(f) => self.publish_report(&ctx, "position", f.as_ref()),
            Event::VenueStatus(f) => self.publish_report(&ctx, "venue_status", f.as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::prelude::{Bar, Interval, KlineFrame};

    #[test]
    fn test_bus_frame_envelope() {
        let frame = KlineFrame {
            venue: VenueName::Okx,
            symbol: "BTC-USDT-SWAP".into(),
            interval: Interval::M1,
            timestamp_ms: 1_735_689_660_123,
            timestamp_ns: 9,
            bar: Bar::new(1_735_689_600_000, 1.0, 2.0, 0.5, 1.5, 3.0),
            closed: true,
        };
        let wrapped = BusFrame {
            kind: "kline",
            body: &frame,
        };
        let json = serde_json::to_value(&wrapped).unwrap();
        assert_eq!(json["type"], "kline");
        assert_eq!(json["venue"], "okx");
        assert_eq!(json["symbol"], "BTC-USDT-SWAP");
        assert_eq!(json["open"], 1.0);
    }
}
