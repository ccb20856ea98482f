use std::fmt;
use std::sync::Arc;

use strum::{Display, EnumDiscriminants, EnumIter, IntoEnumIterator};

use crate::models::{
    BalanceFrame, BookFrame, FundingFrame, KlineFrame, MarkPriceFrame, OrderUpdateFrame, PositionFrame, TickerFrame,
    TradeFrame, VenueStatusFrame,
};

/// Everything that moves over the internal bus. Market events fan out to
/// the strategy bus; closed klines additionally feed the aggregator and
/// the archive; private events end up on the report channel.
#[derive(Debug, Clone, EnumDiscriminants)]
#[strum_discriminants(name(EventType))]
#[strum_discriminants(derive(Hash, Display, EnumIter))]
#[strum_discriminants(strum(serialize_all = "snake_case"))]
pub enum Event {
    // Market data
    TradeUpdate(Arc<TradeFrame>),
    TickerUpdate(Arc<TickerFrame>),
    BookUpdate(Arc<BookFrame>),
    KlineUpdate(Arc<KlineFrame>),
    KlineClosed(Arc<KlineFrame>),
    FundingUpdate(Arc<FundingFrame>),
    MarkPriceUpdate(Arc<MarkPriceFrame>),
    // Private streams
    OrderUpdate(Arc<OrderUpdateFrame>),
    BalanceUpdate(Arc<BalanceFrame>),
    PositionUpdate(Arc<PositionFrame>),
    // Session lifecycle
    VenueStatus(Arc<VenueStatusFrame>),
}

impl Event {
    pub fn event_type(&self) -> EventType {
        self.into()
    }

    pub fn timestamp_ms(&self) -> i64 {
        match self {
            Event::TradeUpdate(e) => e.timestamp_ms,
            Event::TickerUpdate(e) => e.timestamp_ms,
            Event::BookUpdate(e) => e.timestamp_ms,
            Event::KlineUpdate(e) => e.timestamp_ms,
            Event::KlineClosed(e) => e.timestamp_ms,
            Event::FundingUpdate(e) => e.timestamp_ms,
            Event::MarkPriceUpdate(e) => e.timestamp_ms,
            Event::OrderUpdate(e) => e.timestamp_ms,
            Event::BalanceUpdate(e) => e.timestamp_ms,
            Event::PositionUpdate(e) => e.timestamp_ms,
            Event::VenueStatus(e) => e.timestamp_ms,
        }
    }

    pub fn is_market_data(&self) -> bool {
        self.event_type().is_market_data()
    }
}

impl EventType {
    pub fn is_market_data(&self) -> bool {
        matches!(
            self,
            EventType::TradeUpdate
                | EventType::TickerUpdate
                | EventType::BookUpdate
                | EventType::KlineUpdate
                | EventType::KlineClosed
                | EventType::FundingUpdate
                | EventType::MarkPriceUpdate
        )
    }

    pub fn is_private(&self) -> bool {
        matches!(
            self,
            EventType::OrderUpdate | EventType::BalanceUpdate | EventType::PositionUpdate
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.event_type(), self.timestamp_ms())
    }
}

/// Which event types a service wants delivered.
pub enum EventFilter {
    All,
    None,
    MarketData,
    Private,
    Events(Vec<EventType>),
}

impl EventFilter {
    pub fn event_types(&self) -> Vec<EventType> {
        match self {
            EventFilter::All => EventType::iter().collect(),
            EventFilter::None => vec![],
            EventFilter::MarketData => EventType::iter().filter(|et| et.is_market_data()).collect(),
            EventFilter::Private => EventType::iter().filter(|et| et.is_private()).collect(),
            EventFilter::Events(events) => events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bar, Interval, VenueName};

    #[test]
    fn test_filter_market_data() {
        let types = EventFilter::MarketData.event_types();
        assert!(types.contains(&EventType::KlineClosed));
        assert!(!types.contains(&EventType::OrderUpdate));
    }

    #[test]
    fn test_event_type_of_kline() {
        let frame = KlineFrame {
            venue: VenueName::Binance,
            symbol: "BTCUSDT".into(),
            interval: Interval::M1,
            timestamp_ms: 1,
            timestamp_ns: 2,
            bar: Bar::new(0, 1.0, 1.0, 1.0, 1.0, 0.0),
            closed: true,
        };
        let event = Event::KlineClosed(frame.into());
        assert_eq!(event.event_type(), EventType::KlineClosed);
        assert!(event.is_market_data());
    }
}
