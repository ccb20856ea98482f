use std::collections::BTreeSet;
use std::sync::RwLock;

use strata_core::prelude::{Interval, MarketChannel, SubscriptionCommand, SubscriptionOp};

/// One subscribed stream on a venue session.
pub type SubscriptionEntry = (MarketChannel, String, Option<Interval>);

/// The local subscription state of one WebSocket session. Replayed in
/// full after every reconnect; mutated by the subscribe control worker.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    entries: RwLock<BTreeSet<SubscriptionEntry>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a control command; returns the entries that actually changed.
    pub fn apply(&self, cmd: &SubscriptionCommand) -> Vec<SubscriptionEntry> {
        let mut entries = self.entries.write().expect("subscription set poisoned");
        let mut changed = Vec::new();
        for symbol in &cmd.symbols {
            let entry = (cmd.channel, symbol.clone(), cmd.interval);
            let did_change = match cmd.op {
                SubscriptionOp::Subscribe => entries.insert(entry.clone()),
                SubscriptionOp::Unsubscribe => entries.remove(&entry),
            };
            if did_change {
                changed.push(entry);
            }
        }
        changed
    }

    pub fn insert(&self, channel: MarketChannel, symbol: &str, interval: Option<Interval>) -> bool {
        self.entries
            .write()
            .expect("subscription set poisoned")
            .insert((channel, symbol.to_string(), interval))
    }

    pub fn remove(&self, channel: MarketChannel, symbol: &str, interval: Option<Interval>) -> bool {
        self.entries
            .write()
            .expect("subscription set poisoned")
            .remove(&(channel, symbol.to_string(), interval))
    }

    pub fn snapshot(&self) -> Vec<SubscriptionEntry> {
        self.entries.read().expect("subscription set poisoned").iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("subscription set poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::prelude::VenueName;

    #[test]
    fn test_apply_subscribe_then_unsubscribe() {
        let set = SubscriptionSet::new();
        let sub = SubscriptionCommand {
            op: SubscriptionOp::Subscribe,
            venue: VenueName::Okx,
            channel: MarketChannel::Klines,
            symbols: vec!["BTC-USDT-SWAP".into(), "ETH-USDT-SWAP".into()],
            interval: Some(Interval::M1),
        };
        let changed = set.apply(&sub);
        assert_eq!(changed.len(), 2);
        assert_eq!(set.len(), 2);

        // Re-subscribing is a no-op.
        assert!(set.apply(&sub).is_empty());

        let unsub = SubscriptionCommand {
            op: SubscriptionOp::Unsubscribe,
            symbols: vec!["ETH-USDT-SWAP".into()],
            ..sub
        };
        let changed = set.apply(&unsub);
        assert_eq!(changed.len(), 1);
        assert_eq!(set.len(), 1);
    }
}
