use serde::{Deserialize, Serialize};

use super::VenueName;

/// A tradable contract as the venue lists it. Only live USDT-settled
/// perpetuals make it through the venue connectors' filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub venue: VenueName,
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub tick_size: f64,
    pub lot_size: f64,
}

impl Instrument {
    pub fn new(venue: VenueName, symbol: &str, base: &str, quote: &str, tick_size: f64, lot_size: f64) -> Self {
        Self {
            venue,
            symbol: symbol.to_string(),
            base: base.to_string(),
            quote: quote.to_string(),
            tick_size,
            lot_size,
        }
    }
}
