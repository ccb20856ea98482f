mod binance;
mod okx;

pub use binance::parse as parse_binance;
pub use okx::parse as parse_okx;

use thiserror::Error;

use strata_core::prelude::{Event, VenueName};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("json: {0}")]
    Json(String),
    #[error("missing field: {0}")]
    Missing(String),
    #[error("unsupported message: {0}")]
    Unsupported(String),
}

/// Normalize one venue-native text frame into canonical events.
/// `timestamp_ns` is the steady-clock stamp taken at normalization.
pub fn parse_frame(venue: VenueName, text: &str, timestamp_ns: u64) -> Result<Vec<Event>, ParseError> {
    match venue {
        VenueName::Okx => parse_okx(text, timestamp_ns),
        VenueName::Binance => parse_binance(text, timestamp_ns),
    }
}
