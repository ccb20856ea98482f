use thiserror::Error;

use crate::models::VenueName;

/// Errors coming back from a venue connector. Transient kinds are retried
/// locally inside the connector; everything else surfaces to the caller.
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited")]
    RateLimited,
    #[error("server error {code}: {message}")]
    Server { code: u16, message: String },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("venue rejected request: {0}")]
    Rejected(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl VenueError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VenueError::Network(_) | VenueError::Timeout | VenueError::RateLimited | VenueError::Server { .. }
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("NoAccountBound: no account bound for strategy {strategy_id} on {venue}")]
    NoAccountBound { strategy_id: String, venue: VenueName },
    #[error("BadRequest: {0}")]
    BadRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(VenueError::Timeout.is_transient());
        assert!(VenueError::RateLimited.is_transient());
        assert!(
            VenueError::Server {
                code: 503,
                message: "unavailable".into()
            }
            .is_transient()
        );
        assert!(!VenueError::Auth("bad key".into()).is_transient());
        assert!(!VenueError::Rejected("insufficient funds".into()).is_transient());
    }
}
