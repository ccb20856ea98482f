use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Failure categories of one WebSocket session, for the status line and
/// the degraded-event detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    ConnectionFailed,
    WebSocketError,
    PongSendFailed,
    PingSendFailed,
    SubscribeSendFailed,
    StaleConnection,
    UnexpectedBinary,
}

impl fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::WebSocketError => write!(f, "websocket_error"),
            Self::PongSendFailed => write!(f, "pong_send_failed"),
            Self::PingSendFailed => write!(f, "ping_send_failed"),
            Self::SubscribeSendFailed => write!(f, "subscribe_send_failed"),
            Self::StaleConnection => write!(f, "stale_connection"),
            Self::UnexpectedBinary => write!(f, "unexpected_binary"),
        }
    }
}

/// Lock-free per-category error counters plus the most recent message.
#[derive(Debug, Default)]
pub struct SessionErrorStats {
    connection_failed: AtomicU64,
    websocket_error: AtomicU64,
    pong_send_failed: AtomicU64,
    ping_send_failed: AtomicU64,
    subscribe_send_failed: AtomicU64,
    stale_connection: AtomicU64,
    unexpected_binary: AtomicU64,
    last_error: Mutex<Option<(SessionErrorKind, String)>>,
}

impl SessionErrorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: SessionErrorKind, message: impl Into<String>) {
        self.counter(kind).fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some((kind, message.into()));
        }
    }

    pub fn total(&self) -> u64 {
        [
            &self.connection_failed,
            &self.websocket_error,
            &self.pong_send_failed,
            &self.ping_send_failed,
            &self.subscribe_send_failed,
            &self.stale_connection,
            &self.unexpected_binary,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::Relaxed))
        .sum()
    }

    /// Non-zero categories with counts, plus the latest message.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = [
            (SessionErrorKind::ConnectionFailed, &self.connection_failed),
            (SessionErrorKind::WebSocketError, &self.websocket_error),
            (SessionErrorKind::PongSendFailed, &self.pong_send_failed),
            (SessionErrorKind::PingSendFailed, &self.ping_send_failed),
            (SessionErrorKind::SubscribeSendFailed, &self.subscribe_send_failed),
            (SessionErrorKind::StaleConnection, &self.stale_connection),
            (SessionErrorKind::UnexpectedBinary, &self.unexpected_binary),
        ]
        .iter()
        .filter_map(|(kind, counter)| {
            let count = counter.load(Ordering::Relaxed);
            (count > 0).then(|| format!("{}: {}", kind, count))
        })
        .collect();

        if let Ok(last) = self.last_error.lock()
            && let Some((kind, message)) = last.as_ref()
        {
            parts.push(format!("last {}: {}", kind, message));
        }
        if parts.is_empty() {
            "no errors".to_string()
        } else {
            parts.join(", ")
        }
    }

    fn counter(&self, kind: SessionErrorKind) -> &AtomicU64 {
        match kind {
            SessionErrorKind::ConnectionFailed => &self.connection_failed,
            SessionErrorKind::WebSocketError => &self.websocket_error,
            SessionErrorKind::PongSendFailed => &self.pong_send_failed,
            SessionErrorKind::PingSendFailed => &self.ping_send_failed,
            SessionErrorKind::SubscribeSendFailed => &self.subscribe_send_failed,
            SessionErrorKind::StaleConnection => &self.stale_connection,
            SessionErrorKind::UnexpectedBinary => &self.unexpected_binary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_skips_zero_categories() {
        let stats = SessionErrorStats::new();
        assert_eq!(stats.summary(), "no errors");

        stats.record(SessionErrorKind::StaleConnection, "no messages for 60s");
        stats.record(SessionErrorKind::StaleConnection, "no messages for 60s");
        stats.record(SessionErrorKind::ConnectionFailed, "dns");

        let summary = stats.summary();
        assert!(summary.contains("stale_connection: 2"));
        assert!(summary.contains("connection_failed: 1"));
        assert!(summary.contains("last connection_failed: dns"));
        assert!(!summary.contains("websocket_error"));
        assert_eq!(stats.total(), 3);
    }
}
