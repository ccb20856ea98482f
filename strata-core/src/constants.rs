use std::time::Duration;

pub const MINUTE_MS: i64 = 60_000;

/// Reconnect backoff for venue WebSocket sessions.
pub const WS_RECONNECT_BASE: Duration = Duration::from_secs(2);
pub const WS_RECONNECT_CAP: Duration = Duration::from_secs(30);

/// Consecutive reconnect failures before a venue is reported degraded.
pub const WS_DEGRADED_THRESHOLD: u32 = 5;

/// Subscription batching toward the venues.
pub const SUBSCRIBE_BATCH_SIZE: usize = 100;
pub const SUBSCRIBE_BATCH_PACING: Duration = Duration::from_millis(500);

/// Venue-side channel limits per connection.
pub const OKX_MAX_CHANNELS: usize = 480;
pub const BINANCE_MAX_STREAMS: usize = 1024;

/// Minimum spacing between REST calls on one venue connector.
pub const REST_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Bounded retry count for transient REST failures.
pub const REST_MAX_RETRIES: u32 = 5;

/// History paging limits.
pub const OKX_HISTORY_PAGE: usize = 100;
pub const BINANCE_HISTORY_PAGE: usize = 1500;

/// Largest batch the venues accept on batch order endpoints.
pub const MAX_BATCH_ORDERS: usize = 20;
