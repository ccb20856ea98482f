use std::sync::Arc;

use async_trait::async_trait;
use kanal::AsyncSender;
use tracing::warn;

use strata_core::prelude::{
    BINANCE_MAX_STREAMS, Credentials, Interval, MarketChannel, OKX_MAX_CHANNELS, SUBSCRIBE_BATCH_SIZE, SessionRole,
    SubscriptionOp, VenueError, VenueName,
};

use crate::subscriptions::{SubscriptionEntry, SubscriptionSet};
use crate::ws::{SessionCommand, SessionDriver};

/// Frame building for incremental subscription changes, on top of the
/// replay contract in `SessionDriver`.
pub trait ChangeFrames {
    fn change_frames(&self, op: SubscriptionOp, entries: &[SubscriptionEntry]) -> Vec<String>;
}

// ============================================================================
// OKX
// ============================================================================

pub struct OkxSessionDriver {
    role: SessionRole,
    url: String,
    credentials: Option<Credentials>,
    pub subscriptions: Arc<SubscriptionSet>,
}

impl OkxSessionDriver {
    pub fn new(role: SessionRole, url: &str, credentials: Option<Credentials>) -> Self {
        Self {
            role,
            url: url.to_string(),
            credentials,
            subscriptions: Arc::new(SubscriptionSet::new()),
        }
    }

    fn args_for(entries: &[SubscriptionEntry]) -> Vec<strata_okx::OkxWsArg> {
        entries
            .iter()
            .map(|(channel, symbol, interval)| {
                strata_okx::OkxWsArg::instrument(&strata_okx::channel_name(*channel, *interval), symbol)
            })
            .collect()
    }

    fn frames_for(op: SubscriptionOp, entries: &[SubscriptionEntry]) -> Vec<String> {
        let args = Self::args_for(entries);
        args.chunks(SUBSCRIBE_BATCH_SIZE)
            .map(|chunk| match op {
                SubscriptionOp::Subscribe => strata_okx::subscribe_frame(chunk),
                SubscriptionOp::Unsubscribe => strata_okx::unsubscribe_frame(chunk),
            })
            .collect()
    }
}

#[async_trait]
impl SessionDriver for OkxSessionDriver {
    fn venue(&self) -> VenueName {
        VenueName::Okx
    }

    fn role(&self) -> SessionRole {
        self.role
    }

    async fn connect_url(&self) -> Result<String, VenueError> {
        Ok(self.url.clone())
    }

    async fn login_frames(&self) -> Result<Vec<String>, VenueError> {
        if self.role != SessionRole::PrivateUser {
            return Ok(vec![]);
        }
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| VenueError::Auth("private session without credentials".to_string()))?;
        Ok(vec![strata_okx::login_frame(credentials)?])
    }

    fn replay_frames(&self) -> Vec<String> {
        let mut frames = Vec::new();
        if self.role == SessionRole::PrivateUser {
            let args: Vec<serde_json::Value> = strata_okx::private_args()
                .iter()
                .map(|a| serde_json::to_value(a).expect("arg serializes"))
                .collect();
            frames.push(
                serde_json::to_string(&strata_okx::OkxWsRequest {
                    op: "subscribe".to_string(),
                    args,
                })
                .expect("frame serializes"),
            );
        }
        let entries = self.subscriptions.snapshot();
        if entries.len() > OKX_MAX_CHANNELS {
            warn!(target: "ingestor", "okx {} session over the {}-channel limit ({})", self.role, OKX_MAX_CHANNELS, entries.len());
        }
        frames.extend(Self::frames_for(SubscriptionOp::Subscribe, &entries));
        frames
    }

    fn app_ping(&self) -> Option<String> {
        Some("ping".to_string())
    }
}

impl ChangeFrames for OkxSessionDriver {
    fn change_frames(&self, op: SubscriptionOp, entries: &[SubscriptionEntry]) -> Vec<String> {
        Self::frames_for(op, entries)
    }
}

// ============================================================================
// BINANCE
// ============================================================================

pub struct BinanceSessionDriver {
    role: SessionRole,
    ws_base: String,
    client: Option<Arc<strata_binance::BinanceClient>>,
    pub subscriptions: Arc<SubscriptionSet>,
}

impl BinanceSessionDriver {
    pub fn new(role: SessionRole, ws_base: &str, client: Option<Arc<strata_binance::BinanceClient>>) -> Self {
        Self {
            role,
            ws_base: ws_base.to_string(),
            client,
            subscriptions: Arc::new(SubscriptionSet::new()),
        }
    }

    fn stream_names(entries: &[SubscriptionEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|(channel, symbol, interval)| strata_binance::stream_name(symbol, *channel, *interval))
            .collect()
    }
}

#[async_trait]
impl SessionDriver for BinanceSessionDriver {
    fn venue(&self) -> VenueName {
        VenueName::Binance
    }

    fn role(&self) -> SessionRole {
        self.role
    }

    async fn connect_url(&self) -> Result<String, VenueError> {
        if self.role == SessionRole::PrivateUser {
            let client = self
                .client
                .as_ref()
                .ok_or_else(|| VenueError::Auth("private session without credentials".to_string()))?;
            let listen_key = client.create_listen_key().await?;
            return Ok(strata_binance::user_stream_url(&self.ws_base, &listen_key));
        }

        let streams = Self::stream_names(&self.subscriptions.snapshot());
        if streams.len() > BINANCE_MAX_STREAMS {
            warn!(target: "ingestor", "binance {} session over the {}-stream limit ({})", self.role, BINANCE_MAX_STREAMS, streams.len());
        }
        if streams.is_empty() {
            Ok(format!("{}/ws", self.ws_base.trim_end_matches('/')))
        } else {
            Ok(strata_binance::combined_stream_url(&self.ws_base, &streams))
        }
    }

    fn replay_frames(&self) -> Vec<String> {
        // The dial URL carries the full stream set, which is the replay;
        // incremental changes ride SUBSCRIBE frames on the live socket.
        vec![]
    }
}

impl ChangeFrames for BinanceSessionDriver {
    fn change_frames(&self, op: SubscriptionOp, entries: &[SubscriptionEntry]) -> Vec<String> {
        let streams = Self::stream_names(entries);
        streams
            .chunks(SUBSCRIBE_BATCH_SIZE)
            .enumerate()
            .map(|(i, chunk)| match op {
                SubscriptionOp::Subscribe => strata_binance::subscribe_frame(chunk, i as u64 + 1),
                SubscriptionOp::Unsubscribe => strata_binance::unsubscribe_frame(chunk, i as u64 + 1),
            })
            .collect()
    }
}

// ============================================================================
// SESSION HANDLES
// ============================================================================

/// A running session as the control plane sees it: its subscription set
/// and a way to push frames onto the live socket.
pub struct SessionHandle {
    pub venue: VenueName,
    pub role: SessionRole,
    pub subscriptions: Arc<SubscriptionSet>,
    commands: AsyncSender<SessionCommand>,
    change_frames: Box<dyn Fn(SubscriptionOp, &[SubscriptionEntry]) -> Vec<String> + Send + Sync>,
}

impl SessionHandle {
    pub fn new<D>(driver: Arc<D>, subscriptions: Arc<SubscriptionSet>, commands: AsyncSender<SessionCommand>) -> Self
    where
        D: SessionDriver + ChangeFrames + Send + Sync + 'static,
    {
        Self {
            venue: driver.venue(),
            role: driver.role(),
            subscriptions,
            commands,
            change_frames: Box::new(move |op, entries| driver.change_frames(op, entries)),
        }
    }

    /// True when this session carries the given market channel.
    pub fn carries(&self, channel: MarketChannel) -> bool {
        match self.role {
            SessionRole::BusinessKline => channel == MarketChannel::Klines,
            SessionRole::PublicMarket => channel != MarketChannel::Klines,
            SessionRole::PrivateUser => false,
        }
    }

    /// Apply a subscription change and push the frames on the socket.
    /// Entries already in (or absent from) the set are skipped.
    pub fn apply_change(
        &self,
        op: SubscriptionOp,
        channel: MarketChannel,
        symbols: &[String],
        interval: Option<Interval>,
    ) {
        let changed: Vec<SubscriptionEntry> = symbols
            .iter()
            .filter(|symbol| match op {
                SubscriptionOp::Subscribe => self.subscriptions.insert(channel, symbol, interval),
                SubscriptionOp::Unsubscribe => self.subscriptions.remove(channel, symbol, interval),
            })
            .map(|symbol| (channel, symbol.clone(), interval))
            .collect();
        if changed.is_empty() {
            return;
        }
        let frames = (self.change_frames)(op, &changed);
        if !frames.is_empty() {
            let _ = self.commands.try_send(SessionCommand::Send(frames));
        }
    }

    pub fn request_reconnect(&self) {
        let _ = self.commands.try_send(SessionCommand::Reconnect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_okx_replay_rebuilds_subscriptions() {
        let driver = OkxSessionDriver::new(SessionRole::BusinessKline, "wss://example/ws/v5/business", None);
        for symbol in ["BTC-USDT-SWAP", "ETH-USDT-SWAP", "SOL-USDT-SWAP"] {
            driver.subscriptions.insert(MarketChannel::Klines, symbol, Some(Interval::M1));
        }

        let frames = driver.replay_frames();
        assert_eq!(frames.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["op"], "subscribe");
        let args = value["args"].as_array().unwrap();
        assert_eq!(args.len(), 3);
        let symbols: Vec<&str> = args.iter().map(|a| a["instId"].as_str().unwrap()).collect();
        assert!(symbols.contains(&"BTC-USDT-SWAP"));
        assert!(symbols.contains(&"ETH-USDT-SWAP"));
        assert!(symbols.contains(&"SOL-USDT-SWAP"));
        assert!(args.iter().all(|a| a["channel"] == "candle1m"));
    }

    #[test]
    fn test_okx_replay_batches_over_limit() {
        let driver = OkxSessionDriver::new(SessionRole::PublicMarket, "wss://example/ws/v5/public", None);
        for i in 0..250 {
            driver
                .subscriptions
                .insert(MarketChannel::Trades, &format!("SYM{}-USDT-SWAP", i), None);
        }
        let frames = driver.replay_frames();
        // 250 channels in batches of 100.
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_okx_private_replay_has_user_channels() {
        let driver = OkxSessionDriver::new(
            SessionRole::PrivateUser,
            "wss://example/ws/v5/private",
            Some(Credentials::new("k", "s", Some("p"), false)),
        );
        let frames = driver.replay_frames();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("\"orders\""));
        assert!(frames[0].contains("\"positions\""));
        assert!(frames[0].contains("\"account\""));
    }

    #[test]
    fn test_binance_change_frames() {
        let driver = BinanceSessionDriver::new(SessionRole::PublicMarket, "wss://example", None);
        let entries = vec![
            (MarketChannel::Trades, "BTCUSDT".to_string(), None),
            (MarketChannel::Tickers, "BTCUSDT".to_string(), None),
        ];
        let frames = driver.change_frames(SubscriptionOp::Subscribe, &entries);
        assert_eq!(frames.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(value["params"].as_array().unwrap().len(), 2);
    }
}
