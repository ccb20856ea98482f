use std::cmp;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use kanal::{AsyncReceiver, AsyncSender};
use rand::Rng;
use tokio::time::{interval, sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Bytes, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use strata_core::prelude::{
    CoreCtx, Event, SUBSCRIBE_BATCH_PACING, SessionRole, VenueError, VenueName, VenueStatus, VenueStatusFrame,
    WS_DEGRADED_THRESHOLD, WS_RECONNECT_BASE, WS_RECONNECT_CAP,
};

use crate::error_stats::{SessionErrorKind, SessionErrorStats};

/// Commands the control plane can push into a live session.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Send pre-built frames on the socket (incremental subscriptions).
    Send(Vec<String>),
    /// Drop the socket and dial again (listen-key rotation).
    Reconnect,
}

/// Venue- and role-specific wiring of a session: where to dial, how to
/// authenticate, how to replay subscriptions, how to keep the link warm.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    fn venue(&self) -> VenueName;

    fn role(&self) -> SessionRole;

    async fn connect_url(&self) -> Result<String, VenueError>;

    async fn login_frames(&self) -> Result<Vec<String>, VenueError> {
        Ok(vec![])
    }

    /// Full subscription replay, already batched to the venue's limits.
    /// Sent after every (re)connect before the session counts as restored.
    fn replay_frames(&self) -> Vec<String>;

    /// Venue-level text ping, when the venue wants one instead of
    /// protocol pings.
    fn app_ping(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct WsSessionConfig {
    pub ping_interval: Duration,
    pub stale_timeout: Duration,
}

impl Default for WsSessionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(25),
            stale_timeout: Duration::from_secs(60),
        }
    }
}

/// Exponential reconnect backoff, before jitter.
pub fn backoff_delay(attempt: u32) -> Duration {
    if attempt <= 1 {
        return WS_RECONNECT_BASE;
    }
    let exp = cmp::min(attempt - 1, 16);
    cmp::min(WS_RECONNECT_BASE.saturating_mul(2u32.saturating_pow(exp)), WS_RECONNECT_CAP)
}

fn jittered(base: Duration) -> Duration {
    let jitter_ms = rand::rng().random_range(0..500);
    base + Duration::from_millis(jitter_ms)
}

/// One supervised WebSocket connection: dial, authenticate, replay the
/// subscription set, pump frames, reconnect forever.
pub struct WsSession {
    driver: Arc<dyn SessionDriver>,
    config: WsSessionConfig,
    out: AsyncSender<String>,
    commands: AsyncReceiver<SessionCommand>,
    reconnect_attempts: u32,
    degraded: bool,
    errors: SessionErrorStats,
}

impl WsSession {
    pub fn new(
        driver: Arc<dyn SessionDriver>,
        config: WsSessionConfig,
        out: AsyncSender<String>,
        commands: AsyncReceiver<SessionCommand>,
    ) -> Self {
        Self {
            driver,
            config,
            out,
            commands,
            reconnect_attempts: 0,
            degraded: false,
            errors: SessionErrorStats::new(),
        }
    }

    pub async fn run(mut self, core_ctx: Arc<CoreCtx>, shutdown: CancellationToken) {
        let venue = self.driver.venue();
        let role = self.driver.role();
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            match self.connect_and_handle(&core_ctx, &shutdown).await {
                Ok(()) => {
                    if shutdown.is_cancelled() {
                        break;
                    }
                    info!(target: "ingestor", "{} {} session closed, redialing", venue, role);
                    self.reconnect_attempts = 0;
                    tokio::select! {
                        _ = sleep(WS_RECONNECT_BASE) => {},
                        _ = shutdown.cancelled() => break,
                    }
                }
                Err((kind, e)) => {
                    self.reconnect_attempts += 1;
                    self.errors.record(kind, e.clone());
                    core_ctx.stats.ws_reconnects.fetch_add(1, Ordering::Relaxed);

                    if self.reconnect_attempts >= WS_DEGRADED_THRESHOLD && !self.degraded {
                        self.degraded = true;
                        warn!(target: "ingestor", "{} {} degraded: {}", venue, role, self.errors.summary());
                        core_ctx
                            .publish(Event::VenueStatus(
                                VenueStatusFrame {
                                    venue,
                                    role,
                                    timestamp_ms: core_ctx.now_ms(),
                                    status: VenueStatus::Degraded,
                                    detail: e.clone(),
                                }
                                .into(),
                            ))
                            .await;
                    }

                    let backoff = jittered(backoff_delay(self.reconnect_attempts));
                    warn!(
                        target: "ingestor",
                        "{} {} connection failed (attempt {}), retrying in {:?}: {}",
                        venue, role, self.reconnect_attempts, backoff, e
                    );
                    tokio::select! {
                        _ = sleep(backoff) => {},
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }
        info!(target: "ingestor", "{} {} session stopped", venue, role);
    }

    async fn connect_and_handle(
        &mut self,
        core_ctx: &Arc<CoreCtx>,
        shutdown: &CancellationToken,
    ) -> Result<(), (SessionErrorKind, String)> {
        let url = self
            .driver
            .connect_url()
            .await
            .map_err(|e| (SessionErrorKind::ConnectionFailed, format!("connect url: {}", e)))?;
        debug!(target: "ingestor", "connecting to {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| (SessionErrorKind::ConnectionFailed, format!("connection failed: {}", e)))?;
        let (mut sink, mut stream) = ws_stream.split();
        info!(target: "ingestor", "{} {} connected", self.driver.venue(), self.driver.role());

        let login_frames = self
            .driver
            .login_frames()
            .await
            .map_err(|e| (SessionErrorKind::ConnectionFailed, format!("login frame: {}", e)))?;
        let needs_login = !login_frames.is_empty();
        for frame in login_frames {
            sink.send(Message::text(frame))
                .await
                .map_err(|e| (SessionErrorKind::SubscribeSendFailed, format!("login send failed: {}", e)))?;
        }
        if needs_login {
            // Give the venue a beat to ack the login before subscribing.
            sleep(Duration::from_millis(500)).await;
        }

        // Full resubscription replay; only after this is the session
        // considered restored.
        let frames = self.driver.replay_frames();
        for (i, frame) in frames.iter().enumerate() {
            if i > 0 {
                sleep(SUBSCRIBE_BATCH_PACING).await;
            }
            sink.send(Message::text(frame.clone()))
                .await
                .map_err(|e| (SessionErrorKind::SubscribeSendFailed, format!("subscribe send failed: {}", e)))?;
        }

        if self.degraded {
            core_ctx
                .publish(Event::VenueStatus(
                    VenueStatusFrame {
                        venue: self.driver.venue(),
                        role: self.driver.role(),
                        timestamp_ms: core_ctx.now_ms(),
                        status: VenueStatus::Restored,
                        detail: format!("resubscribed {} frames", frames.len()),
                    }
                    .into(),
                ))
                .await;
        }
        self.degraded = false;
        self.reconnect_attempts = 0;

        let mut ping_timer = interval(self.config.ping_interval);
        ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ping_timer.tick().await;

        let mut commands_open = true;
        loop {
            tokio::select! {
                result = timeout(self.config.stale_timeout, stream.next()) => {
                    match result {
                        Ok(Some(Ok(msg))) => match msg {
                            Message::Text(text) => {
                                if text.as_str() == "pong" {
                                    continue;
                                }
                                if self.out.send(text.to_string()).await.is_err() {
                                    return Ok(()); // parser gone, shutting down
                                }
                            }
                            Message::Binary(_) => {
                                self.errors.record(SessionErrorKind::UnexpectedBinary, "binary frame");
                                warn!(target: "ingestor", "unexpected binary message");
                            }
                            Message::Ping(data) => {
                                if sink.send(Message::Pong(data)).await.is_err() {
                                    return Err((SessionErrorKind::PongSendFailed, "failed to send pong".to_string()));
                                }
                            }
                            Message::Pong(_) => {}
                            Message::Close(frame) => {
                                info!(target: "ingestor", "received close frame: {:?}", frame);
                                return Ok(());
                            }
                            Message::Frame(_) => {}
                        },
                        Ok(Some(Err(e))) => {
                            error!(target: "ingestor", "websocket error: {}", e);
                            return Err((SessionErrorKind::WebSocketError, format!("websocket error: {}", e)));
                        }
                        Ok(None) => {
                            info!(target: "ingestor", "websocket stream ended");
                            return Ok(());
                        }
                        Err(_) => {
                            return Err((
                                SessionErrorKind::StaleConnection,
                                format!("stale connection, no messages for {:?}", self.config.stale_timeout),
                            ));
                        }
                    }
                }

                _ = ping_timer.tick() => {
                    let ping = match self.driver.app_ping() {
                        Some(text) => Message::text(text),
                        None => Message::Ping(Bytes::new()),
                    };
                    if sink.send(ping).await.is_err() {
                        return Err((SessionErrorKind::PingSendFailed, "failed to send ping".to_string()));
                    }
                }

                cmd = self.commands.recv(), if commands_open => {
                    match cmd {
                        Ok(SessionCommand::Send(frames)) => {
                            for frame in frames {
                                if let Err(e) = sink.send(Message::text(frame)).await {
                                    return Err((
                                        SessionErrorKind::SubscribeSendFailed,
                                        format!("command send failed: {}", e),
                                    ));
                                }
                            }
                        }
                        Ok(SessionCommand::Reconnect) => {
                            info!(target: "ingestor", "reconnect requested");
                            let _ = sink.send(Message::Close(None)).await;
                            return Ok(());
                        }
                        Err(_) => {
                            // Command channel closed; stop polling it.
                            commands_open = false;
                        }
                    }
                }

                _ = shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_to_cap() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
        assert_eq!(backoff_delay(5), Duration::from_secs(30));
        assert_eq!(backoff_delay(60), Duration::from_secs(30));
    }
}
