use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kanal::AsyncReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use strata_core::prelude::{
    BINANCE_MAX_STREAMS, BusQueue, CoreCtx, Credentials, Interval, MarketChannel, Runnable, ServiceCtx, SessionRole,
    SubscriptionCommand, SubscriptionOp, VenueClient, VenueName,
};

use crate::parser::parse_frame;
use crate::session::{BinanceSessionDriver, ChangeFrames, OkxSessionDriver, SessionHandle};
use crate::subscriptions::SubscriptionSet;
use crate::ws::{SessionDriver, WsSession, WsSessionConfig};

const LISTEN_KEY_KEEPALIVE: Duration = Duration::from_secs(30 * 60);
const SUBSCRIBE_POLL: Duration = Duration::from_secs(1);
const INSTRUMENT_REFRESH: Duration = Duration::from_secs(3600);

/// Everything the ingest side needs from configuration, resolved by the
/// binary at wiring time.
pub struct IngestWiring {
    pub okx_ws_public_url: String,
    pub okx_ws_business_url: String,
    pub okx_ws_private_url: String,
    pub binance_ws_url: String,
    pub okx_credentials: Option<Credentials>,
    pub binance_credentials: Option<Credentials>,
    pub binance_client: Option<Arc<strata_binance::BinanceClient>>,
    pub channels: Vec<MarketChannel>,
    pub okx_symbols: Vec<String>,
    pub binance_symbols: Vec<String>,
    /// Public REST clients for periodic instrument refresh; newly listed
    /// contracts get subscribed without a restart. Absent in fixed-universe
    /// deployments.
    pub discovery: Option<(Arc<dyn VenueClient>, Arc<dyn VenueClient>)>,
    pub ws_config: WsSessionConfig,
}

/// C1+C2 front half: owns every venue WebSocket session, normalizes their
/// frames onto the internal bus, and services the `subscribe` queue.
pub struct IngestService {
    wiring: IngestWiring,
}

impl IngestService {
    pub fn new(wiring: IngestWiring) -> Arc<Self> {
        Arc::new(Self { wiring })
    }

    fn seed_market_set(set: &SubscriptionSet, channels: &[MarketChannel], symbols: &[String]) {
        for channel in channels {
            if *channel == MarketChannel::Klines {
                continue;
            }
            for symbol in symbols {
                set.insert(*channel, symbol, None);
            }
        }
    }

    fn seed_kline_set(set: &SubscriptionSet, symbols: &[String]) {
        for symbol in symbols {
            set.insert(MarketChannel::Klines, symbol, Some(Interval::M1));
        }
    }

    /// Split symbols so one Binance market connection stays under the
    /// venue's stream limit. Always yields at least one (possibly empty)
    /// split so dynamic subscriptions have a session to land on.
    fn binance_market_splits(channels: &[MarketChannel], symbols: &[String]) -> Vec<Vec<String>> {
        let per_symbol = channels.iter().filter(|c| **c != MarketChannel::Klines).count().max(1);
        let max_symbols = (BINANCE_MAX_STREAMS / per_symbol).max(1);
        let splits: Vec<Vec<String>> = symbols.chunks(max_symbols).map(|chunk| chunk.to_vec()).collect();
        if splits.is_empty() { vec![vec![]] } else { splits }
    }
}

struct SessionSpec {
    driver: Arc<dyn SessionDriver>,
    handle: Arc<SessionHandle>,
    raw_rx: AsyncReceiver<String>,
}

fn build_session<D>(
    driver: Arc<D>,
    subscriptions: Arc<SubscriptionSet>,
    ws_config: &WsSessionConfig,
) -> (SessionSpec, WsSession)
where
    D: SessionDriver + ChangeFrames + Send + Sync + 'static,
{
    let (raw_tx, raw_rx) = kanal::unbounded_async::<String>();
    let (cmd_tx, cmd_rx) = kanal::bounded_async(256);
    let handle = Arc::new(SessionHandle::new(driver.clone(), subscriptions, cmd_tx));
    let session = WsSession::new(driver.clone(), ws_config.clone(), raw_tx, cmd_rx);
    (
        SessionSpec {
            driver,
            handle,
            raw_rx,
        },
        session,
    )
}

async fn bootstrap_task(service: Arc<IngestService>, service_ctx: Arc<ServiceCtx>, core_ctx: Arc<CoreCtx>) {
    let wiring = &service.wiring;
    let shutdown = service_ctx.get_shutdown_token();
    let mut specs: Vec<SessionSpec> = Vec::new();
    let mut sessions: Vec<WsSession> = Vec::new();

    // OKX public market session.
    {
        let driver = Arc::new(OkxSessionDriver::new(SessionRole::PublicMarket, &wiring.okx_ws_public_url, None));
        IngestService::seed_market_set(&driver.subscriptions, &wiring.channels, &wiring.okx_symbols);
        let subscriptions = driver.subscriptions.clone();
        let (spec, session) = build_session(driver, subscriptions, &wiring.ws_config);
        specs.push(spec);
        sessions.push(session);
    }

    // OKX business session: candles only.
    if wiring.channels.contains(&MarketChannel::Klines) {
        let driver = Arc::new(OkxSessionDriver::new(
            SessionRole::BusinessKline,
            &wiring.okx_ws_business_url,
            None,
        ));
        IngestService::seed_kline_set(&driver.subscriptions, &wiring.okx_symbols);
        let subscriptions = driver.subscriptions.clone();
        let (spec, session) = build_session(driver, subscriptions, &wiring.ws_config);
        specs.push(spec);
        sessions.push(session);
    }

    // OKX private session.
    if let Some(credentials) = &wiring.okx_credentials {
        let driver = Arc::new(OkxSessionDriver::new(
            SessionRole::PrivateUser,
            &wiring.okx_ws_private_url,
            Some(credentials.clone()),
        ));
        let subscriptions = driver.subscriptions.clone();
        let (spec, session) = build_session(driver, subscriptions, &wiring.ws_config);
        specs.push(spec);
        sessions.push(session);
    }

    // Binance market sessions, split under the stream limit.
    for symbols in IngestService::binance_market_splits(&wiring.channels, &wiring.binance_symbols) {
        let driver = Arc::new(BinanceSessionDriver::new(SessionRole::PublicMarket, &wiring.binance_ws_url, None));
        IngestService::seed_market_set(&driver.subscriptions, &wiring.channels, &symbols);
        let subscriptions = driver.subscriptions.clone();
        let (spec, session) = build_session(driver, subscriptions, &wiring.ws_config);
        specs.push(spec);
        sessions.push(session);
    }

    // Binance continuous-kline session.
    if wiring.channels.contains(&MarketChannel::Klines) {
        let driver = Arc::new(BinanceSessionDriver::new(
            SessionRole::BusinessKline,
            &wiring.binance_ws_url,
            None,
        ));
        IngestService::seed_kline_set(&driver.subscriptions, &wiring.binance_symbols);
        let subscriptions = driver.subscriptions.clone();
        let (spec, session) = build_session(driver, subscriptions, &wiring.ws_config);
        specs.push(spec);
        sessions.push(session);
    }

    // Binance user-data session.
    if let Some(client) = &wiring.binance_client {
        let driver = Arc::new(BinanceSessionDriver::new(
            SessionRole::PrivateUser,
            &wiring.binance_ws_url,
            Some(client.clone()),
        ));
        let subscriptions = driver.subscriptions.clone();
        let (spec, session) = build_session(driver, subscriptions, &wiring.ws_config);
        specs.push(spec);
        sessions.push(session);

        // Listen keys go stale without a periodic keepalive.
        let keepalive_client = client.clone();
        let keepalive_shutdown = shutdown.clone();
        service_ctx.spawn(async move {
            let mut timer = tokio::time::interval(LISTEN_KEY_KEEPALIVE);
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = keepalive_client.keepalive_listen_key().await {
                            warn!(target: "ingestor", "listen key keepalive failed: {}", e);
                        }
                    }
                    _ = keepalive_shutdown.cancelled() => break,
                }
            }
        });
    }

    let handles: Arc<Vec<Arc<SessionHandle>>> = Arc::new(specs.iter().map(|s| s.handle.clone()).collect());
    info!(target: "ingestor", "starting {} venue sessions", sessions.len());

    // Periodic instrument refresh keeps the subscribed universe in step
    // with venue listings.
    if let Some((okx_public, binance_public)) = wiring.discovery.clone() {
        let refresh_handles = handles.clone();
        let refresh_channels = wiring.channels.clone();
        let refresh_shutdown = shutdown.clone();
        service_ctx.spawn(async move {
            let mut timer = tokio::time::interval(INSTRUMENT_REFRESH);
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let (okx_symbols, binance_symbols) =
                            discover_symbols(okx_public.as_ref(), binance_public.as_ref()).await;
                        refresh_universe(&refresh_handles, &refresh_channels, VenueName::Okx, &okx_symbols);
                        refresh_universe(&refresh_handles, &refresh_channels, VenueName::Binance, &binance_symbols);
                    }
                    _ = refresh_shutdown.cancelled() => break,
                }
            }
        });
    }

    // Session + parse task per connection.
    for (spec, session) in specs.into_iter().zip(sessions.into_iter()) {
        let session_shutdown = shutdown.clone();
        let session_ctx = core_ctx.clone();
        service_ctx.spawn(async move {
            session.run(session_ctx, session_shutdown).await;
        });

        let parse_ctx = core_ctx.clone();
        let parse_shutdown = shutdown.clone();
        let venue = spec.driver.venue();
        let role = spec.driver.role();
        let handle = spec.handle.clone();
        let raw_rx = spec.raw_rx;
        service_ctx.spawn(async move {
            parse_task(venue, role, raw_rx, handle, parse_ctx, parse_shutdown).await;
        });
    }

    // Subscription-control worker.
    subscribe_worker(handles, core_ctx, shutdown).await;
}

async fn parse_task(
    venue: VenueName,
    role: SessionRole,
    raw_rx: AsyncReceiver<String>,
    handle: Arc<SessionHandle>,
    core_ctx: Arc<CoreCtx>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            msg = raw_rx.recv() => {
                let text = match msg {
                    Ok(text) => text,
                    Err(_) => break,
                };
                if venue == VenueName::Binance && role == SessionRole::PrivateUser && text.contains("listenKeyExpired") {
                    info!(target: "ingestor", "listen key expired, rotating");
                    handle.request_reconnect();
                    continue;
                }
                match parse_frame(venue, &text, core_ctx.now_ns()) {
                    Ok(events) => {
                        for event in events {
                            core_ctx.publish(event).await;
                        }
                    }
                    Err(e) => {
                        // One bad frame never kills the stream.
                        warn!(target: "ingestor", "{} {} frame dropped: {}", venue, role, e);
                    }
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

async fn subscribe_worker(
    handles: Arc<Vec<Arc<SessionHandle>>>,
    core_ctx: Arc<CoreCtx>,
    shutdown: CancellationToken,
) {
    let mut puller = match core_ctx.bus.puller(BusQueue::Subscribe).await {
        Ok(puller) => puller,
        Err(e) => {
            error!(target: "ingestor", "subscribe queue unavailable: {}", e);
            return;
        }
    };

    info!(target: "ingestor", "subscription worker started");
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        let payload = tokio::select! {
            result = puller.pop(SUBSCRIBE_POLL) => match result {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    warn!(target: "ingestor", "subscribe queue error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            },
            _ = shutdown.cancelled() => break,
        };

        let cmd: SubscriptionCommand = match serde_json::from_str(&payload) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(target: "ingestor", "malformed subscription command: {} ({})", e, payload);
                continue;
            }
        };
        apply_subscription_command(&handles, &cmd);
    }
    info!(target: "ingestor", "subscription worker stopped");
}

/// Subscribe symbols no session covers yet. Symbols already live on any
/// split stay where they are.
fn refresh_universe(
    handles: &[Arc<SessionHandle>],
    channels: &[MarketChannel],
    venue: VenueName,
    symbols: &[String],
) {
    use std::collections::HashSet;
    if symbols.is_empty() {
        return;
    }
    for channel in channels {
        let covered: HashSet<String> = handles
            .iter()
            .filter(|h| h.venue == venue && h.carries(*channel))
            .flat_map(|h| {
                h.subscriptions
                    .snapshot()
                    .into_iter()
                    .filter(|(c, _, _)| c == channel)
                    .map(|(_, symbol, _)| symbol)
            })
            .collect();
        let fresh: Vec<String> = symbols.iter().filter(|s| !covered.contains(*s)).cloned().collect();
        if fresh.is_empty() {
            continue;
        }
        info!(target: "ingestor", "{} newly listed on {}: subscribing {}", fresh.len(), venue, channel);
        let cmd = SubscriptionCommand {
            op: SubscriptionOp::Subscribe,
            venue,
            channel: *channel,
            symbols: fresh,
            interval: (*channel == MarketChannel::Klines).then_some(Interval::M1),
        };
        apply_subscription_command(handles, &cmd);
    }
}

/// Route a subscription change to the sessions that carry the channel.
/// Subscribes pick the least-loaded eligible session (the Binance split);
/// unsubscribes hit every eligible session.
pub fn apply_subscription_command(handles: &[Arc<SessionHandle>], cmd: &SubscriptionCommand) {
    let interval = match cmd.channel {
        MarketChannel::Klines => Some(cmd.interval.unwrap_or(Interval::M1)),
        _ => cmd.interval,
    };
    let eligible: Vec<&Arc<SessionHandle>> = handles
        .iter()
        .filter(|h| h.venue == cmd.venue && h.carries(cmd.channel))
        .collect();
    if eligible.is_empty() {
        warn!(target: "ingestor", "no session carries {} {}", cmd.venue, cmd.channel);
        return;
    }
    match cmd.op {
        SubscriptionOp::Subscribe => {
            let target = eligible
                .iter()
                .min_by_key(|h| h.subscriptions.len())
                .expect("eligible is non-empty");
            target.apply_change(cmd.op, cmd.channel, &cmd.symbols, interval);
        }
        SubscriptionOp::Unsubscribe => {
            for handle in eligible {
                handle.apply_change(cmd.op, cmd.channel, &cmd.symbols, interval);
            }
        }
    }
}

#[async_trait]
impl Runnable for IngestService {
    async fn get_tasks(
        self: Arc<Self>,
        service_ctx: Arc<ServiceCtx>,
        core_ctx: Arc<CoreCtx>,
    ) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
        vec![Box::pin(bootstrap_task(self.clone(), service_ctx, core_ctx))]
    }
}

/// Discover the live USDT perpetual universe from both venues' REST
/// surfaces. Used at startup when `subscribe_all` is set.
pub async fn discover_symbols(
    okx: &dyn VenueClient,
    binance: &dyn VenueClient,
) -> (Vec<String>, Vec<String>) {
    let okx_symbols = match okx.list_instruments().await {
        Ok(instruments) => instruments.into_iter().map(|i| i.symbol).collect(),
        Err(e) => {
            error!(target: "ingestor", "okx instrument discovery failed: {}", e);
            vec![]
        }
    };
    let binance_symbols = match binance.list_instruments().await {
        Ok(instruments) => instruments.into_iter().map(|i| i.symbol).collect(),
        Err(e) => {
            error!(target: "ingestor", "binance instrument discovery failed: {}", e);
            vec![]
        }
    };
    info!(
        target: "ingestor",
        "discovered {} okx and {} binance instruments",
        okx_symbols.len(),
        binance_symbols.len()
    );
    (okx_symbols, binance_symbols)
}
