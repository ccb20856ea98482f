use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use strata_aggregator::AggregatorService;
use strata_archive::{ArchiveService, ArchiveStore};
use strata_binance::BinanceClient;
use strata_core::prelude::{
    BinanceSettings, ChannelPubSub, Credentials, Engine, OkxSettings, StatCounters, StatusService, StrataConfig,
    StrategyBus, VenueClient, VenueName,
};
use strata_gateway::{AccountRegistry, GatewayService};
use strata_ingestor::{FanoutService, IngestService, IngestWiring, WsSessionConfig, discover_symbols};
use strata_okx::OkxClient;
use strata_repair::{RepairRunner, RepairService};

const BINANCE_TESTNET_REST: &str = "https://testnet.binancefuture.com";

fn okx_client(settings: &OkxSettings, credentials: Option<Credentials>) -> Arc<OkxClient> {
    Arc::new(OkxClient::new(
        &settings.rest_url,
        credentials,
        Duration::from_millis(settings.rest_min_interval_ms),
    ))
}

fn binance_client(settings: &BinanceSettings, credentials: Option<Credentials>) -> Arc<BinanceClient> {
    let rest_url = match &credentials {
        Some(creds) if creds.testnet => BINANCE_TESTNET_REST,
        _ => settings.rest_url.as_str(),
    };
    Arc::new(BinanceClient::new(
        rest_url,
        credentials,
        Duration::from_millis(settings.rest_min_interval_ms),
    ))
}

async fn build_registry(config: &StrataConfig) -> Arc<AccountRegistry> {
    let okx_settings = config.venues.okx.clone();
    let binance_settings = config.venues.binance.clone();
    let registry = Arc::new(AccountRegistry::new(Box::new(move |venue, credentials| {
        match venue {
            VenueName::Okx => okx_client(&okx_settings, Some(credentials.clone())) as Arc<dyn VenueClient>,
            VenueName::Binance => binance_client(&binance_settings, Some(credentials.clone())) as Arc<dyn VenueClient>,
        }
    })));

    for (venue, entry) in config.accounts.defaults() {
        registry.register_default(venue, entry.credentials()).await;
    }
    for (strategy_id, entry) in &config.accounts.strategies {
        registry.register(strategy_id, entry.venue, entry.credentials()).await;
    }
    registry
}

/// Run the live middleware until a shutdown signal lands.
pub async fn run_live(config: StrataConfig) -> Result<()> {
    let redis_url = config.redis.url();
    let bus = StrategyBus::new(&redis_url, &config.bus.prefix).context("strategy bus setup failed")?;
    let pubsub = ChannelPubSub::new();
    let stats = StatCounters::new();

    let store = ArchiveStore::connect(&redis_url)
        .await
        .context("archive store connection failed")?;
    info!("archive store connected at {}:{}", config.redis.host, config.redis.port);

    let okx_public = okx_client(&config.venues.okx, None);
    let binance_public = binance_client(&config.venues.binance, None);

    let repair_runner = Arc::new(RepairRunner::new(
        store.clone(),
        okx_public.clone() as Arc<dyn VenueClient>,
        binance_public.clone() as Arc<dyn VenueClient>,
        config.repair.empty_window_limit,
    ));

    // Reconcile the archive before going live, when asked to.
    if config.repair.run_on_startup {
        if let Err(e) = repair_runner.run_once().await {
            warn!("startup gap repair failed: {}", e);
        }
    }

    // Subscription universe: configured lists, or discovery.
    let (okx_symbols, binance_symbols) = if config.ingest.subscribe_all {
        discover_symbols(okx_public.as_ref(), binance_public.as_ref()).await
    } else {
        (config.ingest.okx_symbols.clone(), config.ingest.binance_symbols.clone())
    };

    let registry = build_registry(&config).await;

    let defaults = config.accounts.defaults();
    let okx_credentials = defaults.get(&VenueName::Okx).map(|e| e.credentials());
    let binance_credentials = defaults.get(&VenueName::Binance).map(|e| e.credentials());
    let binance_private = binance_credentials
        .clone()
        .map(|creds| binance_client(&config.venues.binance, Some(creds)));
    if let Some(client) = &binance_private
        && let Err(e) = client.sync_time().await
    {
        warn!("binance server time sync failed: {}", e);
    }

    let wiring = IngestWiring {
        okx_ws_public_url: config.venues.okx.ws_public_url.clone(),
        okx_ws_business_url: config.venues.okx.ws_business_url.clone(),
        okx_ws_private_url: config.venues.okx.ws_private_url.clone(),
        binance_ws_url: config.venues.binance.ws_url.clone(),
        okx_credentials,
        binance_credentials,
        binance_client: binance_private,
        channels: config.ingest.channels.clone(),
        okx_symbols,
        binance_symbols,
        discovery: config.ingest.subscribe_all.then(|| {
            (
                okx_public.clone() as Arc<dyn VenueClient>,
                binance_public.clone() as Arc<dyn VenueClient>,
            )
        }),
        ws_config: WsSessionConfig {
            ping_interval: Duration::from_secs(config.ingest.ping_interval_secs),
            stale_timeout: Duration::from_secs(config.ingest.stale_timeout_secs),
        },
    };

    let mut public_clients: HashMap<VenueName, Arc<dyn VenueClient>> = HashMap::new();
    public_clients.insert(VenueName::Okx, okx_public);
    public_clients.insert(VenueName::Binance, binance_public);

    let mut engine = Engine::new(pubsub, bus, stats);
    // Start order: consumers of closed bars first, then the gateway, the
    // venue sessions last. Stop order is the reverse of the data flow:
    // gateway workers drain first, sessions drop, archive flushes last.
    engine.register("archive", ArchiveService::new(store), 10, 20);
    engine.register("aggregator", AggregatorService::new(), 10, 30);
    engine.register("fanout", FanoutService::new(), 10, 40);
    engine.register("gateway", GatewayService::new(registry, public_clients), 20, 100);
    engine.register("ingestor", IngestService::new(wiring), 30, 80);
    if let Some(hours) = config.repair.interval_hours {
        let interval = Duration::from_secs(hours.max(1) * 3600);
        engine.register("repair", RepairService::new(repair_runner, interval), 40, 15);
    }
    let status_interval = Duration::from_secs(config.status_interval_secs.unwrap_or(60));
    engine.register("status", StatusService::new(status_interval), 40, 10);

    engine.start().await;
    info!("strata is live");
    engine.wait_for_shutdown().await;
    Ok(())
}

/// One reconciliation sweep against the archive, then exit.
pub async fn run_repair(config: StrataConfig) -> Result<()> {
    let redis_url = config.redis.url();
    let store = ArchiveStore::connect(&redis_url)
        .await
        .context("archive store connection failed")?;

    let okx_public = okx_client(&config.venues.okx, None);
    let binance_public = binance_client(&config.venues.binance, None);

    let runner = RepairRunner::new(
        store,
        okx_public as Arc<dyn VenueClient>,
        binance_public as Arc<dyn VenueClient>,
        config.repair.empty_window_limit,
    );
    let report = runner.run_once().await.context("repair sweep failed")?;
    info!(
        "repair finished: {} streams, {} backfilled, {} regenerated",
        report.streams_scanned, report.bars_backfilled, report.bars_regenerated
    );
    Ok(())
}
