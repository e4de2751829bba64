//! Trading-intelligence engine binary.
//!
//! Wires the pipeline together: venue events → signal detector → alert
//! engine; truth events → linker → alert engine + edge detector; whale
//! trades → tracker → edge detector; periodic edge scans and arbitrage
//! ticks. Upstream wire clients deliver into the engine's input channels;
//! the binary owns all components and the axum status surface.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use clap::Parser;
use parking_lot::{Mutex as ParkingMutex, RwLock as ParkingRwLock};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use intelbot_backend::{
    alerts::{
        format_arbitrage, format_edge, format_linked, format_signal, format_truth_event,
        AlertChannel, AlertEngine, AlertEngineConfig, ConsoleChannel, FileChannel, WebhookChannel,
    },
    arbitrage::{ArbConfig, ArbitrageDetector},
    archive::TradeArchive,
    caches,
    edge::{EdgeConfig, EdgeDetector},
    linker::{categorize, TrackedMarket, TruthMarketLinker},
    models::{now_ms, Config, Market, Priority, Significance, VenueEvent},
    signals::{MidPriceBoard, SignalConfig, SignalDetector},
    sources::SourceRegistry,
    truth::TruthSourceEvent,
    whales::{UniverseConfig, VenueTrade, WhaleTracker, WhaleTrade},
};

#[derive(Parser, Debug)]
#[command(name = "intelbot", about = "Prediction-market trading-intelligence engine")]
struct Cli {
    /// Override the status-surface port.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

/// Inputs multiplexed onto the whale task so the tracker stays single-writer.
enum WhaleInput {
    Venue(VenueTrade),
    Whale(WhaleTrade),
}

/// Handles the upstream source adapters deliver into.
#[allow(dead_code)]
struct EngineInputs {
    venue_tx: mpsc::Sender<VenueEvent>,
    truth_tx: mpsc::Sender<TruthSourceEvent>,
    whale_tx: mpsc::Sender<WhaleInput>,
    universe_tx: mpsc::Sender<Vec<Market>>,
}

#[derive(Clone)]
struct AppState {
    sources: Arc<SourceRegistry>,
    tracked_markets: Arc<ParkingRwLock<HashMap<String, TrackedMarket>>>,
    alert_engine: Arc<AlertEngine>,
    started_ms: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    init_tracing();

    info!("🚀 intelbot engine starting");

    let sources = Arc::new(SourceRegistry::new());
    for name in ["venue", "congress", "weather", "fed", "sports", "whales"] {
        sources.register(name);
    }

    // Alert channels are fixed at construction; failures stay per-channel.
    let mut channels: Vec<Arc<dyn AlertChannel>> =
        vec![Arc::new(ConsoleChannel::new(Priority::Low))];
    if let Some(path) = &config.alert_file_path {
        channels.push(Arc::new(FileChannel::new(path, Priority::Low)));
    }
    if let Some(url) = &config.webhook_url {
        channels.push(Arc::new(
            WebhookChannel::new(url, Priority::High).context("webhook channel")?,
        ));
    }
    let alert_engine = Arc::new(AlertEngine::new(AlertEngineConfig::from_env(), channels));

    let archive = match &config.archive_path {
        Some(path) => Some(Arc::new(
            TradeArchive::open(path).context("open trade archive")?,
        )),
        None => None,
    };

    let rules = match &config.keywords_path {
        Some(path) => categorize::load_rules(path)
            .with_context(|| format!("load keyword tables from {path}"))?,
        None => categorize::default_rules(),
    };

    let mid_board = MidPriceBoard::default();
    let edge_detector = Arc::new(ParkingMutex::new(EdgeDetector::new(
        EdgeConfig::from_env(),
        Arc::new(mid_board.clone()),
    )));
    let tracked_markets: Arc<ParkingRwLock<HashMap<String, TrackedMarket>>> =
        Arc::new(ParkingRwLock::new(HashMap::new()));

    let (venue_tx, venue_rx) = mpsc::channel::<VenueEvent>(4096);
    let (truth_tx, truth_rx) = mpsc::channel::<TruthSourceEvent>(512);
    let (whale_tx, whale_rx) = mpsc::channel::<WhaleInput>(2048);
    let (universe_tx, universe_rx) = mpsc::channel::<Vec<Market>>(4);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let _inputs = EngineInputs {
        venue_tx,
        truth_tx,
        whale_tx,
        universe_tx,
    };

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(venue_task(
        venue_rx,
        SignalDetector::new(SignalConfig::from_env(), mid_board.clone()),
        edge_detector.clone(),
        alert_engine.clone(),
        sources.clone(),
        shutdown_rx.clone(),
    )));
    tasks.push(tokio::spawn(linker_task(
        truth_rx,
        universe_rx,
        TruthMarketLinker::new(rules),
        config.linker_refresh_ms,
        tracked_markets.clone(),
        edge_detector.clone(),
        alert_engine.clone(),
        sources.clone(),
        shutdown_rx.clone(),
    )));
    let impact_archive = archive.clone();
    tasks.push(tokio::spawn(whale_task(
        whale_rx,
        WhaleTracker::new(UniverseConfig::from_env()),
        config.whale_rebuild_ms,
        edge_detector.clone(),
        archive,
        sources.clone(),
        shutdown_rx.clone(),
    )));
    tasks.push(tokio::spawn(edge_scan_task(
        edge_detector.clone(),
        config.edge_cache_ms,
        alert_engine.clone(),
        shutdown_rx.clone(),
    )));
    tasks.push(tokio::spawn(arbitrage_task(
        ArbitrageDetector::new(ArbConfig::from_env()),
        config.arb_check_ms,
        tracked_markets.clone(),
        mid_board.clone(),
        alert_engine.clone(),
        shutdown_rx.clone(),
    )));
    if let Some(archive) = impact_archive {
        tasks.push(tokio::spawn(impact_job_task(
            archive,
            mid_board,
            shutdown_rx.clone(),
        )));
    }

    let state = AppState {
        sources: sources.clone(),
        tracked_markets,
        alert_engine,
        started_ms: now_ms(),
    };
    let app = Router::new()
        .route("/health", get(health_handler))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind status surface on {addr}"))?;
    info!("🩺 status surface listening on {addr}");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "status surface exited");
        }
    });

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("🛑 shutdown requested; draining tasks");
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }
    server.abort();
    caches::flush_all();
    info!("👋 shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": state.sources.overall(),
        "sources": state.sources.snapshot(),
        "tracked_markets": state.tracked_markets.read().len(),
        "suppressed_duplicates": state.alert_engine.suppressed_duplicates(),
        "dropped_rate_limited": state.alert_engine.dropped_rate_limited(),
        "channel_failures": state.alert_engine.channel_failures(),
        "uptime_ms": now_ms() - state.started_ms,
    }))
}

/// Venue ingest: apply each event to the signal detector, publish activity
/// to the edge detector, and emit any fired signals.
async fn venue_task(
    mut venue_rx: mpsc::Receiver<VenueEvent>,
    mut detector: SignalDetector,
    edge: Arc<ParkingMutex<EdgeDetector>>,
    alerts: Arc<AlertEngine>,
    sources: Arc<SourceRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = venue_rx.recv() => {
                let Some(event) = event else { break };
                sources.mark_update("venue", event.timestamp_ms());

                {
                    let mut edge = edge.lock();
                    match &event {
                        VenueEvent::Trade { asset_id, price, size, timestamp_ms, .. } => {
                            edge.record_trade_activity(asset_id, price * size, *timestamp_ms);
                        }
                        VenueEvent::Book { asset_id, best_bid, best_ask, .. } => {
                            edge.record_spread(asset_id, best_ask - best_bid);
                        }
                        VenueEvent::Price { .. } => {}
                    }
                }

                for signal in detector.on_event(&event) {
                    alerts.process(format_signal(&signal)).await;
                }
            }
        }
    }
    info!("venue task drained");
}

/// Truth events and the 10-minute universe refresh share the linker.
#[allow(clippy::too_many_arguments)]
async fn linker_task(
    mut truth_rx: mpsc::Receiver<TruthSourceEvent>,
    mut universe_rx: mpsc::Receiver<Vec<Market>>,
    mut linker: TruthMarketLinker,
    refresh_ms: i64,
    tracked_out: Arc<ParkingRwLock<HashMap<String, TrackedMarket>>>,
    edge: Arc<ParkingMutex<EdgeDetector>>,
    alerts: Arc<AlertEngine>,
    sources: Arc<SourceRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut latest_universe: Option<Vec<Market>> = None;
    let mut refresh = interval(Duration::from_millis(refresh_ms.max(1_000) as u64));
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            snapshot = universe_rx.recv() => {
                let Some(snapshot) = snapshot else { break };
                latest_universe = Some(snapshot);
            }
            _ = refresh.tick() => {
                if let Some(markets) = &latest_universe {
                    linker.refresh_universe(markets, now_ms());
                    *tracked_out.write() = linker.tracked_markets();
                }
            }
            event = truth_rx.recv() => {
                let Some(event) = event else { break };
                sources.mark_update(event.source_name(), event.timestamp_ms());

                if let Some(linked) = linker.handle_event(&event) {
                    edge.lock().on_linked_alert(&linked);
                    alerts.process(format_linked(&linked)).await;
                } else if event.significance() == Significance::Critical {
                    // Nothing tracked moves on it, but critical events are
                    // still worth surfacing raw.
                    alerts.process(format_truth_event(&event)).await;
                }
            }
        }
    }
    info!("linker task drained");
}

/// Whale stream: venue trades feed the stats store, whale trades run the
/// full classify-and-ledger path. Universe rebuilds hourly.
async fn whale_task(
    mut whale_rx: mpsc::Receiver<WhaleInput>,
    mut tracker: WhaleTracker,
    rebuild_ms: i64,
    edge: Arc<ParkingMutex<EdgeDetector>>,
    archive: Option<Arc<TradeArchive>>,
    sources: Arc<SourceRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rebuild = interval(Duration::from_millis(rebuild_ms.max(1_000) as u64));
    rebuild.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut archive_seq: u32 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = rebuild.tick() => {
                tracker.rebuild_universe(now_ms());
            }
            input = whale_rx.recv() => {
                let Some(input) = input else { break };
                match input {
                    WhaleInput::Venue(trade) => {
                        if let Some(archive) = &archive {
                            archive_seq = archive_seq.wrapping_add(1);
                            if let Err(e) = archive.archive_trade(&trade, None, archive_seq) {
                                warn!(error = %e, "trade archive append failed");
                            }
                        }
                        tracker.on_venue_trade(trade);
                    }
                    WhaleInput::Whale(trade) => {
                        sources.mark_update("whales", trade.timestamp_ms);
                        let classified = tracker.on_whale_trade(trade);
                        edge.lock().on_whale_trade(classified);
                    }
                }
            }
        }
    }
    info!("whale task drained");
}

/// Periodic edge scan; new opportunities become alerts.
async fn edge_scan_task(
    edge: Arc<ParkingMutex<EdgeDetector>>,
    cache_ms: i64,
    alerts: Arc<AlertEngine>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(Duration::from_millis(cache_ms.max(1_000) as u64));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let scan = edge.lock().scan_at(now_ms());
                for opportunity in &scan.opportunities {
                    alerts.process(format_edge(opportunity)).await;
                }
            }
        }
    }
    info!("edge scan task drained");
}

/// Drains the archive's impact job queue: measure how far each archived
/// trade's market has moved since the fill, then mark the job done. Jobs
/// whose market has no observed mid yet go back through `retry_job`, which
/// enforces the three-try budget.
async fn impact_job_task(
    archive: Arc<TradeArchive>,
    mid_board: MidPriceBoard,
    mut shutdown: watch::Receiver<bool>,
) {
    use intelbot_backend::signals::PriceProvider;

    const POLL_MS: u64 = 15_000;
    const MAX_JOBS_PER_TICK: usize = 50;

    let mut tick = interval(Duration::from_millis(POLL_MS));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                for _ in 0..MAX_JOBS_PER_TICK {
                    let job = match archive.next_due_job(now_ms()) {
                        Ok(Some(job)) => job,
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "impact job poll failed");
                            break;
                        }
                    };

                    let computed = archive.job_trade(&job.trade_id).map(|context| {
                        context.and_then(|(market_id, price_cents)| {
                            mid_board
                                .mid(&market_id)
                                .map(|mid| (mid * 100.0).round() as i64 - price_cents)
                        })
                    });

                    let result = match computed {
                        Ok(Some(impact_cents)) => archive
                            .record_impact(&job.trade_id, impact_cents)
                            .and_then(|_| archive.complete_job(job.id)),
                        // No observed mid for the market yet: try again later.
                        Ok(None) => archive.retry_job(&job, now_ms()).map(|_| ()),
                        Err(e) => {
                            warn!(error = %e, trade = %job.trade_id, "impact lookup failed");
                            archive.retry_job(&job, now_ms()).map(|_| ())
                        }
                    };
                    if let Err(e) = result {
                        warn!(error = %e, trade = %job.trade_id, "impact job update failed");
                    }
                }
            }
        }
    }
    info!("impact job task drained");
}

/// Arbitrage tick over the tracked universe and current mids.
async fn arbitrage_task(
    mut detector: ArbitrageDetector,
    check_ms: i64,
    tracked: Arc<ParkingRwLock<HashMap<String, TrackedMarket>>>,
    mid_board: MidPriceBoard,
    alerts: Arc<AlertEngine>,
    mut shutdown: watch::Receiver<bool>,
) {
    use intelbot_backend::signals::PriceProvider;

    let mut tick = interval(Duration::from_millis(check_ms.max(1_000) as u64));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                for entry in tracked.read().values() {
                    let price = mid_board
                        .mid(&entry.market.asset_id)
                        .unwrap_or(entry.last_price);
                    detector.update_market(
                        &entry.market.asset_id,
                        &entry.market.question,
                        price,
                    );
                }
                for opportunity in detector.check_all(now_ms()) {
                    alerts.process(format_arbitrage(&opportunity)).await;
                }
            }
        }
    }
    info!("arbitrage task drained");
}
