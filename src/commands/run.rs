//! Trading loop command

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use voltx::exchange::UpbitClient;
use voltx::{Config, SharedClock, SystemClock, TradingEngine, TradingMode};

pub fn run(config_path: String, mode: Option<TradingMode>, run_id: Option<String>) -> Result<()> {
    dotenv::dotenv().ok();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run_async(config_path, mode, run_id))
}

async fn run_async(
    config_path: String,
    mode: Option<TradingMode>,
    run_id: Option<String>,
) -> Result<()> {
    let mut config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    if let Some(mode) = mode {
        config.trading.mode = mode;
    }

    let credentials = config.exchange.credentials();
    if config.trading.mode == TradingMode::Live && credentials.is_empty() {
        bail!("Live mode requires UPBIT_ACCESS_KEY and UPBIT_SECRET_KEY");
    }

    info!("========================================");
    info!("  VOLT-X TRADING LOOP - {} MODE", config.trading.mode);
    info!("========================================");
    info!("Run ID: {}", run_id.as_deref().unwrap_or("-"));
    info!("Timezone: {}", config.trading.timezone);
    info!("Universe: top {} movers", config.universe.limit);
    if !config.trading.l2_symbols.is_empty() {
        info!("L2 symbols: {}", config.trading.l2_symbols.iter().join(", "));
    }
    if config.trading.mode == TradingMode::Paper {
        info!("Paper balance: {:.0} KRW", config.trading.initial_balance);
    }
    info!("Tick interval: {} seconds", config.trading.tick_interval_secs);

    if config.trading.mode == TradingMode::Live {
        warn!("⚠️  LIVE TRADING MODE - REAL MONEY AT RISK!");
        warn!("⚠️  Press Ctrl+C within 10 seconds to abort...");

        for i in (1..=10).rev() {
            info!("Starting in {} seconds...", i);
            sleep(Duration::from_secs(1)).await;
        }
    }

    let client_config = config.exchange.client_config();
    let client = if credentials.is_empty() {
        warn!("No Upbit credentials, using public endpoints only");
        UpbitClient::public(client_config)
    } else {
        UpbitClient::new(credentials, client_config)
    }
    .context("Failed to build Upbit client")?;
    let clock: SharedClock = Arc::new(SystemClock);
    let tick_secs = config.trading.tick_interval_secs;
    let mut engine = TradingEngine::new(config, client, clock, run_id.as_deref())?;

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, finishing current tick...");
                shutdown_flag_clone.store(true, Ordering::SeqCst);
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });

    let mut tick_interval = interval(Duration::from_secs(tick_secs));
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Starting trading loop...");

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                if shutdown_flag.load(Ordering::SeqCst) {
                    break;
                }
                engine.tick().await;
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let open = engine.trader().positions().len();
    if open > 0 {
        warn!(
            "Stopping with {} open position(s): {}",
            open,
            engine.trader().positions().keys().sorted().join(", ")
        );
    }
    info!("Stopping VOLT-X after {} ticks.", engine.tick_count());
    Ok(())
}
