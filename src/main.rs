use kline_screener::batch::{BatchOrchestrator, build_delay_policy};
use kline_screener::market_data::{BINANCE_FUTURES_URL, BinanceFutures, request_weight, suggested_chunk_size};
use kline_screener::report;
use kline_screener::screens::Screener;
use kline_screener::storage_utils::{AsyncStorageManager, ScreenConfig};
use kline_screener::universe::{UniverseFilter, load_universe};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TABLE_ROWS: usize = 15;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Step 1: Configuration
    let storage = AsyncStorageManager::new_relative("storage").await?;
    let config = storage.load_config().await?;
    info!(?config, "configuration loaded");

    // Step 2: Universe
    let source = BinanceFutures::new(BINANCE_FUTURES_URL)?;
    let universe = match config.screen {
        ScreenConfig::BoundaryViews { .. } => Vec::new(),
        _ => load_universe(&source, &UniverseFilter::from_config(&config.universe)).await?,
    };

    // Step 3: Batch pacing
    let weight_limit = config.batch.weight_limit_per_minute;
    let chunk_size = config
        .batch
        .chunk_size
        .unwrap_or_else(|| suggested_chunk_size(weight_limit, config.klines.limit));
    let policy = build_delay_policy(
        &config.batch.delay,
        source.gauge(),
        weight_limit as u64,
        request_weight(config.klines.limit) as u64,
    );
    let orchestrator = BatchOrchestrator::with_boxed_policy(chunk_size, policy);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping before the next chunk");
            on_interrupt.cancel();
        }
    });

    // Step 4: Screen, persist and display
    let mut screener = Screener::new(&source, orchestrator, config.klines.clone(), cancel);
    let output = screener.run(&config.screen, &universe).await?;

    storage.save("results", &output).await?;
    println!("{}", report::render(&output, TABLE_ROWS));

    Ok(())
}
