mod business_logic;
mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::business_logic::backtest::{self, BacktestEngine, ParameterGrid};
use crate::business_logic::config::BacktestScoring;
use crate::business_logic::reversal::ReversalDetector;
use crate::config::AppConfig;
use crate::services::hyperliquid::{HyperliquidClient, MarketDataSource};
use crate::services::monitor::{MonitorService, MonitorSettings};
use crate::services::notifier::{FeishuNotifier, LogNotifier, Notifier};
use crate::services::persistence::{self, DataPaths, MonitorLock};
use crate::services::status::new_shared_status;
use crate::state::AppState;

#[derive(Parser)]
#[command(
    name = "goldscreener",
    version,
    about = "N-pattern reversal monitor and parameter backtester for spot gold"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one poll cycle and print the result (default)
    Once,
    /// Poll on a timer and serve the status API
    Serve,
    /// Grid-search detector parameters over the stored candle window
    Backtest(BacktestArgs),
    /// Fetch once and send a test notification
    Check,
}

#[derive(Args)]
struct BacktestArgs {
    /// Reversal thresholds to test, e.g. 0.001,0.003
    #[arg(long, value_delimiter = ',')]
    thresholds: Option<Vec<f64>>,
    /// Swing window sizes to test
    #[arg(long, value_delimiter = ',')]
    windows: Option<Vec<usize>>,
    /// Minimum pattern strengths to test
    #[arg(long, value_delimiter = ',')]
    strengths: Option<Vec<f64>>,
    /// Combinations to list by composite score
    #[arg(long, default_value_t = 5)]
    top: usize,
    /// Report path (defaults to DATA_DIR/backtest_report.json)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Refresh the candle window from the market-data source first
    #[arg(long, default_value_t = false)]
    fetch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid configuration")?;
    let _log_guard = init_tracing(&config)?;

    tracing::info!(
        "goldscreener: {} {} over {}h, threshold {}, window {}, min strength {}",
        config.symbol,
        config.interval,
        config.window_hours,
        config.detector.min_reversal_threshold(),
        config.detector.window_size(),
        config.detector.min_strength()
    );

    match cli.command.unwrap_or(Commands::Once) {
        Commands::Once => run_once(&config).await,
        Commands::Serve => serve(&config).await,
        Commands::Backtest(args) => run_backtest(&config, args).await,
        Commands::Check => check(&config).await,
    }
}

fn init_tracing(config: &AppConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir)
        .context(format!("Failed to create log directory: {}", config.log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "goldscreener.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "goldscreener=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

fn build_monitor(config: &AppConfig) -> MonitorService {
    let source: Arc<dyn MarketDataSource> = Arc::new(HyperliquidClient::new());
    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => Arc::new(FeishuNotifier::new(url.clone())),
        None => {
            tracing::warn!("FEISHU_WEBHOOK_URL not set; signals will only be logged");
            Arc::new(LogNotifier)
        }
    };

    MonitorService::new(
        source,
        notifier,
        ReversalDetector::new(config.detector, config.scoring),
        DataPaths::new(config.data_dir.clone()),
        MonitorSettings::from(config),
    )
}

async fn run_once(config: &AppConfig) -> Result<()> {
    let report = build_monitor(config).run_once().await?;
    println!("{}", report.render());
    Ok(())
}

async fn serve(config: &AppConfig) -> Result<()> {
    let shared_status = new_shared_status();
    let monitor = build_monitor(config).with_shared_state(shared_status.clone());

    let check_interval = config.check_interval;
    tokio::spawn(async move {
        tracing::info!("Reversal monitor active, polling every {:?}", check_interval);
        monitor.run().await;
    });

    let app = routes::router(AppState {
        status: shared_status,
        symbol: config.symbol.clone(),
        interval: config.interval.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .context(format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Server running on http://{}", config.bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui", config.bind_addr);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn run_backtest(config: &AppConfig, args: BacktestArgs) -> Result<()> {
    let paths = DataPaths::new(config.data_dir.clone());
    let mut store = persistence::load_store(&paths.snapshot(), config.window_hours)?;

    if args.fetch || store.is_empty() {
        let _lock = MonitorLock::acquire(&paths.lock(), config.lock_stale)?;
        tracing::info!("Fetching {} {} candles for backtest", config.fetch_count, config.interval);
        let fetched = HyperliquidClient::new()
            .fetch(&config.symbol, &config.interval, config.fetch_count)
            .await?;
        store.merge(&fetched);
        persistence::persist_store(&paths.snapshot(), &store, &config.symbol, &config.interval)?;
    }

    let grid = match (args.thresholds, args.windows, args.strengths) {
        (None, None, None) => ParameterGrid::default(),
        (t, w, s) => ParameterGrid::new(
            t.unwrap_or_else(|| backtest::DEFAULT_THRESHOLDS.to_vec()),
            w.unwrap_or_else(|| backtest::DEFAULT_WINDOWS.to_vec()),
            s.unwrap_or_else(|| backtest::DEFAULT_STRENGTHS.to_vec()),
        )
        .context("invalid parameter grid")?,
    };
    tracing::info!(
        "Backtesting {} combinations on {} candles from {}",
        grid.len(),
        store.len(),
        paths.dir().display()
    );

    let engine = BacktestEngine::new(config.scoring, BacktestScoring::default())?;
    let top = args.top;
    let candles = store.candles().to_vec();
    let candle_count = candles.len();
    let report = tokio::task::spawn_blocking(move || engine.run(&candles, &grid, top))
        .await
        .context("backtest task panicked")?
        .context("backtest produced no results")?;

    println!("{}", backtest::render_report(&report));

    let output = args.output.unwrap_or_else(|| paths.report());
    persistence::save_report(&output, &report)?;
    tracing::info!(
        "Backtest over {} candles saved to {}",
        candle_count,
        output.display()
    );
    Ok(())
}

async fn check(config: &AppConfig) -> Result<()> {
    let text = build_monitor(config).check_connectivity().await?;
    println!("Test notification sent:\n{text}");
    Ok(())
}
