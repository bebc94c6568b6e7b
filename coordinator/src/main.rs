// File: coordinator/src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use coordinator::clock::{Clock, SystemClock};
use coordinator::constants::cleanup;
use coordinator::web::{start_web_server, AppState};
use coordinator::{
    Config, ConfigManager, Database, HttpComputeClient, InvocationResponse, RetirementLedger,
    SqliteTriggerStore, SqliteWorkQueue, Stage, StageContext, StageRunner, StageScheduler,
};

#[derive(Parser)]
#[command(name = "coordinator", version, about = "Maintenance-window gated instance retirement")]
struct Cli {
    /// Directory holding main.toml
    #[arg(long, default_value = "config")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the stage scheduler and the invocation API
    Serve,
    /// Run one stage once and print its result
    Invoke {
        /// detector, stop-worker or start-worker
        stage: Stage,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with reduced verbosity
    let env_filter = EnvFilter::from_default_env()
        .add_directive("coordinator=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config)
        .await
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    let config = config_manager.get_current_config();

    let runner = build_runner(&config).await?;

    match cli.command {
        Command::Serve => serve(config, runner).await,
        Command::Invoke { stage } => invoke_once(&runner, stage).await,
    }
}

async fn build_runner(config: &Config) -> Result<StageRunner> {
    let settings = Arc::new(config.retirement_settings()?);
    info!(
        "Window zone {}: DST {}, standard {}",
        settings.windows.time_zone, settings.windows.dst, settings.windows.standard
    );

    let database = Arc::new(Database::new(&config.database_path).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let compute = Arc::new(HttpComputeClient::new(&config.compute)?);
    info!("Compute API client initialized for {}", config.compute.base_url);

    Ok(StageRunner::new(StageContext {
        inventory: compute.clone(),
        power: compute,
        queue: Arc::new(SqliteWorkQueue::new(database.clone(), clock.clone())),
        triggers: Arc::new(SqliteTriggerStore::new(database)),
        clock,
        ledger: RetirementLedger::new(),
        settings,
    }))
}

async fn invoke_once(runner: &StageRunner, stage: Stage) -> Result<()> {
    let report = runner.invoke(stage).await?;
    let response = InvocationResponse::from(&report);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn serve(config: Arc<Config>, runner: StageRunner) -> Result<()> {
    info!("Starting instance retirement coordinator");

    // Periodic ledger cleanup
    let ledger = runner.context().ledger.clone();
    let clock = runner.context().clock.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            cleanup::CLEANUP_INTERVAL_SECONDS,
        ));
        loop {
            interval.tick().await;
            let cleaned = ledger
                .cleanup_stale(cleanup::LEDGER_STALE_HOURS, clock.now())
                .await;
            if cleaned > 0 {
                warn!(
                    "Cleaned up {} ledger entries older than {} hours",
                    cleaned,
                    cleanup::LEDGER_STALE_HOURS
                );
            }
        }
    });

    let scheduler = StageScheduler::new(runner.clone(), config.schedule.clone()).await?;
    scheduler.start().await?;
    info!("Scheduler started");

    start_web_server(AppState::new(config, runner)).await
}
