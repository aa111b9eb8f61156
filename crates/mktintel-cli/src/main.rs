use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mktintel_core::Category;
use mktintel_storage::PgStore;
use mktintel_sync::{AppConfig, Engine, TickOutcome};
use mktintel_web::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "mktintel-cli")]
#[command(about = "Market intelligence dashboard: seeding, sync and web server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize the engine, start auto-sync and serve the dashboard until Ctrl-C.
    Serve,
    /// Run a single sync tick and exit.
    Sync,
    /// Seed empty baseline categories from the bundled snapshots.
    Seed,
    /// Print baseline record counts.
    Summary,
    /// Apply Postgres migrations.
    Migrate,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await?,
        Commands::Sync => match mktintel_sync::run_sync_once_from_env().await? {
            TickOutcome::Completed(report) => {
                println!(
                    "sync complete: run_id={} categories={} upserted={} failures={}",
                    report.run_id,
                    report.categories.len(),
                    report.upserted(),
                    report.failures.len()
                );
                for (category, message) in &report.failures {
                    println!("  {category}: {message}");
                }
            }
            TickOutcome::Skipped => println!("sync skipped: a tick is already in flight"),
        },
        Commands::Seed => {
            let report = mktintel_sync::seed_from_env().await?;
            if report.is_noop() {
                println!("seed: all baseline categories already populated");
            }
            for (category, rows) in &report.seeded {
                println!("seeded {category}: {rows} rows");
            }
        }
        Commands::Summary => {
            let summary = mktintel_sync::summary_from_env().await?;
            for category in Category::BASELINE {
                println!("{category}: {}", summary.count(category));
            }
        }
        Commands::Migrate => {
            let config = AppConfig::from_env()?;
            let url = config
                .database_url
                .as_deref()
                .context("migrate requires DATABASE_URL")?;
            let store = PgStore::connect(url).await.context("connecting to postgres")?;
            store.run_migrations().await.context("applying migrations")?;
            println!("migrations applied");
        }
    }

    Ok(())
}

async fn serve() -> Result<()> {
    let config = AppConfig::from_env()?;
    let engine = Engine::from_config(&config).await?;

    let init = tokio::spawn({
        let coordinator = engine.coordinator.clone();
        async move { coordinator.initialize().await }
    });

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler unavailable; shutting down");
        }
        info!("shutdown requested");
    };
    let served = mktintel_web::serve(AppState::from_engine(&engine), config.web_port, shutdown).await;

    engine.coordinator.teardown().await;
    match init.await {
        Ok(state) if state.error.is_some() => {
            error!(error = ?state.error, "engine exited without a clean initialization")
        }
        Ok(_) => {}
        Err(err) => error!(error = %err, "initialization task panicked"),
    }
    served
}
