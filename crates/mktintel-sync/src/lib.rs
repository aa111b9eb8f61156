//! Initialization and synchronization engine.
//!
//! Startup seeds the store once per baseline category, then a single
//! background loop keeps it in step with upstream sources. Views read the
//! store through a fallback-merge path that always yields renderable data.

use std::sync::Arc;

use anyhow::Result;
use mktintel_adapters::UpstreamSource;
use mktintel_storage::StoreGateway;

pub mod config;
pub mod coordinator;
pub mod reconcile;
pub mod scheduler;
pub mod seed;
pub mod views;

#[cfg(test)]
mod test_support;

pub use config::{build_source, build_store, AppConfig, StoreBackend};
pub use coordinator::{InitializationCoordinator, InitializationState};
pub use reconcile::{reconcile_category, CategoryReport, SyncTickError};
pub use scheduler::{
    FixedInterval, SyncScheduler, SyncState, TickOutcome, TickReport, TickSchedule, SYNC_INTERVAL,
};
pub use seed::{bundled_baseline, SeedError, SeedReport, SeedSummary, Seeder};
pub use views::{load_dashboard, load_view, DashboardViews, ViewData};

pub const CRATE_NAME: &str = "mktintel-sync";

/// The engine's long-lived objects, built once at process entry.
#[derive(Clone)]
pub struct Engine {
    pub store: Arc<dyn StoreGateway>,
    pub scheduler: Arc<SyncScheduler>,
    pub coordinator: Arc<InitializationCoordinator>,
}

impl Engine {
    pub fn new(store: Arc<dyn StoreGateway>, source: Arc<dyn UpstreamSource>) -> Self {
        let scheduler = Arc::new(SyncScheduler::new(store.clone(), source));
        let coordinator = Arc::new(InitializationCoordinator::new(
            Seeder::new(store.clone()),
            scheduler.clone(),
        ));
        Self {
            store,
            scheduler,
            coordinator,
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = build_store(config).await?;
        let source = build_source(config)?;
        Ok(Self::new(store, source))
    }

    pub fn seeder(&self) -> Seeder {
        Seeder::new(self.store.clone())
    }
}

pub async fn run_sync_once_from_env() -> Result<TickOutcome> {
    let config = AppConfig::from_env()?;
    let engine = Engine::from_config(&config).await?;
    Ok(engine.scheduler.run_tick_now().await)
}

pub async fn seed_from_env() -> Result<SeedReport> {
    let config = AppConfig::from_env()?;
    let engine = Engine::from_config(&config).await?;
    Ok(engine.seeder().seed_database().await?)
}

pub async fn summary_from_env() -> Result<SeedSummary> {
    let config = AppConfig::from_env()?;
    let engine = Engine::from_config(&config).await?;
    Ok(engine.seeder().summary().await?)
}
