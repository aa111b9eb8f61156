//! Startup orchestration: seed the baseline, then start the sync loop.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::scheduler::SyncScheduler;
use crate::seed::{SeedError, Seeder};

/// State surfaced to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitializationState {
    pub is_initialized: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl InitializationState {
    fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    fn initialized() -> Self {
        Self {
            is_initialized: true,
            ..Self::default()
        }
    }

    fn failed(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Loading,
    Initialized,
    Failed,
    TornDown,
}

pub struct InitializationCoordinator {
    seeder: Seeder,
    scheduler: Arc<SyncScheduler>,
    phase: Mutex<Phase>,
    state: watch::Sender<InitializationState>,
}

impl InitializationCoordinator {
    pub fn new(seeder: Seeder, scheduler: Arc<SyncScheduler>) -> Self {
        let (state, _) = watch::channel(InitializationState::default());
        Self {
            seeder,
            scheduler,
            phase: Mutex::new(Phase::Idle),
            state,
        }
    }

    pub fn state(&self) -> InitializationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<InitializationState> {
        self.state.subscribe()
    }

    pub fn scheduler(&self) -> &Arc<SyncScheduler> {
        &self.scheduler
    }

    /// Run startup once. Later calls return the current state without side effects.
    pub async fn initialize(&self) -> InitializationState {
        {
            let mut phase = self.phase.lock().await;
            if *phase != Phase::Idle {
                return self.state();
            }
            *phase = Phase::Loading;
            self.state.send_replace(InitializationState::loading());
        }

        let outcome = self.ensure_seeded().await;

        let mut phase = self.phase.lock().await;
        if *phase == Phase::TornDown {
            warn!("teardown ran during initialization; sync loop not started");
            let state = match outcome {
                Ok(()) => InitializationState::default(),
                Err(err) => InitializationState::failed(err.to_string()),
            };
            self.state.send_replace(state);
            return self.state();
        }

        match outcome {
            Ok(()) => {
                self.scheduler.start_auto_sync().await;
                *phase = Phase::Initialized;
                self.state.send_replace(InitializationState::initialized());
                info!("initialization complete");
            }
            Err(err) => {
                error!(error = %err, "initialization failed; sync loop not started");
                *phase = Phase::Failed;
                self.state
                    .send_replace(InitializationState::failed(err.to_string()));
            }
        }
        self.state()
    }

    async fn ensure_seeded(&self) -> Result<(), SeedError> {
        let summary = self.seeder.summary().await.map_err(SeedError::Summary)?;
        if summary.is_fully_seeded() {
            info!("baseline already present; skipping seed");
            return Ok(());
        }
        let report = self.seeder.seed_database().await?;
        info!(seeded = ?report.seeded, skipped = ?report.skipped, "baseline seeded");
        Ok(())
    }

    /// Mandatory shutdown hook. Stops the sync loop whatever state startup reached.
    pub async fn teardown(&self) {
        let mut phase = self.phase.lock().await;
        let previous = *phase;
        *phase = Phase::TornDown;
        self.scheduler.stop_auto_sync().await;
        info!(?previous, "coordinator torn down");
    }
}
