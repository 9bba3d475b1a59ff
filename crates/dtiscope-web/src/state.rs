//! Shared application state for the web server.

use std::sync::Arc;

use anyhow::Context;
use dtiscope_catalog::Catalog;
use dtiscope_common::Settings;
use dtiscope_predict::{CommandScorerLoader, JobEvent, JobManager, ManagerConfig, ScorerLoader, ScorerPool};
use tokio::sync::broadcast;

/// Shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub jobs: Arc<JobManager>,
    pub catalog: Catalog,
}

impl AppState {
    pub fn new(settings: Settings, jobs: Arc<JobManager>, catalog: Catalog) -> Self {
        Self { settings, jobs, catalog }
    }

    /// Wire the production services: the external predictor behind a
    /// scorer pool, and the catalog loaded from the configured data files.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let prediction = &settings.prediction;
        let command: Arc<dyn ScorerLoader> = Arc::new(CommandScorerLoader::new(
            &prediction.predictor_command,
            prediction.max_concurrent_inferences,
        ));
        let pool: Arc<dyn ScorerLoader> = Arc::new(ScorerPool::new(command, prediction.scorer_pool_size));
        let jobs = Arc::new(JobManager::new(ManagerConfig::from_settings(&settings), pool));

        let catalog = Catalog::load(&settings).context("Failed to load catalog data")?;
        Ok(Self::new(settings, jobs, catalog))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.jobs.subscribe()
    }
}

pub type SharedState = Arc<AppState>;
