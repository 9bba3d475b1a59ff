//! Scorer pool for reusing loaded models across prediction jobs.
//!
//! Loading weights is the expensive part of a job's startup, and most jobs
//! ask for the same `(model_path, device)` pair, so loaded scorers are
//! cached here and handed out as shared `Arc`s.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::gateway::{AffinityScorer, ModelOptions, ScorerLoader, ScoringError};

struct CachedScorer {
    scorer: Arc<dyn AffinityScorer>,
    loaded_seq: u64,
}

#[derive(Default)]
struct PoolInner {
    scorers: HashMap<ModelOptions, CachedScorer>,
    next_seq: u64,
}

/// A bounded cache of loaded scorers in front of another [`ScorerLoader`].
pub struct ScorerPool {
    loader: Arc<dyn ScorerLoader>,
    inner: RwLock<PoolInner>,
    max_scorers: usize,
}

impl std::fmt::Debug for ScorerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScorerPool")
            .field("max_scorers", &self.max_scorers)
            .field("scorers", &"<cached scorers>")
            .finish()
    }
}

impl ScorerPool {
    pub fn new(loader: Arc<dyn ScorerLoader>, max_scorers: usize) -> Self {
        Self {
            loader,
            inner: RwLock::new(PoolInner::default()),
            max_scorers: max_scorers.max(1),
        }
    }

    /// Get a cached scorer or load and cache a new one.
    pub async fn get_or_load(&self, options: &ModelOptions) -> Result<Arc<dyn AffinityScorer>, ScoringError> {
        {
            let inner = self.inner.read().await;
            if let Some(cached) = inner.scorers.get(options) {
                debug!(model = %options.model_path.display(), device = %options.device, "Scorer cache hit");
                return Ok(Arc::clone(&cached.scorer));
            }
        }

        info!(model = %options.model_path.display(), device = %options.device, "Loading scorer into pool");
        let scorer = self.loader.load(options).await?;

        let mut inner = self.inner.write().await;

        // Another job may have loaded the same model while we were loading.
        if let Some(cached) = inner.scorers.get(options) {
            return Ok(Arc::clone(&cached.scorer));
        }

        if inner.scorers.len() >= self.max_scorers {
            let oldest = inner
                .scorers
                .iter()
                .min_by_key(|(_, c)| c.loaded_seq)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                warn!(model = %key.model_path.display(), device = %key.device, "Evicting scorer from pool");
                inner.scorers.remove(&key);
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .scorers
            .insert(options.clone(), CachedScorer { scorer: Arc::clone(&scorer), loaded_seq: seq });
        debug!("{} scorers in pool", inner.scorers.len());

        Ok(scorer)
    }

    pub async fn is_cached(&self, options: &ModelOptions) -> bool {
        self.inner.read().await.scorers.contains_key(options)
    }

    pub async fn cached_count(&self) -> usize {
        self.inner.read().await.scorers.len()
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        let count = inner.scorers.len();
        inner.scorers.clear();
        info!("Cleared {} scorers from pool", count);
    }
}

#[async_trait]
impl ScorerLoader for ScorerPool {
    async fn load(&self, options: &ModelOptions) -> Result<Arc<dyn AffinityScorer>, ScoringError> {
        self.get_or_load(options).await
    }
}
