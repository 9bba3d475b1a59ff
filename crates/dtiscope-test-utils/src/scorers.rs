//! Scripted scorers for driving the job engine in tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dtiscope_predict::{AffinityScorer, ModelOptions, ScorerLoader, ScoringError};

/// Scorer with a default score, per-sequence overrides and scripted failures.
pub struct MockScorer {
    default_score: f64,
    by_sequence: HashMap<String, f64>,
    fail_calls: HashSet<usize>,
    fail_sequences: HashSet<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockScorer {
    pub fn new(default_score: f64) -> Self {
        Self {
            default_score,
            by_sequence: HashMap::new(),
            fail_calls: HashSet::new(),
            fail_sequences: HashSet::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Return `score` whenever `sequence` is scored.
    pub fn with_score(mut self, sequence: &str, score: f64) -> Self {
        self.by_sequence.insert(sequence.to_string(), score);
        self
    }

    /// Fail the `n`-th call (1-based) with a model error.
    pub fn failing_on_call(mut self, n: usize) -> Self {
        self.fail_calls.insert(n);
        self
    }

    /// Fail every call for `sequence`.
    pub fn failing_for(mut self, sequence: &str) -> Self {
        self.fail_sequences.insert(sequence.to_string());
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AffinityScorer for MockScorer {
    async fn score(&self, _smiles: &str, sequence: &str) -> Result<f64, ScoringError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_calls.contains(&call) || self.fail_sequences.contains(sequence) {
            return Err(ScoringError::Model(format!("scripted failure on call {call}")));
        }
        Ok(self.by_sequence.get(sequence).copied().unwrap_or(self.default_score))
    }
}

/// Loader that always hands out the same scorer, or always fails.
pub struct MockLoader {
    scorer: Option<Arc<MockScorer>>,
    loads: AtomicUsize,
}

impl MockLoader {
    pub fn new(scorer: Arc<MockScorer>) -> Self {
        Self { scorer: Some(scorer), loads: AtomicUsize::new(0) }
    }

    /// A loader whose model can never be loaded.
    pub fn unavailable() -> Self {
        Self { scorer: None, loads: AtomicUsize::new(0) }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScorerLoader for MockLoader {
    async fn load(&self, options: &ModelOptions) -> Result<Arc<dyn AffinityScorer>, ScoringError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match &self.scorer {
            Some(scorer) => Ok(Arc::clone(scorer) as Arc<dyn AffinityScorer>),
            None => Err(ScoringError::Model(format!(
                "model weights not found: {}",
                options.model_path.display()
            ))),
        }
    }
}
