//! Scoring gateway: the boundary to the binding-affinity model.
//!
//! The model is opaque to the job engine. It is reached through
//! [`AffinityScorer`], and instances are obtained per job from a
//! [`ScorerLoader`] keyed by [`ModelOptions`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::smiles;

/// Failure of a single scoring call. Never fatal to a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    /// The structure or sequence could not be accepted by the model.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Anything that went wrong downstream: weights, device, inference.
    #[error("model error: {0}")]
    Model(String),
}

/// Which model weights to use and where to run them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelOptions {
    pub model_path: PathBuf,
    pub device: String,
}

/// `score(smiles, sequence) -> probability in [0, 1]`.
#[async_trait]
pub trait AffinityScorer: Send + Sync {
    async fn score(&self, smiles: &str, sequence: &str) -> Result<f64, ScoringError>;
}

/// Produces a ready-to-use scorer for the given model options.
#[async_trait]
pub trait ScorerLoader: Send + Sync {
    async fn load(&self, options: &ModelOptions) -> Result<Arc<dyn AffinityScorer>, ScoringError>;
}

/// Check a (structure, sequence) pair before handing it to a model.
pub fn check_inputs(smiles: &str, sequence: &str) -> Result<(), ScoringError> {
    smiles::validate(smiles).map_err(|e| ScoringError::InvalidInput(e.to_string()))?;
    if sequence.trim().is_empty() {
        return Err(ScoringError::InvalidInput("empty protein sequence".to_string()));
    }
    Ok(())
}

/// Reject model output that is not a probability.
pub fn check_score(raw: f64) -> Result<f64, ScoringError> {
    if raw.is_finite() && (0.0..=1.0).contains(&raw) {
        Ok(raw)
    } else {
        Err(ScoringError::Model(format!("model returned out-of-range score {raw}")))
    }
}

/// Parse the probability printed by the predictor executable.
///
/// The last non-empty line of stdout is taken, so the predictor may log
/// freely before printing its answer.
pub fn parse_score(stdout: &str) -> Result<f64, ScoringError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .ok_or_else(|| ScoringError::Model("predictor produced no output".to_string()))?;

    let raw: f64 = line
        .parse()
        .map_err(|_| ScoringError::Model(format!("unparsable predictor output: {line:?}")))?;
    check_score(raw)
}

// ── External predictor ────────────────────────────────────────────────────────

/// Runs one external predictor process per scored pair.
///
/// Invocation: `<cmd> --model <path> --device <dev> --smiles <s> --sequence <seq>`,
/// answer on stdout.
pub struct CommandScorer {
    executable_path: PathBuf,
    options: ModelOptions,
    device_lock: Arc<Semaphore>,
}

impl CommandScorer {
    pub fn new<P: AsRef<Path>>(
        executable_path: P,
        options: ModelOptions,
        device_lock: Arc<Semaphore>,
    ) -> Self {
        Self {
            executable_path: executable_path.as_ref().to_path_buf(),
            options,
            device_lock,
        }
    }
}

#[async_trait]
impl AffinityScorer for CommandScorer {
    async fn score(&self, smiles: &str, sequence: &str) -> Result<f64, ScoringError> {
        check_inputs(smiles, sequence)?;

        let _permit = self
            .device_lock
            .acquire()
            .await
            .map_err(|_| ScoringError::Model("device lock closed".to_string()))?;

        let output = Command::new(&self.executable_path)
            .arg("--model")
            .arg(&self.options.model_path)
            .arg("--device")
            .arg(&self.options.device)
            .arg("--smiles")
            .arg(smiles)
            .arg("--sequence")
            .arg(sequence)
            .output()
            .await
            .map_err(|e| {
                ScoringError::Model(format!(
                    "failed to run predictor {}: {e}",
                    self.executable_path.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScoringError::Model(format!("predictor failed: {}", stderr.trim())));
        }

        let score = parse_score(&String::from_utf8_lossy(&output.stdout))?;
        debug!(score, "predictor call completed");
        Ok(score)
    }
}

/// Loader for [`CommandScorer`]s sharing one device lock.
pub struct CommandScorerLoader {
    executable_path: PathBuf,
    device_lock: Arc<Semaphore>,
}

impl CommandScorerLoader {
    /// `max_concurrent` bounds how many inferences may run at once across all jobs.
    pub fn new<P: AsRef<Path>>(executable_path: P, max_concurrent: usize) -> Self {
        Self {
            executable_path: executable_path.as_ref().to_path_buf(),
            device_lock: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }
}

#[async_trait]
impl ScorerLoader for CommandScorerLoader {
    async fn load(&self, options: &ModelOptions) -> Result<Arc<dyn AffinityScorer>, ScoringError> {
        let exists = tokio::fs::try_exists(&options.model_path).await.unwrap_or(false);
        if !exists {
            return Err(ScoringError::Model(format!(
                "model weights not found: {}",
                options.model_path.display()
            )));
        }

        info!(
            model = %options.model_path.display(),
            device = %options.device,
            "Predictor ready"
        );
        Ok(Arc::new(CommandScorer::new(
            &self.executable_path,
            options.clone(),
            Arc::clone(&self.device_lock),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQ: &str = "MKTAYIAKQRQISFVKSHFSRQ";

    #[test]
    fn test_check_inputs() {
        assert!(check_inputs("CCO", SEQ).is_ok());
        assert!(matches!(check_inputs("C(C", SEQ), Err(ScoringError::InvalidInput(_))));
        assert!(matches!(check_inputs("CCO", "  "), Err(ScoringError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_score_takes_last_line() {
        assert_eq!(parse_score("loading weights\n0.875\n").unwrap(), 0.875);
        assert_eq!(parse_score("  0\n\n").unwrap(), 0.0);
    }

    #[test]
    fn test_parse_score_rejects_garbage_and_out_of_range() {
        assert!(matches!(parse_score(""), Err(ScoringError::Model(_))));
        assert!(matches!(parse_score("probability: high"), Err(ScoringError::Model(_))));
        assert!(matches!(parse_score("1.5"), Err(ScoringError::Model(_))));
        assert!(matches!(parse_score("NaN"), Err(ScoringError::Model(_))));
        assert!(matches!(parse_score("-0.1"), Err(ScoringError::Model(_))));
    }

    #[tokio::test]
    async fn test_loader_requires_weights_file() {
        let loader = CommandScorerLoader::new("dti-predict", 1);
        let opts = ModelOptions {
            model_path: PathBuf::from("/nonexistent/best_model.pth"),
            device: "cpu".into(),
        };
        let err = loader.load(&opts).await.err().unwrap();
        assert!(matches!(err, ScoringError::Model(m) if m.contains("not found")));
    }

    #[tokio::test]
    async fn test_missing_executable_is_model_error() {
        let weights = tempfile::NamedTempFile::new().unwrap();
        let loader = CommandScorerLoader::new("/nonexistent/dti-predict", 1);
        let opts = ModelOptions { model_path: weights.path().to_path_buf(), device: "cpu".into() };
        let scorer = loader.load(&opts).await.unwrap();

        let err = scorer.score("CCO", SEQ).await.unwrap_err();
        assert!(matches!(err, ScoringError::Model(_)));
    }

    #[tokio::test]
    async fn test_invalid_smiles_never_reaches_executable() {
        let scorer = CommandScorer::new(
            "/nonexistent/dti-predict",
            ModelOptions { model_path: "m.pth".into(), device: "cpu".into() },
            Arc::new(Semaphore::new(1)),
        );
        let err = scorer.score("C1CC", SEQ).await.unwrap_err();
        assert!(matches!(err, ScoringError::InvalidInput(_)));
    }
}
