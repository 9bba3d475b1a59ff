/// Core entity types shared by the prediction engine, the catalog and the web layer.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Prediction jobs
// ---------------------------------------------------------------------------

/// How a prediction job receives its compounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// One structure string scored against the whole panel.
    Single,
    /// Every valid row of an uploaded table scored against the whole panel.
    Batch,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Single => "single",
            JobMode::Batch  => "batch",
        }
    }
}

/// Lifecycle state of a prediction job.
///
/// `Queued → Running → {Completed | Failed | Cancelled}`; the last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued    => "queued",
            JobStatus::Running   => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed    => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Interaction results
// ---------------------------------------------------------------------------

/// One scored compound ↔ target pair produced by a prediction job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionResult {
    /// `{job_id}_{target_index}` for single jobs, `{job_id}_{row}_{target_index}` for batch jobs.
    pub id: String,
    /// Compound label: the id column value, `compound_{row}`, or `None` for single jobs.
    pub compound_id: Option<String>,
    /// Structure string that was scored.
    pub smiles: String,
    /// Protein name from the panel.
    pub target_name: String,
    /// Gene symbol from the panel.
    pub target_canonical_id: String,
    pub sequence: String,
    /// Predicted binding probability in [0, 1].
    pub score: f64,
    /// Panel `id` column when present, otherwise the panel row index.
    pub protein_id: String,
    /// Row of the uploaded table (batch jobs only).
    pub row_index: Option<usize>,
    /// Position of the target in the panel.
    pub target_index: usize,
}

impl InteractionResult {
    pub fn is_high_confidence(&self, threshold: f64) -> bool {
        self.score >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        let mode: JobMode = serde_json::from_str("\"batch\"").unwrap();
        assert_eq!(mode, JobMode::Batch);
    }
}
