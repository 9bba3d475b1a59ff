//! Prediction job model: inputs, mutable progress, and the read-only views
//! handed to callers.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use dtiscope_common::entities::{InteractionResult, JobMode, JobStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::gateway::ModelOptions;

pub type JobId = String;

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// What a job scores against the panel.
#[derive(Debug, Clone, PartialEq)]
pub enum JobInput {
    /// One structure string.
    Single { smiles: String },
    /// An uploaded table with a structure column and an optional id column.
    Batch {
        table_path: PathBuf,
        smiles_column: String,
        id_column: Option<String>,
    },
}

impl JobInput {
    pub fn mode(&self) -> JobMode {
        match self {
            JobInput::Single { .. } => JobMode::Single,
            JobInput::Batch { .. } => JobMode::Batch,
        }
    }
}

/// Caller-supplied options; unset fields fall back to the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default)]
    pub high_confidence_only: bool,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub input: JobInput,
    pub options: JobOptions,
}

impl JobRequest {
    pub fn single(smiles: impl Into<String>, options: JobOptions) -> Self {
        Self { input: JobInput::Single { smiles: smiles.into() }, options }
    }

    pub fn batch(
        table_path: impl Into<PathBuf>,
        smiles_column: impl Into<String>,
        id_column: Option<String>,
        options: JobOptions,
    ) -> Self {
        Self {
            input: JobInput::Batch {
                table_path: table_path.into(),
                smiles_column: smiles_column.into(),
                id_column,
            },
            options,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Mutable counters of a job, written only by the job's own task
/// (and by `cancel`).
#[derive(Debug, Clone)]
pub struct JobProgress {
    pub status: JobStatus,
    pub processed: usize,
    /// Zero until the panel (and table) are loaded.
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            status: JobStatus::Queued,
            processed: 0,
            total: 0,
            success_count: 0,
            failed_count: 0,
            start_time: None,
            end_time: None,
            error: None,
        }
    }
}

impl JobProgress {
    /// Percentage in [0, 100]; zero while the total is unknown.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        }
    }

    /// Remaining time extrapolated from the rate so far.
    ///
    /// Only defined while running and after at least one unit.
    pub fn eta(&self, now: DateTime<Utc>) -> Option<String> {
        if self.status != JobStatus::Running || self.processed == 0 {
            return None;
        }
        let start = self.start_time?;
        let elapsed = (now - start).num_milliseconds().max(1) as f64 / 1000.0;
        let rate = self.processed as f64 / elapsed;
        let remaining = self.total.saturating_sub(self.processed) as f64;
        let eta_secs = if rate > 0.0 { remaining / rate } else { 0.0 };
        Some(format_eta(eta_secs))
    }
}

/// `MM:SS`, minutes zero-padded to two digits.
pub fn format_eta(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub total_targets: usize,
    pub successful_predictions: usize,
    pub failed_predictions: usize,
    pub high_confidence_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_compounds: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_compounds: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_interactions: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResults {
    pub interactions: Vec<InteractionResult>,
    pub summary: JobSummary,
}

// ---------------------------------------------------------------------------
// The job itself
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct JobState {
    pub progress: JobProgress,
    /// Interactions accumulated by the running task.
    pub partial: Vec<InteractionResult>,
    /// Set once the job reaches a terminal state with something to return.
    pub results: Option<JobResults>,
}

#[derive(Debug)]
pub struct PredictionJob {
    pub id: JobId,
    pub input: JobInput,
    pub options: JobOptions,
    pub model: ModelOptions,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: RwLock<JobState>,
}

impl PredictionJob {
    pub(crate) fn new(id: JobId, request: JobRequest, model: ModelOptions) -> Self {
        Self {
            id,
            input: request.input,
            options: request.options,
            model,
            cancel: CancellationToken::new(),
            state: RwLock::new(JobState::default()),
        }
    }

    pub fn mode(&self) -> JobMode {
        self.input.mode()
    }

    pub async fn snapshot(&self) -> JobStatusSnapshot {
        let state = self.state.read().await;
        JobStatusSnapshot::from_progress(&self.id, self.mode(), &state.progress, Utc::now())
    }

    pub async fn listing(&self) -> JobListing {
        let state = self.state.read().await;
        JobListing {
            job_id: self.id.clone(),
            mode: self.mode(),
            status: state.progress.status,
            progress: state.progress.percent(),
            start_time: state.progress.start_time,
            end_time: state.progress.end_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Point-in-time status of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusSnapshot {
    pub job_id: JobId,
    pub mode: JobMode,
    pub status: JobStatus,
    pub progress: f64,
    pub processed: usize,
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub eta: Option<String>,
    pub error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl JobStatusSnapshot {
    pub fn from_progress(id: &str, mode: JobMode, p: &JobProgress, now: DateTime<Utc>) -> Self {
        Self {
            job_id: id.to_string(),
            mode,
            status: p.status,
            progress: p.percent(),
            processed: p.processed,
            total: p.total,
            success_count: p.success_count,
            failed_count: p.failed_count,
            eta: p.eta(now),
            error: p.error.clone(),
            start_time: p.start_time,
            end_time: p.end_time,
        }
    }
}

/// One line of the job list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobListing {
    pub job_id: JobId,
    pub mode: JobMode,
    pub status: JobStatus,
    pub progress: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Lifecycle notifications published on the manager's broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        job_id: JobId,
        mode: JobMode,
    },
    Progress {
        job_id: JobId,
        processed: usize,
        total: usize,
        success_count: usize,
        failed_count: usize,
    },
    Finished {
        job_id: JobId,
        status: JobStatus,
        error: Option<String>,
    },
}

impl JobEvent {
    /// SSE event name; matches the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Started { .. } => "started",
            JobEvent::Progress { .. } => "progress",
            JobEvent::Finished { .. } => "finished",
        }
    }

    /// The last event a job publishes.
    pub fn is_final(&self) -> bool {
        matches!(self, JobEvent::Finished { .. })
    }

    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Finished { job_id, .. } => job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(0.0), "00:00");
        assert_eq!(format_eta(75.9), "01:15");
        assert_eq!(format_eta(6000.0), "100:00");
        assert_eq!(format_eta(-3.0), "00:00");
    }

    #[test]
    fn test_eta_requires_running_and_progress() {
        let now = Utc::now();
        let mut p = JobProgress {
            status: JobStatus::Running,
            total: 10,
            start_time: Some(now - Duration::seconds(10)),
            ..Default::default()
        };
        assert_eq!(p.eta(now), None);

        p.processed = 5;
        assert_eq!(p.eta(now).as_deref(), Some("00:10"));

        p.status = JobStatus::Completed;
        assert_eq!(p.eta(now), None);
    }

    #[test]
    fn test_percent_undefined_until_total_known() {
        let mut p = JobProgress::default();
        assert_eq!(p.percent(), 0.0);
        p.total = 4;
        p.processed = 1;
        assert_eq!(p.percent(), 25.0);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let ev = JobEvent::Finished { job_id: "j1".into(), status: JobStatus::Completed, error: None };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "finished");
        assert_eq!(json["status"], "completed");
        assert_eq!(ev.job_id(), "j1");
        assert_eq!(json["type"], ev.name());
        assert!(ev.is_final());
        assert!(!JobEvent::Started { job_id: "j1".into(), mode: JobMode::Single }.is_final());
    }

    #[test]
    fn test_batch_summary_fields_are_optional() {
        let json = serde_json::to_value(JobSummary { total_targets: 3, ..Default::default() }).unwrap();
        assert!(json.get("total_compounds").is_none());
        assert_eq!(json["total_targets"], 3);
    }
}
