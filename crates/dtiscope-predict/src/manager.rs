//! Job lifecycle manager.
//!
//! `submit` validates synchronously, stores the job and spawns one
//! background task per job. The task walks the compounds × panel units in a
//! fixed order, checking the cancellation token before each unit. Anything
//! that escapes the task (error or panic) lands in the job's `failed` state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dtiscope_common::config::{PredictionConfig, RetentionConfig};
use dtiscope_common::entities::{InteractionResult, JobStatus};
use dtiscope_common::Settings;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::PredictError;
use crate::export::interactions_to_csv;
use crate::gateway::{AffinityScorer, ModelOptions, ScorerLoader};
use crate::job::{
    JobEvent, JobId, JobInput, JobListing, JobRequest, JobResults, JobStatusSnapshot, JobSummary,
    PredictionJob,
};
use crate::panel::{PanelTarget, ProteinPanel};
use crate::smiles;
use crate::store::{CleanupReport, JobStore};
use crate::table::{self, BatchTable};

const EVENT_CAPACITY: usize = 256;

/// Everything the manager needs from the service configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub panel_file: PathBuf,
    /// Batch tables under this directory belong to their job and are
    /// deleted once it finishes.
    pub upload_dir: PathBuf,
    pub prediction: PredictionConfig,
    pub retention: RetentionConfig,
}

impl ManagerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            panel_file: settings.data.panel_file.clone(),
            upload_dir: settings.server.upload_dir.clone(),
            prediction: settings.prediction.clone(),
            retention: settings.retention.clone(),
        }
    }
}

/// Result of scoring one (compound, target) unit.
enum UnitOutcome {
    Kept(InteractionResult),
    /// Scored, but below the high-confidence threshold.
    Filtered,
    Failed,
}

pub struct JobManager {
    config: ManagerConfig,
    loader: Arc<dyn ScorerLoader>,
    store: JobStore,
    events: broadcast::Sender<JobEvent>,
}

impl JobManager {
    pub fn new(config: ManagerConfig, loader: Arc<dyn ScorerLoader>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let store = JobStore::new(config.retention.max_finished_jobs);
        Self { config, loader, store, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    // ── Submission ────────────────────────────────────────────────────────────

    /// Validate a request, start it in the background and return its id.
    ///
    /// Invalid requests are rejected here and never allocate a job.
    pub async fn submit(self: &Arc<Self>, request: JobRequest) -> Result<JobId, PredictError> {
        validate_request(&request).await?;

        let model = ModelOptions {
            model_path: request
                .options
                .model_path
                .clone()
                .unwrap_or_else(|| self.config.prediction.default_model_path.clone()),
            device: request
                .options
                .device
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| self.config.prediction.default_device.clone()),
        };

        let id = Uuid::new_v4().to_string();
        let job = Arc::new(PredictionJob::new(id.clone(), request, model));
        self.store.insert(Arc::clone(&job)).await;

        {
            let mut state = job.state.write().await;
            state.progress.status = JobStatus::Running;
            state.progress.start_time = Some(Utc::now());
        }
        info!(job_id = %id, mode = job.mode().as_str(), "Prediction job started");
        let _ = self.events.send(JobEvent::Started { job_id: id.clone(), mode: job.mode() });

        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.supervise(job).await });

        Ok(id)
    }

    /// Run the job on its own task so panics are caught at the boundary.
    async fn supervise(self: Arc<Self>, job: Arc<PredictionJob>) {
        let worker = {
            let manager = Arc::clone(&self);
            let job = Arc::clone(&job);
            tokio::spawn(async move { manager.execute(&job).await })
        };

        let outcome = match worker.await {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(e)) => Err(e.to_string()),
            Err(join_err) => Err(format!("prediction task aborted: {join_err}")),
        };
        self.finish(&job, outcome).await;
    }

    async fn execute(&self, job: &PredictionJob) -> Result<JobSummary, PredictError> {
        let scorer = self
            .loader
            .load(&job.model)
            .await
            .map_err(|e| PredictError::Resource(format!("Failed to load model: {e}")))?;

        let panel = ProteinPanel::load_async(&self.config.panel_file)
            .await
            .map_err(|e| PredictError::Resource(format!("Failed to load protein data: {e:#}")))?;

        match &job.input {
            JobInput::Single { smiles } => self.run_single(job, scorer.as_ref(), &panel, smiles).await,
            JobInput::Batch { table_path, smiles_column, id_column } => {
                let path = table_path.clone();
                let smiles_column = smiles_column.clone();
                let id_column = id_column.clone();
                let table = tokio::task::spawn_blocking(move || {
                    table::read_batch_table(&path, &smiles_column, id_column.as_deref())
                })
                .await
                .map_err(|e| PredictError::Resource(format!("table reader aborted: {e}")))?
                .map_err(|e| PredictError::Resource(format!("Failed to read batch table: {e:#}")))?;

                self.run_batch(job, scorer.as_ref(), &panel, &table).await
            }
        }
    }

    // ── Runners ───────────────────────────────────────────────────────────────

    /// Score one structure against every panel target, in panel order.
    #[instrument(skip_all, fields(job_id = %job.id, targets = panel.len()))]
    async fn run_single(
        &self,
        job: &PredictionJob,
        scorer: &dyn AffinityScorer,
        panel: &ProteinPanel,
        smiles: &str,
    ) -> Result<JobSummary, PredictError> {
        set_total(job, panel.len()).await;
        let pause = Duration::from_millis(self.config.prediction.unit_pause_ms);

        for (idx, target) in panel.iter().enumerate() {
            if job.cancel.is_cancelled() {
                break;
            }
            let unit = self
                .score_unit(job, scorer, smiles, target, format!("{}_{}", job.id, idx), None, None, idx)
                .await;
            if !self.record_unit(job, unit).await {
                break;
            }
            pause_after_unit(pause).await;
        }

        Ok(self.summarize(job, panel.len(), None).await)
    }

    /// Score every valid table row against every panel target, row-major.
    #[instrument(skip_all, fields(job_id = %job.id, rows = table.rows.len(), targets = panel.len()))]
    async fn run_batch(
        &self,
        job: &PredictionJob,
        scorer: &dyn AffinityScorer,
        panel: &ProteinPanel,
        table: &BatchTable,
    ) -> Result<JobSummary, PredictError> {
        set_total(job, table.rows.len() * panel.len()).await;
        let pause = Duration::from_millis(self.config.prediction.batch_unit_pause_ms);
        let mut processed_compounds = 0usize;

        'rows: for row in &table.rows {
            if job.cancel.is_cancelled() {
                break;
            }

            if let Err(e) = smiles::validate(&row.smiles) {
                warn!(job_id = %job.id, compound = %row.compound_id, error = %e, "Invalid SMILES, skipping compound");
                if !self.record_failed_block(job, panel.len()).await {
                    break;
                }
                continue;
            }

            for (idx, target) in panel.iter().enumerate() {
                if job.cancel.is_cancelled() {
                    break 'rows;
                }
                let unit = self
                    .score_unit(
                        job,
                        scorer,
                        &row.smiles,
                        target,
                        format!("{}_{}_{}", job.id, row.row_index, idx),
                        Some(row.compound_id.clone()),
                        Some(row.row_index),
                        idx,
                    )
                    .await;
                if !self.record_unit(job, unit).await {
                    break 'rows;
                }
                pause_after_unit(pause).await;
            }
            processed_compounds += 1;
        }

        Ok(self
            .summarize(job, panel.len(), Some((table.total_rows, processed_compounds)))
            .await)
    }

    #[allow(clippy::too_many_arguments)]
    async fn score_unit(
        &self,
        job: &PredictionJob,
        scorer: &dyn AffinityScorer,
        smiles: &str,
        target: &PanelTarget,
        result_id: String,
        compound_id: Option<String>,
        row_index: Option<usize>,
        target_index: usize,
    ) -> UnitOutcome {
        match scorer.score(smiles, &target.sequence).await {
            Ok(score) => {
                if job.options.high_confidence_only
                    && score < self.config.prediction.high_confidence_threshold
                {
                    return UnitOutcome::Filtered;
                }
                UnitOutcome::Kept(InteractionResult {
                    id: result_id,
                    compound_id,
                    smiles: smiles.to_string(),
                    target_name: target.name.clone(),
                    target_canonical_id: target.gene.clone(),
                    sequence: target.sequence.clone(),
                    score,
                    protein_id: target.protein_id.clone(),
                    row_index,
                    target_index,
                })
            }
            Err(e) => {
                warn!(job_id = %job.id, target = %target.name, error = %e, "Prediction failed");
                UnitOutcome::Failed
            }
        }
    }

    /// Apply one unit's outcome. Returns false once the job has left `running`,
    /// in which case nothing is recorded.
    async fn record_unit(&self, job: &PredictionJob, unit: UnitOutcome) -> bool {
        let mut state = job.state.write().await;
        if state.progress.status != JobStatus::Running {
            return false;
        }
        match unit {
            UnitOutcome::Kept(result) => {
                state.progress.success_count += 1;
                state.partial.push(result);
            }
            UnitOutcome::Filtered => state.progress.success_count += 1,
            UnitOutcome::Failed => state.progress.failed_count += 1,
        }
        state.progress.processed += 1;
        self.emit_progress(job, &state.progress);
        true
    }

    /// Count `units` units as processed and failed without scoring them.
    async fn record_failed_block(&self, job: &PredictionJob, units: usize) -> bool {
        let mut state = job.state.write().await;
        if state.progress.status != JobStatus::Running {
            return false;
        }
        state.progress.failed_count += units;
        state.progress.processed += units;
        self.emit_progress(job, &state.progress);
        true
    }

    fn emit_progress(&self, job: &PredictionJob, p: &crate::job::JobProgress) {
        // Roughly one event per percent, plus the last unit.
        let step = (p.total / 100).max(1);
        if p.processed % step == 0 || p.processed == p.total {
            let _ = self.events.send(JobEvent::Progress {
                job_id: job.id.clone(),
                processed: p.processed,
                total: p.total,
                success_count: p.success_count,
                failed_count: p.failed_count,
            });
        }
    }

    async fn summarize(&self, job: &PredictionJob, total_targets: usize, batch: Option<(usize, usize)>) -> JobSummary {
        let threshold = self.config.prediction.high_confidence_threshold;
        let state = job.state.read().await;
        let mut summary = JobSummary {
            total_targets,
            successful_predictions: state.progress.success_count,
            failed_predictions: state.progress.failed_count,
            high_confidence_count: state.partial.iter().filter(|r| r.is_high_confidence(threshold)).count(),
            ..Default::default()
        };
        if let Some((total_compounds, processed_compounds)) = batch {
            summary.total_compounds = Some(total_compounds);
            summary.processed_compounds = Some(processed_compounds);
            summary.total_interactions = Some(state.partial.len());
        }
        summary
    }

    /// Move a job to its terminal state and into the finished set.
    ///
    /// A job that is no longer `running` here was cancelled; its status and
    /// end time were already set by `cancel`.
    async fn finish(&self, job: &PredictionJob, outcome: Result<JobSummary, String>) {
        let now = Utc::now();
        let retain_partial = self.config.prediction.retain_partial_on_cancel;

        let (status, error, ended_at) = {
            let mut state = job.state.write().await;
            let interactions = std::mem::take(&mut state.partial);
            let was_running = state.progress.status == JobStatus::Running;

            match outcome {
                Ok(summary) if was_running => {
                    state.progress.status = JobStatus::Completed;
                    state.progress.end_time = Some(now);
                    state.results = Some(JobResults { interactions, summary });
                }
                Err(message) if was_running => {
                    state.progress.status = JobStatus::Failed;
                    state.progress.end_time = Some(now);
                    state.progress.error = Some(message);
                }
                Ok(summary) => {
                    if retain_partial {
                        state.results = Some(JobResults { interactions, summary });
                    }
                }
                Err(message) => {
                    warn!(job_id = %job.id, error = %message, "Cancelled job ended with an error");
                }
            }

            (
                state.progress.status,
                state.progress.error.clone(),
                state.progress.end_time.unwrap_or(now),
            )
        };

        self.store.retire(&job.id, ended_at).await;
        self.discard_upload(job).await;

        match status {
            JobStatus::Failed => warn!(job_id = %job.id, error = error.as_deref().unwrap_or(""), "Prediction job failed"),
            _ => info!(job_id = %job.id, status = %status, "Prediction job finished"),
        }
        let _ = self.events.send(JobEvent::Finished { job_id: job.id.clone(), status, error });
    }

    /// Delete the uploaded table of a finished batch job.
    ///
    /// Tables outside the upload directory are left alone.
    async fn discard_upload(&self, job: &PredictionJob) {
        let JobInput::Batch { table_path, .. } = &job.input else {
            return;
        };
        if !table_path.starts_with(&self.config.upload_dir) {
            return;
        }
        match tokio::fs::remove_file(table_path).await {
            Ok(()) => debug!(job_id = %job.id, file = %table_path.display(), "Removed batch upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(job_id = %job.id, file = %table_path.display(), error = %e, "Failed to remove batch upload"),
        }
    }

    // ── Queries and control ───────────────────────────────────────────────────

    /// Stop a running job at its next unit boundary.
    pub async fn cancel(&self, id: &str) -> Result<JobStatusSnapshot, PredictError> {
        let job = self
            .store
            .get(id)
            .await
            .ok_or_else(|| PredictError::JobNotFound(id.to_string()))?;

        let ended_at = {
            let mut state = job.state.write().await;
            if state.progress.status != JobStatus::Running {
                return Err(PredictError::JobNotRunning(id.to_string()));
            }
            let now = Utc::now();
            state.progress.status = JobStatus::Cancelled;
            state.progress.end_time = Some(now);
            now
        };
        job.cancel.cancel();
        self.store.retire(id, ended_at).await;

        info!(job_id = %id, "Prediction job cancelled");
        Ok(job.snapshot().await)
    }

    pub async fn get_status(&self, id: &str) -> Option<JobStatusSnapshot> {
        let job = self.store.get(id).await?;
        Some(job.snapshot().await)
    }

    /// Results of a terminal job; `Ok(None)` when it ended without any.
    pub async fn get_results(&self, id: &str) -> Result<Option<JobResults>, PredictError> {
        let job = self
            .store
            .get(id)
            .await
            .ok_or_else(|| PredictError::JobNotFound(id.to_string()))?;
        let state = job.state.read().await;
        if !state.progress.status.is_terminal() {
            return Err(PredictError::JobNotFinished(id.to_string()));
        }
        Ok(state.results.clone())
    }

    /// Results as CSV; `Ok(None)` when the job has no results to download.
    pub async fn export_csv(&self, id: &str) -> Result<Option<String>, PredictError> {
        match self.get_results(id).await? {
            Some(results) => interactions_to_csv(&results.interactions)
                .map(Some)
                .map_err(|e| PredictError::Resource(format!("Failed to export results: {e}"))),
            None => Ok(None),
        }
    }

    /// All known jobs, newest start first.
    pub async fn list_jobs(&self) -> Vec<JobListing> {
        let mut listings = Vec::new();
        for job in self.store.all().await {
            listings.push(job.listing().await);
        }
        listings.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| a.job_id.cmp(&b.job_id)));
        listings
    }

    /// Enforce the retention bounds now.
    pub async fn cleanup(&self) -> CleanupReport {
        let max_age = chrono::Duration::hours(self.config.retention.max_age_hours);
        self.store.prune(Some(max_age), Utc::now()).await
    }

    /// Periodic retention pass until `shutdown` fires.
    pub fn spawn_janitor(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = Duration::from_secs(self.config.retention.cleanup_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let report = manager.cleanup().await;
                        if report.removed > 0 {
                            info!(removed = report.removed, finished = report.finished_jobs, "Removed expired prediction jobs");
                        }
                    }
                }
            }
        })
    }
}

async fn validate_request(request: &JobRequest) -> Result<(), PredictError> {
    match &request.input {
        JobInput::Single { smiles } => {
            if smiles.trim().is_empty() {
                return Err(PredictError::Validation("SMILES string required".to_string()));
            }
            smiles::validate(smiles)
                .map_err(|e| PredictError::Validation(format!("Invalid SMILES string: {e}")))?;
        }
        JobInput::Batch { table_path, smiles_column, id_column } => {
            if smiles_column.trim().is_empty() {
                return Err(PredictError::Validation("SMILES column required".to_string()));
            }
            let path = table_path.clone();
            let headers = tokio::task::spawn_blocking(move || table::read_headers(&path))
                .await
                .map_err(|e| PredictError::Resource(format!("header reader aborted: {e}")))?
                .map_err(|e| PredictError::Validation(format!("Failed to read CSV file: {e:#}")))?;

            let required = std::iter::once(smiles_column.as_str()).chain(id_column.as_deref());
            for column in required {
                if !headers.iter().any(|h| h == column) {
                    return Err(PredictError::Validation(format!("Column \"{column}\" not found")));
                }
            }
        }
    }
    Ok(())
}

async fn set_total(job: &PredictionJob, total: usize) {
    job.state.write().await.progress.total = total;
}

async fn pause_after_unit(pause: Duration) {
    if pause.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ScoringError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    struct FixedScorer(f64);

    #[async_trait]
    impl AffinityScorer for FixedScorer {
        async fn score(&self, _smiles: &str, _sequence: &str) -> Result<f64, ScoringError> {
            Ok(self.0)
        }
    }

    struct FixedLoader(f64);

    #[async_trait]
    impl ScorerLoader for FixedLoader {
        async fn load(&self, _options: &ModelOptions) -> Result<Arc<dyn AffinityScorer>, ScoringError> {
            Ok(Arc::new(FixedScorer(self.0)))
        }
    }

    fn panel_file() -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(b"protein,gene,sequence\nP1,G1,MKV\nP2,G2,MKL\n").unwrap();
        f
    }

    fn manager(panel: &tempfile::NamedTempFile, score: f64) -> Arc<JobManager> {
        let mut settings = Settings::default();
        settings.data.panel_file = panel.path().to_path_buf();
        settings.prediction.unit_pause_ms = 0;
        settings.prediction.batch_unit_pause_ms = 0;
        Arc::new(JobManager::new(ManagerConfig::from_settings(&settings), Arc::new(FixedLoader(score))))
    }

    async fn wait_terminal(m: &JobManager, id: &str) -> JobStatusSnapshot {
        for _ in 0..500 {
            let s = m.get_status(id).await.unwrap();
            if s.status.is_terminal() {
                return s;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn test_single_job_completes() {
        let panel = panel_file();
        let m = manager(&panel, 0.97);
        let id = m.submit(JobRequest::single("CCO", Default::default())).await.unwrap();

        let s = wait_terminal(&m, &id).await;
        assert_eq!(s.status, JobStatus::Completed);
        assert_eq!((s.processed, s.total, s.success_count, s.failed_count), (2, 2, 2, 0));
        assert_eq!(s.progress, 100.0);
        assert_eq!(s.eta, None);

        let results = m.get_results(&id).await.unwrap().unwrap();
        assert_eq!(results.interactions.len(), 2);
        assert_eq!(results.interactions[1].id, format!("{id}_1"));
        assert_eq!(results.interactions[1].target_canonical_id, "G2");
        assert_eq!(results.summary.high_confidence_count, 2);
    }

    #[tokio::test]
    async fn test_high_confidence_filter_counts_success_but_drops_result() {
        let panel = panel_file();
        let m = manager(&panel, 0.5);
        let options = crate::job::JobOptions { high_confidence_only: true, ..Default::default() };
        let id = m.submit(JobRequest::single("CCO", options)).await.unwrap();

        let s = wait_terminal(&m, &id).await;
        assert_eq!(s.success_count, 2);
        let results = m.get_results(&id).await.unwrap().unwrap();
        assert!(results.interactions.is_empty());
        assert_eq!(results.summary.successful_predictions, 2);
    }

    #[tokio::test]
    async fn test_invalid_single_smiles_is_rejected() {
        let panel = panel_file();
        let m = manager(&panel, 0.5);
        let err = m.submit(JobRequest::single("C1CC(", Default::default())).await.unwrap_err();
        assert!(matches!(err, PredictError::Validation(_)));
        assert!(m.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_panel_fails_job() {
        let panel = panel_file();
        let mut settings = Settings::default();
        settings.data.panel_file = panel.path().with_extension("missing");
        let m = Arc::new(JobManager::new(ManagerConfig::from_settings(&settings), Arc::new(FixedLoader(0.5))));

        let id = m.submit(JobRequest::single("CCO", Default::default())).await.unwrap();
        let s = wait_terminal(&m, &id).await;
        assert_eq!(s.status, JobStatus::Failed);
        assert!(s.error.unwrap().contains("protein data"));
        assert_eq!(m.get_results(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let panel = panel_file();
        let m = manager(&panel, 0.5);
        assert!(m.get_status("nope").await.is_none());
        assert!(matches!(m.get_results("nope").await, Err(PredictError::JobNotFound(_))));
        assert!(matches!(m.cancel("nope").await, Err(PredictError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_cancel_finished_job_is_rejected() {
        let panel = panel_file();
        let m = manager(&panel, 0.5);
        let id = m.submit(JobRequest::single("CCO", Default::default())).await.unwrap();
        wait_terminal(&m, &id).await;
        assert!(matches!(m.cancel(&id).await, Err(PredictError::JobNotRunning(_))));
    }

    #[tokio::test]
    async fn test_events_cover_lifecycle() {
        let panel = panel_file();
        let m = manager(&panel, 0.5);
        let mut rx = m.subscribe();
        let id = m.submit(JobRequest::single("CCO", Default::default())).await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), JobEvent::Started { .. }));
        loop {
            match rx.recv().await.unwrap() {
                JobEvent::Progress { job_id, total, .. } => {
                    assert_eq!(job_id, id);
                    assert_eq!(total, 2);
                }
                JobEvent::Finished { status, .. } => {
                    assert_eq!(status, JobStatus::Completed);
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }
}
