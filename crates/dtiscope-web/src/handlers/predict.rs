//! Prediction job endpoints.

use std::path::PathBuf;

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use dtiscope_common::error::ApiError;
use dtiscope_predict::{smiles, JobOptions, JobRequest};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::success;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct SinglePredictionRequest {
    #[serde(default)]
    pub smiles: String,
    #[serde(flatten)]
    pub options: JobOptions,
}

#[derive(Debug, Deserialize)]
pub struct SmilesBody {
    #[serde(default)]
    pub smiles: String,
}

/// POST /api/predict/single
pub async fn predict_single(
    State(state): State<SharedState>,
    Json(body): Json<SinglePredictionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = state.jobs.submit(JobRequest::single(body.smiles, body.options)).await?;
    Ok(success(json!({ "job_id": job_id, "message": "Prediction started" })))
}

/// Fields of a batch upload form.
#[derive(Debug, Default)]
struct BatchForm {
    file: Option<(String, Vec<u8>)>,
    smiles_column: Option<String>,
    id_column: Option<String>,
    options: JobOptions,
}

async fn read_batch_form(mut multipart: Multipart) -> Result<BatchForm, ApiError> {
    let mut form = BatchForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
            form.file = Some((file_name, bytes.to_vec()));
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed form field {name}: {e}")))?;
        let value = value.trim().to_string();
        match name.as_str() {
            "smiles_column" => form.smiles_column = Some(value).filter(|v| !v.is_empty()),
            "id_column" => form.id_column = Some(value).filter(|v| !v.is_empty()),
            "high_confidence_only" => form.options.high_confidence_only = value == "true",
            "device" => form.options.device = Some(value).filter(|v| !v.is_empty()),
            "model_path" => form.options.model_path = Some(value).filter(|v| !v.is_empty()).map(PathBuf::from),
            _ => {}
        }
    }
    Ok(form)
}

/// Upload name reduced to a safe file name.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    base.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

/// POST /api/predict/batch: multipart upload of a CSV table.
pub async fn predict_batch(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_batch_form(multipart).await?;

    let (file_name, bytes) = form
        .file
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;
    if file_name.is_empty() {
        return Err(ApiError::BadRequest("No file selected".to_string()));
    }
    if !file_name.to_lowercase().ends_with(".csv") {
        return Err(ApiError::BadRequest("Only CSV files are supported".to_string()));
    }
    let smiles_column = form
        .smiles_column
        .ok_or_else(|| ApiError::BadRequest("SMILES column required".to_string()))?;

    let upload_dir = &state.settings.server.upload_dir;
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to create upload directory: {e}")))?;
    let path = upload_dir.join(format!("{}_{}", Uuid::new_v4(), sanitize_file_name(&file_name)));
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save upload: {e}")))?;
    info!(file = %path.display(), bytes = bytes.len(), "Saved batch upload");

    let request = JobRequest::batch(&path, smiles_column, form.id_column, form.options);
    match state.jobs.submit(request).await {
        Ok(job_id) => Ok(success(json!({ "job_id": job_id, "message": "Batch prediction started" }))),
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!(file = %path.display(), error = %remove_err, "Failed to remove rejected upload");
            }
            Err(e.into())
        }
    }
}

/// GET /api/predict/status/{id}
pub async fn job_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .jobs
        .get_status(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))?;
    Ok(success(status))
}

/// POST /api/predict/cancel/{id}
pub async fn cancel_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.jobs.cancel(&id).await?;
    Ok(success(status))
}

/// GET /api/predict/results/{id}
pub async fn job_results(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let results = state
        .jobs
        .get_results(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Results not found".to_string()))?;
    Ok(success(results))
}

/// GET /api/predict/download/{id}: results as a CSV attachment.
pub async fn download_results(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let csv = state
        .jobs
        .export_csv(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No results available".to_string()))?;
    let disposition = format!("attachment; filename=\"prediction_results_{id}.csv\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

/// GET /api/predict/jobs
pub async fn list_jobs(State(state): State<SharedState>) -> impl IntoResponse {
    success(json!({ "jobs": state.jobs.list_jobs().await }))
}

/// POST /api/predict/cleanup
pub async fn cleanup_jobs(State(state): State<SharedState>) -> impl IntoResponse {
    success(state.jobs.cleanup().await)
}

/// POST /api/predict/validate/smiles: syntax check without starting a job.
pub async fn validate_smiles(Json(body): Json<SmilesBody>) -> impl IntoResponse {
    if body.smiles.trim().is_empty() {
        return success(json!({ "valid": false, "message": "SMILES string required" }));
    }
    match smiles::validate(&body.smiles) {
        Ok(summary) => success(json!({ "valid": true, "summary": summary })),
        Err(e) => success(json!({ "valid": false, "message": format!("Invalid SMILES string: {e}") })),
    }
}
