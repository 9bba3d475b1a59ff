use dtiscope_common::error::ApiError;
use thiserror::Error;

use crate::job::JobId;

#[derive(Debug, Error)]
pub enum PredictError {
    /// Rejected at submission; no job is created.
    #[error("{0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {0} is not running")]
    JobNotRunning(JobId),

    #[error("Job {0} has not finished yet")]
    JobNotFinished(JobId),

    /// Panel, table or model could not be loaded.
    #[error("Resource error: {0}")]
    Resource(String),
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::Validation(m)     => ApiError::BadRequest(m),
            PredictError::JobNotFound(_)    => ApiError::NotFound(err.to_string()),
            PredictError::JobNotRunning(_)
            | PredictError::JobNotFinished(_) => ApiError::Conflict(err.to_string()),
            other                           => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_to_http_status() {
        let e: ApiError = PredictError::JobNotFound("x".into()).into();
        assert_eq!(e.status_code().as_u16(), 404);
        let e: ApiError = PredictError::Validation("Column \"smiles\" not found".into()).into();
        assert_eq!(e.status_code().as_u16(), 400);
        let e: ApiError = PredictError::JobNotRunning("x".into()).into();
        assert_eq!(e.status_code().as_u16(), 409);
    }
}
