//! dtiscope-predict: Asynchronous compound-protein prediction jobs.
//!
//! 1. Structure validation ([`smiles`])
//! 2. Scoring gateway and scorer pool ([`gateway`], [`pool`])
//! 3. Protein panel and batch table loading ([`panel`], [`table`])
//! 4. Job store and lifecycle manager ([`store`], [`manager`])
//! 5. Results export ([`export`])

pub mod error;
pub mod export;
pub mod gateway;
pub mod job;
pub mod manager;
pub mod panel;
pub mod pool;
pub mod smiles;
pub mod store;
pub mod table;

pub use error::PredictError;
pub use gateway::{AffinityScorer, CommandScorer, CommandScorerLoader, ModelOptions, ScorerLoader, ScoringError};
pub use job::{JobEvent, JobId, JobInput, JobOptions, JobRequest, JobResults, JobStatusSnapshot, JobSummary};
pub use manager::{JobManager, ManagerConfig};
pub use pool::ScorerPool;
