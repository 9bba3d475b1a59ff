//! dtiscope-common: Shared types, errors, and configuration used across all dtiscope crates.

pub mod error;
pub mod entities;
pub mod config;

// Re-export commonly used types
pub use config::Settings;
pub use error::{ApiError, DtiError, Result};
