//! dtiscope-web: HTTP API for dtiscope
//! Provides:
//!   - Prediction job submission, status, results and CSV download
//!   - Target list, search, detail and statistics
//!   - Compound list, search, detail and per-compound targets
//!   - Live job events over SSE

pub mod handlers;
pub mod router;
pub mod sse;
pub mod state;
