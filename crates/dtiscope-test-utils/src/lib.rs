//! dtiscope-test-utils: Shared fixtures and scripted scorers for tests.

pub mod fixtures;
pub mod scorers;

pub use fixtures::{write_csv, TestData};
pub use scorers::{MockLoader, MockScorer};
