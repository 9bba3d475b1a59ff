//! Configuration loading for dtiscope.
//! Reads dtiscope.toml from the current directory or the path in the DTISCOPE_CONFIG env var.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DtiError, Result};

/// Complete service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub prediction: PredictionConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            data: DataConfig::default(),
            prediction: PredictionConfig::default(),
            retention: RetentionConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Where uploaded batch tables are stored.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

fn default_bind()       -> String  { "127.0.0.1:3001".to_string() }
fn default_upload_dir() -> PathBuf { PathBuf::from("data/uploads") }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), upload_dir: default_upload_dir() }
    }
}

// ── Data files ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_compounds_file")]
    pub compounds_file: PathBuf,
    /// Reference target table (canonical symbol + alias names + metadata).
    #[serde(default = "default_targets_file")]
    pub targets_file: PathBuf,
    /// Protein panel scored by every prediction job.
    #[serde(default = "default_panel_file")]
    pub panel_file: PathBuf,
    /// Per-compound prediction file directories, one per compound type.
    #[serde(default = "default_partitions")]
    pub partitions: Vec<PartitionConfig>,
}

/// One compound-type partition of the prediction corpus.
///
/// Files are named `{prefix}{compound_id}.csv` inside `dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub compound_type: String,
    pub dir: PathBuf,
    pub prefix: String,
}

fn default_compounds_file() -> PathBuf { PathBuf::from("data/compounds.csv") }
fn default_targets_file()   -> PathBuf { PathBuf::from("data/targets.csv") }
fn default_panel_file()     -> PathBuf { PathBuf::from("data/protein_info_with_gene.csv") }

fn default_partitions() -> Vec<PartitionConfig> {
    [("volatile_oil", "huifayou"), ("triterpene", "santie"), ("sterol", "zaichun")]
        .into_iter()
        .map(|(compound_type, prefix)| PartitionConfig {
            compound_type: compound_type.to_string(),
            dir: PathBuf::from("data").join(prefix),
            prefix: prefix.to_string(),
        })
        .collect()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            compounds_file: default_compounds_file(),
            targets_file: default_targets_file(),
            panel_file: default_panel_file(),
            partitions: default_partitions(),
        }
    }
}

// ── Prediction jobs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    #[serde(default = "default_model_path")]
    pub default_model_path: PathBuf,
    #[serde(default = "default_device")]
    pub default_device: String,
    /// External predictor executable invoked once per scored pair.
    #[serde(default = "default_predictor_command")]
    pub predictor_command: PathBuf,
    #[serde(default = "default_high_confidence")]
    pub high_confidence_threshold: f64,
    /// Pause after each unit of a single job, in milliseconds.
    #[serde(default = "default_unit_pause_ms")]
    pub unit_pause_ms: u64,
    /// Pause after each unit of a batch job, in milliseconds.
    #[serde(default = "default_batch_unit_pause_ms")]
    pub batch_unit_pause_ms: u64,
    #[serde(default = "default_max_concurrent_inferences")]
    pub max_concurrent_inferences: usize,
    #[serde(default = "default_scorer_pool_size")]
    pub scorer_pool_size: usize,
    /// Keep results computed before a cancellation instead of discarding them.
    #[serde(default)]
    pub retain_partial_on_cancel: bool,
}

fn default_model_path()                -> PathBuf { PathBuf::from("result/best_model.pth") }
fn default_device()                    -> String  { "cuda".to_string() }
fn default_predictor_command()         -> PathBuf { PathBuf::from("dti-predict") }
fn default_high_confidence()           -> f64     { 0.95 }
fn default_unit_pause_ms()             -> u64     { 10 }
fn default_batch_unit_pause_ms()       -> u64     { 1 }
fn default_max_concurrent_inferences() -> usize   { 1 }
fn default_scorer_pool_size()          -> usize   { 4 }

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            default_model_path: default_model_path(),
            default_device: default_device(),
            predictor_command: default_predictor_command(),
            high_confidence_threshold: default_high_confidence(),
            unit_pause_ms: default_unit_pause_ms(),
            batch_unit_pause_ms: default_batch_unit_pause_ms(),
            max_concurrent_inferences: default_max_concurrent_inferences(),
            scorer_pool_size: default_scorer_pool_size(),
            retain_partial_on_cancel: false,
        }
    }
}

// ── Finished-job retention ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_max_finished")]
    pub max_finished_jobs: usize,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: i64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_max_finished()     -> usize { 10 }
fn default_max_age_hours()    -> i64   { 24 }
fn default_cleanup_interval() -> u64   { 3600 }

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_finished_jobs: default_max_finished(),
            max_age_hours: default_max_age_hours(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

// ── Catalog ───────────────────────────────────────────────────────────────────

/// How alias tokens shared by several reference rows are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasPolicy {
    /// The first reference row claiming a token keeps it.
    #[default]
    FirstWins,
    /// Later reference rows overwrite earlier claims.
    LastWins,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub alias_policy: AliasPolicy,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_page_size()     -> usize { 20 }
fn default_max_page_size() -> usize { 100 }

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            alias_policy: AliasPolicy::default(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Settings {
    /// Load configuration from dtiscope.toml.
    /// Checks DTISCOPE_CONFIG env var first, then the current directory.
    /// Falls back to built-in defaults when no file exists.
    pub fn load() -> Result<Self> {
        let path = std::env::var("DTISCOPE_CONFIG")
            .unwrap_or_else(|_| "dtiscope.toml".to_string());

        if !Path::new(&path).exists() {
            tracing::warn!("Config file {} not found, using built-in defaults", path);
            return Ok(Self::default());
        }

        Self::from_file(Path::new(&path))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| DtiError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DtiError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_empty_toml_yields_defaults() {
        let s = Settings::from_toml("").unwrap();
        assert_eq!(s.server.bind, "127.0.0.1:3001");
        assert_eq!(s.prediction.high_confidence_threshold, 0.95);
        assert_eq!(s.retention.max_finished_jobs, 10);
        assert_eq!(s.retention.max_age_hours, 24);
        assert_eq!(s.catalog.alias_policy, AliasPolicy::FirstWins);
        assert_eq!(s.data.partitions.len(), 3);
        assert!(!s.prediction.retain_partial_on_cancel);
    }

    #[test]
    fn test_partial_override() {
        let toml = r#"
            [prediction]
            default_device = "cpu"
            retain_partial_on_cancel = true

            [catalog]
            alias_policy = "last_wins"

            [[data.partitions]]
            compound_type = "alkaloid"
            dir = "corpus/alkaloid"
            prefix = "alk"
        "#;
        let s = Settings::from_toml(toml).unwrap();
        assert_eq!(s.prediction.default_device, "cpu");
        assert!(s.prediction.retain_partial_on_cancel);
        assert_eq!(s.prediction.unit_pause_ms, 10);
        assert_eq!(s.catalog.alias_policy, AliasPolicy::LastWins);
        assert_eq!(
            s.data.partitions,
            vec![PartitionConfig {
                compound_type: "alkaloid".into(),
                dir: PathBuf::from("corpus/alkaloid"),
                prefix: "alk".into(),
            }]
        );
    }

    #[test]
    fn test_example_config_parses() {
        let s = Settings::from_toml(include_str!("../../../dtiscope.example.toml")).unwrap();
        assert_eq!(s.data.partitions.len(), 3);
        assert_eq!(s.data.partitions[2].prefix, "zaichun");
        assert_eq!(s.catalog.max_page_size, 100);
    }

    #[test]
    fn test_from_file_reports_bad_toml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[retention]\nmax_finished_jobs = \"ten\"").unwrap();
        let err = Settings::from_file(f.path()).unwrap_err();
        assert!(matches!(err, DtiError::Config(_)));
    }
}
