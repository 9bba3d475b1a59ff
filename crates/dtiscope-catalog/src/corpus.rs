//! Per-compound prediction files, grouped into compound-type partitions.
//!
//! Each partition is a directory of `{prefix}{compound_id}.csv` files with
//! one row per scored target:
//! - From: raw target name as written by the predictor (required)
//! - score: predicted probability; non-numeric cells are treated as missing
//! - Gene Name: long gene description (optional)

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use dtiscope_common::config::PartitionConfig;
use serde::Serialize;
use tracing::{debug, warn};

const FILE_EXTENSION: &str = "csv";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    /// Zero-based data row in the source file.
    pub row_index: usize,
    pub from_name: String,
    pub score: Option<f64>,
    pub gene_name_full: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// All rows of one prediction file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundPredictions {
    pub compound_type: String,
    pub compound_id: String,
    pub source_file: String,
    pub rows: Vec<PredictionRow>,
}

#[derive(Debug, Clone, Default)]
pub struct PredictionCorpus {
    partitions: Vec<PartitionConfig>,
}

impl PredictionCorpus {
    pub fn new(partitions: Vec<PartitionConfig>) -> Self {
        Self { partitions }
    }

    fn partition(&self, compound_type: &str) -> Option<&PartitionConfig> {
        self.partitions.iter().find(|p| p.compound_type == compound_type)
    }

    /// Path of a compound's prediction file; `None` for an unknown compound type.
    pub fn file_path(&self, compound_type: &str, compound_id: &str) -> Option<PathBuf> {
        self.partition(compound_type)
            .map(|p| p.dir.join(format!("{}{}.{}", p.prefix, compound_id, FILE_EXTENSION)))
    }

    /// Read one compound's predictions; `Ok(None)` when it has none on disk.
    pub fn load_compound(&self, compound_type: &str, compound_id: &str) -> Result<Option<CompoundPredictions>> {
        let Some(path) = self.file_path(compound_type, compound_id) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        read_prediction_file(&path, compound_type, compound_id).map(Some)
    }

    /// Read every prediction file of every partition.
    ///
    /// Partitions are visited in configuration order and files in name
    /// order. Unreadable files are skipped with a warning.
    pub fn scan(&self) -> Vec<CompoundPredictions> {
        let mut out = Vec::new();
        for partition in &self.partitions {
            for (path, compound_id) in list_partition(partition) {
                match read_prediction_file(&path, &partition.compound_type, &compound_id) {
                    Ok(file) => out.push(file),
                    Err(e) => warn!(file = %path.display(), error = %format!("{e:#}"), "Skipping prediction file"),
                }
            }
        }
        debug!("Scanned {} prediction files", out.len());
        out
    }
}

/// Path, length and modification time of every prediction file.
///
/// Two equal fingerprints mean the corpus has not changed on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusFingerprint(Vec<(PathBuf, u64, Option<SystemTime>)>);

impl PredictionCorpus {
    /// Stat every prediction file without reading it.
    pub fn fingerprint(&self) -> CorpusFingerprint {
        let entries = self
            .partitions
            .iter()
            .flat_map(list_partition)
            .map(|(path, _)| {
                let meta = std::fs::metadata(&path).ok();
                let len = meta.as_ref().map_or(0, |m| m.len());
                let modified = meta.and_then(|m| m.modified().ok());
                (path, len, modified)
            })
            .collect();
        CorpusFingerprint(entries)
    }
}

/// Prediction files in a partition as `(path, compound_id)`, sorted by file name.
fn list_partition(partition: &PartitionConfig) -> Vec<(PathBuf, String)> {
    let entries = match std::fs::read_dir(&partition.dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %partition.dir.display(), error = %e, "Partition directory unavailable");
            return Vec::new();
        }
    };

    let mut files: Vec<(PathBuf, String)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION))
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?;
            let compound_id = stem.strip_prefix(partition.prefix.as_str())?.to_string();
            (!compound_id.is_empty()).then_some((path, compound_id))
        })
        .collect();
    files.sort();
    files
}

pub fn read_prediction_file(path: &Path, compound_type: &str, compound_id: &str) -> Result<CompoundPredictions> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let rows = parse_prediction_rows(file).with_context(|| format!("Failed to parse {}", path.display()))?;
    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(CompoundPredictions {
        compound_type: compound_type.to_string(),
        compound_id: compound_id.to_string(),
        source_file,
        rows,
    })
}

pub fn parse_prediction_rows<R: Read>(reader: R) -> Result<Vec<PredictionRow>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .context("Prediction file has no header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if !headers.iter().any(|h| h == "From") {
        anyhow::bail!("Prediction file missing From column");
    }

    let mut rows = Vec::new();
    for (row_index, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Malformed row {}", row_index))?;
        let mut row = PredictionRow {
            row_index,
            from_name: String::new(),
            score: None,
            gene_name_full: String::new(),
            extra: BTreeMap::new(),
        };
        for (header, value) in headers.iter().zip(record.iter()) {
            let value = value.trim();
            match header.as_str() {
                "From" => row.from_name = value.to_string(),
                "score" => row.score = parse_score(value),
                "Gene Name" => row.gene_name_full = value.to_string(),
                other => {
                    row.extra.insert(other.to_string(), value.to_string());
                }
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Numeric score or `None`; never an error.
pub fn parse_score(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|s| s.is_finite())
}
