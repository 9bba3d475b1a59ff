//! Temporary on-disk data sets: reference table, protein panel, prediction
//! corpus, compound table and batch uploads.

use std::path::{Path, PathBuf};

use dtiscope_common::config::PartitionConfig;
use dtiscope_common::Settings;
use tempfile::TempDir;

/// Write a CSV file with a header row.
pub fn write_csv(path: &Path, headers: &[&str], rows: &[Vec<&str>]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture directory");
    }
    let mut wtr = csv::Writer::from_path(path).expect("create fixture csv");
    wtr.write_record(headers).expect("write header");
    for row in rows {
        wtr.write_record(row).expect("write row");
    }
    wtr.flush().expect("flush fixture csv");
}

/// A temporary data directory plus [`Settings`] pointing into it.
///
/// Partitions are empty until added with [`TestData::with_partition`].
pub struct TestData {
    dir: TempDir,
    settings: Settings,
}

impl TestData {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let root = dir.path();

        let mut settings = Settings::default();
        settings.server.upload_dir = root.join("uploads");
        settings.data.compounds_file = root.join("compounds.csv");
        settings.data.targets_file = root.join("targets.csv");
        settings.data.panel_file = root.join("panel.csv");
        settings.data.partitions.clear();
        settings.prediction.unit_pause_ms = 0;
        settings.prediction.batch_unit_pause_ms = 0;

        Self { dir, settings }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn settings(&self) -> Settings {
        self.settings.clone()
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Reference table rows as `(gene_symbol, gene_names_full)`.
    pub fn with_reference(self, rows: &[(&str, &str)]) -> Self {
        let rows: Vec<Vec<&str>> = rows.iter().map(|(s, a)| vec![*s, *a]).collect();
        self.with_reference_table(&["gene_symbol", "gene_names_full"], &rows)
    }

    /// Reference table with arbitrary columns.
    pub fn with_reference_table(self, headers: &[&str], rows: &[Vec<&str>]) -> Self {
        write_csv(&self.settings.data.targets_file, headers, rows);
        self
    }

    /// Panel rows as `(protein, gene, sequence)`.
    pub fn with_panel(self, rows: &[(&str, &str, &str)]) -> Self {
        let rows: Vec<Vec<&str>> = rows.iter().map(|(p, g, s)| vec![*p, *g, *s]).collect();
        write_csv(&self.settings.data.panel_file, &["protein", "gene", "sequence"], &rows);
        self
    }

    pub fn with_partition(mut self, compound_type: &str, prefix: &str) -> Self {
        let dir = self.dir.path().join(prefix);
        std::fs::create_dir_all(&dir).expect("create partition dir");
        self.settings.data.partitions.push(PartitionConfig {
            compound_type: compound_type.to_string(),
            dir,
            prefix: prefix.to_string(),
        });
        self
    }

    /// One per-compound prediction file with rows `(From, score)`.
    pub fn with_predictions(self, compound_type: &str, compound_id: &str, rows: &[(&str, &str)]) -> Self {
        let rows: Vec<Vec<&str>> = rows.iter().map(|(f, s)| vec![*f, *s, *f]).collect();
        let path = self.prediction_path(compound_type, compound_id);
        write_csv(&path, &["From", "score", "Gene Name"], &rows);
        self
    }

    /// Raw file contents in a partition, for malformed-input cases.
    pub fn with_raw_file(self, compound_type: &str, file_name: &str, contents: &[u8]) -> Self {
        let partition = self.partition(compound_type);
        std::fs::write(partition.dir.join(file_name), contents).expect("write raw file");
        self
    }

    pub fn with_compounds(self, headers: &[&str], rows: &[Vec<&str>]) -> Self {
        write_csv(&self.settings.data.compounds_file, headers, rows);
        self
    }

    /// Write a batch upload and return its path.
    pub fn batch_table(&self, name: &str, headers: &[&str], rows: &[Vec<&str>]) -> PathBuf {
        let path = self.dir.path().join("uploads").join(name);
        write_csv(&path, headers, rows);
        path
    }

    pub fn prediction_path(&self, compound_type: &str, compound_id: &str) -> PathBuf {
        let partition = self.partition(compound_type);
        partition.dir.join(format!("{}{}.csv", partition.prefix, compound_id))
    }

    fn partition(&self, compound_type: &str) -> &PartitionConfig {
        self.settings
            .data
            .partitions
            .iter()
            .find(|p| p.compound_type == compound_type)
            .unwrap_or_else(|| panic!("partition {compound_type} not registered"))
    }
}

impl Default for TestData {
    fn default() -> Self {
        Self::new()
    }
}
