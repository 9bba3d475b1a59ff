//! Protein panel: the fixed set of targets every job scores against.
//!
//! Expected columns:
//! - protein: display name
//! - gene: gene symbol (canonical target identifier)
//! - sequence: amino-acid sequence
//! - id: external protein id (optional; the row index is used when absent)

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelTarget {
    pub protein_id: String,
    pub name: String,
    pub gene: String,
    pub sequence: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProteinPanel {
    targets: Vec<PanelTarget>,
}

impl ProteinPanel {
    /// Load the panel from a CSV file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open protein panel {}", path.display()))?;
        let panel = Self::from_reader(file)
            .with_context(|| format!("Failed to load protein panel {}", path.display()))?;
        info!("Loaded protein panel: {} targets from {}", panel.len(), path.display());
        Ok(panel)
    }

    /// [`ProteinPanel::load`] on the blocking pool.
    pub async fn load_async(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::load(&path))
            .await
            .context("Panel loading task panicked")?
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers = rdr.headers().context("Panel has no header row")?.clone();
        let col = |name: &str| headers.iter().position(|h| h.trim() == name);

        let protein_idx = col("protein").ok_or_else(|| anyhow::anyhow!("Panel missing protein column"))?;
        let gene_idx = col("gene").ok_or_else(|| anyhow::anyhow!("Panel missing gene column"))?;
        let sequence_idx = col("sequence").ok_or_else(|| anyhow::anyhow!("Panel missing sequence column"))?;
        let id_idx = col("id");

        let mut targets = Vec::new();
        for (row_idx, record) in rdr.records().enumerate() {
            let record = record.with_context(|| format!("Malformed panel row {}", row_idx))?;
            let field = |i: usize| record.get(i).unwrap_or("").trim().to_string();

            let sequence = field(sequence_idx);
            if sequence.is_empty() {
                warn!("Skipping panel row {} ({}): empty sequence", row_idx, field(protein_idx));
                continue;
            }

            let protein_id = id_idx
                .map(field)
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| row_idx.to_string());

            targets.push(PanelTarget {
                protein_id,
                name: field(protein_idx),
                gene: field(gene_idx),
                sequence,
            });
        }

        if targets.is_empty() {
            anyhow::bail!("Protein panel contains no usable targets");
        }
        Ok(Self { targets })
    }

    pub fn targets(&self) -> &[PanelTarget] {
        &self.targets
    }

    pub fn iter(&self) -> impl Iterator<Item = &PanelTarget> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
