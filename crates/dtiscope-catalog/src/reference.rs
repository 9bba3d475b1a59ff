//! Reference target table.
//!
//! Expected columns:
//! - gene_symbol: canonical identifier (required)
//! - gene_names_full: whitespace-separated alias names (required)
//! - gene_name, species, uniprot_id, protein_names, function_cc,
//!   subcellular_location_cc (optional)
//!
//! Any other column is kept in `extra`.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceRecord {
    pub gene_symbol: String,
    pub gene_names_full: String,
    pub gene_name: Option<String>,
    pub species: Option<String>,
    pub uniprot_id: Option<String>,
    pub protein_names: Option<String>,
    pub function_cc: Option<String>,
    pub subcellular_location_cc: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    records: Vec<ReferenceRecord>,
    /// gene_symbol → index of its first row.
    by_symbol: HashMap<String, usize>,
}

impl ReferenceTable {
    pub fn new(records: Vec<ReferenceRecord>) -> Self {
        let mut by_symbol = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            if by_symbol.contains_key(&record.gene_symbol) {
                warn!(gene_symbol = %record.gene_symbol, "Duplicate reference row ignored for lookups");
                continue;
            }
            by_symbol.insert(record.gene_symbol.clone(), idx);
        }
        Self { records, by_symbol }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open reference table {}", path.display()))?;
        let table = Self::from_reader(file)
            .with_context(|| format!("Failed to load reference table {}", path.display()))?;
        info!("Loaded reference table: {} targets from {}", table.len(), path.display());
        Ok(table)
    }

    /// Load the table, or an empty one when the file does not exist.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Reference table {} not found, targets will not be enriched", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .context("Reference table has no header row")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        for required in ["gene_symbol", "gene_names_full"] {
            if !headers.iter().any(|h| h == required) {
                anyhow::bail!("Reference table missing {} column", required);
            }
        }

        let mut records = Vec::new();
        for (row_idx, row) in rdr.records().enumerate() {
            let row = row.with_context(|| format!("Malformed reference row {}", row_idx))?;
            let mut record = ReferenceRecord::default();

            for (header, value) in headers.iter().zip(row.iter()) {
                let value = value.trim();
                let optional = || (!value.is_empty()).then(|| value.to_string());
                match header.as_str() {
                    "gene_symbol" => record.gene_symbol = value.to_string(),
                    "gene_names_full" => record.gene_names_full = value.to_string(),
                    "gene_name" => record.gene_name = optional(),
                    "species" => record.species = optional(),
                    "uniprot_id" => record.uniprot_id = optional(),
                    "protein_names" => record.protein_names = optional(),
                    "function_cc" => record.function_cc = optional(),
                    "subcellular_location_cc" => record.subcellular_location_cc = optional(),
                    other => {
                        record.extra.insert(other.to_string(), value.to_string());
                    }
                }
            }

            if record.gene_symbol.is_empty() {
                warn!("Skipping reference row {}: empty gene_symbol", row_idx);
                continue;
            }
            records.push(record);
        }

        Ok(Self::new(records))
    }

    pub fn get(&self, gene_symbol: &str) -> Option<&ReferenceRecord> {
        self.by_symbol.get(gene_symbol).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[ReferenceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_known_and_extra_columns() {
        let csv = "gene_symbol,gene_names_full,species,protein_names,ec_number\n\
                   CYP3A4,CYP3A4 CYP3A,Homo sapiens,Cytochrome P450 3A4,1.14.14.1\n\
                   ,orphan,,,\n\
                   PTGS2,PTGS2 COX2,,,\n";
        let table = ReferenceTable::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(table.len(), 2);
        let cyp = table.get("CYP3A4").unwrap();
        assert_eq!(cyp.species.as_deref(), Some("Homo sapiens"));
        assert_eq!(cyp.extra.get("ec_number").map(String::as_str), Some("1.14.14.1"));
        assert_eq!(table.get("PTGS2").unwrap().species, None);
    }

    #[test]
    fn test_requires_symbol_and_alias_columns() {
        let err = ReferenceTable::from_reader("gene_symbol,species\nX,Y\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("gene_names_full"));
    }

    #[test]
    fn test_first_duplicate_row_wins_lookup() {
        let csv = "gene_symbol,gene_names_full,species\nA,A,first\nA,A,second\n";
        let table = ReferenceTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.get("A").unwrap().species.as_deref(), Some("first"));
    }

    #[test]
    fn test_missing_file_yields_empty_table() {
        let table = ReferenceTable::load_or_empty(Path::new("/nonexistent/targets.csv")).unwrap();
        assert!(table.is_empty());
    }
}
