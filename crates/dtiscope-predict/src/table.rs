//! Uploaded batch tables.
//!
//! Only the structure column and the optional id column are read; any other
//! columns are ignored.

use std::path::Path;

use anyhow::{Context, Result};

/// One compound row that carries a structure string.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    /// Zero-based data row in the uploaded file.
    pub row_index: usize,
    pub compound_id: String,
    pub smiles: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchTable {
    /// Every data row in the file, including rows with an empty structure cell.
    pub total_rows: usize,
    /// Rows with a non-empty structure cell, in file order.
    pub rows: Vec<BatchRow>,
}

/// Header row of a CSV file.
pub fn read_headers(path: &Path) -> Result<Vec<String>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = rdr.headers().context("Failed to read CSV header")?;
    Ok(headers.iter().map(|h| h.trim().to_string()).collect())
}

/// Read the compound rows of a batch upload.
///
/// Rows whose id cell is empty (or that have no id column) are labelled
/// `compound_{row}`.
pub fn read_batch_table(path: &Path, smiles_column: &str, id_column: Option<&str>) -> Result<BatchTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = rdr.headers().context("Failed to read CSV header")?.clone();
    let col = |name: &str| headers.iter().position(|h| h.trim() == name);

    let smiles_idx = col(smiles_column)
        .ok_or_else(|| anyhow::anyhow!("Column \"{}\" not found", smiles_column))?;
    let id_idx = match id_column {
        Some(name) => Some(col(name).ok_or_else(|| anyhow::anyhow!("Column \"{}\" not found", name))?),
        None => None,
    };

    let mut table = BatchTable::default();
    for (row_index, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Malformed row {}", row_index))?;
        table.total_rows += 1;

        let smiles = record.get(smiles_idx).unwrap_or("").trim();
        if smiles.is_empty() {
            continue;
        }
        let compound_id = id_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("compound_{}", row_index));

        table.rows.push(BatchRow { row_index, compound_id, smiles: smiles.to_string() });
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_reads_rows_and_labels_missing_ids() {
        let f = write_csv("name,smiles,mw\naspirin,CC(=O)OC1=CC=CC=C1C(=O)O,180.2\n,CCO,46.1\nblank,,0\n");
        let table = read_batch_table(f.path(), "smiles", Some("name")).unwrap();

        assert_eq!(table.total_rows, 3);
        assert_eq!(
            table.rows,
            vec![
                BatchRow { row_index: 0, compound_id: "aspirin".into(), smiles: "CC(=O)OC1=CC=CC=C1C(=O)O".into() },
                BatchRow { row_index: 1, compound_id: "compound_1".into(), smiles: "CCO".into() },
            ]
        );
    }

    #[test]
    fn test_missing_columns_are_errors() {
        let f = write_csv("name,structure\na,CCO\n");
        assert!(read_batch_table(f.path(), "smiles", None).is_err());
        assert!(read_batch_table(f.path(), "structure", Some("id")).is_err());
        assert_eq!(read_headers(f.path()).unwrap(), vec!["name", "structure"]);
    }
}
