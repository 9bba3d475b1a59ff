//! Corpus-wide target aggregation.
//!
//! Two stages: scores are grouped per canonical symbol into [`TargetStats`],
//! then reference metadata is merged into named [`TargetRecord`] fields.
//! Computed statistics never share a field with reference data.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::alias::AliasMap;
use crate::corpus::CompoundPredictions;
use crate::reference::ReferenceTable;

pub const DEFAULT_SPECIES: &str = "Homo sapiens";

/// One canonical target across the whole corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetRecord {
    pub gene_symbol: String,
    /// Reference `gene_name`, else the symbol.
    pub gene_name: String,
    /// Raw name of the first contributing row.
    pub from_name: String,
    pub compound_types: Vec<String>,
    pub compound_type_count: usize,
    pub avg_score: f64,
    pub max_score: f64,
    pub min_score: f64,
    pub score_std: Option<f64>,
    pub prediction_count: usize,
    pub compound_count: usize,
    pub species: String,
    pub protein_names: String,
    #[serde(rename = "function_cc")]
    pub function_description: String,
    #[serde(rename = "uniprot_id")]
    pub accession_id: String,
    #[serde(rename = "subcellular_location_cc")]
    pub subcellular_location: String,
}

/// Score statistics for one canonical symbol, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetStats {
    pub gene_symbol: String,
    pub from_name: String,
    pub compound_types: BTreeSet<String>,
    pub scores: Vec<f64>,
    pub source_files: HashSet<(String, String)>,
}

impl TargetStats {
    fn new(gene_symbol: &str, from_name: &str) -> Self {
        Self {
            gene_symbol: gene_symbol.to_string(),
            from_name: from_name.to_string(),
            compound_types: BTreeSet::new(),
            scores: Vec::new(),
            source_files: HashSet::new(),
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.iter().sum::<f64>() / self.scores.len() as f64)
    }

    /// Sample standard deviation; needs at least two scores.
    pub fn std_dev(&self) -> Option<f64> {
        let n = self.scores.len();
        if n < 2 {
            return None;
        }
        let mean = self.mean()?;
        let var = self.scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some(var.sqrt())
    }

    pub fn max(&self) -> Option<f64> {
        self.scores.iter().copied().reduce(f64::max)
    }

    pub fn min(&self) -> Option<f64> {
        self.scores.iter().copied().reduce(f64::min)
    }
}

/// Group every resolvable row of the corpus by canonical symbol.
///
/// Rows are visited in (compound type, source file, row) order whatever the
/// input order, so the representative name and the score sums are stable.
/// Rows whose name does not resolve are left out.
pub fn group_scores(files: &[CompoundPredictions], aliases: &AliasMap) -> BTreeMap<String, TargetStats> {
    let mut ordered: Vec<&CompoundPredictions> = files.iter().collect();
    ordered.sort_by(|a, b| {
        (a.compound_type.as_str(), a.source_file.as_str()).cmp(&(b.compound_type.as_str(), b.source_file.as_str()))
    });

    let mut groups: BTreeMap<String, TargetStats> = BTreeMap::new();
    for file in ordered {
        let mut rows: Vec<_> = file.rows.iter().collect();
        rows.sort_by_key(|r| r.row_index);

        for row in rows {
            let Some(symbol) = aliases.resolve(&row.from_name) else {
                continue;
            };
            let stats = groups
                .entry(symbol.to_string())
                .or_insert_with(|| TargetStats::new(symbol, &row.from_name));
            stats.compound_types.insert(file.compound_type.clone());
            stats
                .source_files
                .insert((file.compound_type.clone(), file.source_file.clone()));
            if let Some(score) = row.score {
                stats.scores.push(score);
            }
        }
    }
    groups
}

/// Merge reference metadata into grouped statistics.
pub fn enrich(stats: TargetStats, reference: &ReferenceTable) -> TargetRecord {
    let meta = reference.get(&stats.gene_symbol);
    let text = |value: Option<&String>| value.filter(|v| !v.is_empty()).cloned();

    TargetRecord {
        gene_name: text(meta.and_then(|m| m.gene_name.as_ref())).unwrap_or_else(|| stats.gene_symbol.clone()),
        species: text(meta.and_then(|m| m.species.as_ref())).unwrap_or_else(|| DEFAULT_SPECIES.to_string()),
        protein_names: text(meta.and_then(|m| m.protein_names.as_ref())).unwrap_or_default(),
        function_description: text(meta.and_then(|m| m.function_cc.as_ref())).unwrap_or_default(),
        accession_id: text(meta.and_then(|m| m.uniprot_id.as_ref())).unwrap_or_default(),
        subcellular_location: text(meta.and_then(|m| m.subcellular_location_cc.as_ref())).unwrap_or_default(),
        avg_score: stats.mean().unwrap_or(0.0),
        max_score: stats.max().unwrap_or(0.0),
        min_score: stats.min().unwrap_or(0.0),
        score_std: stats.std_dev(),
        prediction_count: stats.scores.len(),
        compound_count: stats.source_files.len(),
        compound_type_count: stats.compound_types.len(),
        compound_types: stats.compound_types.into_iter().collect(),
        from_name: stats.from_name,
        gene_symbol: stats.gene_symbol,
    }
}

/// One [`TargetRecord`] per canonical symbol, sorted by symbol.
pub fn aggregate(files: &[CompoundPredictions], aliases: &AliasMap, reference: &ReferenceTable) -> Vec<TargetRecord> {
    group_scores(files, aliases)
        .into_values()
        .map(|stats| enrich(stats, reference))
        .collect()
}
