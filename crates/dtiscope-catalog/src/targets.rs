//! Target queries over the prediction corpus.
//!
//! The aggregated corpus is cached and rebuilt whenever a prediction file
//! is added, removed or rewritten. All lookups accept aliases.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::{aggregate, TargetRecord};
use crate::alias::AliasMap;
use crate::compounds::{CompoundCatalog, CompoundRecord};
use crate::corpus::{CompoundPredictions, CorpusFingerprint, PredictionCorpus};
use crate::pagination::{paginate, Page, PageInfo, SortOrder};
use crate::reference::{ReferenceRecord, ReferenceTable};

/// Targets shown by the statistics view.
const TOP_TARGETS: usize = 10;

// ── Result shapes ─────────────────────────────────────────────────────────────

/// Row shape of the target list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSummary {
    pub gene_name: String,
    pub gene_symbol: String,
    pub species: String,
    pub prediction_count: usize,
    pub compound_count: usize,
    /// Rounded to four decimals.
    pub avg_score: f64,
    pub uniprot_id: String,
    pub protein_names: String,
}

impl From<&TargetRecord> for TargetSummary {
    fn from(t: &TargetRecord) -> Self {
        Self {
            gene_name: t.gene_name.clone(),
            gene_symbol: t.gene_symbol.clone(),
            species: t.species.clone(),
            prediction_count: t.prediction_count,
            compound_count: t.compound_count,
            avg_score: (t.avg_score * 10_000.0).round() / 10_000.0,
            uniprot_id: t.accession_id.clone(),
            protein_names: t.protein_names.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopTarget {
    pub gene_name: String,
    pub gene_symbol: String,
    pub prediction_count: usize,
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStatistics {
    pub total_targets: usize,
    pub species_distribution: std::collections::BTreeMap<String, usize>,
    pub top_predicted_targets: Vec<TopTarget>,
}

/// A target found by name: the reference row when there is one,
/// otherwise the aggregated record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TargetLookup {
    Reference {
        #[serde(flatten)]
        record: ReferenceRecord,
        queried_name: String,
        mapped_symbol: String,
    },
    Aggregated(TargetRecord),
}

impl TargetLookup {
    pub fn gene_symbol(&self) -> &str {
        match self {
            TargetLookup::Reference { record, .. } => &record.gene_symbol,
            TargetLookup::Aggregated(t) => &t.gene_symbol,
        }
    }

    pub fn gene_name(&self) -> &str {
        match self {
            TargetLookup::Reference { record, .. } => record.gene_name.as_deref().unwrap_or(&record.gene_symbol),
            TargetLookup::Aggregated(t) => &t.gene_name,
        }
    }

    pub fn protein_names(&self) -> Option<&str> {
        match self {
            TargetLookup::Reference { record, .. } => record.protein_names.as_deref(),
            TargetLookup::Aggregated(t) => Some(t.protein_names.as_str()).filter(|s| !s.is_empty()),
        }
    }
}

/// One prediction row that names a target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundHit {
    pub compound_id: String,
    pub compound_type: String,
    pub score: Option<f64>,
    pub from_name: String,
    pub gene_name_full: String,
    pub source_file: String,
}

/// A [`CompoundHit`] joined with the compound catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssociatedCompound {
    #[serde(flatten)]
    pub hit: CompoundHit,
    pub global_id: u64,
    pub chinese_name: String,
    pub molecular_formula: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetDetail {
    #[serde(flatten)]
    pub target: TargetLookup,
    pub associated_compounds: Vec<AssociatedCompound>,
    pub associated_compounds_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetInfo {
    pub gene_name: String,
    pub gene_symbol: String,
    pub protein_names: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetCompounds {
    pub target_info: TargetInfo,
    pub compounds: Vec<AssociatedCompound>,
    pub total: usize,
}

/// One scored target of a single compound, with reference metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundTarget {
    pub from_name: String,
    pub score: Option<f64>,
    pub gene_name_full: String,
    pub gene_symbol: Option<String>,
    pub gene_name: Option<String>,
    pub species: Option<String>,
    pub uniprot_id: Option<String>,
    pub protein_names: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundTargetStatistics {
    pub total: usize,
    pub avg_score: f64,
    pub score_range: ScoreRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundTargets {
    pub targets: Vec<CompoundTarget>,
    pub statistics: CompoundTargetStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundTargetsPage {
    pub compound_info: CompoundRecord,
    pub targets: Vec<CompoundTarget>,
    pub statistics: CompoundTargetStatistics,
    pub pagination: PageInfo,
}

// ── Queries ───────────────────────────────────────────────────────────────────

/// Sortable target list columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSort {
    PredictionCount,
    AvgScore,
    MaxScore,
    CompoundCount,
    GeneSymbol,
}

impl TargetSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "prediction_count" => Some(TargetSort::PredictionCount),
            "avg_score" => Some(TargetSort::AvgScore),
            "max_score" => Some(TargetSort::MaxScore),
            "compound_count" => Some(TargetSort::CompoundCount),
            "gene_symbol" => Some(TargetSort::GeneSymbol),
            _ => None,
        }
    }

    fn compare(self, a: &TargetRecord, b: &TargetRecord) -> std::cmp::Ordering {
        match self {
            TargetSort::PredictionCount => a.prediction_count.cmp(&b.prediction_count),
            TargetSort::AvgScore => a.avg_score.total_cmp(&b.avg_score),
            TargetSort::MaxScore => a.max_score.total_cmp(&b.max_score),
            TargetSort::CompoundCount => a.compound_count.cmp(&b.compound_count),
            TargetSort::GeneSymbol => a.gene_symbol.cmp(&b.gene_symbol),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetQuery {
    pub search: Option<String>,
    /// Column name; unknown columns keep symbol order.
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub page: usize,
    pub page_size: usize,
}

impl Default for TargetQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort_by: "prediction_count".to_string(),
            sort_order: SortOrder::Desc,
            page: 1,
            page_size: 20,
        }
    }
}

fn matches_search(target: &TargetRecord, needle: &str) -> bool {
    [
        &target.gene_name,
        &target.gene_symbol,
        &target.protein_names,
        &target.function_description,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle))
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Corpus contents and their aggregation, computed together.
#[derive(Debug)]
struct CorpusSnapshot {
    fingerprint: CorpusFingerprint,
    files: Vec<CompoundPredictions>,
    targets: Vec<TargetRecord>,
}

pub struct TargetService {
    reference: ReferenceTable,
    aliases: AliasMap,
    corpus: PredictionCorpus,
    compounds: Arc<CompoundCatalog>,
    max_page_size: usize,
    snapshot: RwLock<Option<Arc<CorpusSnapshot>>>,
}

impl TargetService {
    pub fn new(
        reference: ReferenceTable,
        aliases: AliasMap,
        corpus: PredictionCorpus,
        compounds: Arc<CompoundCatalog>,
        max_page_size: usize,
    ) -> Self {
        Self {
            reference,
            aliases,
            corpus,
            compounds,
            max_page_size,
            snapshot: RwLock::new(None),
        }
    }

    /// Aggregation of the corpus as it is on disk now.
    ///
    /// The cached snapshot is reused while the corpus fingerprint is
    /// unchanged.
    fn snapshot(&self) -> Arc<CorpusSnapshot> {
        let fingerprint = self.corpus.fingerprint();
        let current = |slot: &Option<Arc<CorpusSnapshot>>| {
            slot.as_ref().filter(|s| s.fingerprint == fingerprint).map(Arc::clone)
        };

        if let Some(snapshot) = current(&*self.snapshot.read().unwrap_or_else(|e| e.into_inner())) {
            return snapshot;
        }
        let mut slot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        if let Some(snapshot) = current(&*slot) {
            return snapshot;
        }
        if slot.is_some() {
            debug!("Prediction corpus changed on disk, re-aggregating");
        }
        let snapshot = Arc::new(self.build_snapshot(fingerprint.clone()));
        *slot = Some(Arc::clone(&snapshot));
        snapshot
    }

    #[instrument(skip_all)]
    fn build_snapshot(&self, fingerprint: CorpusFingerprint) -> CorpusSnapshot {
        let files = self.corpus.scan();
        let targets = aggregate(&files, &self.aliases, &self.reference);
        info!("Aggregated {} targets from {} prediction files", targets.len(), files.len());
        CorpusSnapshot { fingerprint, files, targets }
    }

    /// Search, sort and paginate the aggregated targets.
    pub fn list_targets(&self, query: &TargetQuery) -> Page<TargetSummary> {
        let snapshot = self.snapshot();
        let needle = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut targets: Vec<&TargetRecord> = snapshot
            .targets
            .iter()
            .filter(|t| needle.as_deref().map_or(true, |n| matches_search(t, n)))
            .collect();
        if let Some(sort) = TargetSort::parse(&query.sort_by) {
            targets.sort_by(|a, b| query.sort_order.apply(sort.compare(a, b)));
        }

        paginate(targets, query.page, query.page_size, self.max_page_size).map(TargetSummary::from)
    }

    pub fn statistics(&self) -> TargetStatistics {
        let snapshot = self.snapshot();
        let mut species_distribution = std::collections::BTreeMap::new();
        for t in &snapshot.targets {
            *species_distribution.entry(t.species.clone()).or_insert(0) += 1;
        }

        let mut ranked: Vec<&TargetRecord> = snapshot.targets.iter().collect();
        ranked.sort_by(|a, b| b.prediction_count.cmp(&a.prediction_count));
        let top_predicted_targets = ranked
            .into_iter()
            .take(TOP_TARGETS)
            .map(|t| TopTarget {
                gene_name: t.gene_name.clone(),
                gene_symbol: t.gene_symbol.clone(),
                prediction_count: t.prediction_count,
                avg_score: t.avg_score,
            })
            .collect();

        TargetStatistics {
            total_targets: snapshot.targets.len(),
            species_distribution,
            top_predicted_targets,
        }
    }

    /// Find a target by symbol or alias.
    pub fn get_target_by_name(&self, name: &str) -> Option<TargetLookup> {
        let symbol = self.aliases.resolve_or_self(name);
        if let Some(record) = self.reference.get(symbol) {
            return Some(TargetLookup::Reference {
                record: record.clone(),
                queried_name: name.to_string(),
                mapped_symbol: symbol.to_string(),
            });
        }
        self.snapshot()
            .targets
            .iter()
            .find(|t| t.gene_symbol == symbol)
            .cloned()
            .map(TargetLookup::Aggregated)
    }

    /// Every prediction row naming the target, by raw name or canonical symbol.
    pub fn get_compounds_by_target(&self, name: &str) -> Vec<CompoundHit> {
        let name = name.trim();
        let symbol = self.aliases.resolve_or_self(name);
        let snapshot = self.snapshot();

        let mut hits = Vec::new();
        for file in &snapshot.files {
            for row in &file.rows {
                let matched = row.from_name == name || self.aliases.resolve(&row.from_name) == Some(symbol);
                if matched {
                    hits.push(CompoundHit {
                        compound_id: file.compound_id.clone(),
                        compound_type: file.compound_type.clone(),
                        score: row.score,
                        from_name: row.from_name.clone(),
                        gene_name_full: row.gene_name_full.clone(),
                        source_file: file.source_file.clone(),
                    });
                }
            }
        }
        hits
    }

    /// Target lookup plus its compounds, joined with the compound catalog.
    ///
    /// Hits whose compound is not in the catalog are left out.
    pub fn get_target_detail(&self, name: &str) -> Option<TargetDetail> {
        let target = self.get_target_by_name(name)?;
        let mut associated_compounds: Vec<AssociatedCompound> = self
            .get_compounds_by_target(name)
            .into_iter()
            .filter_map(|hit| {
                let compound = self.compounds.find_local(&hit.compound_type, &hit.compound_id)?;
                Some(AssociatedCompound {
                    global_id: compound.global_id,
                    chinese_name: compound.chinese_name.clone(),
                    molecular_formula: compound.molecular_formula.clone(),
                    hit,
                })
            })
            .collect();
        associated_compounds.sort_by(|a, b| compare_scores_desc(a.hit.score, b.hit.score));

        Some(TargetDetail {
            associated_compounds_count: associated_compounds.len(),
            associated_compounds,
            target,
        })
    }

    /// Compounds of a target, best score first.
    pub fn get_target_compounds(&self, name: &str) -> Option<TargetCompounds> {
        let detail = self.get_target_detail(name)?;
        Some(TargetCompounds {
            target_info: TargetInfo {
                gene_name: detail.target.gene_name().to_string(),
                gene_symbol: detail.target.gene_symbol().to_string(),
                protein_names: detail.target.protein_names().map(str::to_string),
            },
            total: detail.associated_compounds.len(),
            compounds: detail.associated_compounds,
        })
    }

    /// Scored targets of one compound, in file order.
    pub fn get_compound_targets(&self, compound_type: &str, compound_id: &str) -> CompoundTargets {
        let rows = match self.corpus.load_compound(compound_type, compound_id) {
            Ok(Some(file)) => file.rows,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(compound_type, compound_id, error = %format!("{e:#}"), "Prediction file unreadable");
                Vec::new()
            }
        };

        let targets: Vec<CompoundTarget> = rows
            .into_iter()
            .map(|row| {
                let gene_symbol = self.aliases.resolve(&row.from_name).map(str::to_string);
                let meta = gene_symbol.as_deref().and_then(|s| self.reference.get(s));
                CompoundTarget {
                    gene_name: meta.and_then(|m| m.gene_name.clone()),
                    species: meta.and_then(|m| m.species.clone()),
                    uniprot_id: meta.and_then(|m| m.uniprot_id.clone()),
                    protein_names: meta.and_then(|m| m.protein_names.clone()),
                    gene_symbol,
                    from_name: row.from_name,
                    score: row.score,
                    gene_name_full: row.gene_name_full,
                }
            })
            .collect();

        let scores: Vec<f64> = targets.iter().filter_map(|t| t.score).collect();
        let statistics = CompoundTargetStatistics {
            total: targets.len(),
            avg_score: if scores.is_empty() { 0.0 } else { scores.iter().sum::<f64>() / scores.len() as f64 },
            score_range: ScoreRange {
                min: scores.iter().copied().reduce(f64::min).unwrap_or(0.0),
                max: scores.iter().copied().reduce(f64::max).unwrap_or(0.0),
            },
        };
        CompoundTargets { targets, statistics }
    }

    /// Paginated targets of a compound looked up by global id.
    pub fn compound_targets_page(&self, global_id: u64, page: usize, page_size: usize) -> Option<CompoundTargetsPage> {
        let compound = self.compounds.get(global_id)?.clone();
        let CompoundTargets { targets, statistics } =
            self.get_compound_targets(&compound.compound_type, &compound.id);
        let page = paginate(targets, page, page_size, self.max_page_size);
        Some(CompoundTargetsPage {
            compound_info: compound,
            targets: page.items,
            statistics,
            pagination: page.pagination,
        })
    }
}

/// Missing scores sort last.
fn compare_scores_desc(a: Option<f64>, b: Option<f64>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
