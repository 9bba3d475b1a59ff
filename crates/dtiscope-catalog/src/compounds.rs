//! Compound catalog.
//!
//! Expected columns of the compound table:
//! - global_id: integer identifier, unique across compound types (required)
//! - id: identifier within its compound type, matches prediction file names
//! - chinese_name, Name, compound_type, Molecular_Formula, Molecular_Weight,
//!   SMILES, Compound_CID
//!
//! Other columns are kept as extras, with `-` in their names replaced by `_`
//! (`H-Bond_Donor_Count` becomes `H_Bond_Donor_Count`).

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::pagination::{paginate, Page, SortOrder};

/// Upper bound on [`CompoundCatalog::search`] results.
pub const SEARCH_LIMIT: usize = 100;

const FIXED_COLUMNS: [&str; 9] = [
    "global_id",
    "id",
    "chinese_name",
    "Name",
    "compound_type",
    "Molecular_Formula",
    "Molecular_Weight",
    "SMILES",
    "Compound_CID",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompoundRecord {
    pub global_id: u64,
    pub id: String,
    pub chinese_name: String,
    #[serde(rename = "Name")]
    pub name: String,
    pub compound_type: String,
    #[serde(rename = "Molecular_Formula")]
    pub molecular_formula: String,
    #[serde(rename = "Molecular_Weight")]
    pub molecular_weight: Option<f64>,
    #[serde(rename = "SMILES")]
    pub smiles: String,
    #[serde(rename = "Compound_CID")]
    pub compound_cid: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// Row shape of the compound list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundSummary {
    pub global_id: u64,
    pub id: String,
    pub chinese_name: String,
    #[serde(rename = "Name")]
    pub name: String,
    pub compound_type: String,
    #[serde(rename = "Molecular_Formula")]
    pub molecular_formula: String,
    /// Rounded to two decimals.
    #[serde(rename = "Molecular_Weight")]
    pub molecular_weight: Option<f64>,
    #[serde(rename = "SMILES")]
    pub smiles: String,
    #[serde(rename = "Compound_CID")]
    pub compound_cid: Option<String>,
}

impl From<&CompoundRecord> for CompoundSummary {
    fn from(c: &CompoundRecord) -> Self {
        Self {
            global_id: c.global_id,
            id: c.id.clone(),
            chinese_name: c.chinese_name.clone(),
            name: c.name.clone(),
            compound_type: c.compound_type.clone(),
            molecular_formula: c.molecular_formula.clone(),
            molecular_weight: c.molecular_weight.map(|w| (w * 100.0).round() / 100.0),
            smiles: c.smiles.clone(),
            compound_cid: c.compound_cid.clone(),
        }
    }
}

/// Row shape of quick search results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundSearchHit {
    pub global_id: u64,
    pub chinese_name: String,
    #[serde(rename = "Name")]
    pub name: String,
    pub compound_type: String,
    #[serde(rename = "Molecular_Formula")]
    pub molecular_formula: String,
    #[serde(rename = "Molecular_Weight")]
    pub molecular_weight: Option<f64>,
}

impl From<&CompoundRecord> for CompoundSearchHit {
    fn from(c: &CompoundRecord) -> Self {
        Self {
            global_id: c.global_id,
            chinese_name: c.chinese_name.clone(),
            name: c.name.clone(),
            compound_type: c.compound_type.clone(),
            molecular_formula: c.molecular_formula.clone(),
            molecular_weight: c.molecular_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundStatistics {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub with_smiles: usize,
    pub with_pubchem_id: usize,
}

/// Which fields a quick search looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchField {
    #[default]
    All,
    Name,
    Formula,
    Smiles,
}

impl SearchField {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => SearchField::Name,
            "formula" => SearchField::Formula,
            "smiles" => SearchField::Smiles,
            _ => SearchField::All,
        }
    }
}

/// Filters and ordering for [`CompoundCatalog::query`].
#[derive(Debug, Clone)]
pub struct CompoundQuery {
    /// `None` or `"all"` disables the type filter.
    pub compound_type: Option<String>,
    pub search: Option<String>,
    pub sort_by: String,
    pub sort_order: SortOrder,
}

impl Default for CompoundQuery {
    fn default() -> Self {
        Self {
            compound_type: None,
            search: None,
            sort_by: "global_id".to_string(),
            sort_order: SortOrder::Asc,
        }
    }
}

#[derive(Debug, PartialEq, PartialOrd)]
enum SortValue<'a> {
    Num(f64),
    Text(&'a str),
}

impl CompoundRecord {
    fn matches(&self, needle: &str, field: SearchField) -> bool {
        let contains = |haystack: &str| haystack.to_lowercase().contains(needle);
        match field {
            SearchField::All => {
                contains(&self.chinese_name)
                    || contains(&self.name)
                    || contains(&self.molecular_formula)
                    || contains(&self.smiles)
            }
            SearchField::Name => contains(&self.chinese_name) || contains(&self.name),
            SearchField::Formula => contains(&self.molecular_formula),
            SearchField::Smiles => contains(&self.smiles),
        }
    }

    /// `None` for an empty or absent cell.
    fn sort_value(&self, column: &str) -> Option<SortValue<'_>> {
        match column {
            "global_id" => Some(SortValue::Num(self.global_id as f64)),
            "Molecular_Weight" => self.molecular_weight.map(SortValue::Num),
            "id" => text_value(&self.id),
            "chinese_name" => text_value(&self.chinese_name),
            "Name" => text_value(&self.name),
            "compound_type" => text_value(&self.compound_type),
            "Molecular_Formula" => text_value(&self.molecular_formula),
            "SMILES" => text_value(&self.smiles),
            "Compound_CID" => self.compound_cid.as_deref().and_then(text_value),
            other => self.extra.get(other).and_then(|v| text_value(v)),
        }
    }
}

fn text_value(s: &str) -> Option<SortValue<'_>> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else if let Ok(n) = s.parse::<f64>() {
        Some(SortValue::Num(n))
    } else {
        Some(SortValue::Text(s))
    }
}

/// Empty cells sort last in either direction.
fn compare_values(a: Option<SortValue<'_>>, b: Option<SortValue<'_>>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => order.apply(a.partial_cmp(&b).unwrap_or(Ordering::Equal)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompoundCatalog {
    records: Vec<CompoundRecord>,
    by_global_id: HashMap<u64, usize>,
    /// (compound_type, local id) → index.
    by_local_id: HashMap<(String, String), usize>,
    /// Names of the table's extra columns, as stored in `extra`.
    extra_columns: BTreeSet<String>,
}

impl CompoundCatalog {
    pub fn new(records: Vec<CompoundRecord>) -> Self {
        let mut by_global_id = HashMap::new();
        let mut by_local_id = HashMap::new();
        let mut extra_columns = BTreeSet::new();
        for (idx, record) in records.iter().enumerate() {
            extra_columns.extend(record.extra.keys().cloned());
            if by_global_id.insert(record.global_id, idx).is_some() {
                warn!(global_id = record.global_id, "Duplicate compound global_id, keeping the last row");
            }
            by_local_id
                .entry((record.compound_type.clone(), record.id.clone()))
                .or_insert(idx);
        }
        Self { records, by_global_id, by_local_id, extra_columns }
    }

    /// Load the compound table. A missing file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Compound table {} not readable", path.display()))?;
        let catalog = Self::from_reader(file)
            .with_context(|| format!("Failed to load compound table {}", path.display()))?;
        info!("Loaded compound catalog: {} compounds from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .context("Compound table has no header row")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if !headers.iter().any(|h| h == "global_id") {
            anyhow::bail!("Compound table missing global_id column");
        }

        let mut records = Vec::new();
        for (row_idx, row) in rdr.records().enumerate() {
            let row = row.with_context(|| format!("Malformed compound row {}", row_idx))?;
            let mut record = CompoundRecord::default();

            for (header, value) in headers.iter().zip(row.iter()) {
                let value = value.trim();
                match header.as_str() {
                    "global_id" => {
                        record.global_id = parse_integer(value)
                            .ok_or_else(|| anyhow::anyhow!("Row {}: invalid global_id {:?}", row_idx, value))?;
                    }
                    "id" => record.id = normalize_id(value),
                    "chinese_name" => record.chinese_name = value.to_string(),
                    "Name" => record.name = value.to_string(),
                    "compound_type" => record.compound_type = value.to_string(),
                    "Molecular_Formula" => record.molecular_formula = value.to_string(),
                    "Molecular_Weight" => record.molecular_weight = value.parse().ok(),
                    "SMILES" => record.smiles = value.to_string(),
                    "Compound_CID" => record.compound_cid = (!value.is_empty()).then(|| normalize_id(value)),
                    other => {
                        record.extra.insert(other.replace('-', "_"), value.to_string());
                    }
                }
            }
            records.push(record);
        }

        let mut catalog = Self::new(records);
        catalog.extra_columns.extend(
            headers
                .iter()
                .filter(|h| !FIXED_COLUMNS.contains(&h.as_str()))
                .map(|h| h.replace('-', "_")),
        );
        Ok(catalog)
    }

    pub fn get(&self, global_id: u64) -> Option<&CompoundRecord> {
        self.by_global_id.get(&global_id).map(|&i| &self.records[i])
    }

    /// Compound by type and type-local id, as named by prediction files.
    pub fn find_local(&self, compound_type: &str, local_id: &str) -> Option<&CompoundRecord> {
        self.by_local_id
            .get(&(compound_type.to_string(), normalize_id(local_id)))
            .map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[CompoundRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Filter, search and sort. Unknown sort columns keep table order.
    pub fn query(&self, query: &CompoundQuery) -> Vec<&CompoundRecord> {
        let type_filter = query
            .compound_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty() && *t != "all");
        let needle = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut out: Vec<&CompoundRecord> = self
            .records
            .iter()
            .filter(|c| type_filter.map_or(true, |t| c.compound_type == t))
            .filter(|c| needle.as_deref().map_or(true, |n| c.matches(n, SearchField::All)))
            .collect();

        if self.is_column(&query.sort_by) {
            out.sort_by(|a, b| {
                compare_values(a.sort_value(&query.sort_by), b.sort_value(&query.sort_by), query.sort_order)
            });
        }
        out
    }

    fn is_column(&self, name: &str) -> bool {
        FIXED_COLUMNS.contains(&name) || self.extra_columns.contains(name)
    }

    /// One page of [`query`](Self::query) results in list shape.
    pub fn list(&self, query: &CompoundQuery, page: usize, page_size: usize, max_page_size: usize) -> Page<CompoundSummary> {
        paginate(self.query(query), page, page_size, max_page_size).map(CompoundSummary::from)
    }

    /// Quick search in table order, at most [`SEARCH_LIMIT`] hits.
    pub fn search(&self, query: &str, field: SearchField) -> Vec<CompoundSearchHit> {
        let needle = query.trim().to_lowercase();
        self.records
            .iter()
            .filter(|c| c.matches(&needle, field))
            .take(SEARCH_LIMIT)
            .map(CompoundSearchHit::from)
            .collect()
    }

    pub fn statistics(&self) -> CompoundStatistics {
        let mut by_type = BTreeMap::new();
        for c in self.records.iter().filter(|c| !c.compound_type.is_empty()) {
            *by_type.entry(c.compound_type.clone()).or_insert(0) += 1;
        }
        CompoundStatistics {
            total: self.records.len(),
            by_type,
            with_smiles: self.records.iter().filter(|c| !c.smiles.is_empty()).count(),
            with_pubchem_id: self.records.iter().filter(|c| c.compound_cid.is_some()).count(),
        }
    }
}

/// Integer cell, accepting a spreadsheet-style `12.0`.
fn parse_integer(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().or_else(|| {
        let f = value.parse::<f64>().ok()?;
        (f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
    })
}

/// Identifier text with a spreadsheet-style `.0` suffix removed.
fn normalize_id(value: &str) -> String {
    let value = value.trim();
    match parse_integer(value) {
        Some(n) => n.to_string(),
        None => value.to_string(),
    }
}
