//! dtiscope-catalog: compound and target catalog.
//!
//! Builds the alias map from the reference table, reads the per-compound
//! prediction corpus and aggregates it into one record per canonical
//! target, then answers list, search, detail and statistics queries.

pub mod aggregate;
pub mod alias;
pub mod compounds;
pub mod corpus;
pub mod pagination;
pub mod reference;
pub mod targets;

use std::sync::Arc;

use anyhow::Result;
use dtiscope_common::Settings;

pub use aggregate::{aggregate, TargetRecord};
pub use alias::AliasMap;
pub use compounds::{CompoundCatalog, CompoundQuery, CompoundRecord, SearchField};
pub use corpus::PredictionCorpus;
pub use pagination::{paginate, Page, PageInfo, SortOrder};
pub use reference::ReferenceTable;
pub use targets::{TargetLookup, TargetQuery, TargetService};

/// Everything the catalog routes need, loaded once at startup.
#[derive(Clone)]
pub struct Catalog {
    pub compounds: Arc<CompoundCatalog>,
    pub targets: Arc<TargetService>,
}

impl Catalog {
    /// Load the compound table and reference table and wire the services.
    ///
    /// A missing compound table is an error; a missing reference table
    /// leaves targets unenriched. The corpus is read lazily.
    pub fn load(settings: &Settings) -> Result<Self> {
        let compounds = Arc::new(CompoundCatalog::load(&settings.data.compounds_file)?);
        let reference = ReferenceTable::load_or_empty(&settings.data.targets_file)?;
        let aliases = AliasMap::from_reference(&reference, settings.catalog.alias_policy);
        let corpus = PredictionCorpus::new(settings.data.partitions.clone());

        let targets = Arc::new(TargetService::new(
            reference,
            aliases,
            corpus,
            Arc::clone(&compounds),
            settings.catalog.max_page_size,
        ));
        Ok(Self { compounds, targets })
    }
}
