//! Catalog queries over a small on-disk corpus.

use dtiscope_catalog::{Catalog, SortOrder, TargetLookup, TargetQuery};
use dtiscope_test_utils::TestData;
use pretty_assertions::assert_eq;

const COMPOUND_HEADERS: &[&str] = &[
    "global_id", "id", "chinese_name", "Name", "compound_type", "Molecular_Formula", "Molecular_Weight", "SMILES",
];

fn fixture() -> TestData {
    TestData::new()
        .with_reference_table(
            &["gene_symbol", "gene_names_full", "gene_name", "species", "protein_names"],
            &[
                vec!["CYP3A4", "CYP3A4 CYP3A CYP3A3", "Cytochrome P450 3A4", "Homo sapiens", "Cytochrome P450 3A4"],
                vec!["PTGS2", "PTGS2 COX2", "", "Homo sapiens", "Prostaglandin G/H synthase 2"],
            ],
        )
        .with_partition("sterol", "zaichun")
        .with_partition("triterpene", "santie")
        .with_predictions("sterol", "1", &[("CYP3A", "0.9"), ("PTGS2", "0.3")])
        .with_predictions("sterol", "2", &[("CYP3A4", "0.7")])
        .with_predictions("triterpene", "1", &[("COX2", "0.5"), ("NOTAGENE", "0.99")])
        .with_compounds(
            COMPOUND_HEADERS,
            &[
                vec!["1", "1", "豆甾醇", "Stigmasterol", "sterol", "C29H48O", "412.69", "CCC"],
                vec!["2", "2", "谷甾醇", "beta-Sitosterol", "sterol", "C29H50O", "414.71", "CCCC"],
                vec!["3", "1", "齐墩果酸", "Oleanolic acid", "triterpene", "C30H48O3", "456.7", ""],
            ],
        )
}

#[test]
fn test_target_list_collapses_aliases() {
    let data = fixture();
    let catalog = Catalog::load(&data.settings()).unwrap();

    let page = catalog.targets.list_targets(&TargetQuery::default());
    let symbols: Vec<&str> = page.items.iter().map(|t| t.gene_symbol.as_str()).collect();
    assert_eq!(symbols, vec!["CYP3A4", "PTGS2"]);
    assert_eq!(page.pagination.total, 2);

    let cyp = &page.items[0];
    assert_eq!(cyp.prediction_count, 2);
    assert_eq!(cyp.compound_count, 2);
    assert_eq!(cyp.avg_score, 0.8);
    assert_eq!(page.items[1].gene_name, "PTGS2");
}

#[test]
fn test_target_list_search_and_sort() {
    let data = fixture();
    let catalog = Catalog::load(&data.settings()).unwrap();

    let query = TargetQuery { search: Some("prostaglandin".into()), ..Default::default() };
    let page = catalog.targets.list_targets(&query);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].gene_symbol, "PTGS2");

    let query = TargetQuery { sort_by: "avg_score".into(), sort_order: SortOrder::Asc, ..Default::default() };
    let page = catalog.targets.list_targets(&query);
    assert_eq!(page.items[0].gene_symbol, "PTGS2");
}

#[test]
fn test_lookup_by_alias() {
    let data = fixture();
    let catalog = Catalog::load(&data.settings()).unwrap();

    match catalog.targets.get_target_by_name("CYP3A").unwrap() {
        TargetLookup::Reference { record, queried_name, mapped_symbol } => {
            assert_eq!(record.gene_symbol, "CYP3A4");
            assert_eq!(queried_name, "CYP3A");
            assert_eq!(mapped_symbol, "CYP3A4");
        }
        other => panic!("expected reference row, got {other:?}"),
    }
    assert!(catalog.targets.get_target_by_name("NOTAGENE").is_none());

    let json = serde_json::to_value(catalog.targets.get_target_by_name("CYP3A3").unwrap()).unwrap();
    assert_eq!(json["mapped_symbol"], "CYP3A4");
    assert_eq!(json["species"], "Homo sapiens");
}

#[test]
fn test_target_detail_joins_compounds() {
    let data = fixture();
    let catalog = Catalog::load(&data.settings()).unwrap();

    let detail = catalog.targets.get_target_detail("COX2").unwrap();
    assert_eq!(detail.associated_compounds_count, 2);
    let ids: Vec<u64> = detail.associated_compounds.iter().map(|c| c.global_id).collect();
    assert_eq!(ids, vec![3, 1]);
    assert_eq!(detail.associated_compounds[0].hit.from_name, "COX2");
    assert_eq!(detail.associated_compounds[1].chinese_name, "豆甾醇");

    let listing = catalog.targets.get_target_compounds("PTGS2").unwrap();
    assert_eq!(listing.total, 2);
    assert_eq!(listing.target_info.gene_symbol, "PTGS2");
    assert_eq!(listing.target_info.protein_names.as_deref(), Some("Prostaglandin G/H synthase 2"));
}

#[test]
fn test_compound_targets_page() {
    let data = fixture();
    let catalog = Catalog::load(&data.settings()).unwrap();

    let view = catalog.targets.compound_targets_page(1, 1, 1).unwrap();
    assert_eq!(view.compound_info.name, "Stigmasterol");
    assert_eq!(view.targets.len(), 1);
    assert_eq!(view.targets[0].gene_symbol.as_deref(), Some("CYP3A4"));
    assert_eq!(view.statistics.total, 2);
    assert!((view.statistics.avg_score - 0.6).abs() < 1e-9);
    assert_eq!(view.statistics.score_range.min, 0.3);
    assert_eq!(view.statistics.score_range.max, 0.9);
    assert_eq!(view.pagination.total_pages, 2);
    assert!(view.pagination.has_next);

    assert!(catalog.targets.compound_targets_page(99, 1, 10).is_none());
}

#[test]
fn test_statistics() {
    let data = fixture();
    let catalog = Catalog::load(&data.settings()).unwrap();

    let stats = catalog.targets.statistics();
    assert_eq!(stats.total_targets, 2);
    assert_eq!(stats.species_distribution.get("Homo sapiens"), Some(&2));
    assert_eq!(stats.top_predicted_targets.len(), 2);

    let compounds = catalog.compounds.statistics();
    assert_eq!(compounds.total, 3);
    assert_eq!(compounds.with_smiles, 2);
    assert_eq!(compounds.by_type.get("sterol"), Some(&2));
}

#[test]
fn test_queries_follow_corpus_changes() {
    let data = fixture();
    let catalog = Catalog::load(&data.settings()).unwrap();
    let cyp = |catalog: &Catalog| {
        let page = catalog.targets.list_targets(&TargetQuery::default());
        let t = page.items.into_iter().find(|t| t.gene_symbol == "CYP3A4").unwrap();
        (t.prediction_count, t.compound_count, t.avg_score)
    };
    assert_eq!(cyp(&catalog), (2, 2, 0.8));
    assert_eq!(catalog.targets.get_compounds_by_target("CYP3A4").len(), 2);

    let data = data.with_predictions("triterpene", "2", &[("CYP3A3", "0.4")]);
    let (count, compounds, avg) = cyp(&catalog);
    assert_eq!((count, compounds), (3, 3));
    assert!((avg - 0.6667).abs() < 1e-9);
    assert_eq!(catalog.targets.get_compounds_by_target("CYP3A4").len(), 3);

    let data = data.with_predictions("sterol", "2", &[("CYP3A4", "1.0"), ("PTGS2", "0.1")]);
    let (count, _, avg) = cyp(&catalog);
    assert_eq!(count, 3);
    assert!((avg - 0.7667).abs() < 1e-9);
    assert_eq!(catalog.targets.statistics().total_targets, 2);
    drop(data);
}

#[test]
fn test_missing_compound_table_fails_load() {
    let data = TestData::new().with_reference(&[("CYP3A4", "CYP3A4")]);
    assert!(Catalog::load(&data.settings()).is_err());
}
