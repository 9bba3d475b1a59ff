//! CSV download of job results.

use dtiscope_common::entities::InteractionResult;

/// Render interactions as CSV, one row per scored pair, with a header row.
pub fn interactions_to_csv(interactions: &[InteractionResult]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    if interactions.is_empty() {
        wtr.write_record([
            "id", "compound_id", "smiles", "target_name", "target_canonical_id",
            "sequence", "score", "protein_id", "row_index", "target_index",
        ])?;
    }
    for interaction in interactions {
        wtr.serialize(interaction)?;
    }
    let bytes = wtr.into_inner().map_err(|e| anyhow::anyhow!("CSV flush failed: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}
