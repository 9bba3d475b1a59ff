//! Target name normalisation.
//!
//! Maps every alias token of the reference table's `gene_names_full` field
//! to that row's canonical gene symbol. Build once at startup; read-only
//! afterwards and shared freely between threads.
//!
//! ```ignore
//! let aliases = AliasMap::from_reference(&reference, AliasPolicy::FirstWins);
//! assert_eq!(aliases.resolve("CYP3A"), Some("CYP3A4"));
//! ```

use std::collections::HashMap;

use dtiscope_common::config::AliasPolicy;

use crate::reference::ReferenceTable;

#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    /// Alias token → canonical symbol.
    lookup: HashMap<String, String>,
    /// Tokens claimed by more than one canonical symbol.
    collisions: usize,
}

impl AliasMap {
    // ── Constructors ──────────────────────────────────────────────────────────

    /// Build from `(canonical_symbol, whitespace-separated aliases)` pairs.
    ///
    /// Alias tokens are inserted first, according to `policy`. Canonical
    /// symbols are then added as their own alias when no token claimed them.
    pub fn build<'a, I>(rows: I, policy: AliasPolicy) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut lookup: HashMap<String, String> = HashMap::new();
        let mut collisions = 0usize;
        let mut symbols = Vec::new();

        for (symbol, aliases) in rows {
            let symbol = symbol.trim();
            if symbol.is_empty() {
                continue;
            }
            symbols.push(symbol);

            for token in aliases.split_whitespace() {
                match lookup.get(token).cloned() {
                    Some(existing) if existing != symbol => {
                        collisions += 1;
                        let (kept, dropped) = match policy {
                            AliasPolicy::FirstWins => (existing.as_str(), symbol),
                            AliasPolicy::LastWins => (symbol, existing.as_str()),
                        };
                        tracing::warn!(alias = token, kept, dropped, "Alias claimed by more than one target");
                        if policy == AliasPolicy::LastWins {
                            lookup.insert(token.to_string(), symbol.to_string());
                        }
                    }
                    Some(_) => {}
                    None => {
                        lookup.insert(token.to_string(), symbol.to_string());
                    }
                }
            }
        }

        for symbol in symbols {
            lookup.entry(symbol.to_string()).or_insert_with(|| symbol.to_string());
        }

        tracing::info!("Alias map built: {} names, {} collisions", lookup.len(), collisions);
        Self { lookup, collisions }
    }

    pub fn from_reference(reference: &ReferenceTable, policy: AliasPolicy) -> Self {
        Self::build(
            reference
                .records()
                .iter()
                .map(|r| (r.gene_symbol.as_str(), r.gene_names_full.as_str())),
            policy,
        )
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    /// Canonical symbol for a raw target name. Exact match after trimming;
    /// `None` when the name is unknown.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.lookup.get(name.trim()).map(String::as_str)
    }

    /// [`resolve`](Self::resolve), falling back to the name itself.
    pub fn resolve_or_self<'a>(&'a self, name: &'a str) -> &'a str {
        self.resolve(name).unwrap_or_else(|| name.trim())
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROWS: &[(&str, &str)] = &[
        ("UGT1A6", "UGT1A6 GNT1 UGT1"),
        ("CYP3A4", "CYP3A4 CYP3A CYP3A3"),
        ("PTGS2", "PTGS2 COX2"),
    ];

    #[test]
    fn test_every_alias_round_trips() {
        let map = AliasMap::build(ROWS.iter().copied(), AliasPolicy::FirstWins);
        for (symbol, aliases) in ROWS {
            for token in aliases.split_whitespace() {
                assert_eq!(map.resolve(token), Some(*symbol), "alias {token}");
            }
        }
        assert_eq!(map.collisions(), 0);
    }

    #[test]
    fn test_unknown_name_is_none() {
        let map = AliasMap::build(ROWS.iter().copied(), AliasPolicy::FirstWins);
        assert_eq!(map.resolve("ABCB1"), None);
        assert_eq!(map.resolve_or_self(" ABCB1 "), "ABCB1");
        // Exact match only.
        assert_eq!(map.resolve("cyp3a"), None);
    }

    #[test]
    fn test_symbol_maps_to_itself_when_not_listed() {
        let map = AliasMap::build([("ACHE", "ARACHE YT")], AliasPolicy::FirstWins);
        assert_eq!(map.resolve("ACHE"), Some("ACHE"));
        assert_eq!(map.resolve("YT"), Some("ACHE"));
    }

    #[test]
    fn test_collision_policies() {
        let rows = [("UGT1A1", "UGT1A1 UGT1"), ("UGT1A6", "UGT1A6 UGT1")];

        let first = AliasMap::build(rows, AliasPolicy::FirstWins);
        assert_eq!(first.resolve("UGT1"), Some("UGT1A1"));
        assert_eq!(first.collisions(), 1);

        let last = AliasMap::build(rows, AliasPolicy::LastWins);
        assert_eq!(last.resolve("UGT1"), Some("UGT1A6"));
        assert_eq!(last.collisions(), 1);
    }

    #[test]
    fn test_alias_claim_beats_self_mapping() {
        // "CYP3A" is both a symbol of its own row and an alias of CYP3A4's row.
        let rows = [("CYP3A4", "CYP3A4 CYP3A"), ("CYP3A", "CYP3A7")];
        let map = AliasMap::build(rows, AliasPolicy::FirstWins);
        assert_eq!(map.resolve("CYP3A"), Some("CYP3A4"));
        assert_eq!(map.resolve("CYP3A7"), Some("CYP3A"));
    }
}
