//! Syntactic validation of SMILES structure strings.
//!
//! Jobs only need to know whether a structure string can be handed to the
//! scoring model, so this walks the grammar (atoms, bonds, branches, ring
//! closures, components) without building a molecule graph.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::CharIndices;

use serde::Serialize;
use thiserror::Error;

/// Shape of a structure string that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SmilesSummary {
    /// Atoms written in the string (implicit hydrogens are not counted).
    pub atoms: usize,
    /// Ring-closure bonds.
    pub ring_closures: usize,
    /// Dot-separated disconnected components.
    pub components: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmilesError {
    #[error("empty SMILES string")]
    Empty,
    #[error("unrecognized SMILES character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unknown element '{symbol}' at position {pos}")]
    UnknownElement { symbol: String, pos: usize },
    #[error("unterminated bracket atom starting at position {pos}")]
    UnterminatedBracket { pos: usize },
    #[error("malformed bracket atom at position {pos}")]
    MalformedBracket { pos: usize },
    #[error("unmatched ')' at position {pos}")]
    UnmatchedClose { pos: usize },
    #[error("unclosed branch '('")]
    UnclosedBranch,
    #[error("empty branch at position {pos}")]
    EmptyBranch { pos: usize },
    #[error("'{ch}' at position {pos} has no preceding atom")]
    DanglingSymbol { ch: char, pos: usize },
    #[error("bond at position {pos} is not followed by an atom")]
    DanglingBond { pos: usize },
    #[error("ring closure {ring} opened and closed on the same atom")]
    SelfRing { ring: u32 },
    #[error("unclosed ring closure {ring}")]
    UnclosedRing { ring: u32 },
}

const ELEMENTS: &[&str] = &[
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
    "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga",
    "Ge", "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd",
    "Ag", "Cd", "In", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm",
    "Sm", "Eu", "Gd", "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os",
    "Ir", "Pt", "Au", "Hg", "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa",
    "U", "Np", "Pu", "Am", "Cm", "Bk", "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg",
    "Bh", "Hs", "Mt", "Ds", "Rg", "Cn", "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Aromatic symbols allowed inside brackets.
const BRACKET_AROMATIC: &[&str] = &["b", "c", "n", "o", "p", "s", "se", "as", "te"];

/// Returns true if `smiles` is a syntactically valid structure string.
pub fn is_valid(smiles: &str) -> bool {
    validate(smiles).is_ok()
}

/// Validate a SMILES string, returning a summary of what it contains.
pub fn validate(smiles: &str) -> Result<SmilesSummary, SmilesError> {
    let smiles = smiles.trim();
    if smiles.is_empty() {
        return Err(SmilesError::Empty);
    }

    let mut chars = smiles.char_indices().peekable();

    let mut atoms = 0usize;
    let mut ring_closures = 0usize;
    let mut components = 1usize;

    // Index of the atom new bonds attach to; None at the start of a component.
    let mut current: Option<usize> = None;
    // Position of an explicit bond symbol still waiting for its second atom.
    let mut pending_bond: Option<usize> = None;
    // Branch stack: (atom the branch hangs off, atom count when it opened, position).
    let mut branches: Vec<(Option<usize>, usize, usize)> = Vec::new();
    // Open ring closures: ring number -> atom index that opened it.
    let mut rings: HashMap<u32, usize> = HashMap::new();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            '-' | '=' | '#' | '$' | ':' | '/' | '\\' => {
                if current.is_none() || pending_bond.is_some() {
                    return Err(SmilesError::DanglingSymbol { ch, pos });
                }
                pending_bond = Some(pos);
                chars.next();
            }

            '(' => {
                if current.is_none() || pending_bond.is_some() {
                    return Err(SmilesError::DanglingSymbol { ch, pos });
                }
                branches.push((current, atoms, pos));
                chars.next();
            }

            ')' => {
                if let Some(bond_pos) = pending_bond {
                    return Err(SmilesError::DanglingBond { pos: bond_pos });
                }
                let (anchor, atoms_at_open, _) = branches
                    .pop()
                    .ok_or(SmilesError::UnmatchedClose { pos })?;
                if atoms == atoms_at_open {
                    return Err(SmilesError::EmptyBranch { pos });
                }
                current = anchor;
                chars.next();
            }

            '.' => {
                if current.is_none() || pending_bond.is_some() || !branches.is_empty() {
                    return Err(SmilesError::DanglingSymbol { ch, pos });
                }
                current = None;
                components += 1;
                chars.next();
            }

            '%' | '0'..='9' => {
                let Some(atom) = current else {
                    return Err(SmilesError::DanglingSymbol { ch, pos });
                };
                let ring = read_ring_number(&mut chars)?;
                match rings.remove(&ring) {
                    Some(opener) if opener == atom => return Err(SmilesError::SelfRing { ring }),
                    Some(_) => ring_closures += 1,
                    None => {
                        rings.insert(ring, atom);
                    }
                }
                pending_bond = None;
            }

            '[' => {
                parse_bracket_atom(&mut chars)?;
                current = Some(atoms);
                atoms += 1;
                pending_bond = None;
            }

            _ => {
                parse_organic_atom(&mut chars)?;
                current = Some(atoms);
                atoms += 1;
                pending_bond = None;
            }
        }
    }

    if let Some(bond_pos) = pending_bond {
        return Err(SmilesError::DanglingBond { pos: bond_pos });
    }
    if !branches.is_empty() {
        return Err(SmilesError::UnclosedBranch);
    }
    if let Some(ring) = rings.keys().min() {
        return Err(SmilesError::UnclosedRing { ring: *ring });
    }
    if current.is_none() {
        // Trailing '.' or nothing but punctuation.
        return Err(SmilesError::Empty);
    }

    Ok(SmilesSummary { atoms, ring_closures, components })
}

fn read_ring_number(chars: &mut Peekable<CharIndices<'_>>) -> Result<u32, SmilesError> {
    let Some((pos, ch)) = chars.next() else {
        return Err(SmilesError::Empty);
    };
    if ch != '%' {
        return Ok(ch as u32 - '0' as u32);
    }
    let mut value = 0u32;
    for _ in 0..2 {
        match chars.next() {
            Some((_, d)) if d.is_ascii_digit() => value = value * 10 + (d as u32 - '0' as u32),
            _ => return Err(SmilesError::UnexpectedChar { ch: '%', pos }),
        }
    }
    Ok(value)
}

/// Organic-subset atom written without brackets.
fn parse_organic_atom(chars: &mut Peekable<CharIndices<'_>>) -> Result<(), SmilesError> {
    let Some((pos, ch)) = chars.next() else {
        return Err(SmilesError::Empty);
    };
    match ch {
        'C' => {
            if matches!(chars.peek(), Some((_, 'l'))) {
                chars.next();
            }
            Ok(())
        }
        'B' => {
            if matches!(chars.peek(), Some((_, 'r'))) {
                chars.next();
            }
            Ok(())
        }
        'N' | 'O' | 'P' | 'S' | 'F' | 'I' | '*' => Ok(()),
        'b' | 'c' | 'n' | 'o' | 'p' | 's' => Ok(()),
        _ => Err(SmilesError::UnexpectedChar { ch, pos }),
    }
}

/// Bracket atom: `[isotope? symbol chirality? hcount? charge? class?]`.
fn parse_bracket_atom(chars: &mut Peekable<CharIndices<'_>>) -> Result<(), SmilesError> {
    let Some((open, _)) = chars.next() else {
        return Err(SmilesError::Empty);
    };

    let mut body = String::new();
    loop {
        match chars.next() {
            Some((_, ']')) => break,
            Some((_, c)) => body.push(c),
            None => return Err(SmilesError::UnterminatedBracket { pos: open }),
        }
    }

    let malformed = SmilesError::MalformedBracket { pos: open };
    let mut rest = body.as_str();

    // Isotope
    rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    // Element symbol
    let symbol_len = if rest.starts_with('*') {
        1
    } else {
        let mut it = rest.chars();
        match it.next() {
            Some(c) if c.is_ascii_uppercase() => {
                match (it.next(), rest.get(..2)) {
                    (Some(l), Some(pair)) if l.is_ascii_lowercase() && ELEMENTS.contains(&pair) => 2,
                    _ => 1,
                }
            }
            Some(c) if c.is_ascii_lowercase() => match rest.get(..2) {
                Some(pair) if BRACKET_AROMATIC.contains(&pair) => 2,
                _ => 1,
            },
            _ => return Err(malformed),
        }
    };
    let symbol = &rest[..symbol_len];
    let known = symbol == "*"
        || ELEMENTS.contains(&symbol)
        || BRACKET_AROMATIC.contains(&symbol);
    if !known {
        return Err(SmilesError::UnknownElement { symbol: symbol.to_string(), pos: open + 1 });
    }
    rest = &rest[symbol_len..];

    // Chirality: @, @@, or @ followed by a class tag such as TH1 / AL2 / SP3 / TB12 / OH25
    if rest.starts_with('@') {
        rest = rest.trim_start_matches('@');
        let tag_len = rest
            .char_indices()
            .take_while(|(i, c)| (*i < 2 && c.is_ascii_uppercase() && *c != 'H') || c.is_ascii_digit())
            .count();
        rest = &rest[tag_len..];
    }

    // Hydrogen count
    if let Some(r) = rest.strip_prefix('H') {
        rest = r.trim_start_matches(|c: char| c.is_ascii_digit());
    }

    // Charge: +, ++, +2, -, --, -1
    if rest.starts_with('+') || rest.starts_with('-') {
        let sign = &rest[..1];
        rest = rest.trim_start_matches(|c: char| sign.starts_with(c));
        rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    }

    // Atom class
    if let Some(r) = rest.strip_prefix(':') {
        if r.is_empty() || !r.chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed);
        }
        rest = "";
    }

    if rest.is_empty() {
        Ok(())
    } else {
        Err(malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_structures() {
        for s in [
            "C",
            "CCO",
            "CC(=O)OC1=CC=CC=C1C(=O)O",           // aspirin
            "c1ccccc1",                             // benzene
            "CN1C=NC2=C1C(=O)N(C(=O)N2C)C",         // caffeine
            "C[C@@H](O)C(=O)[O-]",                  // lactate
            "[Na+].[Cl-]",
            "C1CC%10CC1%10",
            "[13CH4]",
            "F/C=C/F",
            "[nH]1cccc1",
            "[Fe+2]",
            "CC[C@H](C)[C@@H]1NC(=O)C1",
        ] {
            assert!(is_valid(s), "expected valid: {s}");
        }
    }

    #[test]
    fn test_summary_counts() {
        let s = validate("c1ccccc1.O").unwrap();
        assert_eq!(s.atoms, 7);
        assert_eq!(s.ring_closures, 1);
        assert_eq!(s.components, 2);
    }

    #[test]
    fn test_rejects_empty_and_whitespace() {
        assert_eq!(validate(""), Err(SmilesError::Empty));
        assert_eq!(validate("   "), Err(SmilesError::Empty));
    }

    #[test]
    fn test_rejects_unbalanced_branches() {
        assert!(matches!(validate("CC(C"), Err(SmilesError::UnclosedBranch)));
        assert!(matches!(validate("CC)C"), Err(SmilesError::UnmatchedClose { .. })));
        assert!(matches!(validate("C()C"), Err(SmilesError::EmptyBranch { .. })));
    }

    #[test]
    fn test_rejects_unclosed_ring() {
        assert_eq!(validate("C1CCC"), Err(SmilesError::UnclosedRing { ring: 1 }));
        assert_eq!(validate("C11"), Err(SmilesError::SelfRing { ring: 1 }));
    }

    #[test]
    fn test_rejects_bad_atoms() {
        assert!(matches!(validate("CXC"), Err(SmilesError::UnexpectedChar { ch: 'X', .. })));
        assert!(matches!(validate("[Xx]"), Err(SmilesError::UnknownElement { .. })));
        assert!(matches!(validate("[C"), Err(SmilesError::UnterminatedBracket { .. })));
        assert!(matches!(validate("[C+x]"), Err(SmilesError::MalformedBracket { .. })));
    }

    #[test]
    fn test_rejects_non_ascii_without_panicking() {
        for s in ["[cé]", "[Cé]", "[é]", "[13cé+]", "Cé", "C[Na]ü"] {
            assert!(validate(s).is_err(), "expected invalid: {s}");
        }
        assert!(matches!(validate("[cé]"), Err(SmilesError::MalformedBracket { .. })));
    }

    #[test]
    fn test_rejects_dangling_bonds() {
        assert!(matches!(validate("=C"), Err(SmilesError::DanglingSymbol { .. })));
        assert!(matches!(validate("CC="), Err(SmilesError::DanglingBond { .. })));
        assert!(matches!(validate("C=#C"), Err(SmilesError::DanglingSymbol { .. })));
        assert!(validate("C.").is_err());
        assert!(validate(".C").is_err());
    }

    #[test]
    fn test_rejects_free_text() {
        assert!(!is_valid("not a smiles"));
        assert!(!is_valid("invalid_smiles"));
    }
}
