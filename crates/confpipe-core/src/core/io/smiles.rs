//! A Kekulé-subset SMILES parser producing [`MolecularGraph`]s.
//!
//! Supported: organic-subset atoms (B, C, N, O, P, S, F, Cl, Br, I), bracket
//! atoms with formal charge and explicit hydrogen counts, bond symbols `-`,
//! `=`, `#`, branches, and ring-bond closures (including `%nn`). Isotope and
//! chirality annotations inside brackets are accepted and ignored. Implicit
//! hydrogens are materialized as explicit graph atoms so geometries stay
//! aligned with the full atom list.
//!
//! Aromatic (lowercase) notation is rejected; inputs must be kekulized.

use crate::core::models::atom::{Atom, element_info};
use crate::core::models::graph::{BondOrder, MolecularGraph};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SmilesError {
    #[error("empty SMILES string")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unknown element '{symbol}' at position {pos}")]
    UnknownElement { symbol: String, pos: usize },

    #[error("aromatic atom '{ch}' at position {pos}: supply a Kekulé SMILES")]
    AromaticNotation { ch: char, pos: usize },

    #[error("bond symbol at position {pos} has no preceding atom")]
    DanglingBond { pos: usize },

    #[error("unmatched ')' at position {pos}")]
    UnmatchedBranchClose { pos: usize },

    #[error("branch opened but never closed")]
    UnclosedBranch,

    #[error("ring bond {label} opened but never closed")]
    UnclosedRing { label: u16 },

    #[error("unterminated bracket atom starting at position {pos}")]
    UnterminatedBracket { pos: usize },
}

/// One parsed heavy (or explicit-H) atom before hydrogen materialization.
struct ParsedAtom {
    element: String,
    formal_charge: i8,
    /// Explicit H count from a bracket atom; `None` means fill from valence.
    explicit_hydrogens: Option<u8>,
}

/// Parses a Kekulé SMILES string into a molecular graph.
///
/// Implicit hydrogens of organic-subset atoms are added as explicit atoms.
/// Bracket atoms receive exactly their written hydrogen count; any remaining
/// valence deficit becomes radical electrons, so `[CH3]` parses as a methyl
/// radical with multiplicity 2.
///
/// # Errors
///
/// Returns a [`SmilesError`] for malformed notation, unknown elements, or
/// aromatic (lowercase) input.
pub fn parse_smiles(input: &str) -> Result<MolecularGraph, SmilesError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SmilesError::Empty);
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let mut atoms: Vec<ParsedAtom> = Vec::new();
    let mut bonds: Vec<(usize, usize, BondOrder)> = Vec::new();

    let mut prev_atom: Option<usize> = None;
    let mut pending_bond: Option<BondOrder> = None;
    let mut branch_stack: Vec<usize> = Vec::new();
    let mut open_rings: HashMap<u16, (usize, Option<BondOrder>)> = HashMap::new();

    let mut pos = 0;
    while pos < chars.len() {
        let ch = chars[pos];
        match ch {
            '-' | '=' | '#' => {
                if prev_atom.is_none() {
                    return Err(SmilesError::DanglingBond { pos });
                }
                pending_bond = Some(match ch {
                    '-' => BondOrder::Single,
                    '=' => BondOrder::Double,
                    _ => BondOrder::Triple,
                });
                pos += 1;
            }
            '(' => {
                let Some(current) = prev_atom else {
                    return Err(SmilesError::UnexpectedChar { ch, pos });
                };
                branch_stack.push(current);
                pos += 1;
            }
            ')' => {
                let Some(back) = branch_stack.pop() else {
                    return Err(SmilesError::UnmatchedBranchClose { pos });
                };
                prev_atom = Some(back);
                pos += 1;
            }
            '0'..='9' | '%' => {
                let Some(current) = prev_atom else {
                    return Err(SmilesError::UnexpectedChar { ch, pos });
                };
                let label = if ch == '%' {
                    let d1 = chars.get(pos + 1).and_then(|c| c.to_digit(10));
                    let d2 = chars.get(pos + 2).and_then(|c| c.to_digit(10));
                    match (d1, d2) {
                        (Some(a), Some(b)) => {
                            pos += 3;
                            (a * 10 + b) as u16
                        }
                        _ => return Err(SmilesError::UnexpectedChar { ch, pos }),
                    }
                } else {
                    pos += 1;
                    ch.to_digit(10).unwrap() as u16
                };

                match open_rings.remove(&label) {
                    Some((partner, opening_bond)) => {
                        let order = pending_bond
                            .take()
                            .or(opening_bond)
                            .unwrap_or(BondOrder::Single);
                        bonds.push((partner, current, order));
                    }
                    None => {
                        open_rings.insert(label, (current, pending_bond.take()));
                    }
                }
            }
            '[' => {
                let (atom, consumed) = parse_bracket_atom(&chars, pos)?;
                let index = atoms.len();
                atoms.push(atom);
                if let Some(previous) = prev_atom {
                    bonds.push((
                        previous,
                        index,
                        pending_bond.take().unwrap_or(BondOrder::Single),
                    ));
                }
                prev_atom = Some(index);
                pos += consumed;
            }
            'b' | 'c' | 'n' | 'o' | 'p' | 's' => {
                return Err(SmilesError::AromaticNotation { ch, pos });
            }
            _ if ch.is_ascii_uppercase() => {
                let (symbol, consumed) = read_organic_symbol(&chars, pos)?;
                let index = atoms.len();
                atoms.push(ParsedAtom {
                    element: symbol,
                    formal_charge: 0,
                    explicit_hydrogens: None,
                });
                if let Some(previous) = prev_atom {
                    bonds.push((
                        previous,
                        index,
                        pending_bond.take().unwrap_or(BondOrder::Single),
                    ));
                }
                prev_atom = Some(index);
                pos += consumed;
            }
            _ => return Err(SmilesError::UnexpectedChar { ch, pos }),
        }
    }

    if !branch_stack.is_empty() {
        return Err(SmilesError::UnclosedBranch);
    }
    if let Some((&label, _)) = open_rings.iter().next() {
        return Err(SmilesError::UnclosedRing { label });
    }
    if atoms.is_empty() {
        return Err(SmilesError::Empty);
    }

    build_graph(atoms, bonds)
}

fn read_organic_symbol(chars: &[char], pos: usize) -> Result<(String, usize), SmilesError> {
    let first = chars[pos];
    // Two-letter organic-subset symbols.
    if let Some(&second) = chars.get(pos + 1) {
        if (first == 'C' && second == 'l') || (first == 'B' && second == 'r') {
            return Ok((format!("{first}{second}"), 2));
        }
    }
    let symbol = first.to_string();
    if !matches!(first, 'B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I') {
        return Err(SmilesError::UnknownElement { symbol, pos });
    }
    Ok((symbol, 1))
}

fn parse_bracket_atom(chars: &[char], start: usize) -> Result<(ParsedAtom, usize), SmilesError> {
    let close = chars[start..]
        .iter()
        .position(|&c| c == ']')
        .map(|offset| start + offset)
        .ok_or(SmilesError::UnterminatedBracket { pos: start })?;

    let mut cursor = start + 1;

    // Isotope label, ignored.
    while cursor < close && chars[cursor].is_ascii_digit() {
        cursor += 1;
    }

    if cursor >= close {
        return Err(SmilesError::UnterminatedBracket { pos: start });
    }
    let ch = chars[cursor];
    if ch.is_ascii_lowercase() {
        return Err(SmilesError::AromaticNotation { ch, pos: cursor });
    }
    if !ch.is_ascii_uppercase() {
        return Err(SmilesError::UnexpectedChar { ch, pos: cursor });
    }
    let mut symbol = ch.to_string();
    cursor += 1;
    if cursor < close && chars[cursor].is_ascii_lowercase() {
        symbol.push(chars[cursor]);
        cursor += 1;
    }
    if element_info(&symbol).is_none() {
        return Err(SmilesError::UnknownElement { symbol, pos: start });
    }

    // Chirality markers, ignored.
    while cursor < close && chars[cursor] == '@' {
        cursor += 1;
    }

    let mut hydrogens: u8 = 0;
    if cursor < close && chars[cursor] == 'H' {
        cursor += 1;
        hydrogens = 1;
        if cursor < close && chars[cursor].is_ascii_digit() {
            hydrogens = chars[cursor].to_digit(10).unwrap() as u8;
            cursor += 1;
        }
    }

    let mut charge: i8 = 0;
    while cursor < close {
        let sign = match chars[cursor] {
            '+' => 1i8,
            '-' => -1i8,
            other => {
                return Err(SmilesError::UnexpectedChar {
                    ch: other,
                    pos: cursor,
                });
            }
        };
        cursor += 1;
        if cursor < close && chars[cursor].is_ascii_digit() {
            charge += sign * chars[cursor].to_digit(10).unwrap() as i8;
            cursor += 1;
        } else {
            charge += sign;
        }
    }

    Ok((
        ParsedAtom {
            element: symbol,
            formal_charge: charge,
            explicit_hydrogens: Some(hydrogens),
        },
        close - start + 1,
    ))
}

/// Charge-adjusted valence: cations of C/B lose a bonding site, while for the
/// heteroatoms the charge shifts valence directly (N+ binds four, O- binds one).
fn effective_valence(element: &str, charge: i8) -> u8 {
    let default = element_info(element)
        .map(|info| info.default_valence)
        .unwrap_or(0) as i16;
    let adjusted = match element {
        "C" | "B" => default - charge.unsigned_abs() as i16,
        _ => default + charge as i16,
    };
    adjusted.max(0) as u8
}

fn build_graph(
    atoms: Vec<ParsedAtom>,
    bonds: Vec<(usize, usize, BondOrder)>,
) -> Result<MolecularGraph, SmilesError> {
    let mut bond_valence = vec![0u16; atoms.len()];
    for &(a, b, order) in &bonds {
        bond_valence[a] += order.valence() as u16;
        bond_valence[b] += order.valence() as u16;
    }

    let mut graph = MolecularGraph::new();
    let mut hydrogens_to_add: Vec<(usize, u8)> = Vec::new();

    for (index, parsed) in atoms.iter().enumerate() {
        let valence = effective_valence(&parsed.element, parsed.formal_charge) as i16;
        let bonded = bond_valence[index] as i16;

        let (hydrogens, radicals) = match parsed.explicit_hydrogens {
            // Bracket atom: H count is literal, the leftover valence is radical.
            Some(h) => (h, (valence - bonded - h as i16).max(0) as u8),
            // Organic-subset atom: fill the valence with hydrogens, no radicals.
            None => ((valence - bonded).max(0) as u8, 0),
        };

        let mut atom = Atom::new(&parsed.element);
        atom.formal_charge = parsed.formal_charge;
        atom.radical_electrons = radicals;
        let graph_index = graph.add_atom(atom);
        debug_assert_eq!(graph_index, index);
        hydrogens_to_add.push((graph_index, hydrogens));
    }

    for (a, b, order) in bonds {
        graph.add_bond(a, b, order);
    }

    for (parent, count) in hydrogens_to_add {
        for _ in 0..count {
            let h = graph.add_atom(Atom::new("H"));
            graph.add_bond(parent, h, BondOrder::Single);
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heavy_count(graph: &MolecularGraph) -> usize {
        graph.heavy_atom_indices().len()
    }

    fn hydrogen_count(graph: &MolecularGraph) -> usize {
        graph.atoms().len() - heavy_count(graph)
    }

    #[test]
    fn ethanol_gets_full_hydrogen_shell() {
        let graph = parse_smiles("CCO").unwrap();
        assert_eq!(heavy_count(&graph), 3);
        assert_eq!(hydrogen_count(&graph), 6);
        assert_eq!(graph.bonds().len(), 8);
        assert_eq!(graph.formal_charge(), 0);
        assert_eq!(graph.multiplicity(), 1);
    }

    #[test]
    fn double_and_triple_bonds_reduce_hydrogens() {
        let formic_acid = parse_smiles("C(=O)O").unwrap();
        // HCOOH: 3 heavy atoms, 2 hydrogens.
        assert_eq!(heavy_count(&formic_acid), 3);
        assert_eq!(hydrogen_count(&formic_acid), 2);

        let acetonitrile = parse_smiles("CC#N").unwrap();
        assert_eq!(hydrogen_count(&acetonitrile), 3);
    }

    #[test]
    fn ring_closure_builds_cycle() {
        let cyclohexane = parse_smiles("C1CCCCC1").unwrap();
        assert_eq!(heavy_count(&cyclohexane), 6);
        assert_eq!(hydrogen_count(&cyclohexane), 12);
        assert_eq!(cyclohexane.num_rotatable_bonds(), 0);

        let also_cyclohexane = parse_smiles("C%10CCCCC%10").unwrap();
        assert_eq!(also_cyclohexane.bonds().len(), cyclohexane.bonds().len());
    }

    #[test]
    fn branches_restore_attachment_point() {
        let isobutane = parse_smiles("CC(C)C").unwrap();
        assert_eq!(heavy_count(&isobutane), 4);
        let central_heavy_degree = (0..isobutane.atoms().len())
            .filter(|&i| !isobutane.atoms()[i].is_hydrogen())
            .map(|i| {
                isobutane
                    .neighbors(i)
                    .iter()
                    .filter(|&&n| !isobutane.atoms()[n].is_hydrogen())
                    .count()
            })
            .max()
            .unwrap();
        assert_eq!(central_heavy_degree, 3);
    }

    #[test]
    fn bracket_atoms_carry_charge_and_radicals() {
        let methyl = parse_smiles("[CH3]").unwrap();
        assert_eq!(methyl.radical_electrons(), 1);
        assert_eq!(methyl.multiplicity(), 2);
        assert_eq!(hydrogen_count(&methyl), 3);

        let ammonium = parse_smiles("[NH4+]").unwrap();
        assert_eq!(ammonium.formal_charge(), 1);
        assert_eq!(ammonium.radical_electrons(), 0);
        assert_eq!(hydrogen_count(&ammonium), 4);

        let chloride = parse_smiles("[Cl-]").unwrap();
        assert_eq!(chloride.formal_charge(), -1);
        assert_eq!(chloride.radical_electrons(), 0);

        let methoxide = parse_smiles("C[O-]").unwrap();
        assert_eq!(methoxide.formal_charge(), -1);
        assert_eq!(methoxide.radical_electrons(), 0);
    }

    #[test]
    fn chirality_and_isotopes_are_ignored() {
        let graph = parse_smiles("[13C@H](F)(Cl)Br").unwrap();
        assert_eq!(heavy_count(&graph), 4);
        assert_eq!(hydrogen_count(&graph), 1);
    }

    #[test]
    fn aromatic_notation_is_rejected() {
        assert!(matches!(
            parse_smiles("c1ccccc1"),
            Err(SmilesError::AromaticNotation { ch: 'c', pos: 0 })
        ));
        assert!(matches!(
            parse_smiles("[cH]"),
            Err(SmilesError::AromaticNotation { .. })
        ));
    }

    #[test]
    fn malformed_inputs_produce_clear_errors() {
        assert!(matches!(parse_smiles("  "), Err(SmilesError::Empty)));
        assert!(matches!(
            parse_smiles("=C"),
            Err(SmilesError::DanglingBond { pos: 0 })
        ));
        assert!(matches!(
            parse_smiles("CC)C"),
            Err(SmilesError::UnmatchedBranchClose { .. })
        ));
        assert!(matches!(
            parse_smiles("C(C"),
            Err(SmilesError::UnclosedBranch)
        ));
        assert!(matches!(
            parse_smiles("C1CC"),
            Err(SmilesError::UnclosedRing { label: 1 })
        ));
        assert!(matches!(
            parse_smiles("[CH3"),
            Err(SmilesError::UnterminatedBracket { pos: 0 })
        ));
        assert!(matches!(
            parse_smiles("Xe"),
            Err(SmilesError::UnknownElement { .. })
        ));
    }
}
