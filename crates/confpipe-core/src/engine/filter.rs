//! Post-relaxation candidate filtering.
//!
//! Three stages run in order over a relaxed candidate set: the energy window
//! filter, the greedy geometric deduplicator, and the lowest-energy selector.
//! Each consumes and returns a [`CandidateSet`], so they compose directly in
//! the search workflow.

use crate::core::models::conformer::{Candidate, CandidateSet};
use crate::core::models::graph::MolecularGraph;
use crate::core::utils::geometry::best_fit_rmsd;
use tracing::debug;

/// Keeps candidates whose energy lies within a window above the minimum and
/// rebases kept energies as offsets from that minimum.
///
/// The cutoff is `min + |min| * fraction`. Candidates are visited in
/// ascending energy order and the walk stops at the first candidate above the
/// cutoff, so the minimum itself always survives. Kept candidates carry
/// `energy - min`, which makes the retained energies backend-unit-relative.
pub fn energy_filter(mut set: CandidateSet, fraction: f64) -> CandidateSet {
    if set.is_empty() {
        return set;
    }
    set.sort_by_energy();

    let min = set.as_slice()[0].energy;
    let cutoff = min + min.abs() * fraction;

    let mut kept = CandidateSet::new();
    for candidate in set.iter() {
        if candidate.energy > cutoff && !kept.is_empty() {
            break;
        }
        kept.push(Candidate {
            energy: candidate.energy - min,
            conformer_id: candidate.conformer_id,
        });
    }
    debug!(kept = kept.len(), cutoff, "energy window applied");
    kept
}

/// Greedy heavy-atom RMSD deduplication in ascending energy order.
///
/// The lowest-energy candidate is always kept. Every later candidate is
/// compared against all kept ones and discarded when any best-fit RMSD falls
/// below the threshold. Sets of one candidate or fewer pass through
/// untouched.
pub fn deduplicate(graph: &MolecularGraph, mut set: CandidateSet, rms_threshold: f64) -> CandidateSet {
    if set.len() <= 1 {
        return set;
    }
    set.sort_by_energy();

    let heavy = graph.heavy_atom_indices();
    let compare: Vec<usize> = if heavy.is_empty() {
        (0..graph.atoms().len()).collect()
    } else {
        heavy
    };

    let mut kept = CandidateSet::new();
    for candidate in set.iter() {
        let Some(geometry) = graph.conformer(candidate.conformer_id) else {
            continue;
        };
        let candidate_compare = geometry.subset(&compare);

        let duplicate = kept.iter().any(|accepted| {
            graph
                .conformer(accepted.conformer_id)
                .and_then(|g| best_fit_rmsd(&g.subset(&compare), &candidate_compare))
                .is_some_and(|rmsd| rmsd < rms_threshold)
        });
        if !duplicate {
            kept.push(*candidate);
        }
    }
    debug!(kept = kept.len(), rms_threshold, "geometric dedup applied");
    kept
}

/// Keeps the `n` lowest-energy candidates.
pub fn select_lowest(mut set: CandidateSet, n: usize) -> CandidateSet {
    set.sort_by_energy();
    set.truncate(n);
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::smiles::parse_smiles;
    use crate::core::models::geometry::Geometry;
    use crate::core::models::ids::ConformerId;
    use nalgebra::Point3;
    use slotmap::SlotMap;

    /// Fresh ids from a throwaway arena, for filters that never look at
    /// geometries.
    fn ids(n: usize) -> Vec<ConformerId> {
        let mut arena: SlotMap<ConformerId, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    fn set_from_energies(energies: &[f64]) -> CandidateSet {
        let ids = ids(energies.len());
        energies
            .iter()
            .zip(ids)
            .map(|(&energy, conformer_id)| Candidate {
                energy,
                conformer_id,
            })
            .collect()
    }

    #[test]
    fn energy_filter_keeps_window_and_rebases() {
        // min = -100, fraction = 0.2 => cutoff = -100 + 20 = -80.
        let set = set_from_energies(&[-100.0, -95.0, -80.0, -79.9, -50.0]);
        let kept = energy_filter(set, 0.2);

        let energies: Vec<f64> = kept.iter().map(|c| c.energy).collect();
        assert_eq!(energies, vec![0.0, 5.0, 20.0]);
    }

    #[test]
    fn energy_filter_always_keeps_minimum() {
        let set = set_from_energies(&[10.0, 500.0]);
        // With a positive min and fraction 0, the cutoff equals the min.
        let kept = energy_filter(set, 0.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.as_slice()[0].energy, 0.0);
    }

    #[test]
    fn energy_filter_stops_at_first_violation() {
        // -79.0 is above the -80 cutoff; -85.0 after it must not be rescued.
        let set = set_from_energies(&[-100.0, -79.0, -85.0]);
        let kept = energy_filter(set, 0.2);
        let energies: Vec<f64> = kept.iter().map(|c| c.energy).collect();
        assert_eq!(energies, vec![0.0, 15.0]);
    }

    #[test]
    fn energy_filter_handles_empty_set() {
        let kept = energy_filter(CandidateSet::new(), 0.2);
        assert!(kept.is_empty());
    }

    fn linear_chain(graph: &mut MolecularGraph, spacing: f64) -> ConformerId {
        let n = graph.atoms().len();
        let positions = (0..n)
            .map(|i| Point3::new(i as f64 * spacing, 0.0, 0.0))
            .collect();
        graph.add_conformer(Geometry::new(positions))
    }

    #[test]
    fn deduplicate_drops_near_identical_geometries() {
        let mut graph = parse_smiles("CCCC").unwrap();
        let a = linear_chain(&mut graph, 1.5);
        let b = linear_chain(&mut graph, 1.5); // same shape as a
        let c = linear_chain(&mut graph, 2.4); // stretched, distinct

        let set: CandidateSet = [
            Candidate {
                energy: 0.0,
                conformer_id: a,
            },
            Candidate {
                energy: 1.0,
                conformer_id: b,
            },
            Candidate {
                energy: 2.0,
                conformer_id: c,
            },
        ]
        .into_iter()
        .collect();

        let kept = deduplicate(&graph, set, 0.3);
        let kept_ids: Vec<ConformerId> = kept.iter().map(|k| k.conformer_id).collect();
        assert_eq!(kept_ids, vec![a, c]);
    }

    #[test]
    fn deduplicate_passes_singletons_through() {
        let mut graph = parse_smiles("CC").unwrap();
        let a = linear_chain(&mut graph, 1.5);
        let set: CandidateSet = [Candidate {
            energy: -3.0,
            conformer_id: a,
        }]
        .into_iter()
        .collect();

        let kept = deduplicate(&graph, set, 0.3);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn deduplicate_keeps_lowest_of_each_cluster() {
        let mut graph = parse_smiles("CCC").unwrap();
        let low = linear_chain(&mut graph, 1.5);
        let high = linear_chain(&mut graph, 1.5);

        let set: CandidateSet = [
            Candidate {
                energy: 9.0,
                conformer_id: high,
            },
            Candidate {
                energy: 1.0,
                conformer_id: low,
            },
        ]
        .into_iter()
        .collect();

        let kept = deduplicate(&graph, set, 0.3);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.as_slice()[0].conformer_id, low);
    }

    #[test]
    fn select_lowest_truncates_sorted() {
        let set = set_from_energies(&[4.0, 1.0, 3.0, 2.0]);
        let kept = select_lowest(set, 2);
        let energies: Vec<f64> = kept.iter().map(|c| c.energy).collect();
        assert_eq!(energies, vec![1.0, 2.0]);
    }

    #[test]
    fn select_lowest_with_large_n_keeps_everything() {
        let set = set_from_energies(&[4.0, 1.0]);
        assert_eq!(select_lowest(set, 10).len(), 2);
    }
}
