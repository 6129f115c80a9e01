//! The per-molecule conformer-search workflow.
//!
//! Embed, relax every candidate, filter by energy window, deduplicate by
//! heavy-atom RMSD, keep the lowest few, and write the multi-frame XYZ
//! artifact the next stage consumes. Individual candidate failures are
//! logged and dropped; the molecule itself fails only when embedding yields
//! nothing or every candidate fails.

use crate::core::models::conformer::{Candidate, CandidateSet};
use crate::core::models::graph::MolecularGraph;
use crate::engine::backend::{OptimizationBackend, Resources};
use crate::engine::config::SearchConfig;
use crate::engine::embed::generate_embeddings;
use crate::engine::error::MoleculeError;
use crate::engine::filter::{deduplicate, energy_filter, select_lowest};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Counts from one completed conformer search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSummary {
    /// Trial geometries that survived embedding and pruning.
    pub embedded: usize,
    /// Candidates that relaxed successfully and stayed structurally valid.
    pub relaxed: usize,
    /// Conformers written to the artifact.
    pub selected: usize,
}

/// Runs the full conformer search for one molecule.
///
/// Candidate scratch directories are created under `stage_dir` and removed
/// after each successful relaxation. The artifact is written to
/// `<stage_dir>/<molecule_id>_confs.xyz` with frames ascending by
/// minimum-relative energy. When `input_marker` is given, the marker file is
/// removed after the artifact is in place, signalling completion.
pub fn run_conformer_search(
    molecule_id: &str,
    graph: &mut MolecularGraph,
    config: &SearchConfig,
    backend: &dyn OptimizationBackend,
    resources: &Resources,
    stage_dir: &Path,
    input_marker: Option<&Path>,
) -> Result<SearchSummary, MoleculeError> {
    fs::create_dir_all(stage_dir)?;

    let conformer_ids = generate_embeddings(graph, config);
    if conformer_ids.is_empty() {
        return Err(MoleculeError::EmbeddingFailed);
    }
    let embedded = conformer_ids.len();
    debug!(molecule_id, embedded, "embedding finished");

    let mut candidates = CandidateSet::new();
    for (index, conformer_id) in conformer_ids.into_iter().enumerate() {
        let Some(geometry) = graph.conformer(conformer_id) else {
            continue;
        };
        let scratch = stage_dir.join(format!("cand_{index:03}"));
        match backend.relax(graph, geometry, resources, &scratch) {
            Ok(relaxation) if relaxation.structurally_valid => {
                graph.update_conformer(conformer_id, relaxation.geometry);
                candidates.push(Candidate::new(relaxation.energy, conformer_id));
                let _ = fs::remove_dir_all(&scratch);
            }
            Ok(_) => {
                debug!(molecule_id, index, "candidate lost its connectivity, dropped");
            }
            Err(e) => {
                debug!(molecule_id, index, error = %e, "candidate relaxation failed, dropped");
            }
        }
    }
    if candidates.is_empty() {
        return Err(MoleculeError::AllCandidatesFailed);
    }
    let relaxed = candidates.len();

    let kept = energy_filter(candidates, config.energy_window_fraction);
    let kept = deduplicate(graph, kept, config.dedup_rms_threshold);
    let kept = select_lowest(kept, config.num_confs_to_keep);

    let mut frames = Vec::with_capacity(kept.len());
    for candidate in kept.iter() {
        if let Some(geometry) = graph.conformer(candidate.conformer_id) {
            frames.push((candidate.energy, geometry));
        }
    }
    let artifact = stage_dir.join(format!("{molecule_id}_confs.xyz"));
    crate::core::io::xyz::write_conformers(&artifact, molecule_id, graph, &frames)?;

    if let Some(marker) = input_marker {
        match fs::remove_file(marker) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        molecule_id,
        embedded,
        relaxed,
        selected = frames.len(),
        "conformer search complete"
    );
    Ok(SearchSummary {
        embedded,
        relaxed,
        selected: frames.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::smiles::parse_smiles;
    use crate::core::io::xyz::read_conformers;
    use crate::engine::backend::{HarmonicBackend, Relaxation};
    use crate::engine::error::BackendError;
    use crate::engine::config::SearchConfigBuilder;

    fn config() -> SearchConfig {
        SearchConfigBuilder::new()
            .max_n_conf(10)
            .max_embed_attempts(200)
            .prune_rms_threshold(0.05)
            .energy_window_fraction(0.5)
            .dedup_rms_threshold(0.1)
            .num_confs_to_keep(3)
            .seed(17)
            .build()
            .unwrap()
    }

    #[test]
    fn writes_sorted_artifact_and_removes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let stage_dir = dir.path().join("mol1");
        let marker = dir.path().join("mol1.in");
        std::fs::write(&marker, "CCO\n").unwrap();

        let mut graph = parse_smiles("CCO").unwrap();
        let summary = run_conformer_search(
            "mol1",
            &mut graph,
            &config(),
            &HarmonicBackend::new(),
            &Resources::default(),
            &stage_dir,
            Some(&marker),
        )
        .unwrap();

        assert!(summary.selected >= 1);
        assert!(summary.selected <= 3);
        assert!(summary.relaxed <= summary.embedded);
        assert!(!marker.exists());

        let frames = read_conformers(stage_dir.join("mol1_confs.xyz")).unwrap();
        assert_eq!(frames.len(), summary.selected);
        assert_eq!(frames[0].energy, 0.0);
        for pair in frames.windows(2) {
            assert!(pair[0].energy <= pair[1].energy);
        }
        assert_eq!(frames[0].positions.len(), graph.atoms().len());
    }

    #[test]
    fn missing_marker_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let stage_dir = dir.path().join("mol2");
        let absent = dir.path().join("mol2.in");

        let mut graph = parse_smiles("C").unwrap();
        let result = run_conformer_search(
            "mol2",
            &mut graph,
            &config(),
            &HarmonicBackend::new(),
            &Resources::default(),
            &stage_dir,
            Some(&absent),
        );
        assert!(result.is_ok());
    }

    /// Backend whose every relaxation reports a broken structure.
    struct InvalidatingBackend;

    impl OptimizationBackend for InvalidatingBackend {
        fn name(&self) -> &str {
            "invalidating"
        }

        fn relax(
            &self,
            _graph: &MolecularGraph,
            geometry: &crate::core::models::geometry::Geometry,
            _resources: &Resources,
            _scratch_dir: &Path,
        ) -> Result<Relaxation, BackendError> {
            Ok(Relaxation {
                energy: 0.0,
                geometry: geometry.clone(),
                structurally_valid: false,
            })
        }
    }

    #[test]
    fn all_invalid_candidates_fail_the_molecule() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = parse_smiles("CC").unwrap();
        let result = run_conformer_search(
            "mol3",
            &mut graph,
            &config(),
            &InvalidatingBackend,
            &Resources::default(),
            &dir.path().join("mol3"),
            None,
        );
        assert!(matches!(result, Err(MoleculeError::AllCandidatesFailed)));
    }
}
