use crate::core::io::smiles::SmilesError;
use crate::core::io::xyz::XyzError;
use thiserror::Error;

/// Failures of a single backend invocation.
///
/// Every variant is contained by the caller: a failed or timed-out relaxation
/// marks that one candidate invalid and never propagates across the pipeline
/// boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend process exceeded the {seconds} s wall-clock limit")]
    Timeout { seconds: u64 },

    #[error("failed to launch backend command '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse backend output: {0}")]
    LogParse(String),

    #[error("backend did not produce expected artifact '{0}'")]
    MissingArtifact(String),

    #[error("backend reported non-convergence after {steps} steps")]
    Convergence { steps: usize },

    #[error("I/O error in backend scratch directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Why one molecule failed a pipeline stage.
///
/// These are aggregated by the coordinator; a molecule-level failure is
/// logged, the molecule stays pending for the stage, and sibling molecules
/// continue unaffected.
#[derive(Debug, Error)]
pub enum MoleculeError {
    #[error("embedding produced no geometries, even after the random-coordinate fallback")]
    EmbeddingFailed,

    #[error("every candidate was structurally invalid or failed to relax")]
    AllCandidatesFailed,

    #[error("invalid structural notation: {0}")]
    Notation(#[from] SmilesError),

    #[error("missing prior-stage artifact '{0}'")]
    MissingInput(String),

    #[error("conformer artifact error: {0}")]
    Artifact(#[from] XyzError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
