//! Persistent job completion record.
//!
//! One TOML file per partition (`jobs_<task_id>.toml`) stores the partition
//! key, the full molecule-id set, and the set of completed ids per stage.
//! Saves go through a temporary file followed by a rename, so a crash never
//! leaves a half-written record. A molecule is either done or pending for a
//! stage; there is no failed state, and errored molecules are simply retried
//! on the next invocation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("no job record for task {task_id} under '{}'", dir.display())]
    NotFound { task_id: usize, dir: PathBuf },

    #[error("failed to parse job record: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize job record: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("I/O error accessing job record: {0}")]
    Io(#[from] std::io::Error),
}

/// The three pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    ConformerSearch,
    SemiempiricalOpt,
    AbInitioOpt,
}

impl Stage {
    /// Every stage, in the fixed order the coordinator runs them.
    pub const ALL: [Stage; 3] = [
        Stage::ConformerSearch,
        Stage::SemiempiricalOpt,
        Stage::AbInitioOpt,
    ];

    /// Stable name used for record keys, directory names, and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ConformerSearch => "conformer_search",
            Stage::SemiempiricalOpt => "semiempirical_opt",
            Stage::AbInitioOpt => "ab_initio_opt",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion state of one partition of the input table.
///
/// The partition key (`task_id`, `num_tasks`) and the molecule-id set are
/// fixed at initialization; a loaded record whose key or id set differs from
/// the current invocation must be treated as fatal by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    task_id: usize,
    num_tasks: usize,
    all_molecule_ids: BTreeSet<String>,
    /// Completed molecule ids, keyed by stage name.
    stages: BTreeMap<String, BTreeSet<String>>,
}

impl JobRecord {
    /// Creates a fresh record with every molecule pending for every stage.
    pub fn initialize<I, S>(task_id: usize, num_tasks: usize, molecule_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stages = Stage::ALL
            .iter()
            .map(|stage| (stage.as_str().to_string(), BTreeSet::new()))
            .collect();
        Self {
            task_id,
            num_tasks,
            all_molecule_ids: molecule_ids.into_iter().map(Into::into).collect(),
            stages,
        }
    }

    fn file_path(dir: &Path, task_id: usize) -> PathBuf {
        dir.join(format!("jobs_{task_id}.toml"))
    }

    /// Loads the record for one task from a directory.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] when no record file exists, which
    /// the caller treats as "first invocation".
    pub fn load(dir: &Path, task_id: usize) -> Result<Self, RecordError> {
        let path = Self::file_path(dir, task_id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RecordError::NotFound {
                    task_id,
                    dir: dir.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Ok(toml::from_str(&contents)?)
    }

    /// Persists the record atomically: write to a sibling temporary file,
    /// then rename over the real one.
    pub fn save(&self, dir: &Path) -> Result<(), RecordError> {
        let path = Self::file_path(dir, self.task_id);
        let tmp_path = path.with_extension("toml.tmp");
        let contents = toml::to_string_pretty(self)?;
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub fn task_id(&self) -> usize {
        self.task_id
    }

    pub fn num_tasks(&self) -> usize {
        self.num_tasks
    }

    pub fn molecule_ids(&self) -> &BTreeSet<String> {
        &self.all_molecule_ids
    }

    /// Whether this record describes the same partition and molecule set as
    /// the current invocation. A mismatch means the work directory belongs
    /// to a different run and must not be touched.
    pub fn is_consistent_with(
        &self,
        task_id: usize,
        num_tasks: usize,
        molecule_ids: &BTreeSet<String>,
    ) -> bool {
        self.task_id == task_id
            && self.num_tasks == num_tasks
            && &self.all_molecule_ids == molecule_ids
    }

    pub fn is_done(&self, stage: Stage, molecule_id: &str) -> bool {
        self.stages
            .get(stage.as_str())
            .is_some_and(|done| done.contains(molecule_id))
    }

    /// Marks a molecule complete for a stage. Idempotent.
    pub fn mark_done(&mut self, stage: Stage, molecule_id: &str) {
        self.stages
            .entry(stage.as_str().to_string())
            .or_default()
            .insert(molecule_id.to_string());
    }

    /// Filters the given ids down to those still pending for a stage,
    /// preserving the input order.
    pub fn pending<'a>(&self, stage: Stage, ids: &'a [String]) -> Vec<&'a String> {
        ids.iter().filter(|id| !self.is_done(stage, id)).collect()
    }
}
