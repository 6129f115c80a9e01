//! The CSV input table of molecules to process.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read input table: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error reading input table: {0}")]
    Io(#[from] std::io::Error),

    #[error("duplicate molecule id '{0}': ids must be unique")]
    DuplicateId(String),

    #[error("input table contains no molecules")]
    Empty,

    #[error("invalid partition: task_id {task_id} must be < num_tasks {num_tasks}")]
    InvalidPartition { task_id: usize, num_tasks: usize },
}

/// One row of the input table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MoleculeEntry {
    /// Unique molecule identifier used for checkpointing and file naming.
    pub id: String,
    /// Structural notation (Kekulé SMILES).
    pub smiles: String,
    /// Explicit total charge; overrides the value derived from the graph.
    #[serde(default)]
    pub charge: Option<i32>,
    /// Explicit spin multiplicity; overrides the value derived from the graph.
    #[serde(default)]
    pub multiplicity: Option<u32>,
}

/// The parsed input table, with id uniqueness already enforced.
#[derive(Debug, Clone)]
pub struct InputTable {
    entries: Vec<MoleculeEntry>,
}

impl InputTable {
    /// Reads and validates an input table from a CSV file.
    ///
    /// The file must carry a header with at least `id` and `smiles` columns;
    /// `charge` and `multiplicity` columns are optional.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a row fails to parse, the
    /// table is empty, or any molecule id appears more than once (duplicate
    /// ids are a fatal startup condition).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut entries = Vec::new();
        for row in reader.deserialize::<MoleculeEntry>() {
            entries.push(row?);
        }
        Self::from_entries(entries)
    }

    /// Builds a table from in-memory entries, enforcing id uniqueness.
    pub fn from_entries(entries: Vec<MoleculeEntry>) -> Result<Self, TableError> {
        if entries.is_empty() {
            return Err(TableError::Empty);
        }
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.id.clone()) {
                return Err(TableError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// Returns every entry in file order.
    pub fn entries(&self) -> &[MoleculeEntry] {
        &self.entries
    }

    /// Returns the fixed-stride slice of this table assigned to one task.
    ///
    /// Row `i` belongs to task `i % num_tasks`, so the same table and
    /// partition parameters always yield the same slice.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::InvalidPartition`] when `task_id >= num_tasks`
    /// or `num_tasks` is zero.
    pub fn partition(
        &self,
        task_id: usize,
        num_tasks: usize,
    ) -> Result<Vec<&MoleculeEntry>, TableError> {
        if num_tasks == 0 || task_id >= num_tasks {
            return Err(TableError::InvalidPartition { task_id, num_tasks });
        }
        Ok(self
            .entries
            .iter()
            .enumerate()
            .filter(|(index, _)| index % num_tasks == task_id)
            .map(|(_, entry)| entry)
            .collect())
    }
}
