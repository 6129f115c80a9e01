//! Input/output for the pipeline's external interfaces.
//!
//! This module covers the three file-shaped boundaries of the system: the CSV
//! input table of molecules, the SMILES notation each row carries, and the
//! multi-frame XYZ artifacts the pipeline writes for (and reads back from)
//! each completed stage.

pub mod smiles;
pub mod table;
pub mod xyz;
