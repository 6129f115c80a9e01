//! Data structures for molecular graphs, geometries, and scored candidates.

pub mod atom;
pub mod conformer;
pub mod geometry;
pub mod graph;
pub mod ids;
