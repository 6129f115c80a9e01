//! # Core Module
//!
//! Fundamental building blocks for molecular representation and geometry handling.
//!
//! ## Overview
//!
//! This module implements the stateless data structures and utilities the rest of
//! the library is built on: molecular graphs parsed from linear notation, 3D
//! geometries aligned index-for-index with their graph, and the file formats the
//! pipeline reads and writes.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Atoms, bonds, graphs, geometries,
//!   and energy-scored candidate sets
//! - **File I/O** ([`io`]) - Input molecule tables, SMILES parsing, and multi-frame
//!   XYZ conformer artifacts
//! - **Geometric Utilities** ([`utils`]) - Plain and best-fit (Kabsch) RMSD

pub mod io;
pub mod models;
pub mod utils;
