//! # Engine Module
//!
//! The conformer-search machinery: everything needed to turn one molecular
//! graph into a small, diverse, low-energy set of 3D conformers.
//!
//! ## Overview
//!
//! The engine is a strict per-molecule pipeline. Trial geometries come from
//! stochastic embedding ([`embed`]), are relaxed and scored by a pluggable
//! [`backend::OptimizationBackend`], then shrink through the energy window
//! filter, the geometric deduplicator, and the final selector ([`filter`]).
//! Configuration is explicit and validated up front ([`config`]); nothing is
//! read from global state.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Search parameters with builder validation
//! - **Embedding** ([`embed`]) - Seeded trial-geometry generation with RMSD pruning
//! - **Backends** ([`backend`]) - The relaxation contract plus in-process and
//!   external-process implementations
//! - **Filtering** ([`filter`]) - Energy window, geometric dedup, selection
//! - **Progress** ([`progress`]) - Callback-based progress reporting
//! - **Errors** ([`error`]) - Backend and per-molecule error kinds

pub mod backend;
pub mod config;
pub mod embed;
pub mod error;
pub mod filter;
pub mod progress;
