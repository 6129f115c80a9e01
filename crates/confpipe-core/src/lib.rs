//! # confpipe Core Library
//!
//! A library for automated conformer searching and staged geometry optimization
//! of small-molecule batches, with crash-safe, per-molecule checkpointing.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear
//! separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models (`MolecularGraph`,
//!   `Geometry`, candidate sets), geometric utilities (best-fit RMSD), and I/O for
//!   the input table, SMILES notation, and conformer artifacts.
//!
//! - **[`engine`]: The Search Core.** Implements the conformer-generation machinery:
//!   stochastic embedding, the pluggable [`engine::backend::OptimizationBackend`]
//!   contract, energy-window filtering, geometric deduplication, and selection.
//!
//! - **[`pipeline`]: The Batch Layer.** Ties the engine to durable state. The
//!   [`pipeline::coordinator::PipelineCoordinator`] drives every molecule of one
//!   batch partition through the staged optimization cascade, persisting completion
//!   after each unit of work so an interrupted job resumes exactly where it stopped.

pub mod core;
pub mod engine;
pub mod pipeline;
