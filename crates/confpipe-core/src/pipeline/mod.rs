//! # Pipeline Module
//!
//! The checkpointed batch layer on top of the engine.
//!
//! ## Overview
//!
//! A pipeline run processes one fixed-stride partition of the input table
//! through three stages in order: conformer search, semiempirical
//! optimization, and ab initio optimization. Completion is tracked per
//! (molecule, stage) in a TOML job record that is atomically replaced after
//! every success, so a killed run resumes exactly where it stopped.
//! Molecule-level failures are logged and leave the molecule pending; only
//! record corruption, partition mismatches, and filesystem errors abort the
//! run.
//!
//! ## Architecture
//!
//! - **Record** ([`record`]) - Persistent per-partition completion state
//! - **Search** ([`search`]) - The per-molecule conformer-search workflow
//! - **Coordinator** ([`coordinator`]) - Stage ordering, resumption, and
//!   molecule-level error containment

pub mod coordinator;
pub mod record;
pub mod search;
