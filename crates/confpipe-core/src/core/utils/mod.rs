//! Shared geometric utilities.

pub mod geometry;
