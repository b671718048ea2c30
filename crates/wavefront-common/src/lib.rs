//! Shared utilities used across Wavefront crates.
//!
//! `wavefront-common` is intentionally small and boring: it contains
//! foundational building blocks that are reused across the workspace but do
//! not encode domain-specific behavior.
//!
//! Most crates should depend on these helpers instead of duplicating ad-hoc
//! parsing, path construction, and I/O glue.

#![warn(missing_docs)]

/// Validation helpers for Wavefront task identifiers.
pub mod id;

/// Convenience wrappers around common file I/O operations.
pub mod io;

/// Canonical `.wavefront/` path builders.
pub mod paths;
