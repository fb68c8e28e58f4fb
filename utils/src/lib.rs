//! Shared infrastructure utilities for Quire.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`diff`**: Line diff model for reviewing proposed rewrites

pub mod atomic_write;
pub mod diff;

pub use atomic_write::{AtomicWriteOptions, FileSyncPolicy, PersistMode, atomic_write, atomic_write_with_options};
pub use diff::{DiffLine, DiffLineKind, DocumentDiff};
