//! Shared infrastructure utilities for Onpoint.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`diff`**: Unified diff rendering and stats for proposed fixes

pub mod atomic_write;
pub mod diff;

pub use atomic_write::{WriteOptions, atomic_write, atomic_write_with_options, recover_bak_file};
pub use diff::{diff_stats, unified_diff};
