// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! CLI module for pipe counting.
//!
//! This module contains the command-line interface logic, including argument
//! parsing and the `count` and `clear-cache` command implementations.

// Modules
/// CLI arguments.
pub mod args;

/// Counting and cache-clearing logic.
pub mod count;

/// Logging macros and verbosity.
pub mod logging;
