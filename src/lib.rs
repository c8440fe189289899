//! Declarative process supervisor for Unix hosts.

#![warn(unused_crate_dependencies)]
// These dependencies are only used in the binary (src/bin/main.rs)
// Test dependencies are only used in test code
#[cfg(test)]
use assert_cmd as _;
#[cfg(test)]
use predicates as _;
use strum as _;
use tracing_subscriber as _;

/// CLI parsing.
pub mod cli;

/// Config loading.
pub mod config;

/// Errors.
pub mod error;

/// Event log.
pub mod events;

/// Process table management.
pub mod manager;

/// Child process entries.
pub mod process;

/// Control shell.
pub mod shell;

/// Status views.
pub mod status;

/// Supervisor orchestration.
pub mod supervisor;
