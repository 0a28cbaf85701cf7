//! CLI command implementations for heap-trigger-tuner.
//!
//! This module provides implementations for all CLI subcommands:
//! - `stress`: Simulated-heap stress run with the tuner attached
//! - `analyze`: Summary report from a stress run log
//! - `config`: Configuration file generation
//! - `check`: Configuration validation and tuner corrections

pub mod analyze;
pub mod check;
pub mod config;
pub mod stress;

// Re-export command functions
pub use analyze::command_analyze;
pub use check::command_check;
pub use config::command_config;
pub use stress::command_stress;
