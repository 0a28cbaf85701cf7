//! CLI arguments and subcommands for heap-trigger-tuner.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Allocation pattern driven by the stress harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPattern {
    /// Steady allocation rate
    Constant,
    /// Sine-modulated allocation rate, like daily traffic
    Wave,
    /// Mostly quiet with short bursts of large objects
    Spike,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "heap-trigger-tuner",
    about = "Adaptive GC growth-trigger tuner with a simulated-heap stress harness",
    long_about = "Adaptive GC growth-trigger tuner.\n\n\
                  Keeps a collector's growth trigger matched to the live working set so the \
                  process stays inside a memory budget. Without a subcommand the stress harness \
                  runs against a simulated heap.",
    version = "0.1.0",
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (overrides log_level from the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Memory hard limit in MB
    #[arg(long)]
    pub memory_limit_mb: Option<u64>,

    /// Container memory limit in bytes, used when no hard limit is set
    #[arg(long, env = "MEMORY_LIMIT_BYTES")]
    pub container_limit_bytes: Option<u64>,

    /// Growth trigger the collector currently runs with
    #[arg(long, env = "GC_TRIGGER_PERCENT")]
    pub initial_trigger: Option<i64>,

    /// Fraction of the limit used as steady-state ceiling (0-1]
    #[arg(long)]
    pub safety_factor: Option<f64>,

    /// Lower bound for the growth trigger
    #[arg(long)]
    pub min_trigger: Option<i64>,

    /// Upper bound for the growth trigger
    #[arg(long)]
    pub max_trigger: Option<i64>,

    /// Allow a looser ceiling while far below the safety limit
    #[arg(long)]
    pub allow_peak_override: bool,

    /// Multiplier applied to the safety limit by the peak override
    #[arg(long)]
    pub peak_threshold: Option<f64>,

    /// Log every trigger adjustment at info level
    #[arg(long)]
    pub debug: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive a simulated heap with a load pattern while the tuner runs
    Stress {
        /// Load pattern
        #[arg(long, value_enum)]
        load: Option<LoadPattern>,

        /// Minimum object size in MB
        #[arg(long)]
        min_obj: Option<u64>,

        /// Maximum object size in MB
        #[arg(long)]
        max_obj: Option<u64>,

        /// Test duration in seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Seconds an object stays reachable
        #[arg(long)]
        hold: Option<u64>,

        /// Run with the baseline trigger only, for comparison
        #[arg(long)]
        disable_tuner: bool,

        /// Print final Prometheus metrics on exit
        #[arg(long)]
        prometheus: bool,
    },

    /// Summarise metrics report lines from a stress run log
    Analyze {
        /// Log file produced by a stress run
        #[arg(short = 'l', long)]
        log: PathBuf,

        /// Report output path ("-" for stdout)
        #[arg(short = 'o', long, default_value = "report.txt")]
        output: PathBuf,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Show the validated tuner configuration and every corrected value
    Check,
}
