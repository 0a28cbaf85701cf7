//! Configuration management for heap-trigger-tuner.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, Commands, ConfigFormat, LoadPattern};
use heap_trigger_tuner::TunerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const MB: u64 = 1024 * 1024;

/// Stress harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressConfig {
    #[serde(default = "default_load")]
    pub load: LoadPattern,

    #[serde(default = "default_min_object_mb", alias = "min-object-mb")]
    pub min_object_mb: u64,

    #[serde(default = "default_max_object_mb", alias = "max-object-mb")]
    pub max_object_mb: u64,

    #[serde(default = "default_duration_secs", alias = "duration-secs")]
    pub duration_secs: u64,

    /// Seconds an object stays reachable before the cleanup task drops it
    #[serde(default = "default_hold_secs", alias = "hold-secs")]
    pub hold_secs: u64,

    #[serde(default = "default_report_interval_secs", alias = "report-interval-secs")]
    pub report_interval_secs: u64,

    #[serde(default = "default_enable_tuner", alias = "enable-tuner")]
    pub enable_tuner: bool,
}

fn default_load() -> LoadPattern {
    LoadPattern::Wave
}
fn default_min_object_mb() -> u64 {
    1
}
fn default_max_object_mb() -> u64 {
    10
}
fn default_duration_secs() -> u64 {
    60
}
fn default_hold_secs() -> u64 {
    5
}
fn default_report_interval_secs() -> u64 {
    2
}
fn default_enable_tuner() -> bool {
    true
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            load: default_load(),
            min_object_mb: default_min_object_mb(),
            max_object_mb: default_max_object_mb(),
            duration_secs: default_duration_secs(),
            hold_secs: default_hold_secs(),
            report_interval_secs: default_report_interval_secs(),
            enable_tuner: default_enable_tuner(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub log_level: Option<String>,

    #[serde(default = "default_tuner")]
    pub tuner: TunerConfig,

    #[serde(default)]
    pub stress: StressConfig,
}

/// Configuration used by the stress harness when nothing is configured:
/// a 500MB budget with the peak override enabled.
fn default_tuner() -> TunerConfig {
    TunerConfig {
        memory_hard_limit: Some(500 * MB),
        allow_peak_override: true,
        debug: true,
        ..TunerConfig::default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".into()),
            tuner: default_tuner(),
            stress: StressConfig::default(),
        }
    }
}

/// Validate effective config (used by --check-config and at startup).
///
/// Tuner tunables are never rejected here; the tuner corrects them itself.
pub fn validate_effective_config(cfg: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let stress = &cfg.stress;

    if stress.min_object_mb == 0 {
        return Err("stress.min_object_mb must be at least 1".into());
    }
    if stress.min_object_mb > stress.max_object_mb {
        return Err(format!(
            "stress.min_object_mb ({}) is larger than stress.max_object_mb ({})",
            stress.min_object_mb, stress.max_object_mb
        )
        .into());
    }
    if stress.duration_secs == 0 {
        return Err("stress.duration_secs must be greater than 0".into());
    }
    if stress.report_interval_secs == 0 {
        return Err("stress.report_interval_secs must be greater than 0".into());
    }

    if let Some(level) = cfg.log_level.as_deref() {
        match level {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(format!(
                    "Invalid log_level '{}', expected off/error/warn/info/debug/trace",
                    other
                )
                .into());
            }
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        AppConfig::default()
    } else {
        load_config(args.config.as_deref().and_then(|p| p.to_str()))?
    };

    if let Some(level) = &args.log_level {
        config.log_level = Some(format!("{:?}", level).to_lowercase());
    }

    // Tuner overrides
    if let Some(limit_mb) = args.memory_limit_mb {
        config.tuner.memory_hard_limit = Some(limit_mb * MB);
    }
    if let Some(limit) = args.container_limit_bytes {
        config.tuner.container_memory_limit = Some(limit);
    }
    if let Some(trigger) = args.initial_trigger {
        config.tuner.initial_trigger = Some(trigger);
    }
    if let Some(factor) = args.safety_factor {
        config.tuner.safety_factor = factor;
    }
    if let Some(min) = args.min_trigger {
        config.tuner.min_trigger = min;
    }
    if let Some(max) = args.max_trigger {
        config.tuner.max_trigger = max;
    }
    if args.allow_peak_override {
        config.tuner.allow_peak_override = true;
    }
    if let Some(threshold) = args.peak_threshold {
        config.tuner.peak_threshold = threshold;
    }
    if args.debug {
        config.tuner.debug = true;
    }

    // Stress overrides: CLI wins if provided
    if let Some(Commands::Stress {
        load,
        min_obj,
        max_obj,
        duration,
        hold,
        disable_tuner,
        ..
    }) = &args.command
    {
        if let Some(load) = load {
            config.stress.load = *load;
        }
        if let Some(min) = min_obj {
            config.stress.min_object_mb = *min;
        }
        if let Some(max) = max_obj {
            config.stress.max_object_mb = *max;
        }
        if let Some(duration) = duration {
            config.stress.duration_secs = *duration;
        }
        if let Some(hold) = hold {
            config.stress.hold_secs = *hold;
        }
        if *disable_tuner {
            config.stress.enable_tuner = false;
        }
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&str>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/heap-trigger-tuner/config.yaml",
            "/etc/heap-trigger-tuner/config.yml",
            "/etc/heap-trigger-tuner/config.json",
            "./heap-trigger-tuner.yaml",
            "./heap-trigger-tuner.yml",
            "./heap-trigger-tuner.json",
            "./heap-trigger-tuner.toml",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if path.to_string_lossy().is_empty() || !path.exists() {
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: AppConfig = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: AppConfig = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format
pub fn render_config(
    config: &AppConfig,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    Ok(output)
}

/// Shows configuration in requested format
pub fn show_config(config: &AppConfig, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, &format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_effective_config(&config).is_ok());
        assert_eq!(config.tuner.memory_hard_limit, Some(500 * MB));
        assert!(config.tuner.allow_peak_override);
    }

    #[test]
    fn test_invalid_stress_sizes() {
        let mut config = AppConfig::default();
        config.stress.min_object_mb = 12;
        config.stress.max_object_mb = 4;
        assert!(validate_effective_config(&config).is_err());

        config.stress.min_object_mb = 0;
        assert!(validate_effective_config(&config).is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.log_level = Some("verbose".into());
        assert!(validate_effective_config(&config).is_err());
    }

    #[test]
    fn test_bad_tunables_are_not_rejected() {
        let mut config = AppConfig::default();
        config.tuner.safety_factor = 7.0;
        config.tuner.min_trigger = -5;
        assert!(validate_effective_config(&config).is_ok());
    }

    #[test]
    fn test_load_yaml() {
        let file = write_temp(
            ".yaml",
            "tuner:\n  memory_hard_limit: 1048576\n  safety_factor: 0.6\nstress:\n  load: spike\n",
        );
        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.tuner.memory_hard_limit, Some(1048576));
        assert_eq!(config.tuner.safety_factor, 0.6);
        assert_eq!(config.tuner.min_trigger, 25);
        assert_eq!(config.stress.load, LoadPattern::Spike);
        assert_eq!(config.stress.hold_secs, 5);
    }

    #[test]
    fn test_load_json_and_toml() {
        let file = write_temp(".json", r#"{"tuner": {"max_trigger": 300}, "log_level": "debug"}"#);
        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.tuner.max_trigger, 300);
        assert_eq!(config.log_level.as_deref(), Some("debug"));

        let file = write_temp(".toml", "[tuner]\nmin_trigger = 40\n\n[stress]\nload = \"constant\"\n");
        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.tuner.min_trigger, 40);
        assert_eq!(config.stress.load, LoadPattern::Constant);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_config(Some("/nonexistent/heap-trigger-tuner.yaml")).unwrap();
        assert_eq!(config.stress.duration_secs, 60);
    }

    #[test]
    fn test_cli_overrides_file() {
        let args = Args::parse_from([
            "heap-trigger-tuner",
            "--no-config",
            "--memory-limit-mb",
            "256",
            "--safety-factor",
            "0.9",
            "--initial-trigger",
            "80",
            "stress",
            "--load",
            "constant",
            "--duration",
            "5",
            "--disable-tuner",
        ]);
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.tuner.memory_hard_limit, Some(256 * MB));
        assert_eq!(config.tuner.safety_factor, 0.9);
        assert_eq!(config.tuner.initial_trigger, Some(80));
        assert_eq!(config.stress.load, LoadPattern::Constant);
        assert_eq!(config.stress.duration_secs, 5);
        assert!(!config.stress.enable_tuner);
    }

    #[test]
    fn test_render_round_trips_through_yaml() {
        let config = AppConfig::default();
        let yaml = render_config(&config, &ConfigFormat::Yaml).unwrap();
        let parsed: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.tuner, config.tuner);
    }
}
