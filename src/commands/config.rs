//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, AppConfig};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from(match format {
            ConfigFormat::Json => "heap-trigger-tuner.json",
            ConfigFormat::Toml => "heap-trigger-tuner.toml",
            ConfigFormat::Yaml => "heap-trigger-tuner.yaml",
        }),
    };

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Heap Trigger Tuner Configuration
# ================================
#
# Tuner
# -----
# tuner:
#   memory_hard_limit: null        # Hard limit in bytes (null/0 = use container limit)
#   container_memory_limit: null   # Container limit in bytes (env MEMORY_LIMIT_BYTES)
#   initial_trigger: null          # Trigger the collector starts with (env GC_TRIGGER_PERCENT)
#   safety_factor: 0.7             # Steady-state ceiling as fraction of the limit (0-1]
#   min_trigger: 25                # Lower bound for the trigger
#   max_trigger: 500               # Upper bound for the trigger
#   allow_peak_override: false     # Looser ceiling while live set < half the safety limit
#   peak_threshold: 1.5            # Peak ceiling = safety limit * peak_threshold
#   debug: false                   # Log every adjustment at info level
#   forced_collection_interval_secs: 120  # Timer period forcing a collection
#   poll_interval_secs: 5          # Timer period when the runtime has no GC notifier
#
# Stress Harness
# --------------
# stress:
#   load: wave                     # constant, wave or spike
#   min_object_mb: 1               # Smallest allocated object
#   max_object_mb: 10              # Largest allocated object
#   duration_secs: 60              # Run length
#   hold_secs: 5                   # How long objects stay reachable
#   report_interval_secs: 2        # Metrics report period
#   enable_tuner: true             # false = baseline trigger only
#
# Logging
# -------
# log_level: "info"                # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commented_yaml_still_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuner.yaml");
        command_config(Some(path.clone()), ConfigFormat::Yaml, true).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Heap Trigger Tuner Configuration"));
        let parsed: AppConfig = serde_yaml::from_str(&content).unwrap();
        assert_eq!(parsed.stress.duration_secs, 60);
    }

    #[test]
    fn test_toml_output_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuner.toml");
        command_config(Some(path.clone()), ConfigFormat::Toml, false).unwrap();

        let config = crate::config::load_config(path.to_str()).unwrap();
        assert_eq!(config.tuner, AppConfig::default().tuner);
    }
}
