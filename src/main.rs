//! heap-trigger-tuner - version 0.1.0
//!
//! Adaptive GC growth-trigger tuner with tracing logging.
//! This is the main entry point that runs the stress harness and handles subcommands.

mod cli;
mod commands;
mod config;
mod workload;

use clap::{Parser, ValueEnum};
use tracing::{info, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_analyze, command_check, command_config, command_stress};
use config::{resolve_config, show_config, validate_effective_config, AppConfig};

/// Initializes tracing logging subsystem with configured log level.
/// Precedence: --log-level > config log_level > info.
fn setup_logging(config: &AppConfig, args: &Args) {
    let level = args
        .log_level
        .clone()
        .or_else(|| {
            config
                .log_level
                .as_deref()
                .and_then(|s| LogLevel::from_str(s, true).ok())
        })
        .unwrap_or(LogLevel::Info);

    let log_level = match level {
        LogLevel::Off => return,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {:?}", level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format.clone());
    }

    // Handle subcommands that do not depend on the effective config
    match &args.command {
        Some(Commands::Config {
            output,
            format,
            commented,
        }) => return command_config(output.clone(), format.clone(), *commented),
        Some(Commands::Analyze { log, output }) => return command_analyze(log, output),
        Some(Commands::Check) => {
            let config = resolve_config(&args)?;
            return command_check(&config);
        }
        Some(Commands::Stress { .. }) | None => {}
    }

    // Stress harness is the default mode
    let config = load_validated_config(&args)?;
    setup_logging(&config, &args);

    info!("Starting heap-trigger-tuner stress harness");

    let prometheus = matches!(
        args.command,
        Some(Commands::Stress {
            prometheus: true,
            ..
        })
    );
    command_stress(&config, prometheus).await?;

    info!("heap-trigger-tuner stopped");
    Ok(())
}
