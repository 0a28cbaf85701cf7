//! Check command implementation.
//!
//! Validates the host configuration and shows what the tuner will run with.

use crate::config::{validate_effective_config, AppConfig};

/// Prints the validated tuner configuration and every correction applied.
pub fn command_check(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Heap Trigger Tuner - Configuration Check");
    println!("===========================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking host configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    println!("\n🎛️  Tuner settings...");
    let (validated, corrections) = config.tuner.validate();
    println!("   safety_factor:       {:.2}", validated.safety_factor);
    println!(
        "   trigger bounds:      {} - {}",
        validated.min_trigger, validated.max_trigger
    );
    println!(
        "   peak override:       {} (threshold {:.2})",
        validated.allow_peak_override, validated.peak_threshold
    );
    println!("   initial trigger:     {}", config.tuner.initial_trigger());
    println!(
        "   forced collection:   every {}s",
        validated.forced_collection_interval.as_secs()
    );
    println!(
        "   poll interval:       {}s (without collection notifier)",
        validated.poll_interval.as_secs()
    );

    println!("\n💾 Memory limit...");
    if let Some(limit) = config.tuner.explicit_limit() {
        println!("   ✅ Configured hard limit: {}MB", limit >> 20);
    } else if let Some(limit) = config.tuner.container_limit() {
        println!("   ✅ Container limit: {}MB", limit >> 20);
    } else {
        println!("   ⚠️  No limit configured, 80% of reserved runtime memory will be used");
    }

    println!("\n🩹 Corrections...");
    if corrections.is_empty() {
        println!("   ✅ No tunables needed correction");
    } else {
        for correction in &corrections {
            println!("   ⚠️  {}", correction);
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review the configuration");
        std::process::exit(1);
    }
}
