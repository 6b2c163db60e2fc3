//! Config validation CLI tool
//!
//! Validates an adwatchd configuration file and reports any errors.

use adwatch_api::AdStatus;
use adwatch_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates an adwatchd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match adwatch_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", adwatch_config::CURRENT_CONFIG_VERSION);
            println!("  Listen address: {}", policy.service.listen_addr);
            println!("  Session mode: {}", policy.service.session_mode.as_str());
            println!(
                "  Cooldown: {}",
                adwatch_util::format_duration(policy.watch.cooldown.period)
            );
            println!(
                "  Rate limit: {} views per {}",
                policy.watch.rate_limit.max_events,
                adwatch_util::format_duration(policy.watch.rate_limit.window)
            );
            println!("  Ads: {}", policy.ads.len());

            if !policy.ads.is_empty() {
                println!();
                println!("Ads:");
                for ad in &policy.ads {
                    let status = match ad.status {
                        AdStatus::Active => "",
                        AdStatus::Inactive => " (inactive)",
                    };
                    println!(
                        "  - {} [{}, {}s]: {} pays {}{}",
                        ad.id, ad.category, ad.duration_secs, ad.title, ad.reward, status
                    );
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                adwatch_config::ConfigError::ReadError { source, .. } => {
                    eprintln!("Failed to read file: {}", source);
                }
                adwatch_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                adwatch_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                adwatch_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        adwatch_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
