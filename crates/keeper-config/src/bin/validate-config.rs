//! Config validation CLI tool
//!
//! Validates a keeperd configuration file and prints the effective settings.

use keeper_config::ConfigError;
use keeper_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let config_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a keeperd configuration file.");
            eprintln!("Default location: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match keeper_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("  Config version:   {}", keeper_config::CURRENT_CONFIG_VERSION);
            println!("  Socket:           {}", config.daemon.socket_path.display());
            println!("  Data directory:   {}", config.daemon.data_dir.display());
            println!(
                "  Monitor:          every {}s, auto-kill {}, start on launch {}",
                config.monitor.poll_interval.as_secs(),
                config.monitor.auto_kill,
                config.monitor.start_on_launch
            );
            println!(
                "  Hosts file:       {} -> {} (timeout {}s)",
                config.enforcement.hosts_path.display(),
                config.enforcement.redirect_address,
                config.enforcement.timeout.as_secs()
            );
            println!(
                "  Default target:   {} minutes",
                config.focus.default_target_minutes
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        keeper_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
