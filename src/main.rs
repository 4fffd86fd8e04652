// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the XDB401 transducer daemon
use anyhow::Result;
use clap::Parser;
use log::info;
use rust_xdb401::config::{self, parse_i2c_address, Config, I2CBusType};
use rust_xdb401::daemon::Daemon;
use rust_xdb401::xdb401::{DecodeMode, PressureUnit};
use std::path::PathBuf;
use tokio::signal;

/// XDB401 pressure and temperature transducer daemon
#[derive(Debug, Parser)]
#[command(name = "xdb401d", author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a configuration to validate and exit
    #[arg(long)]
    validate_config: Option<PathBuf>,

    /// Output the configuration schema as JSON and exit
    #[arg(long)]
    show_config_schema: bool,

    /// I2C address of the transducer, decimal or 0x-prefixed hexadecimal
    #[arg(long, value_parser = parse_i2c_address)]
    address: Option<u8>,

    /// Bus type: mock or native
    #[arg(long)]
    bus: Option<I2CBusType>,

    /// I2C character device used by the native bus
    #[arg(long)]
    device: Option<String>,

    /// Period between measurement cycles in milliseconds
    #[arg(long)]
    update_interval_ms: Option<u64>,

    /// Full-scale pressure of the transducer in MPa
    #[arg(long)]
    fullscale_mpa: Option<f64>,

    /// Pressure decoding: half_pascal or full_scale
    #[arg(long)]
    decode_mode: Option<DecodeMode>,

    /// Unit of the published pressure: pa, hpa, kpa, bar or mpa
    #[arg(long)]
    unit: Option<PressureUnit>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger with appropriate level based on verbose and quiet flags
    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if args.show_config_schema {
        return config::output_config_schema();
    }

    if let Some(validate_path) = args.validate_config {
        if !validate_path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file does not exist: {}",
                validate_path.display()
            ));
        }

        Config::from_file(&validate_path)
            .map_err(|err| anyhow::anyhow!("Configuration validation failed: {}", err))?;
        println!("Configuration file is valid: {}", validate_path.display());
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    config.apply_args(
        args.address,
        args.bus,
        args.device.clone(),
        args.update_interval_ms,
        args.fullscale_mpa,
        args.decode_mode,
        args.unit,
    );
    config::validate_specific_rules(&config)?;

    info!("Starting XDB401 daemon");
    let mut daemon = Daemon::new();
    daemon.launch(&config).await?;

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal, terminating daemon");
        }
        Err(err) => {
            eprintln!("Error waiting for shutdown signal: {}", err);
        }
    }
    daemon.shutdown();
    daemon.join().await?;

    Ok(())
}
