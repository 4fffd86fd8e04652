// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the XDB401 daemon
//!
//! The configuration is backed by a YAML file and validated against a JSON
//! schema embedded in the binary before being deserialized.
//!
//! ## Configuration Structure
//!
//! - `bus`: which I2C bus to open (`mock` or `native`) and its parameters
//! - `sensor`: address, update interval, decoding, timing and output channels
//!
//! ## Usage
//!
//! ```no_run
//! use rust_xdb401::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some(0x28), // Address
//!     None,       // Bus type
//!     None,       // Bus device
//!     Some(1000), // Update interval
//!     None,       // Full scale
//!     None,       // Decode mode
//!     None,       // Unit
//! );
//!
//! println!("Sensor address: 0x{:02X}", config.sensor.address);
//! ```

pub mod bus;
pub mod sensor;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use bus::{I2CBusConfig, I2CBusType, MockDeviceConfig};
pub use sensor::{ChannelConfig, DecodeConfig, SensorConfig, TimingConfig};
pub use utils::{output_config_schema, parse_i2c_address, validate_specific_rules};

use crate::xdb401::decoder::{DecodeMode, PressureUnit};

/// JSON schema the YAML file is validated against
pub const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bus the transducer is attached to.
    ///
    /// Defaults to the simulated transducer so the daemon runs without
    /// hardware.
    #[serde(default)]
    pub bus: I2CBusConfig,

    /// Transducer settings
    #[serde(default)]
    pub sensor: SensorConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Validate a YAML document against the embedded schema
    fn validate_schema(contents: &str, origin: &Path) -> Result<()> {
        let yaml_value: serde_yml::Value = serde_yml::from_str(contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", origin))?;

        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", origin)
        })?;

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", origin.display());
        if let Err(error) = validator.validate(&json_value) {
            anyhow::bail!("Configuration validation failed: {}", error);
        }
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with the default configuration. When the file
    /// is invalid, a `<name>.sample.yaml` with the defaults is written next to
    /// it and an error is returned.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        if let Err(err) = Self::validate_schema(&contents, path) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            return Err(err);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only the arguments actually provided override the loaded values.
    ///
    /// # Parameters
    ///
    /// * `address` - 7-bit I2C address of the transducer
    /// * `bus_type` - `mock` or `native`
    /// * `device` - Character device of the native bus
    /// * `update_interval_ms` - Period between measurement cycles
    /// * `fullscale_mpa` - Full-scale pressure used by `full_scale` decoding
    /// * `decode_mode` - Pressure decoding convention
    /// * `unit` - Unit of the published pressure
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        address: Option<u8>,
        bus_type: Option<I2CBusType>,
        device: Option<String>,
        update_interval_ms: Option<u64>,
        fullscale_mpa: Option<f64>,
        decode_mode: Option<DecodeMode>,
        unit: Option<PressureUnit>,
    ) {
        if let Some(address) = address {
            debug!("Overriding sensor address from command line: 0x{:02X}", address);
            self.sensor.address = address;
        }
        if let Some(bus_type) = bus_type {
            debug!("Overriding bus type from command line: {}", bus_type);
            self.bus.bus_type = bus_type;
        }
        if let Some(device) = device {
            debug!("Overriding bus device from command line: {}", device);
            self.bus.device = device;
        }
        if let Some(interval) = update_interval_ms {
            debug!("Overriding update interval from command line: {} ms", interval);
            self.sensor.update_interval_ms = interval;
        }
        if let Some(fullscale) = fullscale_mpa {
            debug!("Overriding full scale from command line: {} MPa", fullscale);
            self.sensor.decode.fullscale_mpa = fullscale;
        }
        if let Some(mode) = decode_mode {
            debug!("Overriding decode mode from command line: {}", mode);
            self.sensor.decode.mode = mode;
        }
        if let Some(unit) = unit {
            debug!("Overriding pressure unit from command line: {}", unit);
            self.sensor.decode.unit = unit;
        }
    }
}
