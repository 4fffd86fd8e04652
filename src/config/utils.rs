// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! Schema output, rules the JSON schema cannot express, and argument parsing
//! helpers.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{Config, I2CBusType, CONFIG_SCHEMA};

/// Highest 7-bit I2C address
pub const MAX_I2C_ADDRESS: u8 = 0x7F;

/// Output the embedded JSON schema to the console.
///
/// Called when the `--show-config-schema` flag is provided on the command
/// line.
///
/// # Example
///
/// ```bash
/// ./xdb401d --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Parse a 7-bit I2C address given in decimal or `0x` hexadecimal
///
/// Usable as a clap value parser.
pub fn parse_i2c_address(value: &str) -> Result<u8, String> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse::<u8>(),
    }
    .map_err(|e| format!("invalid I2C address '{}': {}", value, e))?;

    if parsed > MAX_I2C_ADDRESS {
        return Err(format!(
            "I2C address 0x{:02X} is out of the 7-bit range",
            parsed
        ));
    }
    Ok(parsed)
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Full scale**: must be a finite, strictly positive number of MPa
/// - **Timing**: the update and poll intervals must be non-zero, and the poll
///   interval must not exceed the conversion timeout
/// - **Address**: must fit in 7 bits
///
/// An update interval shorter than the conversion timeout, a mock device on a
/// different address than the sensor, or a sensor without any output channel
/// only produce warnings.
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");
    let sensor = &config.sensor;

    if !sensor.decode.fullscale_mpa.is_finite() || sensor.decode.fullscale_mpa <= 0.0 {
        anyhow::bail!(
            "Invalid full scale pressure: {} MPa",
            sensor.decode.fullscale_mpa
        );
    }

    if sensor.update_interval_ms == 0 {
        anyhow::bail!("Update interval must be greater than 0 ms");
    }

    if sensor.timing.poll_interval_ms == 0 {
        anyhow::bail!("Poll interval must be greater than 0 ms");
    }

    if sensor.timing.conversion_timeout_ms < sensor.timing.poll_interval_ms {
        anyhow::bail!(
            "Conversion timeout ({} ms) is shorter than the poll interval ({} ms)",
            sensor.timing.conversion_timeout_ms,
            sensor.timing.poll_interval_ms
        );
    }

    if sensor.address > MAX_I2C_ADDRESS {
        anyhow::bail!("I2C address 0x{:02X} is out of the 7-bit range", sensor.address);
    }

    if sensor.update_interval_ms <= sensor.timing.conversion_timeout_ms {
        warn!(
            "Update interval ({} ms) does not exceed the conversion timeout ({} ms), some ticks will be deferred",
            sensor.update_interval_ms, sensor.timing.conversion_timeout_ms
        );
    }

    if config.bus.bus_type == I2CBusType::Mock && config.bus.mock.address != sensor.address {
        warn!(
            "Simulated device answers on 0x{:02X} but the sensor is configured at 0x{:02X}",
            config.bus.mock.address, sensor.address
        );
    }

    if sensor.temperature.is_none() && sensor.pressure.is_none() {
        warn!("Sensor '{}' has no output channel configured", sensor.name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_i2c_address() {
        assert_eq!(parse_i2c_address("127"), Ok(0x7F));
        assert_eq!(parse_i2c_address("0x28"), Ok(0x28));
        assert_eq!(parse_i2c_address("0X7f"), Ok(0x7F));
        assert!(parse_i2c_address("0x80").is_err());
        assert!(parse_i2c_address("300").is_err());
        assert!(parse_i2c_address("abc").is_err());
    }

    #[test]
    fn test_default_config_passes() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_bad_fullscale() {
        for value in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = Config::default();
            config.sensor.decode.fullscale_mpa = value;
            assert!(validate_specific_rules(&config).is_err(), "{} accepted", value);
        }
    }

    #[test]
    fn test_rejects_bad_timing() {
        let mut config = Config::default();
        config.sensor.timing.poll_interval_ms = 0;
        assert!(validate_specific_rules(&config).is_err());

        let mut config = Config::default();
        config.sensor.timing.poll_interval_ms = 20;
        config.sensor.timing.conversion_timeout_ms = 10;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_update_interval() {
        let mut config = Config::default();
        config.sensor.update_interval_ms = 0;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_rejects_eight_bit_address() {
        let mut config = Config::default();
        config.sensor.address = 0xFE;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let mut config = Config::default();
        config.sensor.update_interval_ms = 10;
        config.sensor.temperature = None;
        config.sensor.pressure = None;
        config.bus.mock.address = 0x28;
        assert!(validate_specific_rules(&config).is_ok());
    }
}
