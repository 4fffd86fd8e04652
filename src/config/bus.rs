// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! I2C bus configuration

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::xdb401::registers::DEFAULT_ADDRESS;

/// Kind of I2C bus the sensor sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum I2CBusType {
    /// Simulated transducer, no hardware required
    #[default]
    Mock,
    /// Linux `/dev/i2c-*` character device (`native` feature)
    Native,
}

impl fmt::Display for I2CBusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            I2CBusType::Mock => write!(f, "mock"),
            I2CBusType::Native => write!(f, "native"),
        }
    }
}

impl FromStr for I2CBusType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(I2CBusType::Mock),
            "native" => Ok(I2CBusType::Native),
            other => Err(format!("unknown bus type '{}', expected mock or native", other)),
        }
    }
}

/// Bus selection and parameters.
///
/// ```yaml
/// bus:
///   type: native
///   device: /dev/i2c-1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct I2CBusConfig {
    #[serde(rename = "type", default)]
    pub bus_type: I2CBusType,

    /// Character device used by the native bus
    #[serde(default = "default_device")]
    pub device: String,

    /// Simulated transducer used by the mock bus
    #[serde(default)]
    pub mock: MockDeviceConfig,
}

impl Default for I2CBusConfig {
    fn default() -> Self {
        Self {
            bus_type: I2CBusType::default(),
            device: default_device(),
            mock: MockDeviceConfig::default(),
        }
    }
}

fn default_device() -> String {
    "/dev/i2c-1".to_string()
}

/// Behaviour of the simulated transducer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockDeviceConfig {
    /// Address the simulated device answers on
    #[serde(default = "default_mock_address")]
    pub address: u8,

    /// When false the device never acknowledges, to exercise setup failure
    #[serde(default = "default_present")]
    pub present: bool,

    /// 24-bit signed pressure counts latched on every conversion
    #[serde(default = "default_pressure_raw")]
    pub pressure_raw: i32,

    /// 16-bit signed temperature counts, 1/256 °C each
    #[serde(default = "default_temperature_raw")]
    pub temperature_raw: i16,

    /// Busy status reads after each conversion start
    #[serde(default = "default_busy_polls")]
    pub busy_polls: u32,

    /// Uniform random noise added to the pressure counts
    #[serde(default)]
    pub jitter_counts: u32,
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            address: default_mock_address(),
            present: default_present(),
            pressure_raw: default_pressure_raw(),
            temperature_raw: default_temperature_raw(),
            busy_polls: default_busy_polls(),
            jitter_counts: 0,
        }
    }
}

fn default_mock_address() -> u8 {
    DEFAULT_ADDRESS
}

fn default_present() -> bool {
    true
}

/// A tenth of the positive range: 10 bar on a 10 MPa sensor
fn default_pressure_raw() -> i32 {
    838_861
}

/// 23 °C
fn default_temperature_raw() -> i16 {
    5_888
}

fn default_busy_polls() -> u32 {
    2
}
