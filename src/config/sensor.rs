// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! XDB401 sensor configuration
//!
//! ```yaml
//! sensor:
//!   name: Tank pressure
//!   address: 127
//!   update_interval_ms: 60000
//!   read_mode: contiguous
//!   decode:
//!     mode: full_scale
//!     fullscale_mpa: 10.0
//!     unit: bar
//!   timing:
//!     poll_interval_ms: 5
//!     conversion_timeout_ms: 50
//!   temperature:
//!     name: Tank temperature
//!   pressure:
//!     name: Tank pressure
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::xdb401::decoder::{Calibration, DecodeMode, PressureUnit};
use crate::xdb401::driver::ReadMode;
use crate::xdb401::policy::TimeoutPolicy;
use crate::xdb401::registers::DEFAULT_ADDRESS;

/// Settings of one XDB401 transducer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Name used in logs and as prefix of the channels
    #[serde(default = "default_name")]
    pub name: String,

    /// 7-bit I2C address
    #[serde(default = "default_address")]
    pub address: u8,

    /// Period between measurement cycles in milliseconds
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default)]
    pub read_mode: ReadMode,

    #[serde(default)]
    pub decode: DecodeConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    /// Temperature output, `null` to disable
    #[serde(default = "default_temperature")]
    pub temperature: Option<ChannelConfig>,

    /// Pressure output, `null` to disable
    #[serde(default = "default_pressure")]
    pub pressure: Option<ChannelConfig>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            address: default_address(),
            update_interval_ms: default_update_interval_ms(),
            read_mode: ReadMode::default(),
            decode: DecodeConfig::default(),
            timing: TimingConfig::default(),
            temperature: default_temperature(),
            pressure: default_pressure(),
        }
    }
}

impl SensorConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

fn default_name() -> String {
    "XDB401".to_string()
}

fn default_address() -> u8 {
    DEFAULT_ADDRESS
}

fn default_update_interval_ms() -> u64 {
    60_000
}

fn default_temperature() -> Option<ChannelConfig> {
    Some(ChannelConfig {
        name: "Temperature".to_string(),
    })
}

fn default_pressure() -> Option<ChannelConfig> {
    Some(ChannelConfig {
        name: "Pressure".to_string(),
    })
}

/// Pressure decoding parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    #[serde(default = "default_mode")]
    pub mode: DecodeMode,

    /// Full-scale pressure of the transducer in MPa
    #[serde(default = "default_fullscale_mpa")]
    pub fullscale_mpa: f64,

    #[serde(default = "default_unit")]
    pub unit: PressureUnit,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            fullscale_mpa: default_fullscale_mpa(),
            unit: default_unit(),
        }
    }
}

impl DecodeConfig {
    pub fn calibration(&self) -> Calibration {
        Calibration::new(self.mode, self.fullscale_mpa, self.unit)
    }
}

fn default_mode() -> DecodeMode {
    DecodeMode::FullScale
}

fn default_fullscale_mpa() -> f64 {
    10.0
}

fn default_unit() -> PressureUnit {
    PressureUnit::Bar
}

/// Busy polling cadence and deadline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_conversion_timeout_ms")]
    pub conversion_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            conversion_timeout_ms: default_conversion_timeout_ms(),
        }
    }
}

impl TimingConfig {
    pub fn policy(&self) -> TimeoutPolicy {
        TimeoutPolicy::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_millis(self.conversion_timeout_ms),
        )
    }
}

fn default_poll_interval_ms() -> u64 {
    5
}

fn default_conversion_timeout_ms() -> u64 {
    50
}

/// One published quantity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
}
