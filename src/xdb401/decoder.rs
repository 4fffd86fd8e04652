// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Raw data decoding
//!
//! Pure conversion of the five data bytes into physical values. Two pressure
//! conventions exist for this transducer family and the right one depends on
//! the sensor variant, so both are available through [`DecodeMode`]:
//!
//! - [`DecodeMode::HalfPascal`]: one count is 0.5 Pa
//! - [`DecodeMode::FullScale`]: 2^23 counts span the configured full-scale
//!   pressure in MPa
//!
//! Temperature is always 1/256 °C per count.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::registers::{DATA_LEN, PRESSURE_LEN, TEMPERATURE_LEN};

/// Counts spanning the positive half of the 24-bit pressure range (2^23)
pub const PRESSURE_FULL_SCALE_COUNTS: f64 = 8_388_608.0;
/// Temperature counts per degree Celsius
pub const TEMPERATURE_COUNTS_PER_DEGREE: f64 = 256.0;
/// Pascals per count in half-pascal mode
pub const HALF_PASCAL_PER_COUNT: f64 = 0.5;

/// Sign-extend a 24-bit two's-complement value held in the low bits of `value`
#[inline]
pub fn sign_extend_24(value: u32) -> i32 {
    let value = (value & 0x00FF_FFFF) as i32;
    if value >= 1 << 23 {
        value - (1 << 24)
    } else {
        value
    }
}

/// Sign-extend a 16-bit two's-complement value
#[inline]
pub fn sign_extend_16(value: u16) -> i16 {
    value as i16
}

/// Signed raw counts of one conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub pressure: i32,
    pub temperature: i16,
}

impl RawSample {
    /// Decode the 3 pressure bytes and 2 temperature bytes, MSB first
    pub fn from_parts(pressure: &[u8; PRESSURE_LEN], temperature: &[u8; TEMPERATURE_LEN]) -> Self {
        let pressure_bits =
            (pressure[0] as u32) << 16 | (pressure[1] as u32) << 8 | pressure[2] as u32;
        let temperature_bits = u16::from_be_bytes(*temperature);
        Self {
            pressure: sign_extend_24(pressure_bits),
            temperature: sign_extend_16(temperature_bits),
        }
    }

    /// Decode a contiguous burst starting at the pressure register
    pub fn from_bytes(data: &[u8; DATA_LEN]) -> Self {
        Self::from_parts(&[data[0], data[1], data[2]], &[data[3], data[4]])
    }
}

/// Pressure decoding convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// raw / 2 gives pascals
    HalfPascal,
    /// raw / 2^23 × full-scale gives MPa
    FullScale,
}

impl fmt::Display for DecodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeMode::HalfPascal => write!(f, "half_pascal"),
            DecodeMode::FullScale => write!(f, "full_scale"),
        }
    }
}

impl FromStr for DecodeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "half_pascal" | "half-pascal" | "pascal" => Ok(DecodeMode::HalfPascal),
            "full_scale" | "full-scale" | "fullscale" => Ok(DecodeMode::FullScale),
            other => Err(format!(
                "unknown decode mode '{}', expected half_pascal or full_scale",
                other
            )),
        }
    }
}

/// Unit of the published pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureUnit {
    Pa,
    Hpa,
    Kpa,
    Bar,
    Mpa,
}

impl PressureUnit {
    /// Pascals in one unit
    pub const fn pascals(&self) -> f64 {
        match self {
            PressureUnit::Pa => 1.0,
            PressureUnit::Hpa => 100.0,
            PressureUnit::Kpa => 1_000.0,
            PressureUnit::Bar => 100_000.0,
            PressureUnit::Mpa => 1_000_000.0,
        }
    }

    /// Unit of measurement as displayed
    pub const fn symbol(&self) -> &'static str {
        match self {
            PressureUnit::Pa => "Pa",
            PressureUnit::Hpa => "hPa",
            PressureUnit::Kpa => "kPa",
            PressureUnit::Bar => "bar",
            PressureUnit::Mpa => "MPa",
        }
    }

    /// Convert a value in pascals to this unit
    #[inline]
    pub fn from_pascals(&self, pascals: f64) -> f64 {
        pascals / self.pascals()
    }
}

impl fmt::Display for PressureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for PressureUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pa" => Ok(PressureUnit::Pa),
            "hpa" | "mbar" => Ok(PressureUnit::Hpa),
            "kpa" => Ok(PressureUnit::Kpa),
            "bar" => Ok(PressureUnit::Bar),
            "mpa" => Ok(PressureUnit::Mpa),
            other => Err(format!("unknown pressure unit '{}'", other)),
        }
    }
}

/// A decoded measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Pressure in `pressure_unit`
    pub pressure: f64,
    pub pressure_unit: PressureUnit,
    pub temperature_celsius: f64,
    pub raw: RawSample,
}

/// Calibration parameters of one transducer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub mode: DecodeMode,
    /// Full-scale pressure in MPa, used by [`DecodeMode::FullScale`]
    pub fullscale_mpa: f64,
    pub unit: PressureUnit,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            mode: DecodeMode::FullScale,
            fullscale_mpa: 10.0,
            unit: PressureUnit::Bar,
        }
    }
}

impl Calibration {
    pub fn new(mode: DecodeMode, fullscale_mpa: f64, unit: PressureUnit) -> Self {
        Self {
            mode,
            fullscale_mpa,
            unit,
        }
    }

    /// Pressure in pascals for a raw count
    pub fn pressure_pascals(&self, raw: i32) -> f64 {
        match self.mode {
            DecodeMode::HalfPascal => raw as f64 * HALF_PASCAL_PER_COUNT,
            DecodeMode::FullScale => {
                raw as f64 / PRESSURE_FULL_SCALE_COUNTS * self.fullscale_mpa * 1_000_000.0
            }
        }
    }

    /// Temperature in degrees Celsius for a raw count
    pub fn temperature_celsius(&self, raw: i16) -> f64 {
        raw as f64 / TEMPERATURE_COUNTS_PER_DEGREE
    }

    /// Convert a raw sample to physical values
    pub fn convert(&self, raw: RawSample) -> Reading {
        Reading {
            pressure: self.unit.from_pascals(self.pressure_pascals(raw.pressure)),
            pressure_unit: self.unit,
            temperature_celsius: self.temperature_celsius(raw.temperature),
            raw,
        }
    }

    /// Decode a contiguous data burst
    pub fn decode(&self, data: &[u8; DATA_LEN]) -> Reading {
        self.convert(RawSample::from_bytes(data))
    }
}
