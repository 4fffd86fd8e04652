// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! XDB401 register map
//!
//! | Register    | Width   | Meaning                                              |
//! |-------------|---------|------------------------------------------------------|
//! | `0x30`      | 1 byte  | command/status: write `0x0A` to convert, bit 3 busy |
//! | `0x06-0x08` | 3 bytes | pressure raw, 24-bit signed, MSB first               |
//! | `0x09-0x0A` | 2 bytes | temperature raw, 16-bit signed, MSB first            |

/// Default 7-bit bus address
pub const DEFAULT_ADDRESS: u8 = 0x7F;

/// Command/status register
pub const REG_COMMAND: u8 = 0x30;
/// First pressure data register (MSB)
pub const REG_PRESSURE: u8 = 0x06;
/// First temperature data register (MSB)
pub const REG_TEMPERATURE: u8 = 0x09;

/// Starts a combined pressure and temperature conversion
pub const CMD_START_CONVERSION: u8 = 0x0A;
/// Status bit set while a conversion is running
pub const STATUS_BUSY: u8 = 0x08;

pub const PRESSURE_LEN: usize = 3;
pub const TEMPERATURE_LEN: usize = 2;
/// Pressure and temperature read in one burst
pub const DATA_LEN: usize = PRESSURE_LEN + TEMPERATURE_LEN;

/// Register addresses of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    pub command: u8,
    pub pressure: u8,
    pub temperature: u8,
}

impl RegisterMap {
    pub const XDB401: Self = Self {
        command: REG_COMMAND,
        pressure: REG_PRESSURE,
        temperature: REG_TEMPERATURE,
    };
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::XDB401
    }
}

/// Whether a status byte reports a conversion in progress.
///
/// Only bit 3 is meaningful, the other bits are ignored.
#[inline]
pub fn is_busy(status: u8) -> bool {
    status & STATUS_BUSY != 0
}
