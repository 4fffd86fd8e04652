// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::time::Duration;

use thiserror::Error;

use crate::bus::BusError;

/// Failure of setup or of one measurement cycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The device did not answer during setup; the driver stays disabled
    #[error("XDB401 at 0x{address:02X} is unreachable")]
    SetupUnreachable {
        address: u8,
        #[source]
        source: BusError,
    },

    #[error("failed to send the conversion command")]
    CommandWriteFailed {
        #[source]
        source: BusError,
    },

    #[error("failed to read the conversion status")]
    StatusReadFailed {
        #[source]
        source: BusError,
    },

    #[error("conversion still busy after {elapsed:?} ({polls} status polls)")]
    ConversionTimeout { elapsed: Duration, polls: u32 },

    #[error("failed to read the measurement registers")]
    DataReadFailed {
        #[source]
        source: BusError,
    },
}

impl DriverError {
    /// Whether the driver is disabled for the rest of the process lifetime
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::SetupUnreachable { .. })
    }

    /// Underlying bus error, if any
    pub fn bus_error(&self) -> Option<&BusError> {
        match self {
            DriverError::SetupUnreachable { source, .. }
            | DriverError::CommandWriteFailed { source }
            | DriverError::StatusReadFailed { source }
            | DriverError::DataReadFailed { source } => Some(source),
            DriverError::ConversionTimeout { .. } => None,
        }
    }
}
