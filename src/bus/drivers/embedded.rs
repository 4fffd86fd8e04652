// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! `embedded-hal` backed I2C bus driver
//!
//! Wraps any [`embedded_hal::i2c::I2c`] implementation so that the XDB401
//! driver can run on top of a board support crate or, with the `native`
//! feature, on a Linux `/dev/i2c-*` character device.

use embedded_hal::i2c::{Error as _, ErrorKind, I2c, NoAcknowledgeSource};

use crate::bus::{BusError, I2CBusDriver};

/// I2C bus driver over an `embedded-hal` 1.0 bus
pub struct EmbeddedHalBus<I> {
    i2c: I,
}

impl<I: I2c> EmbeddedHalBus<I> {
    /// Create a new driver around an `embedded-hal` bus
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    /// Give the wrapped bus back
    pub fn release(self) -> I {
        self.i2c
    }
}

fn map_error<E: embedded_hal::i2c::Error>(address: u8, error: E) -> BusError {
    match error.kind() {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address) => {
            BusError::DeviceNotFound { address }
        }
        kind => BusError::Transport(kind.to_string()),
    }
}

impl<I: I2c> I2CBusDriver for EmbeddedHalBus<I> {
    fn read(&mut self, address: u8, register: u8, length: usize) -> Result<Vec<u8>, BusError> {
        let mut buffer = vec![0u8; length];
        self.i2c
            .write_read(address, &[register], &mut buffer)
            .map_err(|e| map_error(address, e))?;
        Ok(buffer)
    }

    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), BusError> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(register);
        frame.extend_from_slice(data);
        self.i2c
            .write(address, &frame)
            .map_err(|e| map_error(address, e))
    }

    fn device_present(&mut self, address: u8) -> Result<bool, BusError> {
        match self.i2c.write(address, &[]) {
            Ok(()) => Ok(true),
            Err(e) => match map_error(address, e) {
                BusError::DeviceNotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }
}

/// Open the Linux I2C character device at `device`
#[cfg(feature = "native")]
pub fn open_native(device: &str) -> anyhow::Result<Box<dyn I2CBusDriver + Send>> {
    use anyhow::Context;

    let i2c = linux_embedded_hal::I2cdev::new(device)
        .with_context(|| format!("Failed to open I2C device {}", device))?;
    log::info!("Opened native I2C bus {}", device);
    Ok(Box::new(EmbeddedHalBus::new(i2c)))
}

/// Open the Linux I2C character device at `device`
#[cfg(not(feature = "native"))]
pub fn open_native(device: &str) -> anyhow::Result<Box<dyn I2CBusDriver + Send>> {
    anyhow::bail!(
        "Native I2C bus {} requested but this build lacks the `native` feature",
        device
    )
}
