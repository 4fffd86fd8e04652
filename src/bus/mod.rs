// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! I2C bus access for register-addressed devices
//!
//! This module provides the two layers sitting between the transducer driver
//! and the wire:
//! - [`I2CBusDriver`]: a whole bus, addressed per transaction (embedded-hal
//!   backed or simulated)
//! - [`BusDevice`]: one device on a bus, seen as a set of registers
//!
//! [`I2CDevice`] binds a bus driver to a 7-bit address and is the register
//! adapter used by the XDB401 driver. Every call is exactly one bus
//! transaction: no retries, no buffering.

pub mod drivers;

use std::sync::{Arc, Mutex};

use log::debug;
use thiserror::Error;

use crate::config::{I2CBusConfig, I2CBusType};

/// Error raised by a single bus transaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Nothing acknowledged the address
    #[error("no device acknowledged address 0x{address:02X}")]
    DeviceNotFound { address: u8 },

    /// The device returned fewer bytes than requested
    #[error("short read at register 0x{register:02X}: expected {expected} bytes, got {received}")]
    ShortRead {
        register: u8,
        expected: usize,
        received: usize,
    },

    /// Arbitration loss, bus fault or any other transport failure
    #[error("I2C transport error: {0}")]
    Transport(String),
}

/// I2C bus driver trait for hardware abstraction
pub trait I2CBusDriver {
    /// Read `length` bytes starting at `register` of the device at `address`
    fn read(&mut self, address: u8, register: u8, length: usize) -> Result<Vec<u8>, BusError>;

    /// Write `data` starting at `register` of the device at `address`
    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), BusError>;

    /// Check if a device acknowledges `address`
    fn device_present(&mut self, address: u8) -> Result<bool, BusError>;
}

impl<B: I2CBusDriver + ?Sized> I2CBusDriver for Box<B> {
    fn read(&mut self, address: u8, register: u8, length: usize) -> Result<Vec<u8>, BusError> {
        (**self).read(address, register, length)
    }

    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), BusError> {
        (**self).write(address, register, data)
    }

    fn device_present(&mut self, address: u8) -> Result<bool, BusError> {
        (**self).device_present(address)
    }
}

/// A bus shared between several owners.
///
/// The mutex serializes transactions, so two devices on the same bus never
/// interleave their register accesses.
impl<B: I2CBusDriver + ?Sized> I2CBusDriver for Arc<Mutex<B>> {
    fn read(&mut self, address: u8, register: u8, length: usize) -> Result<Vec<u8>, BusError> {
        self.lock()
            .map_err(|_| BusError::Transport("bus lock poisoned".to_string()))?
            .read(address, register, length)
    }

    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), BusError> {
        self.lock()
            .map_err(|_| BusError::Transport("bus lock poisoned".to_string()))?
            .write(address, register, data)
    }

    fn device_present(&mut self, address: u8) -> Result<bool, BusError> {
        self.lock()
            .map_err(|_| BusError::Transport("bus lock poisoned".to_string()))?
            .device_present(address)
    }
}

/// Register-level access to a single device
pub trait BusDevice {
    /// Read exactly `count` bytes starting at `register`
    fn read_register(&mut self, register: u8, count: usize) -> Result<Vec<u8>, BusError>;

    /// Write `data` starting at `register`
    fn write_register(&mut self, register: u8, data: &[u8]) -> Result<(), BusError>;

    /// 7-bit bus address of the device
    fn address(&self) -> u8;
}

/// A device bound to an address on an I2C bus
#[derive(Debug)]
pub struct I2CDevice<B> {
    bus: B,
    address: u8,
}

impl<B: I2CBusDriver> I2CDevice<B> {
    /// Bind `bus` to the device at `address`
    pub fn new(bus: B, address: u8) -> Self {
        Self { bus, address }
    }

    /// Give the bus back
    pub fn release(self) -> B {
        self.bus
    }
}

impl<B: I2CBusDriver> BusDevice for I2CDevice<B> {
    fn read_register(&mut self, register: u8, count: usize) -> Result<Vec<u8>, BusError> {
        let data = self.bus.read(self.address, register, count)?;
        if data.len() != count {
            return Err(BusError::ShortRead {
                register,
                expected: count,
                received: data.len(),
            });
        }
        debug!(
            "I2C read address=0x{:02X} register=0x{:02X} data={:02X?}",
            self.address, register, data
        );
        Ok(data)
    }

    fn write_register(&mut self, register: u8, data: &[u8]) -> Result<(), BusError> {
        debug!(
            "I2C write address=0x{:02X} register=0x{:02X} data={:02X?}",
            self.address, register, data
        );
        self.bus.write(self.address, register, data)
    }

    fn address(&self) -> u8 {
        self.address
    }
}

/// Create the bus driver selected by the configuration
pub fn create_bus_driver(config: &I2CBusConfig) -> anyhow::Result<Box<dyn I2CBusDriver + Send>> {
    match config.bus_type {
        I2CBusType::Mock => Ok(Box::new(drivers::mock::MockXdb401Bus::from_config(
            &config.mock,
        ))),
        I2CBusType::Native => drivers::embedded::open_native(&config.device),
    }
}
