// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Mock I2C driver simulating an XDB401 transducer
//!
//! The simulation keeps a 256-byte register image for one device and mimics
//! the conversion protocol:
//! - writing `0x0A` to `0x30` latches a new sample into `0x06..=0x0A` and
//!   raises the busy bit for a configurable number of status reads
//! - reading `0x30` returns the status byte (bit 3 set while converting)
//! - every other register reads back from the image
//!
//! Failures can be injected per transaction class, and the most recent
//! transactions are recorded so tests can check ordering on the wire. The log
//! keeps at most [`MAX_TRANSACTIONS`] entries. The driver is cheap to
//! clone: clones share the same simulated device.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use rand::Rng;

use crate::bus::{BusError, I2CBusDriver};
use crate::config::MockDeviceConfig;
use crate::xdb401::registers::{
    CMD_START_CONVERSION, REG_COMMAND, REG_PRESSURE, REG_TEMPERATURE, STATUS_BUSY,
};

const PRESSURE_MIN: i32 = -(1 << 23);
const PRESSURE_MAX: i32 = (1 << 23) - 1;

/// Maximum number of transactions kept in the log
pub const MAX_TRANSACTIONS: usize = 1024;

/// One recorded bus transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockTransaction {
    Read {
        address: u8,
        register: u8,
        length: usize,
    },
    Write {
        address: u8,
        register: u8,
        data: Vec<u8>,
    },
}

#[derive(Debug)]
struct MockState {
    address: u8,
    present: bool,
    registers: [u8; 256],
    pressure_raw: i32,
    temperature_raw: i16,
    busy_polls: u32,
    busy_remaining: u32,
    status_script: VecDeque<u8>,
    jitter_counts: u32,
    fail_writes: bool,
    fail_status_reads: bool,
    fail_data_reads: bool,
    conversions: u32,
    transactions: VecDeque<MockTransaction>,
}

/// Simulated XDB401 on its own bus
#[derive(Debug, Clone)]
pub struct MockXdb401Bus {
    state: Arc<Mutex<MockState>>,
}

impl MockXdb401Bus {
    /// Create a simulated device at `address`, converting instantly
    pub fn new(address: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                address,
                present: true,
                registers: [0; 256],
                pressure_raw: 0,
                temperature_raw: 0,
                busy_polls: 0,
                busy_remaining: 0,
                status_script: VecDeque::new(),
                jitter_counts: 0,
                fail_writes: false,
                fail_status_reads: false,
                fail_data_reads: false,
                conversions: 0,
                transactions: VecDeque::with_capacity(MAX_TRANSACTIONS),
            })),
        }
    }

    /// Create a simulated device from the `bus.mock` configuration section
    pub fn from_config(config: &MockDeviceConfig) -> Self {
        let bus = Self::new(config.address);
        {
            let mut state = bus.lock();
            state.present = config.present;
            state.pressure_raw = config.pressure_raw.clamp(PRESSURE_MIN, PRESSURE_MAX);
            state.temperature_raw = config.temperature_raw;
            state.busy_polls = config.busy_polls;
            state.jitter_counts = config.jitter_counts;
        }
        debug!(
            "Mock XDB401 at 0x{:02X}: pressure_raw={}, temperature_raw={}, busy_polls={}",
            config.address, config.pressure_raw, config.temperature_raw, config.busy_polls
        );
        bus
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panic while holding the lock only happens in a failing test;
        // keep serving the state so later assertions still see it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Raw values latched by the next conversion
    pub fn set_sample(&self, pressure_raw: i32, temperature_raw: i16) {
        let mut state = self.lock();
        state.pressure_raw = pressure_raw.clamp(PRESSURE_MIN, PRESSURE_MAX);
        state.temperature_raw = temperature_raw;
    }

    /// Put raw bytes straight into the data registers `0x06..=0x0A`
    pub fn set_data_registers(&self, data: [u8; 5]) {
        let start = REG_PRESSURE as usize;
        self.lock().registers[start..start + 5].copy_from_slice(&data);
    }

    /// Number of busy status reads following each conversion start
    pub fn set_busy_polls(&self, polls: u32) {
        self.lock().busy_polls = polls;
    }

    /// Status bytes returned by the next status reads, ahead of the simulation
    pub fn script_status<I: IntoIterator<Item = u8>>(&self, statuses: I) {
        self.lock().status_script.extend(statuses);
    }

    /// Whether the device acknowledges its address
    pub fn set_present(&self, present: bool) {
        self.lock().present = present;
    }

    /// Make every write fail
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Make every read of the status register fail
    pub fn fail_status_reads(&self, fail: bool) {
        self.lock().fail_status_reads = fail;
    }

    /// Make every read of a data register fail
    pub fn fail_data_reads(&self, fail: bool) {
        self.lock().fail_data_reads = fail;
    }

    /// Most recent transactions, oldest first
    pub fn transactions(&self) -> Vec<MockTransaction> {
        self.lock().transactions.iter().cloned().collect()
    }

    /// Forget the recorded transactions
    pub fn clear_transactions(&self) {
        self.lock().transactions.clear();
    }

    /// Number of conversions started
    pub fn conversions(&self) -> u32 {
        self.lock().conversions
    }
}

impl MockState {
    fn record(&mut self, transaction: MockTransaction) {
        if self.transactions.len() >= MAX_TRANSACTIONS {
            self.transactions.pop_front();
        }
        self.transactions.push_back(transaction);
    }

    fn check_address(&self, address: u8) -> Result<(), BusError> {
        if !self.present || address != self.address {
            return Err(BusError::DeviceNotFound { address });
        }
        Ok(())
    }

    fn next_status(&mut self) -> u8 {
        if let Some(status) = self.status_script.pop_front() {
            return status;
        }
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            STATUS_BUSY
        } else {
            0x00
        }
    }

    fn start_conversion(&mut self) {
        let mut pressure = self.pressure_raw;
        if self.jitter_counts > 0 {
            let jitter = self.jitter_counts as i32;
            pressure += rand::rng().random_range(-jitter..=jitter);
        }
        let pressure = (pressure.clamp(PRESSURE_MIN, PRESSURE_MAX) as u32) & 0x00FF_FFFF;
        let temperature = self.temperature_raw.to_be_bytes();

        let p = REG_PRESSURE as usize;
        self.registers[p] = (pressure >> 16) as u8;
        self.registers[p + 1] = (pressure >> 8) as u8;
        self.registers[p + 2] = pressure as u8;
        let t = REG_TEMPERATURE as usize;
        self.registers[t] = temperature[0];
        self.registers[t + 1] = temperature[1];

        self.busy_remaining = self.busy_polls;
        self.conversions += 1;
    }
}

impl I2CBusDriver for MockXdb401Bus {
    fn read(&mut self, address: u8, register: u8, length: usize) -> Result<Vec<u8>, BusError> {
        let mut state = self.lock();
        state.record(MockTransaction::Read {
            address,
            register,
            length,
        });
        state.check_address(address)?;

        if register == REG_COMMAND {
            if state.fail_status_reads {
                return Err(BusError::Transport("injected status read failure".to_string()));
            }
            let status = state.next_status();
            // A multi-byte read of the status register continues into the image
            let mut data = vec![status];
            let start = REG_COMMAND as usize + 1;
            let end = (start + length.saturating_sub(1)).min(state.registers.len());
            data.extend_from_slice(&state.registers[start..end]);
            return Ok(data);
        }

        if state.fail_data_reads {
            return Err(BusError::Transport("injected data read failure".to_string()));
        }
        let start = register as usize;
        let end = (start + length).min(state.registers.len());
        Ok(state.registers[start..end].to_vec())
    }

    fn write(&mut self, address: u8, register: u8, data: &[u8]) -> Result<(), BusError> {
        let mut state = self.lock();
        state.record(MockTransaction::Write {
            address,
            register,
            data: data.to_vec(),
        });
        state.check_address(address)?;
        if state.fail_writes {
            return Err(BusError::Transport("injected write failure".to_string()));
        }

        if register == REG_COMMAND {
            if data.first() == Some(&CMD_START_CONVERSION) {
                state.start_conversion();
            }
            return Ok(());
        }

        let start = register as usize;
        for (offset, byte) in data.iter().enumerate() {
            if let Some(slot) = state.registers.get_mut(start + offset) {
                *slot = *byte;
            }
        }
        Ok(())
    }

    fn device_present(&mut self, address: u8) -> Result<bool, BusError> {
        let state = self.lock();
        Ok(state.present && address == state.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_latches_sample_and_goes_busy() {
        let mut bus = MockXdb401Bus::new(0x7F);
        bus.set_sample(-256, -256);
        bus.set_busy_polls(2);

        bus.write(0x7F, REG_COMMAND, &[CMD_START_CONVERSION]).unwrap();
        assert_eq!(bus.read(0x7F, REG_COMMAND, 1).unwrap(), vec![STATUS_BUSY]);
        assert_eq!(bus.read(0x7F, REG_COMMAND, 1).unwrap(), vec![STATUS_BUSY]);
        assert_eq!(bus.read(0x7F, REG_COMMAND, 1).unwrap(), vec![0x00]);

        let data = bus.read(0x7F, REG_PRESSURE, 5).unwrap();
        assert_eq!(data, vec![0xFF, 0xFF, 0x00, 0xFF, 0x00]);
        assert_eq!(bus.conversions(), 1);
    }

    #[test]
    fn test_absent_device_refuses_every_transaction() {
        let mut bus = MockXdb401Bus::new(0x7F);
        bus.set_present(false);

        assert_eq!(
            bus.read(0x7F, REG_COMMAND, 1),
            Err(BusError::DeviceNotFound { address: 0x7F })
        );
        assert!(!bus.device_present(0x7F).unwrap());
        // Transactions are still recorded
        assert_eq!(bus.transactions().len(), 1);
    }

    #[test]
    fn test_transaction_log_is_bounded() {
        let mut bus = MockXdb401Bus::new(0x7F);
        bus.set_sample(100, 0);

        for _ in 0..1000 {
            bus.write(0x7F, REG_COMMAND, &[CMD_START_CONVERSION]).unwrap();
            bus.read(0x7F, REG_COMMAND, 1).unwrap();
            bus.read(0x7F, REG_PRESSURE, 5).unwrap();
        }

        let transactions = bus.transactions();
        assert_eq!(bus.conversions(), 1000);
        assert_eq!(transactions.len(), MAX_TRANSACTIONS);
        // The newest transaction is kept
        assert_eq!(
            transactions.last(),
            Some(&MockTransaction::Read {
                address: 0x7F,
                register: REG_PRESSURE,
                length: 5,
            })
        );
    }

    #[test]
    fn test_wrong_address_is_not_found() {
        let mut bus = MockXdb401Bus::new(0x7F);
        assert_eq!(
            bus.write(0x76, REG_COMMAND, &[CMD_START_CONVERSION]),
            Err(BusError::DeviceNotFound { address: 0x76 })
        );
        assert_eq!(bus.conversions(), 0);
    }

    #[test]
    fn test_script_overrides_simulation() {
        let mut bus = MockXdb401Bus::new(0x7F);
        bus.script_status([0x0A, 0x02]);

        assert_eq!(bus.read(0x7F, REG_COMMAND, 1).unwrap(), vec![0x0A]);
        assert_eq!(bus.read(0x7F, REG_COMMAND, 1).unwrap(), vec![0x02]);
        assert_eq!(bus.read(0x7F, REG_COMMAND, 1).unwrap(), vec![0x00]);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = MockDeviceConfig {
            address: 0x7F,
            present: true,
            pressure_raw: 1000,
            temperature_raw: 0,
            busy_polls: 0,
            jitter_counts: 10,
        };
        let mut bus = MockXdb401Bus::from_config(&config);

        for _ in 0..50 {
            bus.write(0x7F, REG_COMMAND, &[CMD_START_CONVERSION]).unwrap();
            let data = bus.read(0x7F, REG_PRESSURE, 3).unwrap();
            let raw = ((data[0] as i32) << 16) | ((data[1] as i32) << 8) | data[2] as i32;
            assert!((990..=1010).contains(&raw), "raw {} out of jitter range", raw);
        }
    }
}
