// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! XDB401 pressure/temperature transducer
//!
//! This module contains everything between the register adapter and the
//! published values:
//! - [`registers`]: register map and protocol constants
//! - [`decoder`]: pure conversion of raw bytes to physical values
//! - [`policy`]: bounded busy polling
//! - [`driver`]: the non-blocking measurement cycle
//! - [`channel`]: sinks receiving the decoded values
//! - [`shared_state`]: latest values and history for the host process
//!
//! # Example
//!
//! ```no_run
//! use std::time::Instant;
//! use rust_xdb401::bus::drivers::MockXdb401Bus;
//! use rust_xdb401::bus::I2CDevice;
//! use rust_xdb401::xdb401::{Pollable, Step, Xdb401};
//!
//! let bus = MockXdb401Bus::new(0x7F);
//! let mut sensor = Xdb401::new(I2CDevice::new(bus, 0x7F));
//! sensor.setup()?;
//!
//! let mut step = sensor.update(Instant::now())?;
//! while let Step::Scheduled(due) = step {
//!     // A real host sleeps until `due` instead of spinning
//!     step = sensor.run_pending(due.max(Instant::now()))?;
//! }
//! # Ok::<(), rust_xdb401::xdb401::DriverError>(())
//! ```

pub mod channel;
pub mod conversion;
pub mod decoder;
pub mod driver;
pub mod error;
pub mod policy;
pub mod registers;
pub mod shared_state;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub use channel::{ChannelInfo, Measurement, QueueChannel, RecordingChannel, SensorChannel};
pub use conversion::{Phase, Step};
pub use decoder::{Calibration, DecodeMode, PressureUnit, RawSample, Reading};
pub use driver::{ReadMode, Xdb401};
pub use error::DriverError;
pub use policy::TimeoutPolicy;
pub use shared_state::{create_shared_sensor_state, SharedSensorState};

/// Health of a polled component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentStatus {
    Ok,
    /// The last cycle failed, cleared by the next successful one
    Warning,
    /// Setup failed, the component is disabled
    Failed,
}

/// A component driven by periodic ticks and self-scheduled callbacks
///
/// Implementations never block: waiting is expressed by returning
/// [`Step::Scheduled`] and exposing the instant through [`Pollable::next_due`].
pub trait Pollable {
    /// One-time check performed before the first tick
    fn setup(&mut self) -> Result<(), DriverError>;

    /// Periodic tick starting a new measurement cycle
    fn update(&mut self, now: Instant) -> Result<Step, DriverError>;

    /// Run the pending callback if it is due at `now`
    fn run_pending(&mut self, now: Instant) -> Result<Step, DriverError>;

    /// Instant of the pending callback
    fn next_due(&self) -> Option<Instant>;

    /// Period between ticks
    fn update_interval(&self) -> Duration;

    fn status(&self) -> ComponentStatus;

    /// Log the effective configuration
    fn dump_config(&self);
}
