// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust XDB401 library
//!
//! Non-blocking driver for the XDB401 digital pressure and temperature
//! transducer on I2C, together with the daemon plumbing hosting it.
//!
//! - [`bus`]: I2C bus drivers and the register adapter
//! - [`xdb401`]: protocol, decoding and the measurement state machine
//! - [`config`]: YAML configuration validated against a JSON schema
//! - [`daemon`]: tokio host polling the sensor

pub mod bus;
pub mod config;
pub mod daemon;
pub mod xdb401;
