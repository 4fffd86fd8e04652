// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! I2C bus driver implementations
//!
//! This module provides different I2C bus driver implementations:
//! - Embedded: any `embedded-hal` 1.0 I2C bus, including Linux `/dev/i2c-*`
//!   when the `native` feature is enabled
//! - Mock: register-level simulation of an XDB401 for testing and development

pub mod embedded;
pub mod mock;

pub use embedded::EmbeddedHalBus;
pub use mock::{MockTransaction, MockXdb401Bus};
