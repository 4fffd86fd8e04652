// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Output channels
//!
//! A channel is the sink one physical quantity is published to. The driver
//! owns its channels and hands each value over synchronously; what happens
//! next (queueing, storage, display) belongs to the channel.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Static description of a published quantity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub unit: String,
    /// Decimals worth displaying
    pub accuracy_decimals: u8,
}

impl ChannelInfo {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, accuracy_decimals: u8) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            accuracy_decimals,
        }
    }

    /// Format `value` with the channel accuracy and unit
    pub fn format(&self, value: f64) -> String {
        format!(
            "{:.*} {}",
            self.accuracy_decimals as usize, value, self.unit
        )
    }
}

/// Sink receiving the values of one quantity
pub trait SensorChannel: Send {
    fn info(&self) -> &ChannelInfo;

    /// Accept one value. Must not block.
    fn publish_state(&mut self, value: f64);
}

/// A value published on a channel, stamped on arrival
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub channel: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

/// Channel forwarding every value to an unbounded queue
pub struct QueueChannel {
    info: ChannelInfo,
    sender: UnboundedSender<Measurement>,
}

impl QueueChannel {
    pub fn new(info: ChannelInfo, sender: UnboundedSender<Measurement>) -> Self {
        Self { info, sender }
    }
}

impl SensorChannel for QueueChannel {
    fn info(&self) -> &ChannelInfo {
        &self.info
    }

    fn publish_state(&mut self, value: f64) {
        let measurement = Measurement {
            channel: self.info.name.clone(),
            value,
            unit: self.info.unit.clone(),
            timestamp: Utc::now(),
        };
        if self.sender.send(measurement).is_err() {
            log::debug!("Channel '{}' has no consumer, value dropped", self.info.name);
        }
    }
}

/// Channel keeping every value in memory
///
/// Clones of [`RecordingChannel::values`] observe the same storage, which
/// stays reachable after the channel has been moved into a driver.
pub struct RecordingChannel {
    info: ChannelInfo,
    values: Arc<Mutex<Vec<f64>>>,
}

impl RecordingChannel {
    pub fn new(info: ChannelInfo) -> Self {
        Self {
            info,
            values: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle on the recorded values
    pub fn values(&self) -> Arc<Mutex<Vec<f64>>> {
        self.values.clone()
    }
}

impl SensorChannel for RecordingChannel {
    fn info(&self) -> &ChannelInfo {
        &self.info
    }

    fn publish_state(&mut self, value: f64) {
        match self.values.lock() {
            Ok(mut values) => values.push(value),
            Err(poisoned) => poisoned.into_inner().push(value),
        }
    }
}
