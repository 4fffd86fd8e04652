// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Shared sensor state
//!
//! Thread-safe view of the latest published values, a rolling history and
//! cycle statistics, written by the daemon and read by anyone holding a
//! [`SharedSensorState`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::channel::Measurement;
use super::error::DriverError;
use super::ComponentStatus;

/// Maximum number of measurements kept in history
pub const MAX_HISTORY_SIZE: usize = 3600;

/// Cycle counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStatistics {
    pub completed: u64,
    pub failed: u64,
    pub deferred: u64,
}

/// State of one sensor as seen by the rest of the process
#[derive(Debug, Clone)]
pub struct SensorState {
    name: String,
    status: ComponentStatus,
    latest: HashMap<String, Measurement>,
    history: VecDeque<Measurement>,
    statistics: CycleStatistics,
    last_error: Option<String>,
    last_update: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
}

impl SensorState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ComponentStatus::Ok,
            latest: HashMap::new(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            statistics: CycleStatistics::default(),
            last_error: None,
            last_update: None,
            started_at: Utc::now(),
        }
    }

    /// Store a published value
    pub fn record_measurement(&mut self, measurement: Measurement) {
        self.last_update = Some(measurement.timestamp);
        self.latest
            .insert(measurement.channel.clone(), measurement.clone());
        self.history.push_back(measurement);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }

    pub fn record_success(&mut self) {
        self.statistics.completed += 1;
    }

    pub fn record_failure(&mut self, error: &DriverError) {
        self.statistics.failed += 1;
        self.last_error = Some(error.to_string());
    }

    pub fn record_deferred(&mut self) {
        self.statistics.deferred += 1;
    }

    pub fn set_status(&mut self, status: ComponentStatus) {
        self.status = status;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ComponentStatus {
        self.status
    }

    /// Latest value published on `channel`
    pub fn latest(&self, channel: &str) -> Option<&Measurement> {
        self.latest.get(channel)
    }

    /// Last `count` measurements, oldest first
    pub fn recent(&self, count: usize) -> Vec<Measurement> {
        let start = self.history.len().saturating_sub(count);
        self.history.range(start..).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn statistics(&self) -> &CycleStatistics {
        &self.statistics
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

/// Type alias for the sensor state wrapped in Arc<RwLock<>>
pub type SharedSensorState = Arc<RwLock<SensorState>>;

/// Create a new shared sensor state instance
pub fn create_shared_sensor_state(name: impl Into<String>) -> SharedSensorState {
    Arc::new(RwLock::new(SensorState::new(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusError;

    fn measurement(channel: &str, value: f64) -> Measurement {
        Measurement {
            channel: channel.to_string(),
            value,
            unit: "bar".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_latest_per_channel() {
        let mut state = SensorState::new("XDB401");
        state.record_measurement(measurement("Pressure", 1.0));
        state.record_measurement(measurement("Temperature", 23.0));
        state.record_measurement(measurement("Pressure", 2.0));

        assert_eq!(state.latest("Pressure").map(|m| m.value), Some(2.0));
        assert_eq!(state.latest("Temperature").map(|m| m.value), Some(23.0));
        assert!(state.latest("Humidity").is_none());
        assert_eq!(state.history_len(), 3);
        assert!(state.last_update().is_some());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = SensorState::new("XDB401");
        for i in 0..MAX_HISTORY_SIZE + 10 {
            state.record_measurement(measurement("Pressure", i as f64));
        }
        assert_eq!(state.history_len(), MAX_HISTORY_SIZE);
        let recent = state.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].value, (MAX_HISTORY_SIZE + 9) as f64);
        assert_eq!(state.recent(usize::MAX).len(), MAX_HISTORY_SIZE);
    }

    #[test]
    fn test_statistics() {
        let mut state = SensorState::new("XDB401");
        state.record_success();
        state.record_deferred();
        state.record_failure(&DriverError::CommandWriteFailed {
            source: BusError::DeviceNotFound { address: 0x7F },
        });
        state.set_status(ComponentStatus::Warning);

        assert_eq!(
            *state.statistics(),
            CycleStatistics {
                completed: 1,
                failed: 1,
                deferred: 1,
            }
        );
        assert_eq!(state.last_error(), Some("failed to send the conversion command"));
        assert_eq!(state.status(), ComponentStatus::Warning);
    }
}
