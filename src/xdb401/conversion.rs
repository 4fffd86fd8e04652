// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Measurement cycle bookkeeping
//!
//! A cycle goes through
//! `Idle → CommandSent → AwaitingConversion → Reading → Idle`, or ends in
//! `Failed` and drops back to `Idle` immediately. Waiting for the conversion
//! is represented by a single [`ScheduledTask`] instead of a chain of timer
//! callbacks: the host asks for [`ScheduledTask::due`] and calls back when the
//! instant is reached.

use std::fmt;
use std::time::{Duration, Instant};

use super::decoder::Reading;

/// Where the current measurement cycle stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CommandSent,
    AwaitingConversion,
    Reading,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::CommandSent => "command-sent",
            Phase::AwaitingConversion => "awaiting-conversion",
            Phase::Reading => "reading",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One measurement cycle, from the start command to the data read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub started_at: Instant,
    /// Status reads issued so far
    pub polls: u32,
}

impl Session {
    pub fn start(now: Instant) -> Self {
        Self {
            started_at: now,
            polls: 0,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

/// The pending readiness check of the running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub due: Instant,
    pub session: Session,
}

/// Result of driving the driver one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// A readiness check is pending until the given instant
    Scheduled(Instant),
    /// The cycle completed and the reading was published
    Published(Reading),
    /// A cycle is already running, the tick was ignored
    Deferred,
    /// The driver failed its setup check and no longer talks to the bus
    Disabled,
    /// Nothing to do
    Idle,
}

impl Step {
    /// Instant of the pending readiness check, if any
    pub fn due(&self) -> Option<Instant> {
        match self {
            Step::Scheduled(due) => Some(*due),
            _ => None,
        }
    }
}
