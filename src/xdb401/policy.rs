// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-xdb401 project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Conversion wait policy

use std::time::Duration;

use super::registers::is_busy;

/// Delay between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Longest accepted conversion, measured from the start command
pub const DEFAULT_CONVERSION_TIMEOUT: Duration = Duration::from_millis(50);

/// Outcome of one status poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Conversion finished, data registers can be read
    Ready,
    /// Still busy, poll again after the given delay
    Retry { after: Duration },
    /// Still busy and the deadline has passed
    TimedOut,
}

/// Bounded polling of the busy bit.
///
/// The deadline is inclusive: a busy status observed at exactly `deadline`
/// after the start command is a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub poll_interval: Duration,
    pub deadline: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_CONVERSION_TIMEOUT,
        }
    }
}

impl TimeoutPolicy {
    pub fn new(poll_interval: Duration, deadline: Duration) -> Self {
        Self {
            poll_interval,
            deadline,
        }
    }

    /// Decide what to do with `status` read `elapsed` after the start command
    pub fn decide(&self, status: u8, elapsed: Duration) -> PollDecision {
        if !is_busy(status) {
            PollDecision::Ready
        } else if elapsed >= self.deadline {
            PollDecision::TimedOut
        } else {
            PollDecision::Retry {
                after: self.poll_interval,
            }
        }
    }

    /// Status polls before the deadline is reached with on-time scheduling
    pub fn max_polls(&self) -> u32 {
        if self.poll_interval.is_zero() {
            return u32::MAX;
        }
        let polls = self.deadline.as_nanos().div_ceil(self.poll_interval.as_nanos());
        u32::try_from(polls).unwrap_or(u32::MAX)
    }
}
