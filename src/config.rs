//! Serial link and controller settings.
//!
//! The defaults match a Korad KA3005P over its USB CDC port.

use core::time::Duration;

use fugit::MillisDurationU32;

/// How the serial port is opened and paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    /// The PSU only talks at 9600 baud.
    pub baud_rate: u32,
    /// Upper bound on a single byte read.
    pub timeout: MillisDurationU32,
    /// Pause before every command. The PSU drops characters that arrive too soon after the
    /// previous command.
    pub settle_delay: MillisDurationU32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout: MillisDurationU32::millis(1000),
            settle_delay: MillisDurationU32::millis(10),
        }
    }
}

impl SerialConfig {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: MillisDurationU32) -> Self {
        self.settle_delay = settle_delay;
        self
    }
}

/// Background controller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// How long the worker waits for a command before polling the output again.
    ///
    /// This bounds the streaming sample period.
    pub poll_interval: MillisDurationU32,
    /// The channel the controller drives. Single channel supplies only have `1`.
    pub channel: u8,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: MillisDurationU32::millis(10),
            channel: 1,
        }
    }
}

impl ControllerConfig {
    pub fn with_poll_interval(mut self, poll_interval: MillisDurationU32) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }
}

/// Convert one of our fugit durations for use with `std` APIs.
pub(crate) fn to_std(duration: MillisDurationU32) -> Duration {
    Duration::from_millis(duration.to_millis() as u64)
}
