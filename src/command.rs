//! Requests passed to the controller's worker and the notifications it sends back.

use core::ops::BitOr;
use std::time::Instant;

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::error::Error;

/// A part of the PSU state a command transfers.
#[derive(Debug, EnumIter, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum Transfer {
    /// Voltage and current setpoints.
    Setpoint,
    /// Measured output voltage and current. Read only.
    OutputReading,
    /// Front panel key lock. Write only, the device can't report it.
    Lock,
    /// Beep, OCP, OVP and output flags.
    Status,
}

impl Transfer {
    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// An unordered set of [Transfer]s. Parts not in the set are left alone.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Options(u8);

impl Options {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, transfer: Transfer) -> Self {
        Self(self.0 | transfer.bit())
    }

    pub const fn contains(self, transfer: Transfer) -> bool {
        self.0 & transfer.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Transfer> {
        Transfer::iter().filter(move |transfer| self.contains(*transfer))
    }
}

impl From<Transfer> for Options {
    fn from(transfer: Transfer) -> Self {
        Self::empty().with(transfer)
    }
}

impl BitOr<Transfer> for Options {
    type Output = Options;

    fn bitor(self, transfer: Transfer) -> Options {
        self.with(transfer)
    }
}

impl BitOr for Transfer {
    type Output = Options;

    fn bitor(self, other: Transfer) -> Options {
        Options::from(self).with(other)
    }
}

impl FromIterator<Transfer> for Options {
    fn from_iter<T: IntoIterator<Item = Transfer>>(iter: T) -> Self {
        iter.into_iter().fold(Options::empty(), Options::with)
    }
}

/// Voltage & current to program into a channel.
#[derive(Debug, Default, PartialEq, Clone, Copy)]
pub struct Setpoint {
    pub voltage: f32,
    pub current: f32,
}

/// Everything the caller wants the PSU to be set to.
#[derive(Debug, Default, PartialEq, Clone, Copy)]
pub struct Desired {
    pub setpoint: Setpoint,
    /// Only ever tracked locally. If something else locks or unlocks the front panel, this
    /// silently goes stale.
    pub lock: bool,
    pub beep: bool,
    pub ocp: bool,
    pub ovp: bool,
    pub output: bool,
}

/// One streamed output measurement.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Sample {
    pub voltage: Option<f32>,
    pub current: Option<f32>,
    /// When the reading completed.
    pub at: Instant,
}

/// Work for the controller's worker thread.
///
/// Writes carry a copy of the desired state taken when they were queued, so later edits by the
/// caller can't leak into a write that is already waiting.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Command {
    Read(Options),
    Write(Options, Desired),
    Stop,
}

/// Notifications from the controller.
#[derive(Debug)]
pub enum Event<I: embedded_io::Error> {
    /// The device stopped responding properly. Treat the session as over and close the
    /// controller.
    Disconnected(Error<I>),
    /// Values requested by a read command are now available.
    ReadFinished,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_are_a_set() {
        let options = Transfer::Setpoint | Transfer::Status;
        assert!(options.contains(Transfer::Setpoint));
        assert!(options.contains(Transfer::Status));
        assert!(!options.contains(Transfer::Lock));
        assert!(!options.contains(Transfer::OutputReading));

        // Order and repetition don't matter.
        let reordered = Options::from(Transfer::Status) | Transfer::Setpoint | Transfer::Status;
        assert_eq!(options, reordered);
    }

    #[test]
    fn options_iterate_members() {
        let options: Options = [Transfer::Lock, Transfer::OutputReading].into_iter().collect();
        let members: Vec<Transfer> = options.iter().collect();
        assert_eq!(members, [Transfer::OutputReading, Transfer::Lock]);
        assert!(Options::empty().is_empty());
        assert_eq!(Options::default(), Options::empty());
    }

    #[test]
    fn every_transfer_has_its_own_bit() {
        let all: Options = Transfer::iter().collect();
        assert_eq!(all.iter().count(), Transfer::iter().count());
    }
}
