//! Decoding of the `STATUS?` reply byte.

use core::fmt;

use modular_bitfield::prelude::*;
use strum_macros::{Display, EnumIter};

/// Layout of the status byte, least significant bit first.
#[bitfield]
#[derive(Clone, Copy)]
struct StatusBits {
    channel1: bool,
    channel2: bool,
    tracking: B2,
    beep: bool,
    ocp: bool,
    output: bool,
    ovp: bool,
}

/// Which limit a channel is currently regulating on.
#[derive(Debug, Display, EnumIter, PartialEq, Eq, Clone, Copy)]
#[strum(serialize_all = "snake_case")]
pub enum ChannelMode {
    /// Status bit clear.
    ConstantCurrent,
    /// Status bit set.
    ConstantVoltage,
}

impl From<bool> for ChannelMode {
    fn from(value: bool) -> Self {
        match value {
            true => ChannelMode::ConstantVoltage,
            false => ChannelMode::ConstantCurrent,
        }
    }
}

/// Coupling of the two channels on dual output supplies.
///
/// Single channel supplies accept the command but ignore it.
#[derive(Debug, Display, EnumIter, PartialEq, Eq, Clone, Copy)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Tracking {
    Independent = 0b00,
    Series = 0b01,
    Parallel = 0b11,
}

impl Tracking {
    /// Interpret the two tracking bits. `0b10` is not assigned by the firmware.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b00 => Some(Tracking::Independent),
            0b01 => Some(Tracking::Series),
            0b11 => Some(Tracking::Parallel),
            _ => None,
        }
    }

    /// Command which selects this mode.
    pub fn command(self) -> &'static str {
        match self {
            Tracking::Independent => "TRACK0",
            Tracking::Series => "TRACK1",
            Tracking::Parallel => "TRACK2",
        }
    }
}

/// Decoded status byte. Recomputed on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// The byte as received.
    pub raw: u8,
    pub channel1: ChannelMode,
    pub channel2: ChannelMode,
    /// `None` for the unassigned bit pattern.
    pub tracking: Option<Tracking>,
    pub beep: bool,
    /// Over-current protection enabled.
    pub ocp: bool,
    pub output: bool,
    /// Over-voltage protection enabled.
    pub ovp: bool,
}

impl Status {
    pub fn decode(raw: u8) -> Self {
        let bits = StatusBits::from_bytes([raw]);
        Self {
            raw,
            channel1: bits.channel1().into(),
            channel2: bits.channel2().into(),
            tracking: Tracking::from_bits(bits.tracking()),
            beep: bits.beep(),
            ocp: bits.ocp(),
            output: bits.output(),
            ovp: bits.ovp(),
        }
    }
}

impl From<u8> for Status {
    fn from(raw: u8) -> Self {
        Self::decode(raw)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tracking = match self.tracking {
            Some(tracking) => tracking.to_string(),
            None => "unknown".to_owned(),
        };
        write!(
            f,
            "Channel 1: {}, Channel 2: {}, Tracking: {}, OVP: {}, OCP: {}, Beep: {}, Output: {}",
            self.channel1,
            self.channel2,
            tracking,
            u8::from(self.ovp),
            u8::from(self.ocp),
            u8::from(self.beep),
            u8::from(self.output),
        )
    }
}
