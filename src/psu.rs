use core::ops::RangeInclusive;

use log::warn;
use strum_macros::EnumIter;

use crate::{
    error::{Communication, Result},
    status::{Status, Tracking},
    transport::{Reply, Transport},
};

/// Channel numbers understood by the protocol. Single channel models only respond on `1`.
pub const CHANNELS: RangeInclusive<u8> = 1..=2;
/// Front panel memory slots M1 - M5.
pub const MEMORY_SLOTS: RangeInclusive<u8> = 1..=5;

/// Measured (voltage, current) of a channel. A field is `None` when the reply was not a number.
pub type OutputPair = (Option<f32>, Option<f32>);

/// You can create a KoradPsu from a [Transport] over any serial interface.
///
/// For it's methods, we generally use the nomenclature that "set" means to write a configuration
/// and "get" means to read back a configuration value. Where as "read" means to get a measured
/// value.
pub struct KoradPsu<S, const L: usize = 64>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    transport: Transport<S, L>,
}

impl<S, const L: usize> KoradPsu<S, L>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    pub fn new(transport: Transport<S, L>) -> Self {
        Self { transport }
    }

    /// Return the identification string, e.g. `KORAD KA3005P V5.8 SN:03379314`.
    pub fn model(&mut self) -> Result<Reply<L>, S::Error> {
        self.transport.send_receive("*IDN?", None)
    }

    /// Query and decode the status byte.
    ///
    /// The device answers with a single unterminated byte here.
    pub fn status(&mut self) -> Result<Status, S::Error> {
        self.transport.send("STATUS?")?;
        let raw = self.transport.read_byte()?.ok_or(Communication::NoData)?;
        Ok(Status::decode(raw))
    }

    /// Select the tracking mode. Does nothing on single channel supplies.
    pub fn track(&mut self, tracking: Tracking) -> Result<(), S::Error> {
        self.transport.send(tracking.command())
    }

    /// Access channel `number`, counted from 1.
    pub fn channel(&mut self, number: u8) -> Option<Channel<'_, S, L>> {
        CHANNELS
            .contains(&number)
            .then(|| self.channel_unchecked(number))
    }

    /// For callers which have already checked `number` against [CHANNELS].
    pub(crate) fn channel_unchecked(&mut self, number: u8) -> Channel<'_, S, L> {
        Channel {
            transport: &mut self.transport,
            number,
        }
    }

    /// Access memory slot `number`, counted from 1.
    pub fn memory(&mut self, number: u8) -> Option<Memory<'_, S, L>> {
        MEMORY_SLOTS.contains(&number).then(|| Memory {
            transport: &mut self.transport,
            number,
        })
    }

    pub fn toggle(&mut self, switch: Switch) -> Toggle<'_, S, L> {
        Toggle {
            transport: &mut self.transport,
            switch,
        }
    }

    pub fn beep(&mut self) -> Toggle<'_, S, L> {
        self.toggle(Switch::Beep)
    }

    /// Front panel key lock. There is no command to read this back.
    pub fn lock(&mut self) -> Toggle<'_, S, L> {
        self.toggle(Switch::Lock)
    }

    pub fn output(&mut self) -> Toggle<'_, S, L> {
        self.toggle(Switch::Output)
    }

    pub fn ocp(&mut self) -> Toggle<'_, S, L> {
        self.toggle(Switch::Ocp)
    }

    pub fn ovp(&mut self) -> Toggle<'_, S, L> {
        self.toggle(Switch::Ovp)
    }

    /// Release the serial interface.
    pub fn close(self) -> Result<S, S::Error> {
        self.transport.close()
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &Transport<S, L> {
        &self.transport
    }
}

/// One output channel.
pub struct Channel<'a, S, const L: usize>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    transport: &'a mut Transport<S, L>,
    number: u8,
}

impl<S, const L: usize> Channel<'_, S, L>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Get the voltage setpoint in volts.
    pub fn get_voltage(&mut self) -> Result<Option<f32>, S::Error> {
        let reply = self
            .transport
            .send_receive(&format!("VSET{}?", self.number), Some(5))?;
        Ok(parse_float(&reply))
    }

    /// Set the voltage setpoint. Sent with two decimal places.
    pub fn set_voltage(&mut self, volts: f32) -> Result<(), S::Error> {
        self.transport
            .send(&format!("VSET{}:{:05.2}", self.number, volts))
    }

    /// Get the current limit in amps.
    pub fn get_current(&mut self) -> Result<Option<f32>, S::Error> {
        // The reply carries a 6th byte left over from a previous exchange. It has to be read
        // here or it ends up in front of the next reply.
        let reply = self
            .transport
            .send_receive(&format!("ISET{}?", self.number), Some(6))?;
        Ok(parse_float(reply.get(..5).unwrap_or(reply.as_str())))
    }

    /// Set the current limit. Sent with three decimal places.
    pub fn set_current(&mut self, amps: f32) -> Result<(), S::Error> {
        self.transport
            .send(&format!("ISET{}:{:05.3}", self.number, amps))
    }

    /// Read the measured output voltage in volts.
    pub fn read_output_voltage(&mut self) -> Result<Option<f32>, S::Error> {
        let reply = self
            .transport
            .send_receive(&format!("VOUT{}?", self.number), Some(5))?;
        Ok(parse_float(&reply))
    }

    /// Read the measured output current in amps.
    pub fn read_output_current(&mut self) -> Result<Option<f32>, S::Error> {
        let reply = self
            .transport
            .send_receive(&format!("IOUT{}?", self.number), Some(5))?;
        Ok(parse_float(&reply))
    }

    /// Read measured voltage and current in a single round trip.
    pub fn read_output_pair(&mut self) -> Result<OutputPair, S::Error> {
        let reply = self.transport.send_receive(
            &format!("VOUT{0}?\rIOUT{0}?", self.number),
            Some(11),
        )?;
        match reply.split_once('\n') {
            Some((voltage, current)) if !current.contains('\n') => {
                Ok((parse_float(voltage), parse_float(current)))
            }
            _ => Err(Communication::MalformedPair(reply.as_str().to_owned()).into()),
        }
    }
}

/// One of the front panel memory slots.
pub struct Memory<'a, S, const L: usize>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    transport: &'a mut Transport<S, L>,
    number: u8,
}

impl<S, const L: usize> Memory<'_, S, L>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Load this slot's voltage and current settings.
    pub fn recall(&mut self) -> Result<(), S::Error> {
        self.transport.send(&format!("RCL{}", self.number))
    }

    /// Store the present voltage and current settings in this slot.
    pub fn save(&mut self) -> Result<(), S::Error> {
        self.transport.send(&format!("SAV{}", self.number))
    }
}

/// On/off settings which are driven by a fixed pair of commands.
#[derive(Debug, EnumIter, PartialEq, Eq, Clone, Copy)]
pub enum Switch {
    Beep,
    Lock,
    Output,
    /// Over-current protection.
    Ocp,
    /// Over-voltage protection.
    Ovp,
}

impl Switch {
    pub fn on_command(self) -> &'static str {
        match self {
            Switch::Beep => "BEEP1",
            Switch::Lock => "LOCK1",
            Switch::Output => "OUT1",
            Switch::Ocp => "OCP1",
            Switch::Ovp => "OVP1",
        }
    }

    pub fn off_command(self) -> &'static str {
        match self {
            Switch::Beep => "BEEP0",
            Switch::Lock => "LOCK0",
            Switch::Output => "OUT0",
            Switch::Ocp => "OCP0",
            Switch::Ovp => "OVP0",
        }
    }
}

pub struct Toggle<'a, S, const L: usize>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    transport: &'a mut Transport<S, L>,
    switch: Switch,
}

impl<S, const L: usize> Toggle<'_, S, L>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    pub fn set(&mut self, state: bool) -> Result<(), S::Error> {
        if state { self.on() } else { self.off() }
    }

    pub fn on(&mut self) -> Result<(), S::Error> {
        self.transport.send(self.switch.on_command())
    }

    pub fn off(&mut self) -> Result<(), S::Error> {
        self.transport.send(self.switch.off_command())
    }
}

/// Numeric replies that don't parse are reported as absent rather than as an error.
fn parse_float(text: &str) -> Option<f32> {
    let value = text.trim().parse::<f32>().ok();
    if value.is_none() {
        warn!("Ignoring non-numeric reply {:?}", text);
    }
    value
}
