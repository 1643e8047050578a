//! This crate provides an interface for communicating with and controlling Korad KA3xxxP series
//! programmable power supplies over their serial port.
//!
//! There are two layers:
//! * [psu::KoradPsu] - blocking, typed access to the device's command set.
//! * [controller::Controller] - runs a [psu::KoradPsu] on a worker thread, so a UI or automation
//!   loop can queue reads & writes and poll for results without ever waiting on the serial line.
//!
//! Example PSU models which this should work with:
//! * KA3005P
//! * KA3010P
//! * KD3005P
//! * RND 320-KA3005P
//!
//! The serial port used for PSU comms should be configured like so:
//! * Baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! [port::SerialPortIo::open] takes care of this.

pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod port;
pub mod psu;
pub mod status;
pub mod transport;

#[cfg(test)]
mod mock_serial;
