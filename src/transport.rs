//! Raw framing of the Korad serial protocol.
//!
//! Commands are ASCII text prefixed with a carriage return. Replies are either zero terminated,
//! fixed length, or (for `STATUS?`) a single unterminated byte.

use core::time::Duration;

use embedded_io::{Error as _, ErrorKind};
use log::trace;

use crate::{
    config::{SerialConfig, to_std},
    error::{Communication, Error, Result},
};

/// Reply text, bounded by the transport's buffer size.
pub type Reply<const L: usize> = heapless::String<L>;

/// You can create a Transport using any interface which implements [embedded_io::Read],
/// [embedded_io::ReadReady] & [embedded_io::Write].
///
/// The interface is expected to time out reads on its own. A timed out read is reported as "no
/// data" rather than as an error.
pub struct Transport<S, const L: usize = 64>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    interface: S,
    settle_delay: Duration,
}

impl<S, const L: usize> Transport<S, L>
where
    S: embedded_io::Read + embedded_io::ReadReady + embedded_io::Write,
{
    pub fn new(interface: S, config: &SerialConfig) -> Self {
        Self {
            interface,
            settle_delay: to_std(config.settle_delay),
        }
    }

    /// Read exactly one byte. `None` means the read timed out.
    pub fn read_byte(&mut self) -> Result<Option<u8>, S::Error> {
        let mut byte = [0u8; 1];
        match self.interface.read(&mut byte) {
            Ok(0) => {
                trace!("read: timeout");
                Ok(None)
            }
            Ok(_) => {
                trace!("read: 0x{:02X}", byte[0]);
                Ok(Some(byte[0]))
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                trace!("read: timeout");
                Ok(None)
            }
            Err(e) => Err(Error::Disconnected(e)),
        }
    }

    /// Read one ASCII character. `None` means the read timed out.
    pub fn read_character(&mut self) -> Result<Option<char>, S::Error> {
        match self.read_byte()? {
            Some(byte) if byte.is_ascii() => Ok(Some(char::from(byte))),
            Some(byte) => Err(Communication::NonAscii(byte).into()),
            None => Ok(None),
        }
    }

    /// Read a reply string.
    ///
    /// Stops at a zero byte, a timeout, or once `fixed_length` characters have been collected.
    /// Some replies carry a stray byte left over from an earlier exchange, capping the length
    /// consumes it instead of waiting for a terminator that never comes.
    ///
    /// One leading and one trailing `\n` are stripped.
    pub fn read_string(&mut self, fixed_length: Option<usize>) -> Result<Reply<L>, S::Error> {
        let mut collected: Reply<L> = heapless::String::new();
        while let Some(c) = self.read_character()? {
            if c == '\0' {
                break;
            }
            collected.push(c).map_err(|_| Communication::Overflow)?;
            if fixed_length.is_some_and(|length| collected.len() >= length) {
                break;
            }
        }

        let text = collected.as_str();
        let text = text.strip_prefix('\n').unwrap_or(text);
        let text = text.strip_suffix('\n').unwrap_or(text);
        if text.is_empty() {
            return Err(Communication::EmptyReply.into());
        }
        Ok(Reply::<L>::try_from(text).map_err(|_| Communication::Overflow)?)
    }

    /// Send a command.
    ///
    /// Waits out the settle delay and throws away anything still unread from the previous
    /// exchange before writing `\r` followed by `text`.
    pub fn send(&mut self, text: &str) -> Result<(), S::Error> {
        if let Some(&bad) = text.as_bytes().iter().find(|b| !b.is_ascii()) {
            return Err(Communication::NonAscii(bad).into());
        }

        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
        self.discard_stale()?;

        let mut frame: heapless::Vec<u8, L> = heapless::Vec::new();
        frame.push(b'\r').map_err(|_| Communication::Overflow)?;
        frame.extend_from_slice(text.as_bytes()).map_err(|_| Communication::Overflow)?;

        trace!("send: {:?}", text);
        self.interface
            .write_all(&frame)
            .map_err(Error::Disconnected)?;
        self.interface.flush().map_err(Error::Disconnected)?;
        Ok(())
    }

    /// Send a command and read its reply.
    pub fn send_receive(
        &mut self,
        text: &str,
        fixed_length: Option<usize>,
    ) -> Result<Reply<L>, S::Error> {
        self.send(text)?;
        self.read_string(fixed_length)
    }

    /// Flush and hand back the interface. Dropping it closes the port.
    pub fn close(mut self) -> Result<S, S::Error> {
        self.interface.flush().map_err(Error::Disconnected)?;
        Ok(self.interface)
    }

    fn discard_stale(&mut self) -> Result<(), S::Error> {
        while self.interface.read_ready().map_err(Error::Disconnected)? {
            match self.read_byte()? {
                Some(byte) => trace!("discarding stale byte 0x{:02X}", byte),
                None => break,
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn interface(&self) -> &S {
        &self.interface
    }
}
