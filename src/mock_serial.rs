//! We use this mocking module in unit tests to emulate the PSU on the other end of a serial port.

use std::sync::Arc;

use parking_lot::Mutex;

const CAPACITY: usize = 4096;

type Responder = Box<dyn FnMut(&str) -> Option<Vec<u8>> + Send>;

struct Inner {
    /// Buffer to store data written to the mock serial port
    write_buffer: heapless::Vec<u8, CAPACITY>,
    /// Each write call, minus the leading `\r`
    commands: Vec<String>,
    /// Data waiting to be read
    read_buffer: heapless::Deque<u8, CAPACITY>,
    /// Produces a reply for each command frame written
    responder: Option<Responder>,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
}

/// Our mock type used to emulate a serial port.
///
/// Clones share the same state, so a test can keep one handle while a worker owns another.
#[derive(Clone)]
pub struct MockSerial {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MockSerialError {
    /// Nothing arrived before the read timeout
    #[error("read timed out")]
    Timeout,
    /// Simulated buffer overflow
    #[error("mock buffer overflow")]
    BufferOverflow,
    /// Simulated port removal
    #[error("port unplugged")]
    Unplugged,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::Unplugged => embedded_io::ErrorKind::BrokenPipe,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut inner = self.inner.lock();
        if inner.should_error_on_write {
            return Err(MockSerialError::Unplugged);
        }

        inner
            .write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;

        // Every frame starts with a carriage return, the rest is the command text.
        let text = core::str::from_utf8(buf).unwrap_or_default();
        let command = text.strip_prefix('\r').unwrap_or(text);
        inner.commands.push(command.to_owned());
        let reply = inner.responder.as_mut().and_then(|respond| respond(command));
        if let Some(reply) = reply {
            for byte in reply {
                inner
                    .read_buffer
                    .push_back(byte)
                    .map_err(|_| MockSerialError::BufferOverflow)?;
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.inner.lock().should_error_on_write {
            return Err(MockSerialError::Unplugged);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut inner = self.inner.lock();
        if inner.should_error_on_read {
            return Err(MockSerialError::Unplugged);
        }

        if inner.read_buffer.is_empty() {
            return Err(MockSerialError::Timeout);
        }

        let mut count = 0;
        while count < buf.len() {
            match inner.read_buffer.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

impl embedded_io::ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        let inner = self.inner.lock();
        if inner.should_error_on_read {
            return Err(MockSerialError::Unplugged);
        }
        Ok(!inner.read_buffer.is_empty())
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with empty buffers
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                write_buffer: heapless::Vec::new(),
                commands: Vec::new(),
                read_buffer: heapless::Deque::new(),
                responder: None,
                should_error_on_write: false,
                should_error_on_read: false,
            })),
        }
    }

    /// Queue up data that will be returned by read()
    pub fn set_read_data(&self, data: &[u8]) {
        let mut inner = self.inner.lock();
        inner.read_buffer.clear();
        for &byte in data {
            inner.read_buffer.push_back(byte).unwrap();
        }
    }

    /// Install a closure which is handed each command written, minus the leading `\r`, and
    /// returns the bytes the device replies with.
    pub fn set_responder(&self, responder: impl FnMut(&str) -> Option<Vec<u8>> + Send + 'static) {
        self.inner.lock().responder = Some(Box::new(responder));
    }

    /// Everything written to the port so far.
    pub fn written_data(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.to_vec()
    }

    /// The commands sent, in order.
    pub fn written_commands(&self) -> Vec<String> {
        self.inner.lock().commands.clone()
    }

    /// Number of bytes still waiting to be read
    pub fn pending_read(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&self, should_error: bool) {
        self.inner.lock().should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&self, should_error: bool) {
        self.inner.lock().should_error_on_read = should_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_write_data() {
        let mut mock = MockSerial::new();
        let result = mock.write(b"\rSTATUS?");
        assert_eq!(result, Ok(8));
        assert_eq!(mock.written_data(), b"\rSTATUS?");
    }

    #[test]
    fn test_read_timeout_when_no_data() {
        let mut mock = MockSerial::new();
        let mut buffer = [0u8; 4];
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Timeout));
        assert!(matches!(
            MockSerialError::Timeout.kind(),
            embedded_io::ErrorKind::TimedOut
        ));
    }

    #[test]
    fn test_read_data_in_order() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"Hello World");

        let mut buffer1 = [0u8; 5];
        let mut buffer2 = [0u8; 6];
        assert_eq!(mock.read(&mut buffer1), Ok(5));
        assert_eq!(mock.read(&mut buffer2), Ok(6));
        assert_eq!(&buffer1, b"Hello");
        assert_eq!(&buffer2, b" World");
        assert_eq!(mock.pending_read(), 0);
    }

    #[test]
    fn test_responder_queues_reply() {
        let mut mock = MockSerial::new();
        mock.set_responder(|command| (command == "*IDN?").then(|| b"KORAD\0".to_vec()));

        mock.write(b"\rOUT1").unwrap();
        assert_eq!(mock.pending_read(), 0);

        mock.write(b"\r*IDN?").unwrap();
        assert_eq!(mock.pending_read(), 6);
    }

    #[test]
    fn test_clones_share_state() {
        let mock = MockSerial::new();
        let mut other = mock.clone();
        other.write(b"\rBEEP1").unwrap();
        assert_eq!(mock.written_commands(), vec!["BEEP1".to_owned()]);
    }

    #[test]
    fn test_written_commands_one_per_frame() {
        let mut mock = MockSerial::new();
        mock.write(b"\rVOUT1?\rIOUT1?").unwrap();
        mock.write(b"\rVOUT1?").unwrap();
        mock.write(b"\rOUT0").unwrap();
        assert_eq!(
            mock.written_commands(),
            vec!["VOUT1?\rIOUT1?".to_owned(), "VOUT1?".to_owned(), "OUT0".to_owned()]
        );
    }

    #[test]
    fn test_error_flags_toggle() {
        let mut mock = MockSerial::new();

        mock.set_write_error(true);
        assert_eq!(mock.write(b"test"), Err(MockSerialError::Unplugged));
        assert!(mock.flush().is_err());
        assert!(mock.written_data().is_empty());

        mock.set_write_error(false);
        assert!(mock.write(b"test").is_ok());

        mock.set_read_data(b"data");
        mock.set_read_error(true);
        let mut buffer = [0u8; 10];
        assert!(mock.read(&mut buffer).is_err());

        mock.set_read_error(false);
        assert_eq!(mock.read(&mut buffer), Ok(4));
    }

    #[test]
    fn test_error_describes_itself() {
        let error: &dyn core::error::Error = &MockSerialError::Unplugged;
        assert_eq!(error.to_string(), "port unplugged");
        assert_eq!(MockSerialError::Timeout.kind(), embedded_io::ErrorKind::TimedOut);
        let disconnected =
            crate::error::Error::<MockSerialError>::Disconnected(MockSerialError::Unplugged);
        assert!(disconnected.to_string().contains("port unplugged"));
    }
}
