//! Physical serial port access via the `serialport` crate.

use serialport::{SerialPort, SerialPortType};

use crate::config::{SerialConfig, to_std};

/// USB vendor ID of the CH340-style bridge used by Korad supplies.
pub const KORAD_VID: u16 = 0x0416;
/// USB product ID of the Korad USB CDC bridge.
pub const KORAD_PID: u16 = 0x5011;

/// A serial port exposed through [embedded_io::Read] & [embedded_io::Write].
pub struct SerialPortIo(Box<dyn SerialPort>);

/// An I/O failure from the serial port.
///
/// Read timeouts surface as [embedded_io::ErrorKind::TimedOut], which the transport treats as
/// the end of a reply. Anything else means the port is unusable.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct IoError(#[from] std::io::Error);

impl From<serialport::Error> for IoError {
    fn from(e: serialport::Error) -> Self {
        IoError(e.into())
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        use std::io::ErrorKind as Io;
        match self.0.kind() {
            // Non-blocking ports report an empty buffer this way.
            Io::TimedOut | Io::WouldBlock => embedded_io::ErrorKind::TimedOut,
            Io::Interrupted => embedded_io::ErrorKind::Interrupted,
            Io::NotFound => embedded_io::ErrorKind::NotFound,
            Io::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            Io::BrokenPipe | Io::NotConnected => embedded_io::ErrorKind::BrokenPipe,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for SerialPortIo {
    type Error = IoError;
}

impl embedded_io::Read for SerialPortIo {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::ReadReady for SerialPortIo {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.bytes_to_read().map_err(IoError::from)? > 0)
    }
}

impl embedded_io::Write for SerialPortIo {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

impl SerialPortIo {
    /// Open `path` with the PSU's line settings (8N1) and the configured read timeout.
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self, serialport::Error> {
        let port = serialport::new(path, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(to_std(config.timeout))
            .open()?;
        log::info!("Opened {} at {} baud", path, config.baud_rate);
        Ok(Self(port))
    }

    /// Name of the underlying device, if the OS reports one.
    pub fn name(&self) -> Option<String> {
        self.0.name()
    }
}

/// List the device paths of connected serial ports matching `vid`/`pid`.
///
/// Use [KORAD_VID] & [KORAD_PID] to find Korad supplies. Picking between several candidates
/// is left to the caller.
pub fn scan_devices(vid: u16, pid: u16) -> Result<Vec<String>, serialport::Error> {
    let ports = serialport::available_ports()?;
    let devices: Vec<String> = ports
        .into_iter()
        .filter(|port| match &port.port_type {
            SerialPortType::UsbPort(usb_info) => usb_info.vid == vid && usb_info.pid == pid,
            _ => false,
        })
        .map(|port| port.port_name)
        .collect();
    log::debug!("Found {} device(s) matching {:04X}:{:04X}", devices.len(), vid, pid);
    Ok(devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::Error;

    #[test]
    fn io_error_kinds() {
        let timeout = IoError(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert_eq!(timeout.kind(), embedded_io::ErrorKind::TimedOut);

        let would_block = IoError(std::io::Error::from(std::io::ErrorKind::WouldBlock));
        assert_eq!(would_block.kind(), embedded_io::ErrorKind::TimedOut);

        let gone = IoError(std::io::Error::from(std::io::ErrorKind::NotConnected));
        assert_eq!(gone.kind(), embedded_io::ErrorKind::BrokenPipe);

        let unplugged = IoError::from(serialport::Error::new(
            serialport::ErrorKind::Io(std::io::ErrorKind::BrokenPipe),
            "device removed",
        ));
        assert_eq!(unplugged.kind(), embedded_io::ErrorKind::BrokenPipe);

        let other = IoError(std::io::Error::other("device reports an error"));
        assert_eq!(other.kind(), embedded_io::ErrorKind::Other);
    }
}
