//! Our error types for the Korad PSUs.

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Failure talking to the PSU.
///
/// There are only two kinds the upper layers care about: the serial link went away, or the
/// device answered with something we could not make sense of.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Serial link lost: {0}")]
    Disconnected(I),
    #[error("Communication error: {0}")]
    Communication(Communication),
}

/// Describes what was wrong with a reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Communication {
    #[error("No reply before timeout")]
    NoData,
    #[error("Reply contained non-ASCII byte 0x{0:02X}")]
    NonAscii(u8),
    #[error("Reply was empty")]
    EmptyReply,
    #[error("Reply did not fit the receive buffer")]
    Overflow,
    #[error("Malformed output pair reply {0:?}")]
    MalformedPair(String),
}

impl<I: embedded_io::Error> Error<I> {
    /// True when the physical link is gone, as opposed to a garbled reply.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::Disconnected(_))
    }
}

impl<I: embedded_io::Error> From<Communication> for Error<I> {
    fn from(err: Communication) -> Self {
        Error::Communication(err)
    }
}
