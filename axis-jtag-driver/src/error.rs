use std::io;

use axis_jtag_protocol::error::HeaderError;
use thiserror::Error;

/// Errors raised by transports and by the protocol engine.
///
/// Only [`Error::Timeout`] is ever retried, and only by the reliable transfer loop.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid arguments, out-of-range values, unknown or misconfigured transports.
    #[error("Configuration error: {0}")]
    Config(String),
    /// An underlying I/O operation failed.
    #[error("{context}: {source}")]
    System {
        context: String,
        #[source]
        source: io::Error,
    },
    /// A malformed or rejected reply.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// No usable reply arrived in time.
    #[error("Timeout error; {0}")]
    Timeout(String),
}

/// The kind of an [`Error`], without payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Config,
    System,
    Protocol,
    Timeout,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Error {
        Error::Config(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Error {
        Error::Protocol(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Error {
        Error::Timeout(msg.into())
    }

    pub fn system(context: impl Into<String>, source: io::Error) -> Error {
        Error::System {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::System { .. } => ErrorKind::System,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

impl From<HeaderError> for Error {
    fn from(value: HeaderError) -> Self {
        if value.is_construction_error() {
            Error::Config(value.to_string())
        } else {
            Error::Protocol(value.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_errors_map_to_kinds() {
        let out_of_range = HeaderError::OutOfRange {
            field: "word size",
            value: 17,
            min: 1,
            max: 16,
        };
        assert_eq!(Error::from(out_of_range).kind(), ErrorKind::Config);
        assert_eq!(
            Error::from(HeaderError::UnsupportedVersion(2)).kind(),
            ErrorKind::Protocol
        );
    }

    #[test]
    fn system_error_keeps_context() {
        let err = Error::system(
            "Unable to send datagram",
            io::Error::from(io::ErrorKind::ConnectionRefused),
        );
        assert_eq!(err.kind(), ErrorKind::System);
        assert!(err.to_string().starts_with("Unable to send datagram: "));
    }
}
