use thiserror::Error;

use crate::header::Command;

/// Errors that may occur when building or interpreting a control word.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
pub enum HeaderError {
    /// The version subfield does not match [`crate::Version::SUPPORTED`].
    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u32),
    /// The command tag is not one of Query, Shift or Error.
    #[error("Unknown command tag {0}")]
    UnknownCommand(u32),
    /// A field was requested from a word whose command tag does not carry it.
    #[error("Cannot extract {field} from a {found} control word")]
    WrongCommand {
        field: &'static str,
        found: Command,
    },
    /// A value does not fit its subfield. This is a caller error, never a wire condition.
    #[error("{field} out of range: {value} (valid range {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

impl HeaderError {
    /// Whether this error stems from invalid construction arguments rather than
    /// from a word received over the wire.
    pub fn is_construction_error(&self) -> bool {
        matches!(self, HeaderError::OutOfRange { .. })
    }
}
