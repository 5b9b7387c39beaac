//! Status codes exchanged at every protocol checkpoint
//!
//! Each code travels as a single 4-byte word. The numeric values are part of
//! the wire format and must never be renumbered.

use std::fmt;
use thiserror::Error;

/// Protocol-level outcome of one phase of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusCode {
    /// Phase completed as expected
    Success = 0,
    /// The transport delivered fewer bytes than the frame announced
    IncompleteBytes = 1,
    /// The transport timed out in the middle of a read
    TimedOut = 2,
    /// A required NUL terminator never arrived
    NoTerminatorFound = 3,
    /// The requested function is in the server's table
    ExistingFunction = 4,
    /// The requested function is unknown to the server
    NonexistentFunction = 5,
    /// The block decoded into exactly the declared fields
    GoodBytes = 6,
    /// Bytes were left over after every field was decoded
    TooManyBytes = 7,
    /// The block ran out before every field was decoded
    TooFewBytes = 8,
    /// The block length was plausible but a field could not be decoded
    ScrambledBytes = 9,
}

/// A status word that does not map to any known code
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown code {0}")]
pub struct UnknownStatus(pub u32);

impl StatusCode {
    pub const ALL: [StatusCode; 10] = [
        StatusCode::Success,
        StatusCode::IncompleteBytes,
        StatusCode::TimedOut,
        StatusCode::NoTerminatorFound,
        StatusCode::ExistingFunction,
        StatusCode::NonexistentFunction,
        StatusCode::GoodBytes,
        StatusCode::TooManyBytes,
        StatusCode::TooFewBytes,
        StatusCode::ScrambledBytes,
    ];

    /// The value sent on the wire
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(raw: u32) -> Result<Self, UnknownStatus> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_u32() == raw)
            .ok_or(UnknownStatus(raw))
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusCode::Success => "success",
            StatusCode::IncompleteBytes => "incomplete bytes",
            StatusCode::TimedOut => "timed out",
            StatusCode::NoTerminatorFound => "no terminator found",
            StatusCode::ExistingFunction => "existing function",
            StatusCode::NonexistentFunction => "nonexistent function",
            StatusCode::GoodBytes => "good bytes",
            StatusCode::TooManyBytes => "too many bytes",
            StatusCode::TooFewBytes => "too few bytes",
            StatusCode::ScrambledBytes => "scrambled bytes",
        }
    }

    /// Raised by the reliability layer rather than by the protocol
    pub fn is_transport_fault(self) -> bool {
        matches!(self, StatusCode::IncompleteBytes | StatusCode::TimedOut)
    }

    /// Whether the phase that produced this code may proceed
    pub fn is_success(self) -> bool {
        matches!(
            self,
            StatusCode::Success | StatusCode::ExistingFunction | StatusCode::GoodBytes
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.as_u32())
    }
}

impl TryFrom<u32> for StatusCode {
    type Error = UnknownStatus;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::from_u32(raw)
    }
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> u32 {
        code.as_u32()
    }
}

/// Render any status word for diagnostics, known or not
pub fn describe_status(raw: u32) -> String {
    match StatusCode::from_u32(raw) {
        Ok(code) => code.to_string(),
        Err(unknown) => unknown.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_stable() {
        assert_eq!(StatusCode::Success.as_u32(), 0);
        assert_eq!(StatusCode::ExistingFunction.as_u32(), 4);
        assert_eq!(StatusCode::NonexistentFunction.as_u32(), 5);
        assert_eq!(StatusCode::GoodBytes.as_u32(), 6);
        assert_eq!(StatusCode::ScrambledBytes.as_u32(), 9);
    }

    #[test]
    fn test_every_code_maps_back() {
        for code in StatusCode::ALL {
            assert_eq!(StatusCode::try_from(code.as_u32()), Ok(code));
        }
    }

    #[test]
    fn test_unknown_code_is_rendered() {
        assert_eq!(StatusCode::from_u32(77), Err(UnknownStatus(77)));
        assert_eq!(describe_status(77), "unknown code 77");
        assert_eq!(describe_status(7), "too many bytes (7)");
    }

    #[test]
    fn test_fault_classes() {
        assert!(StatusCode::TimedOut.is_transport_fault());
        assert!(!StatusCode::ScrambledBytes.is_transport_fault());
        assert!(StatusCode::GoodBytes.is_success());
        assert!(!StatusCode::NonexistentFunction.is_success());
    }
}
