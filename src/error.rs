//! Call-level error type shared by proxies, stubs and the dispatcher

use std::io;
use thiserror::Error;

use crate::protocol::{Checkpoint, ExtractError, StatusCode, UnknownStatus};

/// Everything that can abort a single remote call
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The reliability layer could not satisfy a read
    #[error("Transport fault: {code}: {detail}")]
    Transport { code: StatusCode, detail: String },

    /// Malformed bytes; only the current call is lost
    #[error("Protocol fault: {code}: {detail}")]
    Protocol { code: StatusCode, detail: String },

    /// The peer answered a checkpoint with something other than success
    #[error("{checkpoint} rejected by peer: {code}")]
    Rejected { checkpoint: Checkpoint, code: StatusCode },

    #[error("Peer sent an invalid status word: {0}")]
    UnknownStatus(#[from] UnknownStatus),

    #[error("Block of {len} bytes exceeds the {max} byte limit")]
    Oversize { len: usize, max: usize },
}

pub type RpcResult<T> = Result<T, RpcError>;

impl RpcError {
    pub fn transport(code: StatusCode, detail: impl Into<String>) -> Self {
        RpcError::Transport { code, detail: detail.into() }
    }

    pub fn protocol(code: StatusCode, detail: impl Into<String>) -> Self {
        RpcError::Protocol { code, detail: detail.into() }
    }

    /// Status code equivalent of this error, if it has one
    pub fn code(&self) -> Option<StatusCode> {
        match self {
            RpcError::Transport { code, .. }
            | RpcError::Protocol { code, .. }
            | RpcError::Rejected { code, .. } => Some(*code),
            RpcError::Oversize { .. } => Some(StatusCode::TooManyBytes),
            RpcError::Io(_) | RpcError::UnknownStatus(_) => None,
        }
    }

    /// After this error the byte stream can no longer be trusted to sit on a
    /// frame boundary, so the connection must be closed.
    pub fn poisons_connection(&self) -> bool {
        match self {
            RpcError::Io(_)
            | RpcError::Transport { .. }
            | RpcError::UnknownStatus(_)
            | RpcError::Oversize { .. } => true,
            RpcError::Rejected { code, .. } => code.is_transport_fault(),
            RpcError::Protocol { .. } => false,
        }
    }
}

impl From<ExtractError> for RpcError {
    fn from(err: ExtractError) -> Self {
        RpcError::Protocol {
            code: err.status(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_faults_keep_connection() {
        let err = RpcError::protocol(StatusCode::ScrambledBytes, "bad string");
        assert_eq!(err.code(), Some(StatusCode::ScrambledBytes));
        assert!(!err.poisons_connection());
    }

    #[test]
    fn test_transport_faults_poison_connection() {
        let err = RpcError::transport(StatusCode::TimedOut, "2 of 4 bytes read");
        assert!(err.poisons_connection());

        let rejected = RpcError::Rejected {
            checkpoint: Checkpoint::Arguments,
            code: StatusCode::IncompleteBytes,
        };
        assert!(rejected.poisons_connection());

        let refused = RpcError::Rejected {
            checkpoint: Checkpoint::Arguments,
            code: StatusCode::TooFewBytes,
        };
        assert!(!refused.poisons_connection());
    }

    #[test]
    fn test_extract_error_conversion() {
        let err: RpcError = ExtractError::Trailing { remaining: 3 }.into();
        assert_eq!(err.code(), Some(StatusCode::TooManyBytes));
    }
}
