//! Error types and error codes for Tarpon
//!
//! This module defines:
//! - `TarponError`: Application-specific error enum
//! - `ErrorCode`: Structured error codes reported back to remote peers

use serde::{Deserialize, Serialize};

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum TarponError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TarponError {
    /// Whether this error is fatal to the channel it occurred on.
    ///
    /// Only transport-level failures tear the channel down; everything else
    /// is contained locally.
    pub fn is_transport_fatal(&self) -> bool {
        matches!(self, TarponError::ChannelClosed | TarponError::Io(_))
    }
}

/// Error code structure carried in payload-level error responses
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

// General codes
pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

pub const INTERNAL_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10000,
    message: "internal error",
};

pub const MALFORMED_PAYLOAD: ErrorCode<'static> = ErrorCode {
    code: 10001,
    message: "malformed payload",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tarpon_error_display() {
        let err = TarponError::Protocol("bad header".to_string());
        assert_eq!(format!("{}", err), "protocol error: bad header");

        let err = TarponError::ChannelClosed;
        assert_eq!(format!("{}", err), "channel closed");
    }

    #[test]
    fn test_transport_fatal_classification() {
        assert!(TarponError::ChannelClosed.is_transport_fatal());
        assert!(
            TarponError::Io(std::io::Error::other("broken pipe")).is_transport_fatal()
        );
        assert!(!TarponError::Codec("truncated".to_string()).is_transport_fatal());
        assert!(!TarponError::Protocol("junk".to_string()).is_transport_fatal());
    }

    #[test]
    fn test_error_code_constants() {
        assert_eq!(SUCCESS.code, 0);
        assert_eq!(SUCCESS.message, "success");
        assert_eq!(MALFORMED_PAYLOAD.code, 10001);
    }
}
