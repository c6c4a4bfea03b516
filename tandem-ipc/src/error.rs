//! IPC error types

use std::net::SocketAddr;
use thiserror::Error;

/// IPC error types
#[derive(Debug, Error)]
pub enum IpcError {
    /// IO error on an established channel
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Binding failed for a reason other than the port being taken
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Every candidate port was in use
    #[error("No free port found after {attempts} attempts starting at {start}")]
    PortsExhausted { start: u16, attempts: u32 },

    /// Peer closed the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// Timeout waiting for the worker
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// A value contains a character the header format reserves
    #[error("Field '{field}' contains a reserved delimiter: {value:?}")]
    ReservedDelimiter { field: &'static str, value: String },

    /// Header or payload does not match the wire format
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Frame exceeds the configured maximum
    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    /// The handle was shut down
    #[error("Worker handle has been shut down")]
    ShutDown,
}

impl IpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, IpcError::Timeout(_) | IpcError::ConnectionClosed)
    }

    /// Check if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IpcError::Bind { .. } | IpcError::PortsExhausted { .. } | IpcError::ShutDown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(IpcError::Timeout("worker connection".to_string()).is_retryable());
        assert!(IpcError::ConnectionClosed.is_retryable());
        assert!(!IpcError::ShutDown.is_retryable());
        assert!(!IpcError::InvalidHeader("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_error_fatal() {
        assert!(IpcError::PortsExhausted { start: 2336, attempts: 10 }.is_fatal());
        assert!(IpcError::ShutDown.is_fatal());
        let bind = IpcError::Bind {
            addr: "127.0.0.1:80".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(bind.is_fatal());
        assert!(!IpcError::ConnectionClosed.is_fatal());
    }

    #[test]
    fn test_reserved_delimiter_message() {
        let err = IpcError::ReservedDelimiter {
            field: "inputs",
            value: "a,b".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Field 'inputs' contains a reserved delimiter: \"a,b\""
        );
    }
}
