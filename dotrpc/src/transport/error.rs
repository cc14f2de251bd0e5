//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Transport layer error types.
//!
//! Transport errors are the lowest level of the error hierarchy. On the
//! client they are caught at the send/connect boundary, logged, and handed
//! to the caller as an ordinary call failure.

use std::io;
use thiserror::Error;

/// Errors that can occur in the transport layer.
///
/// # Examples
///
/// ```rust
/// use dotrpc::TransportError;
/// use std::io;
///
/// let error = TransportError::ConnectionFailed {
///     address: "127.0.0.1:8080".to_string(),
///     source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
/// };
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to establish a connection to the remote peer.
    #[error("failed to connect to {address}: {source}")]
    ConnectionFailed {
        /// The address that failed to connect
        address: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// An established connection went away with calls still in flight.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Description of why the connection was lost
        reason: String,
    },

    /// Failed to bind a listening socket.
    #[error("failed to bind to {address}: {source}")]
    BindFailed {
        /// The address that failed to bind
        address: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The connection was closed locally.
    #[error("transport is closed")]
    Closed,

    /// A frame announced a payload larger than the allowed maximum.
    #[error("frame size {size} exceeds maximum allowed size {max}")]
    FrameTooLarge {
        /// Announced or attempted payload size
        size: usize,
        /// Maximum allowed payload size
        max: usize,
    },

    /// A frame payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// An unexpected I/O error occurred.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    /// Returns `true` if retrying the connection may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::ConnectionFailed { .. } | TransportError::ConnectionLost { .. } => true,
            TransportError::Io { source } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
            TransportError::BindFailed { .. }
            | TransportError::Closed
            | TransportError::FrameTooLarge { .. }
            | TransportError::Codec(_) => false,
        }
    }

    /// Creates a connection lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        TransportError::ConnectionLost {
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        TransportError::Io { source: error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failed_is_recoverable() {
        let error = TransportError::ConnectionFailed {
            address: "127.0.0.1:8080".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(error.is_recoverable());
        assert_eq!(
            error.to_string(),
            "failed to connect to 127.0.0.1:8080: refused"
        );
    }

    #[test]
    fn test_closed_is_not_recoverable() {
        assert!(!TransportError::Closed.is_recoverable());
        assert!(!TransportError::FrameTooLarge { size: 10, max: 5 }.is_recoverable());
    }

    #[test]
    fn test_reset_io_error_is_recoverable() {
        let error: TransportError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert!(error.is_recoverable());

        let error: TransportError = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(!error.is_recoverable());
    }
}
