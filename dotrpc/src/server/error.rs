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

//! Server error types.

use crate::discovery::DiscoveryError;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors raised by server registration and lifecycle operations.
///
/// Request-level failures never surface here; they are answered on the
/// wire with a [`ReplyCode`](crate::ReplyCode).
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` was called on a server that already left the created state.
    #[error("server already started")]
    AlreadyStarted,

    /// A handler failed registration checks.
    #[error("invalid service handler: {reason}")]
    InvalidHandler {
        /// What was wrong with the handler
        reason: String,
    },

    /// Binding the listener failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Advertising the server failed.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}

impl ServerError {
    /// Creates an invalid handler error.
    pub fn invalid_handler(reason: impl Into<String>) -> Self {
        ServerError::InvalidHandler {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(error: std::io::Error) -> Self {
        ServerError::Transport(TransportError::from(error))
    }
}
