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

//! Client error types.

use crate::discovery::DiscoveryError;
use crate::protocol::ReplyCode;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Every way a call can resolve other than with a success value.
///
/// # Examples
///
/// ```rust
/// use dotrpc::ClientError;
///
/// let error = ClientError::from_reply("INVALID_SERVICE");
/// assert_eq!(error.code(), "INVALID_SERVICE");
///
/// let error = ClientError::from_reply("division by zero");
/// assert_eq!(error.code(), "division by zero");
/// ```
#[derive(Debug, Error)]
pub enum ClientError {
    /// The path was empty.
    #[error("INVALID_PATH")]
    InvalidPath,

    /// No peer offers the service and queueing is disabled.
    #[error("INVALID_SERVICE: no peer offers '{service}'")]
    InvalidService {
        /// Requested service name
        service: String,
    },

    /// The reply did not arrive within the per-call budget.
    #[error("REQUEST_TIMEOUT: no reply within {duration:?}")]
    RequestTimeout {
        /// Configured budget
        duration: Duration,
    },

    /// No peer offering the service appeared within the queue budget.
    #[error("SERVICE_TIMEOUT: no peer within {waited:?}")]
    ServiceTimeout {
        /// How long the call sat in the queue
        waited: Duration,
    },

    /// The server replied with an empty value.
    #[error("INVALID_RESPONSE")]
    InvalidResponse,

    /// The server replied with an error string, either a validation code
    /// or a handler-supplied message.
    #[error("{0}")]
    Remote(String),

    /// The call could not be delivered or the link dropped before a reply.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The client could not join discovery.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// The client was dropped before the call resolved.
    #[error("client disconnected")]
    Disconnected,
}

impl ClientError {
    /// Interprets an error string sent by a server.
    pub fn from_reply(reply: &str) -> Self {
        if reply.is_empty() {
            ClientError::InvalidResponse
        } else {
            ClientError::Remote(reply.to_string())
        }
    }

    /// Returns the short string code of this error.
    ///
    /// Remote errors return the string the server sent.
    pub fn code(&self) -> &str {
        match self {
            ClientError::InvalidPath => ReplyCode::InvalidPath.as_str(),
            ClientError::InvalidService { .. } => ReplyCode::InvalidService.as_str(),
            ClientError::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            ClientError::ServiceTimeout { .. } => "SERVICE_TIMEOUT",
            ClientError::InvalidResponse => ReplyCode::InvalidResponse.as_str(),
            ClientError::Remote(reply) => reply,
            ClientError::Transport(_) => "TRANSPORT_ERROR",
            ClientError::Discovery(_) => "DISCOVERY_ERROR",
            ClientError::Disconnected => "DISCONNECTED",
        }
    }

    /// Returns the validation code when the server rejected the call.
    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            ClientError::InvalidPath => Some(ReplyCode::InvalidPath),
            ClientError::InvalidService { .. } => Some(ReplyCode::InvalidService),
            ClientError::InvalidResponse => Some(ReplyCode::InvalidResponse),
            ClientError::Remote(reply) => ReplyCode::parse(reply),
            _ => None,
        }
    }
}
