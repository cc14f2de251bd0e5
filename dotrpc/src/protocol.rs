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

//! Wire messages and reply codes.
//!
//! A call travels as a [`Request`] carrying a correlation id, a path of the
//! form `<service><delimiter><method>` and an arbitrary JSON payload. The
//! server answers with a [`Response`] echoing the id. A reply that is a
//! string (or empty) is an error; anything else is a success value.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// Marker prefix of methods that may never be invoked over the wire.
pub const PRIVATE_METHOD_MARKER: char = '_';

/// Command value carried by the clean shutdown acknowledgment.
pub const SHUTDOWN_ACK_COMMAND: &str = "#KILL";

/// Validation codes sent back as plain strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyCode {
    /// The path was missing, empty or not a string.
    InvalidPath,
    /// The path named a service but no method.
    MissingMethod,
    /// No registered service matches the path.
    InvalidService,
    /// The method is unknown, not callable, or private.
    InvalidMethod,
    /// The server is shutting down and accepts no new work.
    Locked,
    /// The reply was empty.
    InvalidResponse,
}

impl ReplyCode {
    /// Every code, in declaration order.
    pub const ALL: [ReplyCode; 6] = [
        ReplyCode::InvalidPath,
        ReplyCode::MissingMethod,
        ReplyCode::InvalidService,
        ReplyCode::InvalidMethod,
        ReplyCode::Locked,
        ReplyCode::InvalidResponse,
    ];

    /// Returns the wire representation of this code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReplyCode::InvalidPath => "INVALID_PATH",
            ReplyCode::MissingMethod => "MISSING_METHOD",
            ReplyCode::InvalidService => "INVALID_SERVICE",
            ReplyCode::InvalidMethod => "INVALID_METHOD",
            ReplyCode::Locked => "LOCKED",
            ReplyCode::InvalidResponse => "INVALID_RESPONSE",
        }
    }

    /// Parses a wire string back into a code.
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == code)
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ReplyCode> for Value {
    fn from(code: ReplyCode) -> Self {
        Value::String(code.as_str().to_string())
    }
}

/// A call sent from a client connection to a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, unique per connection.
    pub id: u64,
    /// Dotted path. Kept as raw JSON so a malformed path can be rejected
    /// with `INVALID_PATH` instead of dropping the frame.
    #[serde(default)]
    pub path: Value,
    /// Arbitrary call payload.
    #[serde(default)]
    pub payload: Value,
}

impl Request {
    /// Creates a request for a string path.
    pub fn new(id: u64, path: impl Into<String>, payload: Value) -> Self {
        Self {
            id,
            path: Value::String(path.into()),
            payload,
        }
    }

    /// Returns the path when it is a string.
    pub fn path(&self) -> Option<&str> {
        self.path.as_str()
    }
}

/// A reply sent from a server back to the calling connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id of the request being answered.
    pub id: u64,
    /// Reply value.
    #[serde(default)]
    pub reply: Value,
}

/// Splits a path into its service and method segments.
///
/// Segments after the method are ignored.
///
/// # Examples
///
/// ```rust
/// use dotrpc::protocol::split_path;
///
/// assert_eq!(split_path("users.getById", "."), ("users", Some("getById")));
/// assert_eq!(split_path("users", "."), ("users", None));
/// assert_eq!(split_path("a.b.c", "."), ("a", Some("b")));
/// ```
pub fn split_path<'a>(path: &'a str, delimiter: &str) -> (&'a str, Option<&'a str>) {
    let mut segments = path.splitn(3, delimiter);
    let service = segments.next().unwrap_or_default();
    (service, segments.next())
}

/// Acknowledgment sent in reply to an accepted clean shutdown command.
pub fn shutdown_ack() -> Value {
    json!({ "cmd": SHUTDOWN_ACK_COMMAND, "acknowledged": true })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_code_strings() {
        assert_eq!(ReplyCode::InvalidPath.as_str(), "INVALID_PATH");
        assert_eq!(ReplyCode::MissingMethod.as_str(), "MISSING_METHOD");
        assert_eq!(ReplyCode::InvalidService.as_str(), "INVALID_SERVICE");
        assert_eq!(ReplyCode::InvalidMethod.as_str(), "INVALID_METHOD");
        assert_eq!(ReplyCode::Locked.as_str(), "LOCKED");
        assert_eq!(ReplyCode::InvalidResponse.as_str(), "INVALID_RESPONSE");
        assert_eq!(Value::from(ReplyCode::Locked), json!("LOCKED"));
    }

    #[test]
    fn test_reply_code_parse() {
        for code in ReplyCode::ALL {
            assert_eq!(ReplyCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(ReplyCode::parse("division by zero"), None);
    }

    #[test]
    fn test_split_path_custom_delimiter() {
        assert_eq!(split_path("math::add", "::"), ("math", Some("add")));
        assert_eq!(split_path("math.", "."), ("math", Some("")));
        assert_eq!(split_path("", "."), ("", None));
    }

    #[test]
    fn test_request_path_must_be_string() {
        let request: Request = serde_json::from_value(json!({ "id": 7, "path": 42 })).unwrap();
        assert_eq!(request.path(), None);
        assert_eq!(request.payload, Value::Null);

        let request = Request::new(8, "math.add", json!({ "a": 1 }));
        assert_eq!(request.path(), Some("math.add"));
    }

    #[test]
    fn test_shutdown_ack_shape() {
        assert_eq!(shutdown_ack(), json!({ "cmd": "#KILL", "acknowledged": true }));
    }
}
