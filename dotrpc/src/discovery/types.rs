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

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::net::IpAddr;
use tokio::sync::mpsc;

/// Identity of a discovery member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Creates a peer id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random 64-bit hex id.
    pub fn random() -> Self {
        Self(format!("{:016x}", rand::random::<u64>()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// What a member looks like to the others.
///
/// The advertisement is raw JSON: records are validated by whoever consumes
/// them, and malformed ones are expected noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Member id.
    pub id: PeerId,
    /// Address the member can be reached on.
    pub address: String,
    /// Caller-supplied metadata.
    #[serde(default)]
    pub advertisement: Value,
}

/// A membership change.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A member appeared.
    Added(PeerRecord),
    /// A member went away.
    Removed(PeerRecord),
}

impl PeerEvent {
    /// Returns the record carried by this event.
    pub fn record(&self) -> &PeerRecord {
        match self {
            PeerEvent::Added(record) | PeerEvent::Removed(record) => record,
        }
    }
}

/// Stream of membership changes for one session.
pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

/// Options for joining a discovery group.
///
/// Usually produced by merging JSON objects (see
/// [`RuntimeContext::advertise`](crate::RuntimeContext::advertise)); keys
/// other than the ones named here are kept in `extra` for implementations
/// that understand them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryOptions {
    /// Group key. Only members sharing a key see each other.
    pub key: String,
    /// Address to announce. Implementations pick one when absent.
    #[serde(default)]
    pub address: Option<IpAddr>,
    /// Metadata attached to this member's record.
    #[serde(default)]
    pub advertisement: Value,
    /// Any other options.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DiscoveryOptions {
    /// Creates options for `key` with no advertisement.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            address: None,
            advertisement: Value::Null,
            extra: Map::new(),
        }
    }

    /// Sets the announced address.
    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    /// Sets the advertisement metadata.
    pub fn with_advertisement(mut self, advertisement: Value) -> Self {
        self.advertisement = advertisement;
        self
    }
}
