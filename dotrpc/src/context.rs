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

//! Runtime state shared by clients and servers.

use crate::config::Config;
use crate::discovery::{Discovery, DiscoveryError, DiscoveryOptions, DiscoverySession, PeerEvents, PeerId};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Configuration plus the single discovery session of a client or server.
///
/// A runtime advertises at most once. A second [`advertise`](Self::advertise)
/// fails with [`DiscoveryError::AlreadyAdvertising`], and once stopped a
/// runtime cannot advertise again.
pub struct RuntimeContext {
    config: Config,
    discovery: Arc<dyn Discovery>,
    session: Mutex<Session>,
}

enum Session {
    Idle,
    Active(DiscoverySession),
    Stopped,
}

impl RuntimeContext {
    /// Creates a runtime that has not advertised yet.
    pub fn new(config: Config, discovery: Arc<dyn Discovery>) -> Self {
        Self {
            config,
            discovery,
            session: Mutex::new(Session::Idle),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns `true` when lifecycle logging is enabled.
    pub fn debug(&self) -> bool {
        self.config.debug
    }

    /// Starts the discovery session.
    ///
    /// The session options are `{ key: secret }`, overlaid with `metadata`,
    /// overlaid with the configured `discovery` object.
    ///
    /// # Errors
    ///
    /// - [`DiscoveryError::AlreadyAdvertising`] if a session is active
    /// - [`DiscoveryError::Closed`] if the session was stopped
    /// - [`DiscoveryError::InvalidOptions`] if the merged options are malformed
    pub fn advertise(&self, metadata: Map<String, Value>) -> Result<PeerEvents, DiscoveryError> {
        let mut session = self.session.lock();
        match *session {
            Session::Idle => {}
            Session::Active(_) => return Err(DiscoveryError::AlreadyAdvertising),
            Session::Stopped => return Err(DiscoveryError::Closed),
        }

        let options = self.session_options(metadata)?;
        let (joined, events) = self.discovery.join(options)?;
        if self.debug() {
            debug!(peer_id = %joined.peer_id(), key = %self.config.secret, "Advertising");
        }
        *session = Session::Active(joined);
        Ok(events)
    }

    /// Withdraws the advertisement. Returns `false` if nothing was active.
    pub fn stop_advertising(&self) -> bool {
        let previous = std::mem::replace(&mut *self.session.lock(), Session::Stopped);
        match previous {
            Session::Active(session) => {
                if self.debug() {
                    debug!(peer_id = %session.peer_id(), "Stopped advertising");
                }
                session.stop();
                true
            }
            Session::Idle | Session::Stopped => false,
        }
    }

    /// Id of the active session, if any.
    pub fn peer_id(&self) -> Option<PeerId> {
        match &*self.session.lock() {
            Session::Active(session) => Some(session.peer_id().clone()),
            Session::Idle | Session::Stopped => None,
        }
    }

    /// Returns `true` while a session is active.
    pub fn is_advertising(&self) -> bool {
        matches!(*self.session.lock(), Session::Active(_))
    }

    fn session_options(&self, metadata: Map<String, Value>) -> Result<DiscoveryOptions, DiscoveryError> {
        let mut merged = Map::new();
        merged.insert("key".to_string(), Value::String(self.config.secret.clone()));
        merged.extend(metadata);
        merged.extend(self.config.discovery.clone());
        Ok(serde_json::from_value(Value::Object(merged))?)
    }
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("config", &self.config)
            .field("advertising", &self.is_advertising())
            .finish_non_exhaustive()
    }
}
