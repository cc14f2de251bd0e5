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

//! Peer discovery capability.
//!
//! dotrpc does not broadcast anything itself. It consumes a [`Discovery`]
//! implementation that, given a set of [`DiscoveryOptions`], announces this
//! process to the other members sharing the same key and reports members
//! coming and going as [`PeerEvent`]s.
//!
//! [`MemoryDiscovery`] is an in-process implementation used by tests and by
//! applications that run every peer inside one process.
//!
//! # Examples
//!
//! ```rust
//! use dotrpc::{Discovery, DiscoveryOptions, MemoryDiscovery, PeerEvent};
//! use serde_json::json;
//!
//! # fn example() -> Result<(), dotrpc::DiscoveryError> {
//! let hub = MemoryDiscovery::new();
//!
//! let (_server, _) = hub.join(DiscoveryOptions::new("dot").with_advertisement(json!({
//!     "port": 7000,
//!     "services": ["math"],
//! })))?;
//! let (_client, mut events) = hub.join(DiscoveryOptions::new("dot"))?;
//!
//! match events.try_recv() {
//!     Ok(PeerEvent::Added(peer)) => assert_eq!(peer.advertisement["port"], 7000),
//!     other => panic!("unexpected event: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod memory;
mod types;

pub use error::DiscoveryError;
pub use memory::MemoryDiscovery;
pub use types::{DiscoveryOptions, PeerEvent, PeerEvents, PeerId, PeerRecord};

/// A source of peer membership events.
pub trait Discovery: Send + Sync {
    /// Starts advertising with `options` and watching for other members
    /// with the same key.
    ///
    /// The returned session keeps the advertisement alive; dropping or
    /// stopping it withdraws the advertisement.
    fn join(&self, options: DiscoveryOptions)
    -> Result<(DiscoverySession, PeerEvents), DiscoveryError>;
}

/// Implementation side of a [`DiscoverySession`].
pub trait SessionHandle: Send + Sync {
    /// Withdraws the advertisement. Must tolerate repeated calls.
    fn stop(&self);
}

/// A live advertisement, withdrawn when dropped.
pub struct DiscoverySession {
    peer_id: PeerId,
    handle: Box<dyn SessionHandle>,
}

impl DiscoverySession {
    /// Wraps an implementation handle.
    pub fn new(peer_id: PeerId, handle: impl SessionHandle + 'static) -> Self {
        Self {
            peer_id,
            handle: Box::new(handle),
        }
    }

    /// Id under which this process is known to the other members.
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Withdraws the advertisement.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

impl std::fmt::Debug for DiscoverySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoverySession")
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}
