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

//! In-process discovery hub.

use crate::discovery::{
    Discovery, DiscoveryError, DiscoveryOptions, DiscoverySession, PeerEvent, PeerEvents, PeerId,
    PeerRecord, SessionHandle,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Discovery within a single process.
///
/// Members are partitioned by key. Joining announces the new member to the
/// existing ones and replays the existing ones to the new member; stopping
/// a session announces its removal. Clones share the same hub.
///
/// [`publish`](Self::publish) and [`retract`](Self::retract) inject records
/// that belong to no session, which lets tests simulate remote peers and
/// malformed announcements.
#[derive(Debug, Clone, Default)]
pub struct MemoryDiscovery {
    hub: Arc<Mutex<Hub>>,
}

#[derive(Debug, Default)]
struct Hub {
    partitions: HashMap<String, Vec<Member>>,
}

#[derive(Debug)]
struct Member {
    record: PeerRecord,
    events: Option<mpsc::UnboundedSender<PeerEvent>>,
}

impl Hub {
    fn insert(&mut self, key: &str, member: Member) {
        let members = self.partitions.entry(key.to_string()).or_default();
        for existing in members.iter() {
            if let Some(events) = &existing.events {
                let _ = events.send(PeerEvent::Added(member.record.clone()));
            }
            if let Some(events) = &member.events {
                let _ = events.send(PeerEvent::Added(existing.record.clone()));
            }
        }
        members.push(member);
    }

    fn remove(&mut self, key: &str, id: &PeerId) -> Option<PeerRecord> {
        let members = self.partitions.get_mut(key)?;
        let index = members.iter().position(|member| &member.record.id == id)?;
        let removed = members.remove(index);
        for remaining in members.iter() {
            if let Some(events) = &remaining.events {
                let _ = events.send(PeerEvent::Removed(removed.record.clone()));
            }
        }
        if members.is_empty() {
            self.partitions.remove(key);
        }
        Some(removed.record)
    }
}

impl MemoryDiscovery {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Announces a record that belongs to no session.
    pub fn publish(&self, key: &str, record: PeerRecord) {
        trace!(key, peer_id = %record.id, "Publishing record");
        self.hub.lock().insert(key, Member { record, events: None });
    }

    /// Withdraws a member, announcing its removal to the others.
    ///
    /// Returns the removed record, or `None` if no such member exists.
    pub fn retract(&self, key: &str, id: &PeerId) -> Option<PeerRecord> {
        trace!(key, peer_id = %id, "Retracting record");
        self.hub.lock().remove(key, id)
    }

    /// Number of members sharing `key`.
    pub fn member_count(&self, key: &str) -> usize {
        self.hub
            .lock()
            .partitions
            .get(key)
            .map_or(0, |members| members.len())
    }
}

impl Discovery for MemoryDiscovery {
    fn join(
        &self,
        options: DiscoveryOptions,
    ) -> Result<(DiscoverySession, PeerEvents), DiscoveryError> {
        let id = PeerId::random();
        let address = options
            .address
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .to_string();
        let record = PeerRecord {
            id: id.clone(),
            address,
            advertisement: options.advertisement,
        };

        let (events, receiver) = mpsc::unbounded_channel();
        self.hub.lock().insert(
            &options.key,
            Member {
                record,
                events: Some(events),
            },
        );
        trace!(key = %options.key, peer_id = %id, "Joined");

        let handle = MemorySession {
            hub: self.hub.clone(),
            key: options.key,
            id: id.clone(),
        };
        Ok((DiscoverySession::new(id, handle), receiver))
    }
}

struct MemorySession {
    hub: Arc<Mutex<Hub>>,
    key: String,
    id: PeerId,
}

impl SessionHandle for MemorySession {
    fn stop(&self) {
        self.hub.lock().remove(&self.key, &self.id);
    }
}
