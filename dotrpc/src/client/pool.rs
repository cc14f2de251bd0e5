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

//! Service name to peer to connection mapping.

use crate::discovery::{PeerId, PeerRecord};
use crate::transport::Connection;
use rand::seq::IndexedRandom;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// A server advertisement that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Advertised {
    pub address: Option<IpAddr>,
    pub port: u16,
    pub group: Option<String>,
    pub services: Vec<String>,
}

impl Advertised {
    /// Validates a peer record.
    ///
    /// The advertisement must be an object with an integer `port` and a
    /// non-empty `services` array. The record address must be an IP address
    /// when `require_address` is set. Non-string service names are skipped.
    pub fn parse(record: &PeerRecord, require_address: bool) -> Option<Self> {
        let advertisement = record.advertisement.as_object()?;
        let port = u16::try_from(advertisement.get("port")?.as_u64()?).ok()?;

        let address = record.address.parse::<IpAddr>().ok();
        if require_address && address.is_none() {
            return None;
        }

        let services: Vec<String> = advertisement
            .get("services")?
            .as_array()?
            .iter()
            .filter_map(|service| service.as_str())
            .map(str::to_string)
            .collect();
        if services.is_empty() {
            return None;
        }

        let group = advertisement
            .get("group")
            .and_then(|group| group.as_str())
            .map(str::to_string);

        Some(Self {
            address,
            port,
            group,
            services,
        })
    }

    /// Socket address to connect to, when the record carried an address.
    pub fn socket_address(&self) -> Option<SocketAddr> {
        self.address.map(|address| SocketAddr::new(address, self.port))
    }
}

/// Live connections keyed by service name, then by peer.
///
/// A `(service, peer)` pair maps to at most one connection. All services a
/// peer advertised in one announcement share that announcement's
/// connection.
#[derive(Debug, Default)]
pub(crate) struct ConnectionPool {
    services: HashMap<String, HashMap<PeerId, Arc<Connection>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `peer` under each of `services`, skipping pairs that are
    /// already present.
    ///
    /// `open` is only called when at least one pair is new. Returns the
    /// number of pairs added.
    pub fn add_peer<F>(&mut self, peer: &PeerId, services: &[String], open: F) -> usize
    where
        F: FnOnce() -> Arc<Connection>,
    {
        let is_new = services.iter().any(|service| {
            self.services
                .get(service)
                .is_none_or(|peers| !peers.contains_key(peer))
        });
        if !is_new {
            return 0;
        }

        let connection = open();
        let mut added = 0;
        for service in services {
            let peers = self.services.entry(service.clone()).or_default();
            if !peers.contains_key(peer) {
                peers.insert(peer.clone(), connection.clone());
                added += 1;
            }
        }
        added
    }

    /// Removes `peer` from each of `services` and returns the connections
    /// that were registered, without duplicates.
    pub fn remove_peer(&mut self, peer: &PeerId, services: &[String]) -> Vec<Arc<Connection>> {
        let mut seen = HashSet::new();
        let mut removed = Vec::new();
        for service in services {
            let Some(peers) = self.services.get_mut(service) else {
                continue;
            };
            if let Some(connection) = peers.remove(peer) {
                if seen.insert(connection.id()) {
                    removed.push(connection);
                }
            }
            if peers.is_empty() {
                self.services.remove(service);
            }
        }
        removed
    }

    /// Picks a uniformly random connection registered for `service`.
    pub fn select(&self, service: &str) -> Option<Arc<Connection>> {
        let candidates: Vec<&Arc<Connection>> = self.services.get(service)?.values().collect();
        candidates.choose(&mut rand::rng()).map(|connection| Arc::clone(connection))
    }

    /// Empties the pool, returning every entry.
    pub fn drain(&mut self) -> Vec<(String, PeerId, Arc<Connection>)> {
        self.services
            .drain()
            .flat_map(|(service, peers)| {
                peers
                    .into_iter()
                    .map(move |(peer, connection)| (service.clone(), peer, connection))
            })
            .collect()
    }

    /// Service names with at least one registered peer.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of peers registered for `service`.
    pub fn peer_count(&self, service: &str) -> usize {
        self.services.get(service).map_or(0, HashMap::len)
    }

    /// Number of distinct connections in the pool.
    pub fn connection_count(&self) -> usize {
        self.services
            .values()
            .flat_map(HashMap::values)
            .map(|connection| connection.id())
            .collect::<HashSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn record(id: &str, address: &str, advertisement: Value) -> PeerRecord {
        PeerRecord {
            id: PeerId::new(id),
            address: address.to_string(),
            advertisement,
        }
    }

    fn unreachable() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_parse_valid_advertisement() {
        let parsed = Advertised::parse(
            &record(
                "a",
                "10.0.0.5",
                json!({ "port": 7000, "group": "blue", "services": ["math", 3, "users"] }),
            ),
            true,
        )
        .unwrap();

        assert_eq!(parsed.port, 7000);
        assert_eq!(parsed.group.as_deref(), Some("blue"));
        assert_eq!(parsed.services, names(&["math", "users"]));
        assert_eq!(parsed.socket_address(), Some("10.0.0.5:7000".parse().unwrap()));
    }

    #[test]
    fn test_parse_rejects_malformed_records() {
        let cases = [
            record("a", "10.0.0.5", Value::Null),
            record("a", "10.0.0.5", json!({ "services": ["math"] })),
            record("a", "10.0.0.5", json!({ "port": "7000", "services": ["math"] })),
            record("a", "10.0.0.5", json!({ "port": 70000, "services": ["math"] })),
            record("a", "10.0.0.5", json!({ "port": 7000 })),
            record("a", "10.0.0.5", json!({ "port": 7000, "services": [] })),
            record("a", "localhost", json!({ "port": 7000, "services": ["math"] })),
        ];
        for case in &cases {
            assert_eq!(Advertised::parse(case, true), None, "{case:?}");
        }
    }

    #[test]
    fn test_removal_does_not_require_address() {
        let removed = record("a", "", json!({ "port": 7000, "services": ["math"] }));
        assert!(Advertised::parse(&removed, true).is_none());
        assert!(Advertised::parse(&removed, false).is_some());
    }

    #[tokio::test]
    async fn test_pair_added_once() {
        let mut pool = ConnectionPool::new();
        let peer = PeerId::new("a");
        let mut opened = 0;

        let added = pool.add_peer(&peer, &names(&["math", "users"]), || {
            opened += 1;
            Connection::open(unreachable())
        });
        assert_eq!(added, 2);

        let added = pool.add_peer(&peer, &names(&["math"]), || {
            opened += 1;
            Connection::open(unreachable())
        });
        assert_eq!(added, 0);
        assert_eq!(opened, 1);
        assert_eq!(pool.connection_count(), 1);
        assert_eq!(pool.services(), names(&["math", "users"]));
    }

    #[tokio::test]
    async fn test_new_service_on_reannouncement() {
        let mut pool = ConnectionPool::new();
        let peer = PeerId::new("a");

        pool.add_peer(&peer, &names(&["math"]), || Connection::open(unreachable()));
        let added = pool.add_peer(&peer, &names(&["math", "users"]), || {
            Connection::open(unreachable())
        });

        assert_eq!(added, 1);
        assert_eq!(pool.peer_count("math"), 1);
        assert_eq!(pool.peer_count("users"), 1);
        assert_eq!(pool.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_remove_peer() {
        let mut pool = ConnectionPool::new();
        let a = PeerId::new("a");
        let b = PeerId::new("b");
        pool.add_peer(&a, &names(&["math", "users"]), || Connection::open(unreachable()));
        pool.add_peer(&b, &names(&["math"]), || Connection::open(unreachable()));

        let removed = pool.remove_peer(&a, &names(&["math", "users"]));
        assert_eq!(removed.len(), 1);
        assert_eq!(pool.peer_count("math"), 1);
        assert_eq!(pool.peer_count("users"), 0);
        assert_eq!(pool.services(), names(&["math"]));

        assert!(pool.remove_peer(&a, &names(&["math"])).is_empty());
    }

    #[tokio::test]
    async fn test_select() {
        let mut pool = ConnectionPool::new();
        assert!(pool.select("math").is_none());

        pool.add_peer(&PeerId::new("a"), &names(&["math"]), || {
            Connection::open(unreachable())
        });
        pool.add_peer(&PeerId::new("b"), &names(&["math"]), || {
            Connection::open(unreachable())
        });

        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(pool.select("math").unwrap().id());
        }
        assert_eq!(seen.len(), 2);
        assert!(pool.select("users").is_none());
    }

    #[tokio::test]
    async fn test_drain_empties_pool() {
        let mut pool = ConnectionPool::new();
        pool.add_peer(&PeerId::new("a"), &names(&["math", "users"]), || {
            Connection::open(unreachable())
        });

        let entries = pool.drain();
        assert_eq!(entries.len(), 2);
        assert_eq!(pool.connection_count(), 0);
        assert!(pool.services().is_empty());
    }
}
