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

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # dotrpc - Discovery-driven request/reply RPC
//!
//! dotrpc is a lightweight request/reply RPC layer for a cluster of peer
//! processes:
//!
//! - **Servers** expose named services (collections of callable methods) and
//!   advertise themselves through a [`Discovery`] capability.
//! - **Clients** passively learn about servers, keep a pool of live
//!   connections per service, and route calls by a dotted path
//!   (`"service.method"`) to a randomly chosen peer that offers it.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration merged over defaults
//! - **[`context`]**: Shared runtime context owning the discovery session
//! - **[`discovery`]**: Peer added / removed events keyed by advertised metadata
//! - **[`transport`]**: Length-prefixed JSON frames over TCP
//! - **[`protocol`]**: Wire messages and reply codes
//! - **[`client`]**: Connection pool and queued, delayed dispatch
//! - **[`server`]**: Service registry, request router and clean shutdown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotrpc::{Client, Config, MemoryDiscovery, Server, ServiceHandler};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let discovery = Arc::new(MemoryDiscovery::new());
//!
//! let server = Server::new(Config::default(), discovery.clone());
//! server.add_service(ServiceHandler::new("Math").method_fn("add", |payload, reply| {
//!     let sum = payload["a"].as_i64().unwrap_or(0) + payload["b"].as_i64().unwrap_or(0);
//!     reply.send(sum);
//! }))?;
//! server.start().await?;
//!
//! let client = Client::new(
//!     Config::default().with_delay(Duration::from_millis(500)),
//!     discovery,
//! )?;
//! let sum = client.send("math.add", json!({ "a": 2, "b": 3 })).await?;
//! assert_eq!(sum, json!(5));
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Each layer has its own error type:
//!
//! - [`TransportError`]: Connect, bind, framing and I/O failures
//! - [`DiscoveryError`]: Discovery session failures
//! - [`ClientError`]: Everything a call can resolve with besides success
//! - [`ServerError`]: Registration and lifecycle failures
//!
//! Validation failures travel over the wire as short string codes, see
//! [`ReplyCode`].

pub mod client;
pub mod config;
pub mod context;
pub mod discovery;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{Client, ClientError};
pub use config::Config;
pub use context::RuntimeContext;
pub use discovery::{
    Discovery, DiscoveryError, DiscoveryOptions, DiscoverySession, MemoryDiscovery, PeerEvent,
    PeerId, PeerRecord,
};
pub use protocol::ReplyCode;
pub use server::{Reply, Server, ServerError, ServerState, ServiceHandler};
pub use transport::{Connection, TransportError};
