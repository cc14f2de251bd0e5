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

//! Transport layer for dotrpc.
//!
//! Every peer-to-peer link is a TCP stream carrying length-prefixed JSON
//! frames (see [`framing`]). On top of that the module provides:
//!
//! - [`Connection`]: A client-side link to one server that connects in the
//!   background, buffers calls made before the socket is up and reconnects
//!   after a loss
//! - [`PendingReplies`]: Correlation of in-flight requests with their replies
//! - [`ReconnectionStrategy`]: Pluggable retry policy, with
//!   [`ExponentialBackoff`] as the default
//! - [`bind_preferred`]: Server-side port selection
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotrpc::transport::Connection;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = Connection::open("127.0.0.1:7000".parse()?);
//! let reply = connection.request("math.add", json!({ "a": 1, "b": 2 }))?;
//! println!("reply: {}", reply.await?);
//! connection.close();
//! # Ok(())
//! # }
//! ```

mod connection;
mod error;
pub mod framing;
mod pending;
mod port;
mod strategy;

pub use connection::{Connection, ConnectionId};
pub use error::TransportError;
pub use pending::PendingReplies;
pub use port::{PORT_SCAN_LIMIT, advertised_address, bind_preferred};
pub use strategy::{ExponentialBackoff, ExponentialBackoffBuilder, ReconnectionStrategy};
