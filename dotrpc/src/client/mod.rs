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

//! RPC client.
//!
//! A [`Client`] joins discovery, keeps a pool of connections to the servers
//! it hears about and routes each call to a random peer offering the
//! call's service.
//!
//! # Dispatch
//!
//! 1. An empty path fails with `INVALID_PATH`.
//! 2. The service is the first segment of the path.
//! 3. If a peer offers the service the call is sent, guarded by the
//!    per-call `timeout` when one is configured.
//! 4. Otherwise, with a `delay` configured, the call waits in a queue that
//!    is retried every `drain_interval` and whenever a peer appears. A call
//!    that waits `delay` without a peer fails with `SERVICE_TIMEOUT`.
//! 5. Otherwise the call fails with `INVALID_SERVICE`.
//!
//! Every call resolves exactly once.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotrpc::{Client, Config, MemoryDiscovery};
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), dotrpc::ClientError> {
//! let config = Config::default()
//!     .with_delay(Duration::from_millis(500))
//!     .with_timeout(Duration::from_secs(2));
//! let client = Client::new(config, Arc::new(MemoryDiscovery::new()))?;
//!
//! client.send_with("users.getById", json!({ "id": 7 }), |outcome| match outcome {
//!     Ok(user) => println!("{user}"),
//!     Err(error) => eprintln!("{}", error.code()),
//! });
//! # Ok(())
//! # }
//! ```

mod error;
mod pool;
mod queue;

pub use error::ClientError;

use crate::config::Config;
use crate::context::RuntimeContext;
use crate::discovery::{Discovery, PeerEvent, PeerEvents, PeerId, PeerRecord};
use crate::protocol::split_path;
use crate::transport::{Connection, TransportError};
use parking_lot::Mutex;
use pool::{Advertised, ConnectionPool};
use queue::{Completion, Dispatch, DispatchQueue, DrainWorker, PendingCall};
use serde_json::{Map, Value, json};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Discovery-driven RPC client.
///
/// Must be created inside a tokio runtime. Dropping the client stops
/// advertising, closes every connection and resolves queued calls with
/// [`ClientError::Disconnected`].
pub struct Client {
    inner: Arc<ClientInner>,
    tasks: Vec<JoinHandle<()>>,
}

struct ClientInner {
    context: RuntimeContext,
    pool: Mutex<ConnectionPool>,
    queue: Option<DispatchQueue>,
}

impl Client {
    /// Creates a client and starts watching for servers.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Discovery`] if the discovery session cannot
    /// be started.
    pub fn new(config: Config, discovery: Arc<dyn Discovery>) -> Result<Self, ClientError> {
        let delay = config.queue_delay();
        let interval = config.drain_interval;
        let context = RuntimeContext::new(config, discovery);

        let mut tasks = Vec::with_capacity(2);
        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| {
            let queue = delay.map(|delay| {
                let dispatcher: Weak<dyn Dispatch> = weak.clone();
                let (worker, queue) = DrainWorker::new(dispatcher, delay, interval);
                tasks.push(tokio::spawn(worker.run()));
                queue
            });
            ClientInner {
                context,
                pool: Mutex::new(ConnectionPool::new()),
                queue,
            }
        });

        let mut metadata = Map::new();
        metadata.insert("client".to_string(), json!(true));
        let events = match inner.context.advertise(metadata) {
            Ok(events) => events,
            Err(error) => {
                tasks.iter().for_each(JoinHandle::abort);
                return Err(error.into());
            }
        };
        tasks.push(tokio::spawn(pump_events(Arc::downgrade(&inner), events)));

        Ok(Self { inner, tasks })
    }

    /// Calls `path` with `payload` and waits for the outcome.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`]; see the [module documentation](self).
    pub async fn send(
        &self,
        path: impl Into<String>,
        payload: Value,
    ) -> Result<Value, ClientError> {
        let (completion, outcome) = oneshot::channel();
        self.inner.submit(PendingCall::new(path.into(), payload, completion));
        outcome.await.unwrap_or(Err(ClientError::Disconnected))
    }

    /// Calls `path` with `payload` and hands the outcome to `callback`.
    ///
    /// Validation failures that need no peer (`INVALID_PATH`,
    /// `INVALID_SERVICE`) invoke the callback before this method returns.
    /// Otherwise the callback runs on a spawned task.
    pub fn send_with<F>(&self, path: impl Into<String>, payload: Value, callback: F)
    where
        F: FnOnce(Result<Value, ClientError>) + Send + 'static,
    {
        let (completion, mut outcome) = oneshot::channel();
        self.inner.submit(PendingCall::new(path.into(), payload, completion));
        match outcome.try_recv() {
            Ok(result) => callback(result),
            Err(oneshot::error::TryRecvError::Closed) => callback(Err(ClientError::Disconnected)),
            Err(oneshot::error::TryRecvError::Empty) => {
                tokio::spawn(async move {
                    callback(outcome.await.unwrap_or(Err(ClientError::Disconnected)));
                });
            }
        }
    }

    /// Closes every pooled connection and empties the pool.
    ///
    /// Calls in flight on those connections fail with a transport error.
    /// The client keeps watching discovery and reconnects to peers that
    /// announce themselves again.
    pub fn disconnect(&self) {
        let entries = self.inner.pool.lock().drain();
        for (service, peer, connection) in entries {
            connection.close();
            if self.inner.context.debug() {
                debug!(service = %service, peer_id = %peer, "Connection closed");
            }
        }
    }

    /// Number of distinct open connections.
    pub fn connection_count(&self) -> usize {
        self.inner.pool.lock().connection_count()
    }

    /// Number of peers currently offering `service`.
    pub fn peer_count(&self, service: &str) -> usize {
        self.inner.pool.lock().peer_count(service)
    }

    /// Service names with at least one known peer.
    pub fn services(&self) -> Vec<String> {
        self.inner.pool.lock().services()
    }

    /// This client's discovery id.
    pub fn peer_id(&self) -> Option<PeerId> {
        self.inner.context.peer_id()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        self.inner.context.config()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.inner.context.stop_advertising();
        self.disconnect();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("context", &self.inner.context)
            .field("services", &self.services())
            .finish()
    }
}

impl ClientInner {
    fn submit(&self, call: PendingCall) {
        if call.path.is_empty() {
            call.complete(Err(ClientError::InvalidPath));
            return;
        }
        let Err(call) = self.dispatch(call) else {
            return;
        };
        match &self.queue {
            Some(queue) => queue.enqueue(call),
            None => {
                let service = split_path(&call.path, self.context.config().delimiter()).0;
                let error = ClientError::InvalidService {
                    service: service.to_string(),
                };
                call.complete(Err(error));
            }
        }
    }

    fn peer_added(&self, record: PeerRecord) {
        let Some(advertised) = Advertised::parse(&record, true) else {
            if self.context.debug() {
                debug!(peer_id = %record.id, "Ignoring malformed advertisement");
            }
            return;
        };

        if let Some(group) = self.context.config().group() {
            if advertised.group.as_deref() != Some(group) {
                if self.context.debug() {
                    debug!(peer_id = %record.id, group = ?advertised.group, "Ignoring peer from another group");
                }
                self.drain();
                return;
            }
        }

        let Some(address) = advertised.socket_address() else {
            return;
        };
        let added = self
            .pool
            .lock()
            .add_peer(&record.id, &advertised.services, || Connection::open(address));
        if self.context.debug() {
            debug!(
                peer_id = %record.id,
                address = %address,
                services = ?advertised.services,
                added,
                "Peer added"
            );
        }
        self.drain();
    }

    fn peer_removed(&self, record: PeerRecord) {
        let Some(advertised) = Advertised::parse(&record, false) else {
            return;
        };

        let removed = self.pool.lock().remove_peer(&record.id, &advertised.services);
        for connection in &removed {
            connection.close();
        }
        if self.context.debug() {
            debug!(
                peer_id = %record.id,
                services = ?advertised.services,
                closed = removed.len(),
                "Peer removed"
            );
        }
    }

    fn drain(&self) {
        if let Some(queue) = &self.queue {
            queue.drain();
        }
    }

    fn start_call(&self, connection: Arc<Connection>, call: PendingCall) {
        let PendingCall {
            path,
            payload,
            completion,
            ..
        } = call;

        let reply = match connection.request(path, payload) {
            Ok(reply) => reply,
            Err(error) => {
                warn!(connection = %connection.id(), error = %error, "Send failed");
                let _ = completion.send(Err(ClientError::Transport(error)));
                return;
            }
        };

        let timeout = self.context.config().call_timeout();
        tokio::spawn(await_reply(reply, timeout, completion));
    }
}

impl Dispatch for ClientInner {
    fn dispatch(&self, call: PendingCall) -> Result<(), PendingCall> {
        let service = split_path(&call.path, self.context.config().delimiter()).0;
        let Some(connection) = self.pool.lock().select(service) else {
            return Err(call);
        };
        self.start_call(connection, call);
        Ok(())
    }
}

async fn await_reply(
    reply: oneshot::Receiver<Value>,
    timeout: Option<std::time::Duration>,
    completion: Completion,
) {
    let received = match timeout {
        Some(duration) => match tokio::time::timeout(duration, reply).await {
            Ok(received) => received,
            Err(_) => {
                let _ = completion.send(Err(ClientError::RequestTimeout { duration }));
                return;
            }
        },
        None => reply.await,
    };

    let outcome = match received {
        Ok(reply) => interpret_reply(reply),
        Err(_) => Err(ClientError::Transport(TransportError::connection_lost(
            "connection dropped before reply",
        ))),
    };
    let _ = completion.send(outcome);
}

/// Non-string values are results; null and strings are errors.
fn interpret_reply(reply: Value) -> Result<Value, ClientError> {
    match reply {
        Value::Null => Err(ClientError::InvalidResponse),
        Value::String(message) => Err(ClientError::from_reply(&message)),
        value => Ok(value),
    }
}

async fn pump_events(client: Weak<ClientInner>, mut events: PeerEvents) {
    while let Some(event) = events.recv().await {
        let Some(client) = client.upgrade() else {
            break;
        };
        match event {
            PeerEvent::Added(record) => client.peer_added(record),
            PeerEvent::Removed(record) => client.peer_removed(record),
        }
    }
}
