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

//! RPC server.
//!
//! A [`Server`] holds a registry of [`ServiceHandler`]s. Once started it
//! listens on TCP, advertises `{ port, group, services }` through discovery
//! and routes each inbound request to the named method.
//!
//! # Lifecycle
//!
//! ```text
//! Created -> Starting -> Listening -> ShuttingDown -> Closed
//!               |
//!               +-> Failed
//! ```
//!
//! The advertised service list is captured when the server starts; services
//! added afterwards are routable but not advertised.
//!
//! # Clean shutdown
//!
//! A request whose service segment is the configured shutdown command
//! (`#CLEAN_SHUTDOWN` by default) locks the server, is acknowledged with
//! `{ "cmd": "#KILL", "acknowledged": true }` and closes the server after
//! `payload.shutdown` milliseconds, or the configured default. Requests
//! arriving in between are answered `LOCKED`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotrpc::{Config, MemoryDiscovery, Server, ServiceHandler};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), dotrpc::ServerError> {
//! let server = Server::new(Config::default().with_port(7000), Arc::new(MemoryDiscovery::new()));
//! server.add_service(ServiceHandler::new("Echo").method_fn("say", |payload, reply| {
//!     reply.send(payload);
//! }))?;
//!
//! let address = server.start().await?;
//! println!("listening on {address}");
//! server.wait_closed().await;
//! # Ok(())
//! # }
//! ```

mod connection;
mod error;
mod handler;
mod registry;
mod router;
mod shutdown;

pub use error::ServerError;
pub use handler::{BoxError, MethodFuture, Reply, ServiceHandler};

use crate::config::Config;
use crate::context::RuntimeContext;
use crate::discovery::{Discovery, DiscoveryError, PeerId};
use crate::transport::{advertised_address, bind_preferred};
use parking_lot::Mutex;
use registry::ServiceRegistry;
use router::RequestRouter;
use serde_json::{Map, Value, json};
use shutdown::ShutdownCoordinator;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Lifecycle state of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// Created, not started.
    Created,
    /// Resolving a port and binding.
    Starting,
    /// Accepting requests.
    Listening,
    /// Locked by a clean shutdown, waiting to close.
    ShuttingDown,
    /// Listener and connections closed. Terminal.
    Closed,
    /// Start failed. Terminal.
    Failed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Created => "created",
            ServerState::Starting => "starting",
            ServerState::Listening => "listening",
            ServerState::ShuttingDown => "shutting down",
            ServerState::Closed => "closed",
            ServerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Discovery-advertised RPC server.
pub struct Server {
    context: Arc<RuntimeContext>,
    registry: Arc<ServiceRegistry>,
    state: Arc<watch::Sender<ServerState>>,
    shutdown: Arc<ShutdownCoordinator>,
    router: Arc<RequestRouter>,
    bound: Mutex<Option<Bound>>,
}

#[derive(Debug, Clone)]
struct Bound {
    local_addr: SocketAddr,
    payload: Value,
}

impl Server {
    /// Creates a server. Nothing is bound until [`start`](Self::start).
    ///
    /// The clean shutdown drain wait defaults to 5 seconds when the
    /// configuration sets none.
    pub fn new(config: Config, discovery: Arc<dyn Discovery>) -> Self {
        let default_wait = config.shutdown_wait();
        let delimiter = config.delimiter().to_string();
        let shutdown_command = config.shutdown_command.clone();
        let debug = config.debug;

        let context = Arc::new(RuntimeContext::new(config, discovery));
        let registry = Arc::new(ServiceRegistry::new());
        let (state, _) = watch::channel(ServerState::Created);
        let state = Arc::new(state);
        let shutdown = Arc::new(ShutdownCoordinator::new(
            default_wait,
            context.clone(),
            state.clone(),
        ));
        let router = Arc::new(RequestRouter::new(
            registry.clone(),
            shutdown.clone(),
            delimiter,
            shutdown_command,
            debug,
        ));

        Self {
            context,
            registry,
            state,
            shutdown,
            router,
            bound: Mutex::new(None),
        }
    }

    /// Registers a service, replacing any service with the same name.
    /// Returns the name it was registered under.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidHandler`] if the handler fails
    /// [`ServiceHandler::validate`] or its name contains the delimiter.
    pub fn add_service(&self, handler: ServiceHandler) -> Result<String, ServerError> {
        handler.validate()?;
        let name = handler.service_name();
        if name.contains(self.context.config().delimiter()) {
            return Err(ServerError::invalid_handler(format!(
                "service name '{name}' contains the path delimiter"
            )));
        }
        if self.registry.insert(name.clone(), handler).is_some() && self.context.debug() {
            info!(service = %name, "Service replaced");
        }
        Ok(name)
    }

    /// Registers several services. Stops at the first invalid handler;
    /// the ones before it stay registered.
    pub fn add_services<I>(&self, handlers: I) -> Result<Vec<String>, ServerError>
    where
        I: IntoIterator<Item = ServiceHandler>,
    {
        handlers
            .into_iter()
            .map(|handler| self.add_service(handler))
            .collect()
    }

    /// Binds, advertises and starts accepting requests. Returns the bound
    /// address.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyStarted`] if the server left `Created`
    /// - [`ServerError::Transport`] if no port could be bound
    /// - [`ServerError::Discovery`] if advertising failed
    ///
    /// Bind and discovery failures leave the server `Failed`. A server
    /// closed while starting stays `Closed` and is never advertised.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == ServerState::Created {
                *state = ServerState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(ServerError::AlreadyStarted);
        }
        self.finish_start().await
    }

    async fn finish_start(&self) -> Result<SocketAddr, ServerError> {
        match self.bind_and_advertise().await {
            Ok(local_addr) => Ok(local_addr),
            Err(error) => {
                warn!(error = %error, "Server failed to start");
                self.shutdown.lock();
                self.context.stop_advertising();
                self.state.send_if_modified(|state| {
                    if *state == ServerState::Starting {
                        *state = ServerState::Failed;
                        true
                    } else {
                        false
                    }
                });
                Err(error)
            }
        }
    }

    async fn bind_and_advertise(&self) -> Result<SocketAddr, ServerError> {
        let config = self.context.config();
        let host = config.iface.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let listener = bind_preferred(host, config.port).await?;
        let local_addr = listener.local_addr()?;

        let payload = self.advertising_payload(local_addr.port());
        let mut metadata = Map::new();
        metadata.insert("address".to_string(), payload["address"].clone());
        metadata.insert("advertisement".to_string(), payload["advertisement"].clone());
        *self.bound.lock() = Some(Bound {
            local_addr,
            payload,
        });

        if self.state() == ServerState::Closed {
            return Ok(local_addr);
        }
        match self.context.advertise(metadata) {
            Ok(_) => {}
            // Closed between the check and the advertisement.
            Err(DiscoveryError::Closed) if self.state() == ServerState::Closed => {
                return Ok(local_addr);
            }
            Err(error) => return Err(error.into()),
        }

        let listening = self.state.send_if_modified(|state| {
            if *state == ServerState::Starting {
                *state = ServerState::Listening;
                true
            } else {
                false
            }
        });
        if !listening {
            // Closed while starting; the listener is dropped here.
            return Ok(local_addr);
        }

        if self.context.debug() {
            info!(port = local_addr.port(), "Ready on #{}", local_addr.port());
        }
        tokio::spawn(connection::accept_loop(
            listener,
            self.router.clone(),
            self.state.subscribe(),
            self.context.debug(),
        ));
        Ok(local_addr)
    }

    fn advertising_payload(&self, port: u16) -> Value {
        let config = self.context.config();
        let mut advertisement = Map::new();
        advertisement.insert("port".to_string(), json!(port));
        if let Some(group) = config.group() {
            advertisement.insert("group".to_string(), json!(group));
        }
        advertisement.insert("services".to_string(), json!(self.registry.names()));

        json!({
            "address": advertised_address(config.iface).to_string(),
            "advertisement": advertisement,
        })
    }

    /// Closes the server now: stops advertising and closes the listener and
    /// every connection. Returns `false` if it was already closed.
    pub fn shutdown(&self) -> bool {
        self.shutdown.close_now()
    }

    /// Waits until the server is `Closed` or `Failed`.
    pub async fn wait_closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|state| matches!(state, ServerState::Closed | ServerState::Failed))
            .await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Returns `true` once a clean shutdown was accepted or the server closed.
    pub fn is_locked(&self) -> bool {
        self.shutdown.is_locked()
    }

    /// Bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.lock().as_ref().map(|bound| bound.local_addr)
    }

    /// What the server advertised when it started:
    /// `{ address, advertisement: { port, group, services } }`.
    pub fn advertisement(&self) -> Option<Value> {
        self.bound.lock().as_ref().map(|bound| bound.payload.clone())
    }

    /// Registered service names.
    pub fn services(&self) -> Vec<String> {
        self.registry.names()
    }

    /// This server's discovery id while advertising.
    pub fn peer_id(&self) -> Option<PeerId> {
        self.context.peer_id()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        self.context.config()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.close_now();
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("services", &self.services())
            .finish()
    }
}
