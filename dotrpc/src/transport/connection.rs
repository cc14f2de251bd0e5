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

//! Client side link to a single server.

use crate::protocol::{Request, Response};
use crate::transport::framing::{decode, read_frame, write_message};
use crate::transport::{ExponentialBackoff, PendingReplies, ReconnectionStrategy, TransportError};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection({})", self.0)
    }
}

/// A request/reply link to one server.
///
/// Opening never blocks: a driver task connects in the background, and
/// requests issued before the socket is up are buffered and flushed once it
/// is. When an established link drops, every request awaiting a reply is
/// failed and the driver reconnects according to its
/// [`ReconnectionStrategy`]. [`close`](Self::close) stops the driver for
/// good.
pub struct Connection {
    id: ConnectionId,
    address: SocketAddr,
    pending: Arc<PendingReplies>,
    outbound: mpsc::UnboundedSender<Request>,
    closed: Arc<AtomicBool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Opens a connection using the default [`ExponentialBackoff`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(address: SocketAddr) -> Arc<Self> {
        Self::open_with_strategy(address, Arc::new(ExponentialBackoff::default()))
    }

    /// Opens a connection with a custom reconnection strategy.
    pub fn open_with_strategy(
        address: SocketAddr,
        strategy: Arc<dyn ReconnectionStrategy>,
    ) -> Arc<Self> {
        let id = ConnectionId::next();
        let pending = Arc::new(PendingReplies::new());
        let closed = Arc::new(AtomicBool::new(false));
        let (outbound, requests) = mpsc::unbounded_channel();

        let driver = Driver {
            id,
            address,
            pending: pending.clone(),
            closed: closed.clone(),
            strategy,
        };
        let handle = tokio::spawn(driver.run(requests));

        Arc::new(Self {
            id,
            address,
            pending,
            outbound,
            closed,
            driver: Mutex::new(Some(handle)),
        })
    }

    /// Returns this connection's id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the server address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns `true` once closed, locally or because the driver gave up.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of requests awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Queues a request and returns a receiver for its reply.
    ///
    /// The receiver resolves with an error if the link is lost or the
    /// connection is closed before the reply arrives.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the connection is closed.
    pub fn request(
        &self,
        path: impl Into<String>,
        payload: Value,
    ) -> Result<oneshot::Receiver<Value>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let (id, reply) = self.pending.register();
        if self.outbound.send(Request::new(id, path, payload)).is_err() {
            self.pending.cancel(id);
            return Err(TransportError::Closed);
        }
        Ok(reply)
    }

    /// Closes the connection. Calling it again has no effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
        let failed = self.pending.fail_all();
        debug!(connection = %self.id, address = %self.address, failed, "Connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("closed", &self.is_closed())
            .field("in_flight", &self.pending.len())
            .finish()
    }
}

struct Driver {
    id: ConnectionId,
    address: SocketAddr,
    pending: Arc<PendingReplies>,
    closed: Arc<AtomicBool>,
    strategy: Arc<dyn ReconnectionStrategy>,
}

impl Driver {
    async fn run(self, mut requests: mpsc::UnboundedReceiver<Request>) {
        let mut attempt = 0u32;
        loop {
            let stream = match TcpStream::connect(self.address).await {
                Ok(stream) => stream,
                Err(source) => {
                    let error = TransportError::ConnectionFailed {
                        address: self.address.to_string(),
                        source,
                    };
                    warn!(connection = %self.id, error = %error, attempt, "Connect failed");
                    if !self.retry(attempt, &error).await {
                        break;
                    }
                    attempt = attempt.saturating_add(1);
                    continue;
                }
            };

            attempt = 0;
            let _ = stream.set_nodelay(true);
            debug!(connection = %self.id, address = %self.address, "Connected");

            let (reader, writer) = stream.into_split();
            let lost = tokio::select! {
                error = read_replies(reader, &self.pending) => Some(error),
                outcome = write_requests(writer, &mut requests, &self.pending) => outcome,
            };

            let Some(error) = lost else {
                // Every handle is gone; nothing left to send.
                break;
            };
            warn!(connection = %self.id, error = %error, "Connection lost");
            // Buffered requests were registered before the loss and are
            // failed along with the ones already written.
            while requests.try_recv().is_ok() {}
            self.pending.fail_all();
            if !self.retry(0, &error).await {
                break;
            }
        }

        self.closed.store(true, Ordering::Release);
        requests.close();
        self.pending.fail_all();
    }

    /// Asks the strategy about attempt `attempt`, sleeping its delay when
    /// another attempt is allowed.
    async fn retry(&self, attempt: u32, error: &TransportError) -> bool {
        if !self.strategy.should_reconnect(attempt, error).await {
            warn!(
                connection = %self.id,
                strategy = self.strategy.name(),
                error = %error,
                "Giving up on connection"
            );
            return false;
        }
        tokio::time::sleep(self.strategy.next_delay(attempt).await).await;
        true
    }
}

async fn read_replies(mut reader: OwnedReadHalf, pending: &PendingReplies) -> TransportError {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(TransportError::Io { source }) => {
                return TransportError::connection_lost(source.to_string());
            }
            Err(error) => return error,
        };
        match decode::<Response>(&frame) {
            Ok(response) => {
                pending.complete(response.id, response.reply);
            }
            Err(error) => warn!(error = %error, "Discarding undecodable reply frame"),
        }
    }
}

/// An oversized request fails alone; the frame is rejected before any byte
/// is written, so the link stays usable.
async fn write_requests(
    mut writer: OwnedWriteHalf,
    requests: &mut mpsc::UnboundedReceiver<Request>,
    pending: &PendingReplies,
) -> Option<TransportError> {
    while let Some(request) = requests.recv().await {
        match write_message(&mut writer, &request).await {
            Ok(()) => {}
            Err(error @ TransportError::FrameTooLarge { .. }) => {
                warn!(id = request.id, error = %error, "Dropping oversized request");
                pending.cancel(request.id);
            }
            Err(error) => return Some(error),
        }
    }
    None
}
