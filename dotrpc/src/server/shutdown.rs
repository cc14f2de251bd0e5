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

//! Lock-and-drain shutdown.
//!
//! Accepting the clean shutdown command locks the server (every later
//! request is answered `LOCKED`), acknowledges the command at once and
//! closes the server after the drain wait. The lock is never released.

use crate::context::RuntimeContext;
use crate::protocol::shutdown_ack;
use crate::server::{Reply, ServerState};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Upper bound on a requested drain wait, about a century.
pub(crate) const MAX_DRAIN_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub(crate) struct ShutdownCoordinator {
    locked: AtomicBool,
    default_wait: Duration,
    context: Arc<RuntimeContext>,
    state: Arc<watch::Sender<ServerState>>,
}

impl ShutdownCoordinator {
    pub fn new(
        default_wait: Duration,
        context: Arc<RuntimeContext>,
        state: Arc<watch::Sender<ServerState>>,
    ) -> Self {
        Self {
            locked: AtomicBool::new(false),
            default_wait,
            context,
            state,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Sets the lock. Returns `true` for the call that set it.
    pub fn lock(&self) -> bool {
        !self.locked.swap(true, Ordering::AcqRel)
    }

    /// `payload.shutdown` in milliseconds when it is a positive number,
    /// the server default otherwise. Waits too long for a [`Duration`]
    /// saturate at [`MAX_DRAIN_WAIT`].
    pub fn drain_wait(&self, payload: &Value) -> Duration {
        payload
            .get("shutdown")
            .and_then(Value::as_f64)
            .filter(|ms| ms.is_finite() && *ms > 0.0)
            .map(|ms| Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(MAX_DRAIN_WAIT))
            .map(|wait| wait.min(MAX_DRAIN_WAIT))
            .unwrap_or(self.default_wait)
    }

    /// Locks, acknowledges and schedules the close. Returns the drain wait.
    pub fn begin(self: &Arc<Self>, payload: &Value, reply: &Reply) -> Duration {
        let wait = self.drain_wait(payload);
        if self.lock() {
            self.state.send_if_modified(|state| {
                if *state == ServerState::Listening {
                    *state = ServerState::ShuttingDown;
                    true
                } else {
                    false
                }
            });
            if self.context.debug() {
                info!(wait_ms = wait.as_millis() as u64, "Clean shutdown accepted");
            }
        }
        reply.send(shutdown_ack());

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            coordinator.close_now();
        });
        wait
    }

    /// Locks, withdraws the advertisement and moves to `Closed`, which
    /// tears down the listener and every connection. Returns `false` if the
    /// server was already closed.
    pub fn close_now(&self) -> bool {
        self.lock();
        if self.state.send_replace(ServerState::Closed) == ServerState::Closed {
            return false;
        }
        self.context.stop_advertising();
        if self.context.debug() {
            info!("Server closed");
        }
        true
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("locked", &self.is_locked())
            .field("default_wait", &self.default_wait)
            .finish_non_exhaustive()
    }
}
