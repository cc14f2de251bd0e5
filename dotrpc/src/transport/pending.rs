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

//! Tracking of requests awaiting a reply on one connection.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// In-flight requests of a single connection, keyed by correlation id.
///
/// Ids start at 1 and increase monotonically. Dropping a sender without
/// completing it (see [`fail_all`](Self::fail_all)) wakes the waiting
/// receiver with a `RecvError`, which callers treat as a lost connection.
///
/// # Example
///
/// ```rust
/// use dotrpc::transport::PendingReplies;
/// use serde_json::json;
///
/// # async fn example() {
/// let pending = PendingReplies::new();
/// let (id, rx) = pending.register();
///
/// assert!(pending.complete(id, json!(5)));
/// assert_eq!(rx.await.unwrap(), json!(5));
/// # }
/// ```
#[derive(Debug)]
pub struct PendingReplies {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
}

impl PendingReplies {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            waiting: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates a correlation id and registers a receiver for its reply.
    pub fn register(&self) -> (u64, oneshot::Receiver<Value>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().insert(id, tx);
        (id, rx)
    }

    /// Delivers a reply. Returns `false` when the id is unknown or the
    /// caller stopped waiting.
    pub fn complete(&self, id: u64, reply: Value) -> bool {
        match self.waiting.lock().remove(&id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Forgets a request, waking its receiver with an error.
    pub fn cancel(&self, id: u64) -> bool {
        self.waiting.lock().remove(&id).is_some()
    }

    /// Forgets every request. Returns how many were waiting.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.waiting.lock().drain().collect();
        drained.len()
    }

    /// Number of requests awaiting a reply.
    pub fn len(&self) -> usize {
        self.waiting.lock().len()
    }

    /// Returns `true` when nothing is awaiting a reply.
    pub fn is_empty(&self) -> bool {
        self.waiting.lock().is_empty()
    }
}

impl Default for PendingReplies {
    fn default() -> Self {
        Self::new()
    }
}
