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

//! Queue of calls waiting for a peer.
//!
//! A single [`DrainWorker`] task owns the queue, so at most one drain pass
//! runs at a time. The worker ticks on a fixed interval while the queue is
//! non-empty, and also runs a pass whenever it is asked to through
//! [`DispatchQueue::drain`] (a peer appeared). Each pass handles every call
//! queued when it started: calls still inside the delay budget are offered
//! to the dispatcher again with their original enqueue time, older ones
//! fail with `SERVICE_TIMEOUT`.

use crate::client::ClientError;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::trace;

/// Resolves a call exactly once.
pub(crate) type Completion = oneshot::Sender<Result<Value, ClientError>>;

/// A call that could not be sent yet.
#[derive(Debug)]
pub(crate) struct PendingCall {
    pub path: String,
    pub payload: Value,
    pub enqueued_at: Option<Instant>,
    pub completion: Completion,
}

impl PendingCall {
    pub fn new(path: String, payload: Value, completion: Completion) -> Self {
        Self {
            path,
            payload,
            enqueued_at: None,
            completion,
        }
    }

    /// Resolves the call. A caller that stopped waiting is ignored.
    pub fn complete(self, outcome: Result<Value, ClientError>) {
        let _ = self.completion.send(outcome);
    }
}

/// Something that can send a call right away.
pub(crate) trait Dispatch: Send + Sync {
    /// Sends the call if a peer offers its service, handing the call back
    /// otherwise.
    fn dispatch(&self, call: PendingCall) -> Result<(), PendingCall>;
}

enum Command {
    Enqueue(PendingCall),
    Drain,
}

/// Handle for feeding the [`DrainWorker`].
#[derive(Debug, Clone)]
pub(crate) struct DispatchQueue {
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Enqueue(call) => f.debug_tuple("Enqueue").field(&call.path).finish(),
            Command::Drain => f.write_str("Drain"),
        }
    }
}

impl DispatchQueue {
    /// Queues a call, stamping it with the current time on first entry.
    pub fn enqueue(&self, mut call: PendingCall) {
        call.enqueued_at.get_or_insert_with(Instant::now);
        if let Err(mpsc::error::SendError(Command::Enqueue(call))) =
            self.commands.send(Command::Enqueue(call))
        {
            call.complete(Err(ClientError::Disconnected));
        }
    }

    /// Asks the worker for an immediate pass.
    pub fn drain(&self) {
        let _ = self.commands.send(Command::Drain);
    }
}

/// Task owning the queue.
pub(crate) struct DrainWorker {
    queue: VecDeque<PendingCall>,
    commands: mpsc::UnboundedReceiver<Command>,
    dispatcher: Weak<dyn Dispatch>,
    delay: Duration,
    interval: Duration,
}

impl DrainWorker {
    /// Creates a worker and the handle that feeds it.
    pub fn new(
        dispatcher: Weak<dyn Dispatch>,
        delay: Duration,
        interval: Duration,
    ) -> (Self, DispatchQueue) {
        let (sender, commands) = mpsc::unbounded_channel();
        let worker = Self {
            queue: VecDeque::new(),
            commands,
            dispatcher,
            delay,
            interval: interval.max(Duration::from_millis(1)),
        };
        (worker, DispatchQueue { commands: sender })
    }

    /// Runs until every [`DispatchQueue`] handle or the dispatcher is gone.
    ///
    /// Calls still queued at that point resolve with
    /// [`ClientError::Disconnected`].
    pub async fn run(mut self) {
        let mut next_pass: Option<Instant> = None;
        loop {
            let command = match next_pass {
                Some(deadline) => tokio::select! {
                    command = self.commands.recv() => command,
                    _ = tokio::time::sleep_until(deadline) => {
                        if !self.pass() {
                            break;
                        }
                        next_pass = self.schedule();
                        continue;
                    }
                },
                None => self.commands.recv().await,
            };

            match command {
                Some(Command::Enqueue(call)) => {
                    trace!(path = %call.path, queued = self.queue.len() + 1, "Call queued");
                    self.queue.push_back(call);
                    if next_pass.is_none() {
                        next_pass = self.schedule();
                    }
                }
                Some(Command::Drain) => {
                    if self.queue.is_empty() {
                        continue;
                    }
                    if !self.pass() {
                        break;
                    }
                    next_pass = self.schedule();
                }
                None => break,
            }
        }

        for call in self.queue.drain(..) {
            call.complete(Err(ClientError::Disconnected));
        }
    }

    fn schedule(&self) -> Option<Instant> {
        (!self.queue.is_empty()).then(|| Instant::now() + self.interval)
    }

    /// Runs one pass. Returns `false` when the dispatcher is gone.
    fn pass(&mut self) -> bool {
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            return false;
        };

        let now = Instant::now();
        let batch = std::mem::take(&mut self.queue);
        for call in batch {
            if call.completion.is_closed() {
                continue;
            }
            let enqueued_at = call.enqueued_at.unwrap_or(now);
            let waited = now.saturating_duration_since(enqueued_at);
            if waited >= self.delay {
                call.complete(Err(ClientError::ServiceTimeout { waited }));
                continue;
            }
            if let Err(call) = dispatcher.dispatch(call) {
                self.queue.push_back(call);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    /// Dispatches only once `open` is set, answering with the path.
    #[derive(Default)]
    struct Gate {
        open: Mutex<bool>,
        dispatched: Mutex<Vec<String>>,
    }

    impl Dispatch for Gate {
        fn dispatch(&self, call: PendingCall) -> Result<(), PendingCall> {
            if !*self.open.lock() {
                return Err(call);
            }
            self.dispatched.lock().push(call.path.clone());
            let path = call.path.clone();
            call.complete(Ok(json!(path)));
            Ok(())
        }
    }

    fn start(gate: &Arc<Gate>, delay: u64) -> DispatchQueue {
        let dispatcher: Arc<dyn Dispatch> = gate.clone();
        let (worker, queue) = DrainWorker::new(
            Arc::downgrade(&dispatcher),
            Duration::from_millis(delay),
            Duration::from_millis(20),
        );
        tokio::spawn(worker.run());
        queue
    }

    fn call(path: &str) -> (PendingCall, oneshot::Receiver<Result<Value, ClientError>>) {
        let (tx, rx) = oneshot::channel();
        (PendingCall::new(path.to_string(), Value::Null, tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_within_one_interval_of_budget() {
        let gate = Arc::new(Gate::default());
        let queue = start(&gate, 100);

        let started = Instant::now();
        let (pending, rx) = call("math.add");
        queue.enqueue(pending);

        let outcome = rx.await.unwrap();
        let elapsed = started.elapsed();
        assert!(matches!(outcome, Err(ClientError::ServiceTimeout { .. })));
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(120), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_dispatches_when_peer_appears() {
        let gate = Arc::new(Gate::default());
        let queue = start(&gate, 1000);

        let (first, rx1) = call("math.add");
        let (second, rx2) = call("math.sub");
        queue.enqueue(first);
        queue.enqueue(second);

        tokio::time::sleep(Duration::from_millis(50)).await;
        *gate.open.lock() = true;
        queue.drain();

        assert_eq!(rx1.await.unwrap().unwrap(), json!("math.add"));
        assert_eq!(rx2.await.unwrap().unwrap(), json!("math.sub"));
        assert_eq!(*gate.dispatched.lock(), vec!["math.add", "math.sub"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_original_enqueue_time_is_kept() {
        let gate = Arc::new(Gate::default());
        let queue = start(&gate, 100);

        let (mut pending, rx) = call("math.add");
        pending.enqueued_at = Some(Instant::now() - Duration::from_millis(90));
        queue.enqueue(pending);

        let started = Instant::now();
        assert!(matches!(
            rx.await.unwrap(),
            Err(ClientError::ServiceTimeout { .. })
        ));
        assert!(started.elapsed() <= Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_dispatcher_disconnects_queued_calls() {
        let gate = Arc::new(Gate::default());
        let queue = start(&gate, 1000);

        let (pending, rx) = call("math.add");
        queue.enqueue(pending);
        drop(gate);

        assert!(matches!(rx.await.unwrap(), Err(ClientError::Disconnected)));
    }
}
