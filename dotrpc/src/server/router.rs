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

//! Inbound request routing.
//!
//! Checks run in a fixed order and the first failing one answers the
//! request:
//!
//! 1. Server locked: `LOCKED`
//! 2. Missing, empty or non-string path: `INVALID_PATH`
//! 3. Unknown service: the clean shutdown command if the service segment
//!    matches it, `INVALID_SERVICE` otherwise
//! 4. Missing or empty method: `MISSING_METHOD`
//! 5. Private or unknown method: `INVALID_METHOD`
//!
//! A request that passes is handed to its method on a spawned task.

use crate::protocol::{PRIVATE_METHOD_MARKER, ReplyCode, split_path};
use crate::server::Reply;
use crate::server::registry::ServiceRegistry;
use crate::server::shutdown::ShutdownCoordinator;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// What the router did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RouteOutcome {
    /// Answered with a validation code.
    Rejected(ReplyCode),
    /// The clean shutdown command was accepted.
    Shutdown,
    /// Handed to a method.
    Dispatched,
}

#[derive(Debug)]
pub(crate) struct RequestRouter {
    registry: Arc<ServiceRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    delimiter: String,
    shutdown_command: String,
    debug: bool,
}

impl RequestRouter {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        shutdown: Arc<ShutdownCoordinator>,
        delimiter: impl Into<String>,
        shutdown_command: impl Into<String>,
        debug: bool,
    ) -> Self {
        Self {
            registry,
            shutdown,
            delimiter: delimiter.into(),
            shutdown_command: shutdown_command.into(),
            debug,
        }
    }

    pub fn route(&self, path: Option<&str>, payload: Value, reply: Reply) -> RouteOutcome {
        let outcome = self.resolve(path, payload, &reply);
        if let RouteOutcome::Rejected(code) = &outcome {
            reply.code(*code);
        }
        outcome
    }

    fn resolve(&self, path: Option<&str>, payload: Value, reply: &Reply) -> RouteOutcome {
        if self.shutdown.is_locked() {
            return RouteOutcome::Rejected(ReplyCode::Locked);
        }
        let Some(path) = path.filter(|path| !path.is_empty()) else {
            return RouteOutcome::Rejected(ReplyCode::InvalidPath);
        };

        let (service, method) = split_path(path, &self.delimiter);
        let Some(handler) = self.registry.get(service) else {
            if service == self.shutdown_command {
                self.shutdown.begin(&payload, reply);
                return RouteOutcome::Shutdown;
            }
            return RouteOutcome::Rejected(ReplyCode::InvalidService);
        };

        let Some(method) = method.filter(|method| !method.is_empty()) else {
            return RouteOutcome::Rejected(ReplyCode::MissingMethod);
        };
        if method.starts_with(PRIVATE_METHOD_MARKER) {
            return RouteOutcome::Rejected(ReplyCode::InvalidMethod);
        }
        let Some(invoke) = handler.method_handle(method) else {
            return RouteOutcome::Rejected(ReplyCode::InvalidMethod);
        };

        let future = invoke(payload, reply.clone());
        let reply = reply.clone();
        let debug = self.debug;
        let path = path.to_string();
        tokio::spawn(async move {
            match future.await {
                Ok(Some(value)) => {
                    reply.send(value);
                }
                Ok(None) => {}
                Err(error) => {
                    if debug {
                        debug!(path = %path, error = %error, "Handler failed");
                    }
                }
            }
        });
        RouteOutcome::Dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::RuntimeContext;
    use crate::discovery::MemoryDiscovery;
    use crate::protocol::Response;
    use crate::server::{BoxError, ServerState, ServiceHandler};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::{mpsc, watch};

    struct Harness {
        router: RequestRouter,
        sink: mpsc::UnboundedSender<Response>,
        responses: mpsc::UnboundedReceiver<Response>,
        next_id: u64,
    }

    impl Harness {
        fn new() -> Self {
            let registry = Arc::new(ServiceRegistry::new());
            registry.insert(
                "math".into(),
                ServiceHandler::new("Math")
                    .method_fn("add", |payload, reply| {
                        let sum = payload["a"].as_i64().unwrap_or(0) + payload["b"].as_i64().unwrap_or(0);
                        reply.send(sum);
                    })
                    .method("slow", |_payload, _reply| async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, BoxError>(Some(json!("late")))
                    })
                    .method("fail", |_payload, _reply| async move {
                        Err::<Option<Value>, BoxError>("boom".into())
                    }),
            );
            let context = Arc::new(RuntimeContext::new(
                Config::default(),
                Arc::new(MemoryDiscovery::new()),
            ));
            let (state, _) = watch::channel(ServerState::Listening);
            let shutdown = Arc::new(ShutdownCoordinator::new(
                Duration::from_millis(5000),
                context,
                Arc::new(state),
            ));
            let router = RequestRouter::new(registry, shutdown, ".", "#CLEAN_SHUTDOWN", true);
            let (sink, responses) = mpsc::unbounded_channel();
            Self {
                router,
                sink,
                responses,
                next_id: 1,
            }
        }

        fn route(&mut self, path: Option<&str>, payload: Value) -> RouteOutcome {
            let reply = Reply::new(self.next_id, self.sink.clone());
            self.next_id += 1;
            self.router.route(path, payload, reply)
        }

        async fn reply(&mut self) -> Value {
            self.responses.recv().await.unwrap().reply
        }
    }

    #[tokio::test]
    async fn test_validation_order() {
        let mut harness = Harness::new();
        let cases: [(Option<&str>, ReplyCode); 7] = [
            (None, ReplyCode::InvalidPath),
            (Some(""), ReplyCode::InvalidPath),
            (Some("unknown.op"), ReplyCode::InvalidService),
            (Some("math"), ReplyCode::MissingMethod),
            (Some("math."), ReplyCode::MissingMethod),
            (Some("math._secret"), ReplyCode::InvalidMethod),
            (Some("math.mul"), ReplyCode::InvalidMethod),
        ];
        for (path, code) in cases {
            assert_eq!(harness.route(path, Value::Null), RouteOutcome::Rejected(code));
            assert_eq!(harness.reply().await, json!(code.as_str()));
        }
    }

    #[tokio::test]
    async fn test_dispatch_and_extra_segments() {
        let mut harness = Harness::new();
        assert_eq!(
            harness.route(Some("math.add.ignored"), json!({ "a": 2, "b": 3 })),
            RouteOutcome::Dispatched
        );
        assert_eq!(harness.reply().await, json!(5));
    }

    #[tokio::test]
    async fn test_async_result_is_forwarded() {
        let mut harness = Harness::new();
        harness.route(Some("math.slow"), Value::Null);
        assert_eq!(harness.reply().await, json!("late"));
    }

    #[tokio::test]
    async fn test_handler_error_sends_nothing() {
        let mut harness = Harness::new();
        assert_eq!(harness.route(Some("math.fail"), Value::Null), RouteOutcome::Dispatched);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(harness.responses.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_locks_everything() {
        let mut harness = Harness::new();
        assert_eq!(
            harness.route(Some("#CLEAN_SHUTDOWN"), json!({ "shutdown": 50 })),
            RouteOutcome::Shutdown
        );
        assert_eq!(harness.reply().await, json!({ "cmd": "#KILL", "acknowledged": true }));

        for path in [Some("math.add"), Some("#CLEAN_SHUTDOWN"), None] {
            assert_eq!(
                harness.route(path, Value::Null),
                RouteOutcome::Rejected(ReplyCode::Locked)
            );
            assert_eq!(harness.reply().await, json!("LOCKED"));
        }
    }
}
