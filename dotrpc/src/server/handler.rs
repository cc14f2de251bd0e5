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

//! Service handlers and the reply capability handed to their methods.

use crate::protocol::{PRIVATE_METHOD_MARKER, ReplyCode, Response};
use crate::server::ServerError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Error type returned by asynchronous methods.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Future returned by a registered method.
pub type MethodFuture = Pin<Box<dyn Future<Output = Result<Option<Value>, BoxError>> + Send>>;

pub(crate) type Method = Arc<dyn Fn(Value, Reply) -> MethodFuture + Send + Sync>;

/// One-shot reply to a single request.
///
/// Clones share state: the first [`send`](Self::send) wins and later ones
/// are ignored. A reply that is never sent leaves the caller waiting, bound
/// only by its own timeout.
#[derive(Clone)]
pub struct Reply {
    inner: Arc<ReplyInner>,
}

struct ReplyInner {
    id: u64,
    sent: AtomicBool,
    sink: mpsc::UnboundedSender<Response>,
}

impl Reply {
    pub(crate) fn new(id: u64, sink: mpsc::UnboundedSender<Response>) -> Self {
        Self {
            inner: Arc::new(ReplyInner {
                id,
                sent: AtomicBool::new(false),
                sink,
            }),
        }
    }

    /// Sends a value. Returns `false` if a reply was already sent or the
    /// connection is gone.
    ///
    /// Strings and `null` are read as errors by clients; successful results
    /// should be any other JSON value.
    pub fn send(&self, value: impl Into<Value>) -> bool {
        if self.inner.sent.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner
            .sink
            .send(Response {
                id: self.inner.id,
                reply: value.into(),
            })
            .is_ok()
    }

    /// Sends an error message.
    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(Value::String(message.into()))
    }

    pub(crate) fn code(&self, code: ReplyCode) -> bool {
        self.send(code)
    }

    /// Returns `true` once a reply has been sent.
    pub fn is_sent(&self) -> bool {
        self.inner.sent.load(Ordering::Acquire)
    }

    /// Correlation id of the request being answered.
    pub fn id(&self) -> u64 {
        self.inner.id
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("id", &self.inner.id)
            .field("sent", &self.is_sent())
            .finish()
    }
}

/// A named collection of callable methods.
///
/// The service is registered under [`service_name`](Self::service_name):
/// the explicit name when one was given, otherwise the declared name with
/// its first character lower-cased.
///
/// # Examples
///
/// ```rust
/// use dotrpc::ServiceHandler;
/// use dotrpc::server::BoxError;
/// use serde_json::json;
///
/// let users = ServiceHandler::new("UserDirectory")
///     .method("getById", |payload, _reply| async move {
///         Ok::<_, BoxError>(Some(json!({ "id": payload["id"], "name": "Ada" })))
///     })
///     .method_fn("ping", |_payload, reply| {
///         reply.send(json!({ "pong": true }));
///     });
///
/// assert_eq!(users.service_name(), "userDirectory");
/// assert!(users.has_method("getById"));
/// ```
pub struct ServiceHandler {
    declared: String,
    name: Option<String>,
    methods: HashMap<String, Method>,
}

impl ServiceHandler {
    /// Creates a handler with a declared name.
    pub fn new(declared: impl Into<String>) -> Self {
        Self {
            declared: declared.into(),
            name: None,
            methods: HashMap::new(),
        }
    }

    /// Registers under `name` verbatim instead of the derived name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds an asynchronous method.
    ///
    /// The method may answer through its [`Reply`] or by resolving to
    /// `Ok(Some(value))`. `Ok(None)` sends nothing. An `Err` is logged when
    /// debug logging is on and otherwise dropped.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Value, Reply) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, BoxError>> + Send + 'static,
    {
        let handle: Method = Arc::new(move |payload: Value, reply: Reply| -> MethodFuture {
            Box::pin(method(payload, reply))
        });
        self.methods.insert(name.into(), handle);
        self
    }

    /// Adds a synchronous method that answers through its [`Reply`].
    pub fn method_fn<F>(self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Value, Reply) + Send + Sync + 'static,
    {
        self.method(name, move |payload, reply| {
            method(payload, reply);
            std::future::ready(Ok::<_, BoxError>(None))
        })
    }

    /// Name the service is registered under.
    pub fn service_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let mut chars = self.declared.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Returns `true` if `name` is a registered method.
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Checks the handler shape once, at registration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidHandler`] when the service name is
    /// empty or a method name is empty or private.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.service_name().is_empty() {
            return Err(ServerError::invalid_handler("service name is empty"));
        }
        for name in self.methods.keys() {
            if name.is_empty() {
                return Err(ServerError::invalid_handler("method name is empty"));
            }
            if name.starts_with(PRIVATE_METHOD_MARKER) {
                return Err(ServerError::invalid_handler(format!(
                    "method '{name}' is private and cannot be exposed"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn method_handle(&self, name: &str) -> Option<Method> {
        self.methods.get(name).cloned()
    }
}

impl fmt::Debug for ServiceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandler")
            .field("name", &self.service_name())
            .field("methods", &self.methods())
            .finish()
    }
}
