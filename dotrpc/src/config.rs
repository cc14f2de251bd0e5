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

//! Configuration shared by clients and servers.
//!
//! A [`Config`] can be built in code with the `with_*` methods or merged
//! over the defaults from a JSON object with [`Config::from_json`]. Durations
//! are expressed in milliseconds when (de)serialized.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::time::Duration;

/// Default separator between the service and method segments of a path.
pub const DEFAULT_DELIMITER: &str = ".";

/// Default discovery key. Only peers sharing a key see each other.
pub const DEFAULT_SECRET: &str = "dot";

/// Default reserved path that triggers a clean server shutdown.
pub const DEFAULT_SHUTDOWN_COMMAND: &str = "#CLEAN_SHUTDOWN";

/// Default cadence of the client dispatch queue drain cycle.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(20);

/// Drain wait used by a server when neither the shutdown request nor the
/// configuration supplies one.
pub const DEFAULT_SHUTDOWN_WAIT: Duration = Duration::from_millis(5000);

/// Configuration for a [`Client`](crate::Client) or [`Server`](crate::Server).
///
/// # Examples
///
/// ```rust
/// use dotrpc::Config;
/// use std::time::Duration;
///
/// let config = Config::default()
///     .with_delay(Duration::from_millis(100))
///     .with_group("blue");
/// assert_eq!(config.delay, Some(Duration::from_millis(100)));
/// assert_eq!(config.delimiter(), ".");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Separator splitting a wire path into service and method.
    ///
    /// Default: `.`
    pub delimiter: String,

    /// Discovery key shared by every member of the cluster.
    ///
    /// Default: `dot`
    pub secret: String,

    /// Enables lifecycle logging (peers found and lost, binds, handler
    /// rejections).
    ///
    /// Default: false
    pub debug: bool,

    /// Queue budget for calls that find no peer. `None` disables queueing
    /// and such calls fail with `INVALID_SERVICE` at once.
    ///
    /// Default: None
    #[serde(with = "millis::option")]
    pub delay: Option<Duration>,

    /// Per-call reply budget once a call has been sent to a peer.
    ///
    /// Default: None (wait forever)
    #[serde(with = "millis::option")]
    pub timeout: Option<Duration>,

    /// Default drain wait between accepting a clean shutdown and closing
    /// the server socket.
    ///
    /// Default: None (servers fall back to 5 seconds)
    #[serde(with = "millis::option")]
    pub shutdown: Option<Duration>,

    /// Preferred bind port. When taken, the next free port above it is used.
    ///
    /// Default: None (ephemeral)
    pub port: Option<u16>,

    /// Peer group. Clients ignore servers advertising a different group.
    ///
    /// Default: None
    pub group: Option<String>,

    /// Interface address to bind and advertise.
    ///
    /// Default: None (bind all interfaces, advertise the outbound address)
    pub iface: Option<IpAddr>,

    /// Extra options merged last into the discovery session options.
    ///
    /// Default: empty
    #[serde(alias = "discover")]
    pub discovery: Map<String, Value>,

    /// Reserved path that triggers a clean shutdown on a server.
    ///
    /// Default: `#CLEAN_SHUTDOWN`
    pub shutdown_command: String,

    /// Cadence of the client queue drain cycle.
    ///
    /// Default: 20 ms
    #[serde(with = "millis")]
    pub drain_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            secret: DEFAULT_SECRET.to_string(),
            debug: false,
            delay: None,
            timeout: None,
            shutdown: None,
            port: None,
            group: None,
            iface: None,
            discovery: Map::new(),
            shutdown_command: DEFAULT_SHUTDOWN_COMMAND.to_string(),
            drain_interval: DEFAULT_DRAIN_INTERVAL,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a JSON object over the defaults.
    ///
    /// Unknown keys are ignored; a non-positive duration disables the
    /// corresponding budget.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use dotrpc::Config;
    /// use serde_json::json;
    /// use std::time::Duration;
    ///
    /// let config = Config::from_json(json!({ "delay": 250, "group": "blue" })).unwrap();
    /// assert_eq!(config.delay, Some(Duration::from_millis(250)));
    /// assert_eq!(config.secret, "dot");
    /// ```
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Returns the effective delimiter, falling back to `.` when empty.
    pub fn delimiter(&self) -> &str {
        if self.delimiter.is_empty() {
            DEFAULT_DELIMITER
        } else {
            &self.delimiter
        }
    }

    /// Returns the configured group, treating an empty string as no group.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref().filter(|group| !group.is_empty())
    }

    /// Queue budget, `None` when unset or zero.
    pub fn queue_delay(&self) -> Option<Duration> {
        self.delay.and_then(positive)
    }

    /// Per-call reply budget, `None` when unset or zero.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.timeout.and_then(positive)
    }

    /// Drain wait used by a clean shutdown whose payload names none.
    pub fn shutdown_wait(&self) -> Duration {
        self.shutdown.and_then(positive).unwrap_or(DEFAULT_SHUTDOWN_WAIT)
    }

    /// Sets the path delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Sets the discovery key.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Enables or disables lifecycle logging.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the queue budget. A zero duration disables queueing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = positive(delay);
        self
    }

    /// Sets the per-call reply budget. A zero duration disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = positive(timeout);
        self
    }

    /// Sets the default server drain wait.
    pub fn with_shutdown(mut self, wait: Duration) -> Self {
        self.shutdown = positive(wait);
        self
    }

    /// Sets the preferred bind port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port).filter(|port| *port > 0);
        self
    }

    /// Sets the peer group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Sets the interface address to bind and advertise.
    pub fn with_iface(mut self, iface: IpAddr) -> Self {
        self.iface = Some(iface);
        self
    }

    /// Adds an option merged into the discovery session options.
    pub fn with_discovery_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.discovery.insert(key.into(), value);
        self
    }

    /// Sets the reserved clean shutdown path.
    pub fn with_shutdown_command(mut self, command: impl Into<String>) -> Self {
        self.shutdown_command = command.into();
        self
    }

    /// Sets the queue drain cadence.
    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }
}

fn positive(duration: Duration) -> Option<Duration> {
    Some(duration).filter(|duration| !duration.is_zero())
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match duration {
                Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            let millis = Option::<u64>::deserialize(deserializer)?;
            Ok(millis.filter(|ms| *ms > 0).map(Duration::from_millis))
        }
    }
}
