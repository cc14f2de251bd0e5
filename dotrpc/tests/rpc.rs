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

//! End-to-end request/reply over loopback TCP with in-memory discovery.

use dotrpc::server::BoxError;
use dotrpc::{Client, ClientError, Config, MemoryDiscovery, ReplyCode, Server, ServiceHandler};
use futures_util::future::join_all;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

fn loopback() -> Config {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Config::default()
        .with_iface(Ipv4Addr::LOCALHOST.into())
        .with_debug(true)
}

fn math() -> ServiceHandler {
    ServiceHandler::new("Math")
        .method_fn("add", |payload, reply| {
            reply.send(payload["a"].as_i64().unwrap_or(0) + payload["b"].as_i64().unwrap_or(0));
        })
        .method_fn("fail", |_payload, reply| {
            reply.error("division by zero");
        })
        .method_fn("silent", |_payload, _reply| {})
        .method("double", |payload, _reply| async move {
            Ok::<_, BoxError>(Some(json!(payload.as_i64().unwrap_or(0) * 2)))
        })
}

async fn start_server(config: Config, hub: &Arc<MemoryDiscovery>, handler: ServiceHandler) -> Server {
    let server = Server::new(config, hub.clone());
    server.add_service(handler).unwrap();
    server.start().await.unwrap();
    server
}

async fn wait_for_peers(client: &Client, service: &str, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while client.peer_count(service) != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {count} peers for {service}"));
}

#[tokio::test]
async fn test_call_round_trip() {
    let hub = Arc::new(MemoryDiscovery::new());
    let _server = start_server(loopback(), &hub, math()).await;
    let client = Client::new(loopback(), hub.clone()).unwrap();
    wait_for_peers(&client, "math", 1).await;

    assert_eq!(client.send("math.add", json!({ "a": 2, "b": 3 })).await.unwrap(), json!(5));
    assert_eq!(client.send("math.double", json!(21)).await.unwrap(), json!(42));
    assert_eq!(client.services(), vec!["math".to_string()]);
    assert_eq!(client.connection_count(), 1);
}

#[tokio::test]
async fn test_validation_codes() {
    let hub = Arc::new(MemoryDiscovery::new());
    let _server = start_server(loopback(), &hub, math()).await;
    let client = Client::new(loopback(), hub.clone()).unwrap();
    wait_for_peers(&client, "math", 1).await;

    let error = client.send("", Value::Null).await.unwrap_err();
    assert!(matches!(error, ClientError::InvalidPath));

    let error = client.send("weather.today", Value::Null).await.unwrap_err();
    assert_eq!(error.code(), "INVALID_SERVICE");

    for (path, code) in [
        ("math", ReplyCode::MissingMethod),
        ("math.", ReplyCode::MissingMethod),
        ("math._internal", ReplyCode::InvalidMethod),
        ("math.mul", ReplyCode::InvalidMethod),
    ] {
        let error = client.send(path, Value::Null).await.unwrap_err();
        assert_eq!(error.reply_code(), Some(code), "{path}");
    }
}

#[tokio::test]
async fn test_remote_error_string() {
    let hub = Arc::new(MemoryDiscovery::new());
    let _server = start_server(loopback(), &hub, math()).await;
    let client = Client::new(loopback(), hub.clone()).unwrap();
    wait_for_peers(&client, "math", 1).await;

    let error = client.send("math.fail", Value::Null).await.unwrap_err();
    assert!(matches!(&error, ClientError::Remote(message) if message == "division by zero"));
    assert_eq!(error.reply_code(), None);
}

#[tokio::test]
async fn test_calls_spread_across_peers() {
    let hub = Arc::new(MemoryDiscovery::new());
    let mut servers = Vec::new();
    for label in ["left", "right"] {
        let handler = ServiceHandler::new("Who").method_fn("ami", move |_payload, reply| {
            reply.send(json!({ "server": label }));
        });
        servers.push(start_server(loopback(), &hub, handler).await);
    }

    let client = Client::new(loopback(), hub.clone()).unwrap();
    wait_for_peers(&client, "who", 2).await;
    assert_eq!(client.connection_count(), 2);

    let replies = join_all((0..64).map(|_| client.send("who.ami", Value::Null))).await;
    let seen: HashSet<String> = replies
        .into_iter()
        .map(|reply| reply.unwrap()["server"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(seen.len(), 2, "{seen:?}");
}

#[tokio::test]
async fn test_queued_call_waits_for_server() {
    let hub = Arc::new(MemoryDiscovery::new());
    let client = Arc::new(Client::new(loopback().with_delay(Duration::from_secs(2)), hub.clone()).unwrap());

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.send("math.add", json!({ "a": 20, "b": 22 })).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!call.is_finished());

    let _server = start_server(loopback(), &hub, math()).await;
    let outcome = tokio::time::timeout(Duration::from_secs(1), call).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap(), json!(42));
}

#[tokio::test]
async fn test_service_timeout_without_peers() {
    let hub = Arc::new(MemoryDiscovery::new());
    let config = loopback()
        .with_delay(Duration::from_millis(100))
        .with_drain_interval(Duration::from_millis(10));
    let client = Client::new(config, hub.clone()).unwrap();

    let started = std::time::Instant::now();
    let error = client.send("math.add", Value::Null).await.unwrap_err();
    assert_eq!(error.code(), "SERVICE_TIMEOUT");
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_request_timeout() {
    let hub = Arc::new(MemoryDiscovery::new());
    let _server = start_server(loopback(), &hub, math()).await;
    let client = Client::new(loopback().with_timeout(Duration::from_millis(100)), hub.clone()).unwrap();
    wait_for_peers(&client, "math", 1).await;

    let error = client.send("math.silent", Value::Null).await.unwrap_err();
    assert!(matches!(error, ClientError::RequestTimeout { .. }));
    assert_eq!(error.code(), "REQUEST_TIMEOUT");

    assert_eq!(client.send("math.add", json!({ "a": 1, "b": 1 })).await.unwrap(), json!(2));
}

#[tokio::test]
async fn test_group_filtering() {
    let hub = Arc::new(MemoryDiscovery::new());
    let _red = start_server(loopback().with_group("red"), &hub, math()).await;
    let client = Client::new(loopback().with_group("blue"), hub.clone()).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.peer_count("math"), 0);
    assert_eq!(client.send("math.add", Value::Null).await.unwrap_err().code(), "INVALID_SERVICE");

    let _blue = start_server(loopback().with_group("blue"), &hub, math()).await;
    wait_for_peers(&client, "math", 1).await;
    assert_eq!(client.send("math.add", json!({ "a": 1, "b": 2 })).await.unwrap(), json!(3));
}

#[tokio::test]
async fn test_peer_removal_closes_connections() {
    let hub = Arc::new(MemoryDiscovery::new());
    let server = start_server(loopback(), &hub, math()).await;
    let client = Client::new(loopback(), hub.clone()).unwrap();
    wait_for_peers(&client, "math", 1).await;
    assert_eq!(client.connection_count(), 1);

    server.shutdown();
    wait_for_peers(&client, "math", 0).await;
    assert_eq!(client.connection_count(), 0);
    assert!(client.services().is_empty());
}

#[tokio::test]
async fn test_send_with_callback() {
    let hub = Arc::new(MemoryDiscovery::new());
    let _server = start_server(loopback(), &hub, math()).await;
    let client = Client::new(loopback(), hub.clone()).unwrap();
    wait_for_peers(&client, "math", 1).await;

    let (tx, rx) = oneshot::channel();
    client.send_with("math.add", json!({ "a": 4, "b": 4 }), move |outcome| {
        let _ = tx.send(outcome);
    });
    assert_eq!(rx.await.unwrap().unwrap(), json!(8));

    let (tx, mut rx) = oneshot::channel();
    client.send_with("nothing.here", Value::Null, move |outcome| {
        let _ = tx.send(outcome);
    });
    let outcome = rx.try_recv().expect("unknown services fail before send_with returns");
    assert_eq!(outcome.unwrap_err().code(), "INVALID_SERVICE");
}

#[tokio::test]
async fn test_disconnect_clears_pool() {
    let hub = Arc::new(MemoryDiscovery::new());
    let _server = start_server(loopback(), &hub, math()).await;
    let client = Client::new(loopback(), hub.clone()).unwrap();
    wait_for_peers(&client, "math", 1).await;

    client.disconnect();
    assert_eq!(client.connection_count(), 0);
    assert_eq!(client.peer_count("math"), 0);
    assert_eq!(client.send("math.add", Value::Null).await.unwrap_err().code(), "INVALID_SERVICE");
}

#[tokio::test]
async fn test_servers_are_not_pooled_by_clients() {
    let hub = Arc::new(MemoryDiscovery::new());
    let _first = Client::new(loopback(), hub.clone()).unwrap();
    let second = Client::new(loopback(), hub.clone()).unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(second.connection_count(), 0);
    assert_eq!(hub.member_count("dot"), 2);
}
