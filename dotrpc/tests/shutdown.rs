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

//! Clean shutdown through the wire command.

use dotrpc::{Client, Config, Connection, MemoryDiscovery, Server, ServerState, ServiceHandler};
use serde_json::{Value, json};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn loopback() -> Config {
    Config::default().with_iface(Ipv4Addr::LOCALHOST.into())
}

async fn start(config: Config, hub: &Arc<MemoryDiscovery>) -> (Server, SocketAddr) {
    let server = Server::new(config, hub.clone());
    server
        .add_service(ServiceHandler::new("Math").method_fn("add", |payload, reply| {
            reply.send(payload["a"].as_i64().unwrap_or(0) + payload["b"].as_i64().unwrap_or(0));
        }))
        .unwrap();
    let address = server.start().await.unwrap();
    (server, SocketAddr::new(Ipv4Addr::LOCALHOST.into(), address.port()))
}

async fn call(connection: &Connection, path: &str, payload: Value) -> Value {
    let reply = connection.request(path, payload).unwrap();
    tokio::time::timeout(Duration::from_secs(2), reply).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_lock_and_drain() {
    let hub = Arc::new(MemoryDiscovery::new());
    let (server, address) = start(loopback(), &hub).await;
    let connection = Connection::open(address);

    assert_eq!(call(&connection, "math.add", json!({ "a": 1, "b": 2 })).await, json!(3));

    let started = Instant::now();
    let ack = call(&connection, "#CLEAN_SHUTDOWN", json!({ "shutdown": 50 })).await;
    assert_eq!(ack, json!({ "cmd": "#KILL", "acknowledged": true }));
    assert!(server.is_locked());
    assert_eq!(server.state(), ServerState::ShuttingDown);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(call(&connection, "math.add", json!({ "a": 1, "b": 2 })).await, json!("LOCKED"));
    assert_eq!(call(&connection, "#CLEAN_SHUTDOWN", Value::Null).await, json!("LOCKED"));

    tokio::time::timeout(Duration::from_secs(2), server.wait_closed())
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(server.state(), ServerState::Closed);
    assert_eq!(hub.member_count("dot"), 0);
    connection.close();
}

#[tokio::test]
async fn test_default_drain_wait() {
    let hub = Arc::new(MemoryDiscovery::new());
    let (server, address) = start(loopback().with_shutdown(Duration::from_millis(30)), &hub).await;
    let connection = Connection::open(address);

    let started = Instant::now();
    let ack = call(&connection, "#CLEAN_SHUTDOWN", json!({ "shutdown": "soon" })).await;
    assert_eq!(ack["acknowledged"], json!(true));

    tokio::time::timeout(Duration::from_secs(2), server.wait_closed())
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(30));
    connection.close();
}

#[tokio::test]
async fn test_custom_shutdown_command() {
    let hub = Arc::new(MemoryDiscovery::new());
    let config = loopback().with_shutdown_command("!stop");
    let (server, address) = start(config, &hub).await;
    let connection = Connection::open(address);

    assert_eq!(call(&connection, "#CLEAN_SHUTDOWN", Value::Null).await, json!("INVALID_SERVICE"));
    assert!(!server.is_locked());

    let ack = call(&connection, "!stop", json!({ "shutdown": 1 })).await;
    assert_eq!(ack["cmd"], json!("#KILL"));
    tokio::time::timeout(Duration::from_secs(2), server.wait_closed())
        .await
        .unwrap();
    connection.close();
}

#[tokio::test]
async fn test_clients_see_locked_then_lose_peer() {
    let hub = Arc::new(MemoryDiscovery::new());
    let (server, address) = start(loopback(), &hub).await;
    let client = Client::new(loopback(), hub.clone()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while client.peer_count("math") == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let admin = Connection::open(address);
    call(&admin, "#CLEAN_SHUTDOWN", json!({ "shutdown": 100 })).await;

    let error = client.send("math.add", json!({ "a": 1, "b": 1 })).await.unwrap_err();
    assert_eq!(error.code(), "LOCKED");

    server.wait_closed().await;
    tokio::time::timeout(Duration::from_secs(2), async {
        while client.peer_count("math") != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(client.connection_count(), 0);
    admin.close();
}

#[tokio::test]
async fn test_drop_closes_listener() {
    let hub = Arc::new(MemoryDiscovery::new());
    let (server, address) = start(loopback(), &hub).await;
    assert_eq!(server.state(), ServerState::Listening);

    drop(server);
    assert_eq!(hub.member_count("dot"), 0);

    tokio::time::timeout(Duration::from_secs(2), async {
        while tokio::net::TcpStream::connect(address).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}
