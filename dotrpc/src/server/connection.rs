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

//! Listener and per-connection loops.

use crate::protocol::{Request, Response};
use crate::server::ServerState;
use crate::server::router::RequestRouter;
use crate::server::Reply;
use crate::transport::TransportError;
use crate::transport::framing::{decode, read_frame, write_message};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Accepts connections until the server reaches `Closed`. Dropping the
/// listener on return closes the socket.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    router: Arc<RequestRouter>,
    mut state: watch::Receiver<ServerState>,
    debug: bool,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if debug {
                        debug!(peer = %peer, "Peer connected");
                    }
                    let _ = stream.set_nodelay(true);
                    tokio::spawn(serve_connection(stream, peer, router.clone(), state.clone(), debug));
                }
                Err(error) => warn!(error = %error, "Accept failed"),
            },
            _ = closed(&mut state) => break,
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<RequestRouter>,
    mut state: watch::Receiver<ServerState>,
    debug: bool,
) {
    let (reader, writer) = stream.into_split();
    let (sink, responses) = mpsc::unbounded_channel();

    let ended = tokio::select! {
        result = read_requests(reader, &router, &sink) => result,
        Some(error) = write_responses(writer, responses) => Err(error),
        _ = closed(&mut state) => Ok(()),
    };

    match ended {
        Err(TransportError::Io { source }) if source.kind() != io::ErrorKind::UnexpectedEof => {
            warn!(peer = %peer, error = %source, "Connection failed");
        }
        Err(error @ TransportError::FrameTooLarge { .. }) => {
            warn!(peer = %peer, error = %error, "Connection failed");
        }
        _ => {
            if debug {
                debug!(peer = %peer, "Peer disconnected");
            }
        }
    }
}

async fn read_requests(
    mut reader: OwnedReadHalf,
    router: &RequestRouter,
    sink: &mpsc::UnboundedSender<Response>,
) -> Result<(), TransportError> {
    loop {
        let frame = read_frame(&mut reader).await?;
        let Request { id, path, payload } = match decode(&frame) {
            Ok(request) => request,
            Err(error) => {
                warn!(error = %error, "Discarding undecodable request frame");
                continue;
            }
        };
        router.route(path.as_str(), payload, Reply::new(id, sink.clone()));
    }
}

/// Returns `None` once every reply handle is gone.
async fn write_responses(
    mut writer: OwnedWriteHalf,
    mut responses: mpsc::UnboundedReceiver<Response>,
) -> Option<TransportError> {
    while let Some(response) = responses.recv().await {
        if let Err(error) = write_message(&mut writer, &response).await {
            return Some(error);
        }
    }
    None
}

async fn closed(state: &mut watch::Receiver<ServerState>) {
    let _ = state.wait_for(|state| *state == ServerState::Closed).await;
}
