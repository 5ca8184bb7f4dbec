//! Local stand-ins for the auth (HTTP) and realtime (websocket) endpoints.

use std::time::Duration;

use axum::Router;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::Endpoint;
use super::realtime::PhoenixMessage;

/// Serve `router` on an ephemeral local port and return its base URL
pub(crate) async fn serve(router: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{}/", addr)).unwrap()
}

pub(crate) fn endpoint(base: &Url) -> Endpoint {
    Endpoint::new(base, "anon", Duration::from_secs(5)).unwrap()
}

/// Accepts one realtime socket, answers every join with `join_status`
/// and records the frames the client sends (heartbeats excluded).
pub(crate) struct FakeRealtime {
    pub base: Url,
    frames: mpsc::UnboundedReceiver<PhoenixMessage>,
    push: mpsc::UnboundedSender<String>,
}

impl FakeRealtime {
    pub(crate) async fn start(join_status: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else { return };
            let Ok(socket) = accept_async(stream).await else { return };
            let (mut sink, mut stream) = socket.split();

            loop {
                tokio::select! {
                    incoming = stream.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(frame) = serde_json::from_str::<PhoenixMessage>(&text) else { continue };
                            if frame.topic == "phoenix" {
                                continue;
                            }
                            if frame.event == "phx_join" {
                                let reply = join_reply(&frame, join_status);
                                if sink.send(Message::Text(reply.to_string())).await.is_err() {
                                    break;
                                }
                            }
                            let _ = frames_tx.send(frame);
                        }
                        Some(Ok(_)) => {}
                        _ => break,
                    },

                    outgoing = push_rx.recv() => {
                        let Some(text) = outgoing else { break };
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            base: Url::parse(&format!("http://{}/", addr)).unwrap(),
            frames,
            push,
        }
    }

    /// Next frame sent by the client
    pub(crate) async fn next_frame(&mut self) -> PhoenixMessage {
        tokio::time::timeout(Duration::from_secs(2), self.frames.recv())
            .await
            .expect("no frame from client")
            .expect("realtime server stopped")
    }

    /// Send a raw frame to the client
    pub(crate) fn push(&self, frame: Value) {
        self.push.send(frame.to_string()).unwrap();
    }
}

fn join_reply(join: &PhoenixMessage, status: &str) -> Value {
    let response = if status == "ok" {
        json!({ "postgres_changes": [] })
    } else {
        json!({ "reason": "Invalid JWT" })
    };
    json!({
        "topic": join.topic,
        "event": "phx_reply",
        "ref": join.reference,
        "join_ref": join.join_ref,
        "payload": { "status": status, "response": response }
    })
}
