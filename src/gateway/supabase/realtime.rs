//! Realtime change feed over the Phoenix channel protocol.
//!
//! One websocket per client, opened lazily on the first subscription. Each
//! subscription joins its own topic with a `postgres_changes` config and
//! leaves it when the returned handle is released.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use super::Endpoint;
use crate::error::{AppError, AppResult};
use crate::gateway::{ChangeCallback, ChangeEvent, ChangeKind, Filter, Subscription};

const PROTOCOL_VERSION: &str = "1.0.0";

/// How long a join may wait for the server's reply
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire frame of the Phoenix channel protocol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// `Err` carries the server's reason
type JoinReply = Result<(), String>;

struct Channel {
    join_ref: u64,
    on_change: ChangeCallback,
}

#[derive(Default)]
struct Topics {
    channels: DashMap<String, Channel>,
    /// Joins waiting for their `phx_reply`, keyed by topic, with the join ref
    joins: DashMap<String, (String, oneshot::Sender<JoinReply>)>,
}

impl Topics {
    fn forget(&self, topic: &str) {
        self.channels.remove(topic);
        self.joins.remove(topic);
    }
}

pub struct RealtimeClient {
    socket_url: Url,
    heartbeat: Duration,
    topics: Arc<Topics>,
    outbox: parking_lot::Mutex<Option<mpsc::UnboundedSender<PhoenixMessage>>>,
    /// Only one caller opens the socket
    connecting: tokio::sync::Mutex<()>,
    next_ref: Arc<AtomicU64>,
}

impl RealtimeClient {
    pub(crate) fn new(endpoint: &Endpoint, heartbeat: Duration) -> AppResult<Self> {
        Ok(Self {
            socket_url: socket_url(endpoint.base(), endpoint.anon_key())?,
            heartbeat,
            topics: Arc::new(Topics::default()),
            outbox: parking_lot::Mutex::new(None),
            connecting: tokio::sync::Mutex::new(()),
            next_ref: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Join a `postgres_changes` topic for `table`.
    ///
    /// Returns once the server has accepted the join; a rejected or
    /// unanswered join is an error and leaves nothing registered.
    pub async fn subscribe(
        &self,
        table: &str,
        filter: Option<Filter>,
        access_token: &str,
        on_change: ChangeCallback,
    ) -> AppResult<Subscription> {
        let outbox = self.connection().await?;

        let id = self.next_ref.fetch_add(1, Ordering::SeqCst);
        let topic = format!("realtime:{}:{}", table, id);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.topics.channels.insert(topic.clone(), Channel { join_ref: id, on_change });
        self.topics.joins.insert(topic.clone(), (id.to_string(), reply_tx));

        let join = join_message(&topic, table, filter.as_ref(), access_token, id);
        if outbox.send(join).is_err() {
            self.topics.forget(&topic);
            return Err(AppError::realtime("realtime socket closed before join"));
        }

        let reply = match tokio::time::timeout(JOIN_TIMEOUT, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err("socket closed before the join was answered".to_string()),
            Err(_) => Err(format!("no reply within {:?}", JOIN_TIMEOUT)),
        };
        if let Err(reason) = reply {
            self.topics.forget(&topic);
            warn!("Realtime join on {} failed: {}", topic, reason);
            return Err(AppError::realtime(format!("cannot watch {}: {}", table, reason)));
        }
        info!("Subscribed to changes on {} ({})", table, topic);

        let topics = Arc::clone(&self.topics);
        let next_ref = Arc::clone(&self.next_ref);
        Ok(Subscription::new(id, move || {
            topics.forget(&topic);
            let leave = PhoenixMessage {
                topic: topic.clone(),
                event: "phx_leave".to_string(),
                payload: json!({}),
                reference: Some(next_ref.fetch_add(1, Ordering::SeqCst).to_string()),
                join_ref: Some(id.to_string()),
            };
            // Socket may already be gone; the topic is dropped locally either way
            let _ = outbox.send(leave);
            debug!("Left {}", topic);
        }))
    }

    /// Hand a new access token to every joined topic
    pub fn set_auth(&self, access_token: &str) {
        let Some(outbox) = self.open_outbox() else { return };
        for entry in self.topics.channels.iter() {
            let message = PhoenixMessage {
                topic: entry.key().clone(),
                event: "access_token".to_string(),
                payload: json!({ "access_token": access_token }),
                reference: Some(self.next_ref.fetch_add(1, Ordering::SeqCst).to_string()),
                join_ref: Some(entry.value().join_ref.to_string()),
            };
            let _ = outbox.send(message);
        }
        debug!("Access token pushed to {} realtime topic(s)", self.topics.channels.len());
    }

    fn open_outbox(&self) -> Option<mpsc::UnboundedSender<PhoenixMessage>> {
        self.outbox.lock().as_ref().filter(|tx| !tx.is_closed()).cloned()
    }

    /// Sender for the open socket, connecting first if needed
    async fn connection(&self) -> AppResult<mpsc::UnboundedSender<PhoenixMessage>> {
        let _connecting = self.connecting.lock().await;
        if let Some(tx) = self.open_outbox() {
            return Ok(tx);
        }

        let tx = self.connect().await?;
        *self.outbox.lock() = Some(tx.clone());
        Ok(tx)
    }

    async fn connect(&self) -> AppResult<mpsc::UnboundedSender<PhoenixMessage>> {
        let (socket, _) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| AppError::realtime(format!("connect failed: {}", e)))?;
        info!("🔌 Realtime socket connected");

        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<PhoenixMessage>();
        let topics = Arc::clone(&self.topics);
        let next_ref = Arc::clone(&self.next_ref);
        let mut heartbeat = interval(self.heartbeat);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outgoing = rx.recv() => {
                        let Some(message) = outgoing else { break };
                        match serde_json::to_string(&message) {
                            Ok(text) => {
                                if let Err(e) = sink.send(Message::Text(text)).await {
                                    warn!("Realtime send failed: {}", e);
                                    break;
                                }
                            }
                            Err(e) => error!("Failed to encode realtime frame: {}", e),
                        }
                    }

                    _ = heartbeat.tick() => {
                        let beat = heartbeat_message(next_ref.fetch_add(1, Ordering::SeqCst));
                        if let Ok(text) = serde_json::to_string(&beat) {
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                warn!("Realtime heartbeat failed: {}", e);
                                break;
                            }
                        }
                    }

                    incoming = stream.next() => match incoming {
                        Some(Ok(Message::Text(text))) => dispatch(&topics, &text),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Realtime socket error: {}", e);
                            break;
                        }
                    }
                }
            }
            // Pending joins fail now instead of waiting out their timeout
            topics.joins.clear();
            let _ = sink.close().await;
            info!("Realtime socket closed");
        });

        Ok(tx)
    }
}

fn socket_url(base: &Url, anon_key: &str) -> AppResult<Url> {
    let mut url = base
        .join("realtime/v1/websocket")
        .map_err(|e| AppError::Config(format!("invalid realtime URL: {}", e)))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| AppError::Config("cannot derive websocket scheme".to_string()))?;
    url.query_pairs_mut()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", PROTOCOL_VERSION);
    Ok(url)
}

fn join_message(topic: &str, table: &str, filter: Option<&Filter>, access_token: &str, id: u64) -> PhoenixMessage {
    let mut change = json!({ "event": "*", "schema": "public", "table": table });
    if let Some(filter) = filter {
        change["filter"] = Value::String(filter.expression());
    }

    PhoenixMessage {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change],
                "private": false
            },
            "access_token": access_token
        }),
        reference: Some(id.to_string()),
        join_ref: Some(id.to_string()),
    }
}

fn heartbeat_message(reference: u64) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
        join_ref: None,
    }
}

/// Extract the row change carried by a `postgres_changes` frame
pub(crate) fn parse_change(payload: &Value) -> Option<ChangeEvent> {
    let data = payload.get("data")?;
    let kind = ChangeKind::parse(data.get("type")?.as_str()?)?;
    let table = data.get("table")?.as_str()?.to_string();
    let non_null = |key: &str| data.get(key).filter(|v| !v.is_null()).cloned();

    Some(ChangeEvent {
        table,
        kind,
        record: non_null("record"),
        old_record: non_null("old_record"),
    })
}

/// Reason given in a rejected `phx_reply`
fn rejection_reason(payload: &Value) -> String {
    payload
        .pointer("/response/reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

fn dispatch(topics: &Topics, text: &str) {
    let message: PhoenixMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("Ignoring malformed realtime frame: {}", e);
            return;
        }
    };

    match message.event.as_str() {
        "postgres_changes" => {
            let Some(change) = parse_change(&message.payload) else {
                warn!("postgres_changes frame without usable data on {}", message.topic);
                return;
            };
            // Clone out of the map so the callback runs without a shard lock held
            let callback = topics.channels.get(&message.topic).map(|c| c.on_change.clone());
            match callback {
                Some(callback) => callback(change),
                None => debug!("Change for unknown topic {}", message.topic),
            }
        }
        "phx_reply" => {
            let ok = message.payload.get("status").and_then(Value::as_str) == Some("ok");
            let waiter = topics.joins.remove_if(&message.topic, |_, (join_ref, _)| {
                message.reference.as_deref() == Some(join_ref.as_str())
            });
            match waiter {
                Some((_, (_, waiter))) => {
                    let reply = if ok { Ok(()) } else { Err(rejection_reason(&message.payload)) };
                    let _ = waiter.send(reply);
                }
                None if !ok => warn!("Realtime push rejected on {}: {}", message.topic, message.payload),
                None => {}
            }
        }
        "phx_error" => warn!("Realtime channel error on {}", message.topic),
        other => debug!("Realtime event {} on {}", other, message.topic),
    }
}
