//! Realtime change feed over the Phoenix channel protocol.
//!
//! One websocket per subscribed table. The task joins
//! `realtime:{channel}` with a `postgres_changes` filter for the table,
//! heartbeats every 30 seconds and forwards a [`ChangeNotice`] for every
//! change event. It reconnects with backoff and stops once the feed is
//! dropped. Every rejoin after the first attempt also forwards one notice,
//! since changes made while the socket was down were never delivered.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::{ChangeNotice, Table};
use crate::error::RemoteError;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reconnect delay, doubling up to [`MAX_BACKOFF`].
#[derive(Debug)]
struct Backoff {
    current: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            current: MIN_BACKOFF,
        }
    }

    fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX_BACKOFF);
        delay
    }

    fn reset(&mut self) {
        self.current = MIN_BACKOFF;
    }
}

pub(crate) struct RealtimeChannel {
    socket_url: Url,
    topic: String,
    table: Table,
    access_token: String,
}

impl RealtimeChannel {
    pub(crate) fn new(
        base_url: &str,
        anon_key: &str,
        channel: String,
        table: Table,
    ) -> Result<Self, RemoteError> {
        Ok(Self {
            socket_url: socket_url(base_url, anon_key)?,
            topic: format!("realtime:{}", channel),
            table,
            access_token: anon_key.to_string(),
        })
    }

    fn join_message(&self, msg_ref: u64) -> String {
        json!({
            "topic": self.topic,
            "event": "phx_join",
            "payload": {
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [
                        { "event": "*", "schema": "public", "table": self.table.as_str() }
                    ]
                },
                "access_token": self.access_token
            },
            "ref": msg_ref.to_string()
        })
        .to_string()
    }

    /// Whether `text` is the server's successful reply to join `join_ref`.
    fn is_join_reply(&self, text: &str, join_ref: u64) -> bool {
        let Ok(frame) = serde_json::from_str::<Value>(text) else {
            return false;
        };
        frame["topic"] == self.topic.as_str()
            && frame["event"] == "phx_reply"
            && frame["ref"] == join_ref.to_string().as_str()
            && frame["payload"]["status"] == "ok"
    }

    fn is_change_event(&self, text: &str) -> bool {
        let Ok(frame) = serde_json::from_str::<Value>(text) else {
            return false;
        };
        frame["topic"] == self.topic.as_str() && frame["event"] == "postgres_changes"
    }
}

fn socket_url(base_url: &str, anon_key: &str) -> Result<Url, RemoteError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| RemoteError::Unavailable(format!("invalid remote url: {}", e)))?;
    let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
    url.set_scheme(scheme)
        .map_err(|_| RemoteError::Unavailable(format!("cannot use {} for websockets", base_url)))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", anon_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

fn heartbeat_message(msg_ref: u64) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string()
    })
    .to_string()
}

pub(crate) fn spawn(channel: RealtimeChannel, tx: UnboundedSender<ChangeNotice>) -> JoinHandle<()> {
    tokio::spawn(run(channel, tx))
}

async fn run(channel: RealtimeChannel, tx: UnboundedSender<ChangeNotice>) {
    let mut backoff = Backoff::new();
    let mut rejoin = false;
    while !tx.is_closed() {
        let mut joined = false;
        let result = session(&channel, &tx, rejoin, &mut joined).await;
        if joined {
            backoff.reset();
        }
        rejoin = true;
        match result {
            Ok(()) => break,
            Err(e) => {
                tracing::warn!(topic = %channel.topic, error = %e, "Realtime connection lost");
            }
        }
        tokio::select! {
            _ = tx.closed() => break,
            _ = tokio::time::sleep(backoff.next()) => {}
        }
    }
    tracing::debug!(topic = %channel.topic, "Realtime subscription closed");
}

/// One connection. `Ok` means the subscriber went away.
///
/// `joined` is set once the server accepts the join. On a `rejoin` that
/// acceptance is forwarded as a change notice.
async fn session(
    channel: &RealtimeChannel,
    tx: &UnboundedSender<ChangeNotice>,
    rejoin: bool,
    joined: &mut bool,
) -> Result<(), RemoteError> {
    let (stream, _) = connect_async(channel.socket_url.as_str())
        .await
        .map_err(|e| RemoteError::Unavailable(format!("connect: {}", e)))?;
    let (mut write, mut read) = stream.split();

    let join_ref = 1;
    let mut msg_ref = join_ref;
    write
        .send(Message::Text(channel.join_message(msg_ref).into()))
        .await
        .map_err(|e| RemoteError::Unavailable(format!("join: {}", e)))?;
    tracing::debug!(topic = %channel.topic, "Joined realtime channel");

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = tx.closed() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            _ = heartbeat.tick() => {
                msg_ref += 1;
                write
                    .send(Message::Text(heartbeat_message(msg_ref).into()))
                    .await
                    .map_err(|e| RemoteError::Unavailable(format!("heartbeat: {}", e)))?;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !*joined && channel.is_join_reply(text.as_str(), join_ref) {
                        *joined = true;
                        if rejoin {
                            tracing::debug!(table = %channel.table, "Rejoined, requesting reload");
                            if tx.send(ChangeNotice { table: channel.table }).is_err() {
                                return Ok(());
                            }
                        }
                    } else if channel.is_change_event(text.as_str()) {
                        tracing::debug!(table = %channel.table, "Realtime change received");
                        if tx.send(ChangeNotice { table: channel.table }).is_err() {
                            return Ok(());
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(RemoteError::Unavailable("socket closed".into()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(RemoteError::Unavailable(e.to_string())),
            }
        }
    }
}
