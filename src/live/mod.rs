//! Live update channel
//!
//! One Socket.IO connection per signed-in identity. On connect the client
//! announces the user id with a `setup` event; every `newItem` event becomes a
//! one-item [`SyncEvent::Pushed`] batch for the sync driver, and every
//! `notification` event a [`SyncEvent::Notified`]. Unreadable frames are
//! skipped; only transport errors end a connection.

mod engineio;

pub use engineio::{CodecError, EnginePacket, SocketPacket, encode_event, websocket_url};

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::api::decode_item;
use crate::notifications::Notification;
use crate::session::{Identity, SessionState};
use crate::sync::SyncEvent;

use engineio::CONNECT_FRAME;

/// Event announcing the user to the server
const SETUP_EVENT: &str = "setup";
/// Event carrying one new item
const NEW_ITEM_EVENT: &str = "newItem";
/// Event carrying one notification for the user
const NOTIFICATION_EVENT: &str = "notification";

/// Why a connection ended
#[derive(Debug, Error)]
pub enum LiveError {
    /// WebSocket failure
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    /// Server refused the namespace connection
    #[error("connection refused: {0}")]
    Refused(String),
}

struct Connection {
    user_id: String,
    generation: u64,
    task: JoinHandle<()>,
}

/// Push connection scoped to the current identity
pub struct LiveChannel {
    url: String,
    reconnect_delay: Duration,
    events: mpsc::Sender<SyncEvent>,
    current: Option<Connection>,
}

impl LiveChannel {
    /// Create a disconnected channel delivering into `events`
    pub fn new(socket_url: &str, reconnect_delay: Duration, events: mpsc::Sender<SyncEvent>) -> Self {
        Self {
            url: websocket_url(socket_url),
            reconnect_delay,
            events,
            current: None,
        }
    }

    /// User the channel is connected for, if any
    pub fn user_id(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.user_id.as_str())
    }

    /// Whether a connection task is running
    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(|c| !c.task.is_finished())
    }

    /// Connect for an identity. Any connection for a different identity or
    /// session generation is torn down first.
    pub fn connect(&mut self, identity: &Identity, generation: u64) {
        if let Some(current) = &self.current
            && current.user_id == identity.user_id
            && current.generation == generation
            && !current.task.is_finished()
        {
            return;
        }
        self.disconnect();

        tracing::debug!("Starting live channel for user {}", identity.user_id);
        let task = tokio::spawn(run(
            self.url.clone(),
            identity.user_id.clone(),
            generation,
            self.reconnect_delay,
            self.events.clone(),
        ));
        self.current = Some(Connection {
            user_id: identity.user_id.clone(),
            generation,
            task,
        });
    }

    /// Tear down the connection, if any
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.current.take() {
            connection.task.abort();
            tracing::info!("Live channel closed for user {}", connection.user_id);
        }
    }

    /// Follow a session snapshot: connect when signed in, disconnect when not
    pub fn apply_session(&mut self, state: &SessionState) {
        match &state.identity {
            Some(identity) => self.connect(identity, state.generation),
            None => self.disconnect(),
        }
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        if let Some(connection) = self.current.take() {
            connection.task.abort();
        }
    }
}

/// Connection loop: reconnect after a fixed delay until the receiver is gone
async fn run(
    url: String,
    user_id: String,
    generation: u64,
    delay: Duration,
    events: mpsc::Sender<SyncEvent>,
) {
    loop {
        match connect_once(&url, &user_id, generation, &events).await {
            Ok(()) => tracing::info!("Live channel disconnected"),
            Err(e) => tracing::warn!("Live channel error: {e}"),
        }

        if events.is_closed() {
            break;
        }
        tokio::time::sleep(delay).await;
    }
}

async fn connect_once(
    url: &str,
    user_id: &str,
    generation: u64,
    events: &mpsc::Sender<SyncEvent>,
) -> Result<(), LiveError> {
    let (stream, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut write, mut read) = stream.split();

    while let Some(message) = read.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(()),
            _ => continue,
        };

        let packet = match EnginePacket::parse(text.as_str()) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!("Skipping unreadable frame: {e}");
                continue;
            }
        };

        match packet {
            EnginePacket::Open(_) => {
                write.send(Message::text(CONNECT_FRAME)).await?;
            }
            EnginePacket::Ping(data) => {
                write.send(Message::text(EnginePacket::Pong(data).encode())).await?;
            }
            EnginePacket::Close => return Ok(()),
            EnginePacket::Message(payload) => match SocketPacket::parse(&payload) {
                Err(e) => {
                    tracing::debug!("Skipping unreadable message: {e}");
                }
                Ok(SocketPacket::Connect) => {
                    tracing::info!("Live channel connected");
                    let setup = encode_event(SETUP_EVENT, &[Value::String(user_id.to_string())]);
                    write.send(Message::text(setup)).await?;
                }
                Ok(SocketPacket::Disconnect) => return Ok(()),
                Ok(SocketPacket::ConnectError(reason)) => return Err(LiveError::Refused(reason)),
                Ok(SocketPacket::Event { name, args }) if name == NEW_ITEM_EVENT => {
                    let Some(item) = args
                        .into_iter()
                        .next()
                        .and_then(|payload| decode_item(payload, Some(user_id)))
                    else {
                        tracing::debug!("Discarding {NEW_ITEM_EVENT} event without a usable item");
                        continue;
                    };

                    let event = SyncEvent::Pushed {
                        session: generation,
                        items: vec![item],
                    };
                    if events.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(SocketPacket::Event { name, args }) if name == NOTIFICATION_EVENT => {
                    let Some(notification) =
                        args.into_iter().next().and_then(Notification::from_json)
                    else {
                        continue;
                    };

                    let event = SyncEvent::Notified {
                        session: generation,
                        notification,
                    };
                    if events.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(SocketPacket::Event { name, .. }) => {
                    tracing::trace!("Ignoring event {name}");
                }
                Ok(SocketPacket::Other(_)) => {}
            },
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn next_text<S>(ws: &mut S) -> String
    where
        S: futures::Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        loop {
            let message = ws.next().await.unwrap().unwrap();
            if let Message::Text(text) = message {
                return text.as_str().to_string();
            }
        }
    }

    #[tokio::test]
    async fn test_handshake_setup_and_new_item() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            ws.send(Message::text(r#"0{"sid":"s1","pingInterval":25000,"pingTimeout":20000}"#))
                .await
                .unwrap();
            assert_eq!(next_text(&mut ws).await, "40");

            ws.send(Message::text(r#"40{"sid":"n1"}"#)).await.unwrap();
            assert_eq!(next_text(&mut ws).await, r#"42["setup","me"]"#);

            ws.send(Message::text("2")).await.unwrap();
            assert_eq!(next_text(&mut ws).await, "3");

            ws.send(Message::text(r#"42["newItem",{"text":"no id"}]"#))
                .await
                .unwrap();
            ws.send(Message::text(r#"42["newItem",{"_id":"t1","text":"hi"}]"#))
                .await
                .unwrap();

            // Hold the socket open until the client goes away
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (tx, mut rx) = mpsc::channel(8);
        let mut channel = LiveChannel::new(&format!("http://{addr}"), Duration::from_secs(60), tx);
        channel.connect(&Identity::new("me", "tok"), 3);
        assert_eq!(channel.user_id(), Some("me"));

        match rx.recv().await.unwrap() {
            SyncEvent::Pushed { session, items } => {
                assert_eq!(session, 3);
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].id, "t1");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        channel.disconnect();
        assert!(channel.user_id().is_none());
        server.abort();
    }

    #[tokio::test]
    async fn test_bad_frames_skipped_and_notifications_delivered() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            ws.send(Message::text(r#"0{"sid":"s1"}"#)).await.unwrap();
            assert_eq!(next_text(&mut ws).await, "40");
            ws.send(Message::text("40")).await.unwrap();
            assert_eq!(next_text(&mut ws).await, r#"42["setup","me"]"#);

            for frame in [
                r#"42["typing",{oops}]"#,
                "9garbage",
                "",
                r#"42{"not":"an array"}"#,
                r#"42["notification",{"_id":"n1","type":"reply","tweet":"t0"}]"#,
                r#"42["newItem",{"_id":"t1"}]"#,
            ] {
                ws.send(Message::text(frame)).await.unwrap();
            }

            while let Some(Ok(_)) = ws.next().await {}
        });

        let (tx, mut rx) = mpsc::channel(8);
        let mut channel = LiveChannel::new(&format!("http://{addr}"), Duration::from_secs(60), tx);
        channel.connect(&Identity::new("me", "tok"), 1);

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match first {
            SyncEvent::Notified { session, notification } => {
                assert_eq!(session, 1);
                assert_eq!(notification.id, "n1");
                assert_eq!(notification.item_id.as_deref(), Some("t0"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(second, SyncEvent::Pushed { ref items, .. } if items[0].id == "t1"));
        assert!(channel.is_active());

        channel.disconnect();
        server.abort();
    }

    #[tokio::test]
    async fn test_apply_session_switches_identity() {
        let (tx, _rx) = mpsc::channel(8);
        let mut channel = LiveChannel::new("http://127.0.0.1:9", Duration::from_secs(60), tx);

        let mut state = SessionState {
            generation: 1,
            identity: Some(Identity::new("a", "t")),
        };
        channel.apply_session(&state);
        assert_eq!(channel.user_id(), Some("a"));

        state.generation = 2;
        state.identity = Some(Identity::new("b", "t"));
        channel.apply_session(&state);
        assert_eq!(channel.user_id(), Some("b"));

        state.generation = 3;
        state.identity = None;
        channel.apply_session(&state);
        assert!(channel.user_id().is_none());
        assert!(!channel.is_active());
    }
}
