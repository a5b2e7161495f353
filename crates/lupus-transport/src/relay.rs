//! WebSocket pub/sub relay.
//!
//! Each accepted connection gets its own Tokio task. The flow is:
//!   1. Receive `subscribe` → register the member in its room
//!   2. Send `subscribed` with the member list, announce presence
//!   3. Loop: every `publish` is fanned out as `deliver` to the whole room,
//!      the publisher included
//!   4. On `leave` or close → unregister, announce presence
//!
//! The relay never looks inside payloads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;

use crate::{Topic, TransportError};

/// Control frames spoken between relay and clients, JSON encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RelayFrame {
    /// Client → relay: join `room` as `member`.
    Subscribe { room: String, member: String },
    /// Relay → client: subscription confirmed.
    Subscribed { room: String, members: Vec<String> },
    /// Client → relay: publish on a topic.
    Publish { topic: Topic, payload: Vec<u8> },
    /// Relay → client: a publication from `from`.
    Deliver {
        topic: Topic,
        from: String,
        payload: Vec<u8>,
    },
    /// Relay → client: current room members.
    Presence { members: Vec<String> },
    /// Client → relay: unsubscribe.
    Leave,
    /// Relay → client: the request could not be served.
    Error { message: String },
}

impl RelayFrame {
    pub(crate) fn encode(&self) -> Result<Message, TransportError> {
        let bytes = serde_json::to_vec(self).map_err(|e| TransportError::send_failed(e))?;
        Ok(Message::Binary(bytes.into()))
    }

    /// Decodes a WebSocket message. Returns `Ok(None)` for control frames
    /// (ping/pong) that carry nothing for us.
    pub(crate) fn decode(msg: Message) -> Result<Option<Self>, TransportError> {
        let data: Vec<u8> = match msg {
            Message::Binary(data) => data.into(),
            Message::Text(text) => text.as_bytes().to_vec(),
            _ => return Ok(None),
        };
        serde_json::from_slice(&data).map(Some).map_err(|e| {
            TransportError::ReceiveFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e,
            ))
        })
    }
}

type Outbox = mpsc::UnboundedSender<RelayFrame>;

/// room → member → that member's writer queue.
#[derive(Default)]
struct Registry {
    rooms: HashMap<String, BTreeMap<String, Outbox>>,
}

impl Registry {
    fn members(&self, room: &str) -> Vec<String> {
        self.rooms
            .get(room)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn fan_out(&self, room: &str, frame: &RelayFrame) {
        if let Some(members) = self.rooms.get(room) {
            for outbox in members.values() {
                let _ = outbox.send(frame.clone());
            }
        }
    }

    fn announce_presence(&self, room: &str) {
        let frame = RelayFrame::Presence {
            members: self.members(room),
        };
        self.fan_out(room, &frame);
    }
}

/// A WebSocket relay hosting any number of room channels.
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<Mutex<Registry>>,
}

impl RelayServer {
    /// Binds the relay to `addr`. Use port 0 to let the OS pick one.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "relay listening");
        Ok(Self {
            listener,
            registry: Arc::new(Mutex::new(Registry::default())),
        })
    }

    /// The address the relay is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the process ends.
    pub async fn run(self) -> Result<(), TransportError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, registry).await {
                            tracing::debug!(%peer, error = %e, "relay connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "relay accept failed");
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    registry: Arc<Mutex<Registry>>,
) -> Result<(), TransportError> {
    let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
        TransportError::AcceptFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            e,
        ))
    })?;
    let (mut sink, mut stream) = ws.split();

    // --- Step 1: subscribe ---
    let first = tokio::time::timeout(Duration::from_secs(5), stream.next()).await;
    let (room, member) = match first {
        Ok(Some(Ok(msg))) => match RelayFrame::decode(msg)? {
            Some(RelayFrame::Subscribe { room, member }) => (room, member),
            _ => {
                let reply = RelayFrame::Error {
                    message: "expected subscribe".into(),
                };
                let _ = sink.send(reply.encode()?).await;
                return Err(TransportError::SubscribeFailed(
                    "first frame must be subscribe".into(),
                ));
            }
        },
        Ok(Some(Err(e))) => {
            return Err(TransportError::ReceiveFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                e,
            )));
        }
        Ok(None) => return Ok(()),
        Err(_) => {
            return Err(TransportError::SubscribeFailed(
                "subscribe timed out".into(),
            ));
        }
    };

    // --- Step 2: register, confirm, announce ---
    let (outbox, mut inbox) = mpsc::unbounded_channel::<RelayFrame>();
    {
        let mut reg = registry.lock().await;
        reg.rooms
            .entry(room.clone())
            .or_default()
            .insert(member.clone(), outbox.clone());
        let _ = outbox.send(RelayFrame::Subscribed {
            room: room.clone(),
            members: reg.members(&room),
        });
        reg.announce_presence(&room);
    }
    tracing::info!(%room, %member, "relay member subscribed");

    let writer = tokio::spawn(async move {
        while let Some(frame) = inbox.recv().await {
            let msg = match frame.encode() {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unencodable relay frame");
                    continue;
                }
            };
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // --- Step 3: relay loop ---
    while let Some(next) = stream.next().await {
        let msg = match next {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%room, %member, error = %e, "relay recv error");
                break;
            }
        };
        if matches!(msg, Message::Close(_)) {
            break;
        }
        match RelayFrame::decode(msg) {
            Ok(Some(RelayFrame::Publish { topic, payload })) => {
                let frame = RelayFrame::Deliver {
                    topic,
                    from: member.clone(),
                    payload,
                };
                registry.lock().await.fan_out(&room, &frame);
            }
            Ok(Some(RelayFrame::Leave)) => break,
            Ok(Some(other)) => {
                tracing::debug!(%room, %member, frame = ?other, "ignoring unexpected relay frame");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(%room, %member, error = %e, "undecodable relay frame");
            }
        }
    }

    // --- Step 4: unregister ---
    {
        let mut reg = registry.lock().await;
        if let Some(members) = reg.rooms.get_mut(&room) {
            // A newer connection may have taken over this member name.
            if members.get(&member).is_some_and(|o| o.same_channel(&outbox)) {
                members.remove(&member);
            }
            if members.is_empty() {
                reg.rooms.remove(&room);
            }
        }
        reg.announce_presence(&room);
    }
    tracing::info!(%room, %member, "relay member left");

    // Last sender gone: the writer drains its queue and closes the socket.
    drop(outbox);
    let _ = writer.await;
    Ok(())
}
