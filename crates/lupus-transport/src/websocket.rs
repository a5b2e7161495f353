//! Client side of the WebSocket relay, using `tokio-tungstenite`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;

use crate::{
    Broker, ChannelEvent, Frame, Link, RelayFrame, Subscription, Topic, TransportError,
};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Broker`] that reaches rooms through a [`RelayServer`](crate::RelayServer).
#[derive(Debug, Clone)]
pub struct WsBroker {
    url: String,
}

impl WsBroker {
    /// `url` is the relay address, e.g. `ws://127.0.0.1:9000`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Broker for WsBroker {
    type Link = WsLink;

    async fn subscribe(
        &self,
        room: &str,
        member: &str,
    ) -> Result<Subscription<WsLink>, TransportError> {
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let hello = RelayFrame::Subscribe {
            room: room.to_string(),
            member: member.to_string(),
        };
        sink.send(hello.encode()?)
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

        // Wait for the relay's confirmation, skipping control frames.
        loop {
            let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .map_err(|_| TransportError::SubscribeFailed("no confirmation".into()))?;
            let msg = match next {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(TransportError::SubscribeFailed(e.to_string())),
                None => {
                    return Err(TransportError::ConnectionClosed(
                        "relay closed during subscribe".into(),
                    ));
                }
            };
            match RelayFrame::decode(msg)? {
                Some(RelayFrame::Subscribed { members, .. }) => {
                    tracing::debug!(room, member, members = members.len(), "relay subscription confirmed");
                    break;
                }
                Some(RelayFrame::Error { message }) => {
                    return Err(TransportError::SubscribeFailed(message));
                }
                _ => continue,
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_events(stream, tx));

        Ok(Subscription {
            link: WsLink {
                sink: Arc::new(Mutex::new(sink)),
            },
            events: rx,
        })
    }
}

/// Pumps relay frames into the subscriber's event queue until the socket
/// closes or the subscriber goes away.
async fn forward_events(
    mut stream: SplitStream<WsStream>,
    tx: mpsc::UnboundedSender<ChannelEvent>,
) {
    while let Some(next) = stream.next().await {
        let event = match next.map_err(|e| e.to_string()) {
            Ok(Message::Close(_)) => break,
            Ok(msg) => match RelayFrame::decode(msg) {
                Ok(Some(RelayFrame::Deliver {
                    topic,
                    from,
                    payload,
                })) => ChannelEvent::Frame(Frame {
                    topic,
                    from,
                    payload,
                }),
                Ok(Some(RelayFrame::Presence { members })) => ChannelEvent::Presence(members),
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "undecodable relay frame");
                    continue;
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "relay stream error");
                break;
            }
        };
        if tx.send(event).is_err() {
            return;
        }
    }
    let _ = tx.send(ChannelEvent::Closed);
}

/// Publishing half of a relay subscription.
pub struct WsLink {
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
}

impl Link for WsLink {
    async fn publish(&self, topic: Topic, payload: &[u8]) -> Result<(), TransportError> {
        let frame = RelayFrame::Publish {
            topic,
            payload: payload.to_vec(),
        };
        let msg = frame.encode()?;
        self.sink
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| TransportError::send_failed(e))
    }

    async fn leave(&self) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        let leave = RelayFrame::Leave.encode()?;
        sink.send(leave)
            .await
            .map_err(|e| TransportError::send_failed(e))?;
        sink.close().await.map_err(|e| TransportError::send_failed(e))
    }
}
