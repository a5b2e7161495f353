//! Integration tests for the WebSocket relay.
//!
//! These spin up a real relay on a random port and connect real clients
//! to it, so frames actually cross the network.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use lupus_transport::{Broker, ChannelEvent, Frame, Link, RelayServer, Topic, WsBroker};
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Starts a relay in the background and returns its `ws://` URL.
    async fn start_relay() -> String {
        let relay = RelayServer::bind("127.0.0.1:0")
            .await
            .expect("relay should bind");
        let addr = relay.local_addr().expect("bound address");
        tokio::spawn(relay.run());
        format!("ws://{addr}")
    }

    async fn next_event(events: &mut UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event should arrive")
            .expect("stream open")
    }

    async fn next_frame(events: &mut UnboundedReceiver<ChannelEvent>) -> Frame {
        loop {
            if let ChannelEvent::Frame(frame) = next_event(events).await {
                return frame;
            }
        }
    }

    /// Waits until a presence event lists exactly `expected`.
    async fn wait_for_presence(events: &mut UnboundedReceiver<ChannelEvent>, expected: &[&str]) {
        loop {
            if let ChannelEvent::Presence(members) = next_event(events).await {
                if members == expected {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_relay_delivers_to_all_members_including_publisher() {
        let url = start_relay().await;
        let broker = WsBroker::new(url);

        let mut host = broker.subscribe("R1", "host").await.expect("host subscribes");
        let mut p1 = broker.subscribe("R1", "p1").await.expect("p1 subscribes");
        wait_for_presence(&mut host.events, &["host", "p1"]).await;

        host.link
            .publish(Topic::HostBroadcast, b"{\"hello\":1}")
            .await
            .expect("publish should succeed");

        let own = next_frame(&mut host.events).await;
        assert_eq!(own.from, "host");
        assert_eq!(own.topic, Topic::HostBroadcast);

        let seen = next_frame(&mut p1.events).await;
        assert_eq!(seen.from, "host");
        assert_eq!(seen.payload, b"{\"hello\":1}");
    }

    #[tokio::test]
    async fn test_relay_stamps_sender_on_player_messages() {
        let url = start_relay().await;
        let broker = WsBroker::new(url);

        let mut host = broker.subscribe("R2", "host").await.unwrap();
        let p1 = broker.subscribe("R2", "p1").await.unwrap();
        wait_for_presence(&mut host.events, &["host", "p1"]).await;

        p1.link.publish(Topic::PlayerMessage, b"intent").await.unwrap();

        let frame = next_frame(&mut host.events).await;
        assert_eq!(frame.topic, Topic::PlayerMessage);
        assert_eq!(frame.from, "p1");
    }

    #[tokio::test]
    async fn test_relay_isolates_rooms() {
        let url = start_relay().await;
        let broker = WsBroker::new(url);

        let a = broker.subscribe("A", "x").await.unwrap();
        let mut b = broker.subscribe("B", "y").await.unwrap();
        wait_for_presence(&mut b.events, &["y"]).await;

        a.link.publish(Topic::HostBroadcast, b"only-a").await.unwrap();
        b.link.publish(Topic::HostBroadcast, b"only-b").await.unwrap();

        // The first frame B sees is its own; A's never arrives.
        let frame = next_frame(&mut b.events).await;
        assert_eq!(frame.payload, b"only-b");
    }

    #[tokio::test]
    async fn test_leave_updates_presence_for_remaining_members() {
        let url = start_relay().await;
        let broker = WsBroker::new(url);

        let mut host = broker.subscribe("R3", "host").await.unwrap();
        let p1 = broker.subscribe("R3", "p1").await.unwrap();
        wait_for_presence(&mut host.events, &["host", "p1"]).await;

        p1.link.leave().await.expect("leave should succeed");
        wait_for_presence(&mut host.events, &["host"]).await;
    }

    #[tokio::test]
    async fn test_subscribe_to_unreachable_relay_fails() {
        // Bind and drop a listener to get a port nobody is serving.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let broker = WsBroker::new(format!("ws://{addr}"));
        assert!(broker.subscribe("R", "p1").await.is_err());
    }
}
