// Integration tests for the relay: real WebSocket clients against the warp
// routes, fed by an in-memory queue through the poller

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

use command_relay::core::{
    create_registry, Broadcaster, Command, CommandMessage, QueuePoller, SharedRegistry,
};
use command_relay::handlers::ConnectionSettings;
use command_relay::queue::InMemoryQueue;
use command_relay::server;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Relay {
    addr: SocketAddr,
    registry: SharedRegistry,
    queue: Arc<InMemoryQueue>,
    poller: QueuePoller,
    shutdown: watch::Sender<bool>,
}

// Start the routes on an ephemeral port
fn start_relay() -> Relay {
    let registry = create_registry();
    let queue = Arc::new(InMemoryQueue::new());
    let (shutdown, shutdown_rx) = watch::channel(false);

    let settings = ConnectionSettings {
        send_buffer: 16,
        close_timeout: Duration::from_millis(500),
    };
    let routes = server::routes(registry.clone(), settings, shutdown_rx);
    let (addr, serve) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(serve);

    let poller = QueuePoller::new(
        queue.clone(),
        registry.clone(),
        Broadcaster::new(Duration::from_millis(500)),
        10,
        Duration::from_millis(50),
    );

    Relay {
        addr,
        registry,
        queue,
        poller,
        shutdown,
    }
}

async fn connect(relay: &Relay, path: &str) -> Client {
    let url = format!("ws://{}{}", relay.addr, path);
    let (ws_stream, _) = tokio::time::timeout(Duration::from_secs(5), connect_async(url))
        .await
        .expect("WebSocket connection timeout")
        .expect("Failed to establish WebSocket connection");
    ws_stream
}

// Registration happens in the upgrade task, shortly after the handshake
async fn wait_for_clients(registry: &SharedRegistry, expected: usize) {
    for _ in 0..200 {
        if registry.len() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "Expected {} registered clients, found {}",
        expected,
        registry.len()
    );
}

async fn next_text(client: &mut Client) -> String {
    let message = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("No frame received in time")
        .expect("Connection closed unexpectedly")
        .expect("Error receiving frame");
    match message {
        Message::Text(text) => text,
        other => panic!("Expected text frame, got {:?}", other),
    }
}

async fn assert_silent(client: &mut Client) {
    let result = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(result.is_err(), "Unexpected frame: {:?}", result);
}

#[tokio::test]
async fn test_batch_reaches_connected_clients_in_order() {
    let relay = start_relay();
    let mut first = connect(&relay, "/ws").await;
    let mut second = connect(&relay, "/ws").await;
    wait_for_clients(&relay.registry, 2).await;

    relay.queue.publish(r#"{"command":"up"}"#).await;
    relay.queue.publish(r#"{"command":"down"}"#).await;

    let stats = relay.poller.poll_once().await.unwrap();
    assert_eq!(stats.broadcast, 2);
    assert_eq!(stats.deliveries_succeeded, 4);

    for client in [&mut first, &mut second] {
        assert_eq!(next_text(client).await, r#"{"command":"up"}"#);
        assert_eq!(next_text(client).await, r#"{"command":"down"}"#);
    }

    // A late client misses the processed batch but gets what comes next
    let mut late = connect(&relay, "/ws").await;
    wait_for_clients(&relay.registry, 3).await;
    assert_silent(&mut late).await;

    relay.queue.publish(r#"{"command":"left"}"#).await;
    relay.poller.poll_once().await.unwrap();

    for client in [&mut first, &mut second, &mut late] {
        assert_eq!(next_text(client).await, r#"{"command":"left"}"#);
    }
}

#[tokio::test]
async fn test_every_command_is_forwarded_verbatim() {
    let relay = start_relay();
    let mut client = connect(&relay, "/").await;
    wait_for_clients(&relay.registry, 1).await;

    for command in Command::ALL {
        let payload = CommandMessage::new(command).to_payload().unwrap();
        relay.queue.publish(payload.clone()).await;
        relay.poller.poll_once().await.unwrap();

        assert_eq!(next_text(&mut client).await.into_bytes(), payload);
    }
    assert_silent(&mut client).await;
}

#[tokio::test]
async fn test_malformed_payload_is_dropped() {
    let relay = start_relay();
    let mut client = connect(&relay, "/ws").await;
    wait_for_clients(&relay.registry, 1).await;

    relay.queue.publish("not-json").await;
    let stats = relay.poller.poll_once().await.unwrap();

    assert_eq!(stats.decode_failures, 1);
    assert_eq!(stats.deliveries_attempted, 0);
    assert_eq!(relay.queue.acknowledged_count().await, 1);
    assert_silent(&mut client).await;

    // The loop keeps going afterwards
    relay.queue.publish(r#"{"command":"right"}"#).await;
    relay.poller.poll_once().await.unwrap();
    assert_eq!(next_text(&mut client).await, r#"{"command":"right"}"#);
}

#[tokio::test]
async fn test_closed_clients_are_deregistered() {
    let relay = start_relay();
    let mut polite = connect(&relay, "/ws").await;
    let abrupt = connect(&relay, "/ws").await;
    let mut remaining = connect(&relay, "/ws").await;
    wait_for_clients(&relay.registry, 3).await;

    polite.close(None).await.unwrap();
    drop(abrupt);

    // Broadcast while the two departures may still be in flight
    relay.queue.publish(r#"{"command":"up"}"#).await;
    relay.poller.poll_once().await.unwrap();
    assert_eq!(next_text(&mut remaining).await, r#"{"command":"up"}"#);

    wait_for_clients(&relay.registry, 1).await;

    relay.queue.publish(r#"{"command":"down"}"#).await;
    let stats = relay.poller.poll_once().await.unwrap();
    assert_eq!(stats.deliveries_attempted, 1);
    assert_eq!(stats.deliveries_succeeded, 1);
    assert_eq!(next_text(&mut remaining).await, r#"{"command":"down"}"#);
}

#[tokio::test]
async fn test_client_frames_are_ignored() {
    let relay = start_relay();
    let mut client = connect(&relay, "/ws").await;
    wait_for_clients(&relay.registry, 1).await;

    client.send(Message::Text("hello relay".to_string())).await.unwrap();
    assert_silent(&mut client).await;
    assert_eq!(relay.registry.len(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let relay = start_relay();
    let mut client = connect(&relay, "/ws").await;
    wait_for_clients(&relay.registry, 1).await;

    relay.shutdown.send(true).unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("No close frame received in time");
    match frame {
        Some(Ok(Message::Close(_))) | None => {}
        other => panic!("Expected close frame, got {:?}", other),
    }
    wait_for_clients(&relay.registry, 0).await;
}

#[tokio::test]
async fn test_poller_run_delivers_until_shutdown() {
    let relay = start_relay();
    let mut client = connect(&relay, "/ws").await;
    wait_for_clients(&relay.registry, 1).await;

    let Relay {
        queue,
        poller,
        shutdown,
        ..
    } = relay;
    let poller_handle = tokio::spawn({
        let rx = shutdown.subscribe();
        async move { poller.run(rx).await }
    });

    queue.publish(r#"{"command":"up"}"#).await;
    assert_eq!(next_text(&mut client).await, r#"{"command":"up"}"#);

    shutdown.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), poller_handle)
        .await
        .expect("Poller did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_health_reports_connections() {
    let relay = start_relay();
    let _client = connect(&relay, "/ws").await;
    wait_for_clients(&relay.registry, 1).await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/health", relay.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
}

#[tokio::test]
async fn test_plain_http_request_is_not_registered() {
    let relay = start_relay();

    let response = reqwest::get(format!("http://{}/ws", relay.addr)).await.unwrap();

    assert!(!response.status().is_success());
    assert!(relay.registry.is_empty());
}
