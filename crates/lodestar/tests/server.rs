//! End-to-end tests: a real hub on an OS-assigned port, real WebSocket
//! clients.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lodestar::prelude::*;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn test_config() -> HubConfig {
    HubConfig {
        bind_addr: "127.0.0.1:0".into(),
        cold_store: ColdStoreConfig::InMemory,
        ..HubConfig::default()
    }
}

/// Starts a hub on a random port and returns the address.
async fn start_server(config: HubConfig) -> String {
    let server = HubServer::builder()
        .config(config)
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send_frame(ws: &mut ClientWs, json: &str) {
    ws.send(Message::Text(json.into())).await.expect("send frame");
}

/// Next data frame from the hub, skipping control frames.
async fn recv_frame(ws: &mut ClientWs) -> PlayerState {
    let next = async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).expect("decode frame");
                }
                Some(Ok(Message::Binary(data))) => {
                    return serde_json::from_slice(&data).expect("decode frame");
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended while waiting for a frame: {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), next)
        .await
        .expect("timed out waiting for a frame")
}

/// Asserts nothing arrives for a short while.
async fn expect_silence(ws: &mut ClientWs) {
    let got = tokio::time::timeout(Duration::from_millis(150), ws.next()).await;
    assert!(got.is_err(), "expected no frame, got {got:?}");
}

/// Joins and waits for the echo, which also proves the hub has
/// registered the connection.
async fn join(ws: &mut ClientWs, id: &str, x: f32) -> PlayerState {
    send_frame(ws, &format!(r#"{{"type":"join","id":"{id}","x":{x},"z":0,"ry":0}}"#)).await;
    recv_frame(ws).await
}

fn mv(id: &str, x: f32, z: f32, ry: f32) -> String {
    format!(r#"{{"type":"move","id":"{id}","x":{x},"z":{z},"ry":{ry}}}"#)
}

/// Reads until the hub closes the socket.
async fn drain(ws: &mut ClientWs) {
    while let Some(Ok(_)) = ws.next().await {}
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_join_echo_roster_and_announcement() {
    let addr = start_server(test_config()).await;

    let mut b = connect(&addr).await;
    let echo_b = join(&mut b, "pb", 3.0).await;
    assert_eq!(echo_b.kind, MessageKind::Join);
    assert_eq!(echo_b.x, 3.0);

    let mut a = connect(&addr).await;
    let echo_a = join(&mut a, "pa", 1.0).await;
    assert_eq!(echo_a.id, PlayerId::new("pa"));

    let roster = recv_frame(&mut a).await;
    assert_eq!(roster.id, PlayerId::new("pb"));
    assert_eq!(roster.x, 3.0);

    let announced = recv_frame(&mut b).await;
    assert_eq!(announced.kind, MessageKind::Join);
    assert_eq!(announced.id, PlayerId::new("pa"));

    expect_silence(&mut a).await;
}

#[tokio::test]
async fn test_frames_reach_others_but_not_sender() {
    let addr = start_server(test_config()).await;

    let mut b = connect(&addr).await;
    join(&mut b, "pb", 0.0).await;
    let mut a = connect(&addr).await;
    join(&mut a, "pa", 0.0).await;
    recv_frame(&mut a).await; // roster: pb
    recv_frame(&mut b).await; // join: pa

    send_frame(&mut a, &mv("pa", 2.0, 1.0, 0.5)).await;
    send_frame(&mut a, r#"{"type":"chat","id":"pa","text":"hello"}"#).await;

    let moved = recv_frame(&mut b).await;
    assert_eq!((moved.kind, moved.x, moved.z), (MessageKind::Move, 2.0, 1.0));
    let chat = recv_frame(&mut b).await;
    assert_eq!(chat.text, "hello");

    expect_silence(&mut a).await;
}

#[tokio::test]
async fn test_malformed_and_binary_frames() {
    let addr = start_server(test_config()).await;

    let mut b = connect(&addr).await;
    join(&mut b, "pb", 0.0).await;
    let mut a = connect(&addr).await;
    join(&mut a, "pa", 0.0).await;
    recv_frame(&mut a).await;
    recv_frame(&mut b).await;

    send_frame(&mut a, "{ not json").await;
    a.send(Message::Binary(mv("pa", 7.0, 0.0, 0.0).into_bytes().into()))
        .await
        .unwrap();

    let moved = recv_frame(&mut b).await;
    assert_eq!(moved.x, 7.0);
}

#[tokio::test]
async fn test_position_survives_reconnect() {
    let addr = start_server(test_config()).await;

    let mut watcher = connect(&addr).await;
    join(&mut watcher, "watcher", 0.0).await;

    let mut a = connect(&addr).await;
    join(&mut a, "pa", 0.0).await;
    recv_frame(&mut a).await; // roster: watcher
    send_frame(&mut a, &mv("pa", 5.0, 5.0, 1.0)).await;
    assert_eq!(recv_frame(&mut watcher).await.kind, MessageKind::Join);
    assert_eq!(recv_frame(&mut watcher).await.kind, MessageKind::Move);

    a.close(None).await.unwrap();

    // `leave` is queued only after the write-back finished.
    let left = recv_frame(&mut watcher).await;
    assert_eq!(left.kind, MessageKind::Leave);
    assert_eq!(left.id, PlayerId::new("pa"));

    let mut again = connect(&addr).await;
    let restored = join(&mut again, "pa", 0.0).await;
    assert_eq!(
        restored,
        PlayerState::at(MessageKind::Move, "pa".into(), Pose::new(5.0, 5.0, 1.0))
    );
}

#[tokio::test]
async fn test_hub_runs_without_either_tier() {
    let addr = start_server(HubConfig {
        hot_store_enabled: false,
        cold_store: ColdStoreConfig::Disabled,
        ..test_config()
    })
    .await;

    let mut b = connect(&addr).await;
    join(&mut b, "pb", 0.0).await;

    let mut a = connect(&addr).await;
    let echo = join(&mut a, "pa", 4.0).await;
    assert_eq!(echo.x, 4.0);
    expect_silence(&mut a).await; // nothing cached, so no roster

    send_frame(&mut a, &mv("pa", 6.0, 0.0, 0.0)).await;
    a.close(None).await.unwrap();

    let kinds = [
        recv_frame(&mut b).await.kind,
        recv_frame(&mut b).await.kind,
        recv_frame(&mut b).await.kind,
    ];
    assert_eq!(kinds, [MessageKind::Join, MessageKind::Move, MessageKind::Leave]);
}

#[tokio::test]
async fn test_shutdown_writes_back_every_player() {
    let cold = SqliteColdTier::open_in_memory().unwrap();
    let server = HubServer::builder()
        .config(test_config())
        .cold_tier(cold.clone())
        .build()
        .await
        .expect("server should build");
    let addr = server.local_addr().unwrap().to_string();

    let (stop, stopped) = oneshot::channel::<()>();
    let running: JoinHandle<Result<(), LodestarError>> = tokio::spawn(server.run_until(async {
        let _ = stopped.await;
    }));

    let mut b = connect(&addr).await;
    join(&mut b, "pb", 0.0).await;
    let mut a = connect(&addr).await;
    join(&mut a, "pa", 0.0).await;
    send_frame(&mut a, &mv("pa", 2.0, 0.0, 1.0)).await;
    assert_eq!(recv_frame(&mut b).await.kind, MessageKind::Join);
    assert_eq!(recv_frame(&mut b).await.kind, MessageKind::Move);

    stop.send(()).unwrap();
    tokio::join!(drain(&mut a), drain(&mut b));
    running.await.unwrap().unwrap();

    let record = cold.load(&"pa".into()).await.unwrap().expect("written back");
    assert_eq!(record.pose, Pose::new(2.0, 0.0, 1.0));
    let record = cold.load(&"pb".into()).await.unwrap().expect("written back");
    assert_eq!(record.pose, Pose::new(0.0, 0.0, 0.0));
}

#[tokio::test]
async fn test_silent_socket_does_not_block_new_clients() {
    let addr = start_server(HubConfig {
        handshake_timeout: Duration::from_millis(300),
        ..test_config()
    })
    .await;

    // Connects at the TCP level and never sends the upgrade request.
    let mut silent = tokio::net::TcpStream::connect(&addr).await.unwrap();

    let mut a = tokio::time::timeout(Duration::from_secs(2), connect(&addr))
        .await
        .expect("a second client should be accepted while the first is silent");
    let echo = join(&mut a, "pa", 1.0).await;
    assert_eq!(echo.id, PlayerId::new("pa"));

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf))
        .await
        .expect("the hub should drop the silent socket after the handshake deadline");
    assert!(matches!(read, Ok(0) | Err(_)), "expected EOF, got {read:?}");
}

#[tokio::test]
async fn test_stalled_reader_does_not_freeze_broadcasts() {
    let addr = start_server(HubConfig {
        write_timeout: Some(Duration::from_millis(200)),
        ..test_config()
    })
    .await;

    let mut healthy = connect(&addr).await;
    join(&mut healthy, "healthy", 0.0).await;
    // Joins, then never reads again.
    let mut stalled = connect(&addr).await;
    join(&mut stalled, "stalled", 0.0).await;
    let mut talker = connect(&addr).await;
    join(&mut talker, "talker", 0.0).await;

    // Enough data to fill the stalled peer's socket buffers many times over.
    let talking = tokio::spawn(async move {
        let filler = "x".repeat(1 << 20);
        let big = format!(r#"{{"type":"chat","id":"talker","text":"{filler}"}}"#);
        for _ in 0..40 {
            send_frame(&mut talker, &big).await;
        }
        send_frame(&mut talker, r#"{"type":"chat","id":"talker","text":"MARKER"}"#).await;
        talker
    });

    let (mut saw_marker, mut saw_leave) = (false, false);
    let mut frames = 0;
    while !(saw_marker && saw_leave) {
        let frame = recv_frame(&mut healthy).await;
        frames += 1;
        saw_marker |= frame.kind == MessageKind::Chat && frame.text == "MARKER";
        saw_leave |= frame.kind == MessageKind::Leave && frame.id == PlayerId::new("stalled");
        assert!(frames < 100, "marker={saw_marker} leave={saw_leave} after {frames} frames");
    }

    let _talker = talking.await.unwrap();
    drop(stalled);
}

#[tokio::test]
async fn test_bind_failure_is_fatal() {
    let first = HubServer::builder()
        .config(test_config())
        .build()
        .await
        .unwrap();
    let taken = first.local_addr().unwrap().to_string();

    let second = HubServer::builder().bind(&taken).build().await;
    assert!(matches!(second, Err(LodestarError::Transport(_))));
}
