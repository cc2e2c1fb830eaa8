//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on an OS-assigned port and talk to it
//! with a `tokio-tungstenite` client.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use lodestar_transport::{
        Connection, Handshake, Transport, WebSocketConnection, WebSocketTransport,
    };
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Binds a transport on a random port, connects one client and
    /// returns both ends.
    async fn connected_pair() -> (WebSocketConnection, ClientWs) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr");

        let server = tokio::spawn(async move {
            let pending = transport.accept().await.expect("should accept");
            pending.handshake().await.expect("should upgrade")
        });

        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let conn = server.await.expect("accept task should complete");
        (conn, client)
    }

    #[tokio::test]
    async fn test_websocket_accept_and_send_receive() {
        let (server_conn, mut client) = connected_pair().await;
        assert!(server_conn.id().into_inner() > 0);

        server_conn
            .send(br#"{"type":"move"}"#)
            .await
            .expect("send should succeed");

        // UTF-8 payloads are delivered as text frames.
        let msg = client.next().await.unwrap().unwrap();
        match msg {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{"type":"move"}"#),
            other => panic!("expected text frame, got {other:?}"),
        }

        client
            .send(Message::Text("hello from client".into()))
            .await
            .unwrap();
        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, b"hello from client");

        client
            .send(Message::Binary(vec![0xff, 0x00].into()))
            .await
            .unwrap();
        let received = server_conn.recv().await.unwrap().unwrap();
        assert_eq!(received, vec![0xff, 0x00]);
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (server_conn, mut client) = connected_pair().await;

        client.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_send_is_not_blocked_by_pending_recv() {
        let (server_conn, mut client) = connected_pair().await;
        let server_conn = Arc::new(server_conn);

        // Park a reader on the connection; the client never sends anything.
        let reader = Arc::clone(&server_conn);
        let pending = tokio::spawn(async move { reader.recv().await });

        tokio::time::timeout(Duration::from_secs(2), server_conn.send(b"ping"))
            .await
            .expect("send must not wait for the reader")
            .expect("send should succeed");

        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"ping");
        pending.abort();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_further_sends() {
        let (server_conn, _client) = connected_pair().await;

        server_conn.close().await.expect("first close");
        server_conn.close().await.expect("second close is a no-op");

        let err = server_conn.send(b"late").await;
        assert!(err.is_err(), "send after close should fail");
    }

    #[tokio::test]
    async fn test_close_releases_parked_recv_without_peer_reply() {
        let (server_conn, _client) = connected_pair().await;
        let server_conn = Arc::new(server_conn);

        let reader = Arc::clone(&server_conn);
        let parked = tokio::spawn(async move { reader.recv().await });
        tokio::task::yield_now().await;

        // The client is never polled, so it never answers the Close frame.
        server_conn.close().await.expect("close");

        let result = tokio::time::timeout(Duration::from_secs(2), parked)
            .await
            .expect("recv should return once closed")
            .unwrap();
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_recv_after_close_returns_none() {
        let (server_conn, mut client) = connected_pair().await;
        server_conn.close().await.expect("close");

        // Data the peer sends after the close is never surfaced.
        let _ = client.send(Message::Text("late".into())).await;
        let result = tokio::time::timeout(Duration::from_secs(2), server_conn.recv())
            .await
            .expect("recv should not wait");
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_accept_does_not_wait_for_handshake() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("local addr");

        // Opens a socket and never sends the upgrade request.
        let _silent = tokio::net::TcpStream::connect(addr).await.unwrap();
        let silent = tokio::time::timeout(Duration::from_secs(2), transport.accept())
            .await
            .expect("accept should not wait for the upgrade")
            .expect("should accept");

        let client = tokio::spawn(tokio_tungstenite::connect_async(format!("ws://{addr}")));
        let pending = tokio::time::timeout(Duration::from_secs(2), transport.accept())
            .await
            .expect("second socket accepted while the first is silent")
            .expect("should accept");
        let conn = pending.handshake().await.expect("should upgrade");
        client.await.unwrap().expect("client should connect");
        assert!(conn.id().into_inner() > 0);

        let stalled = tokio::time::timeout(Duration::from_millis(100), silent.handshake()).await;
        assert!(stalled.is_err(), "silent socket never completes its upgrade");
    }
}
