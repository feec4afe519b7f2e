//! Session behavior against a local WebSocket server.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use feeder_ws::{SessionConfig, WsError, WsSession};

/// Minimal scripted server: records incoming text frames, answers pings,
/// and writes whatever is queued on the outbound channel.
struct MockServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    outbound_tx: mpsc::Sender<Message>,
}

impl MockServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(16);

        let received_clone = received.clone();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                handle_connection(stream, received_clone, outbound_rx).await;
            }
        });

        Self {
            addr,
            received,
            outbound_tx,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    async fn push(&self, message: Message) {
        self.outbound_tx.send(message).await.unwrap();
    }

    async fn received(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }
}

async fn handle_connection(
    stream: TcpStream,
    received: Arc<Mutex<Vec<String>>>,
    mut outbound_rx: mpsc::Receiver<Message>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            maybe = outbound_rx.recv() => {
                let Some(message) = maybe else { break };
                if write.send(message).await.is_err() {
                    break;
                }
            }
            maybe = read.next() => {
                match maybe {
                    Some(Ok(Message::Text(text))) => {
                        received.lock().await.push(text.to_string());
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}

#[tokio::test]
async fn connect_send_and_read() {
    let server = MockServer::start().await;
    let config = SessionConfig::new(server.url());
    let shutdown = CancellationToken::new();

    let mut session = WsSession::connect_with_retry(&config, &shutdown)
        .await
        .unwrap();
    let write = session.write_handle();

    write
        .send_json(&json!({"event": "subscribe", "payload": ["BTC_USDT"]}))
        .await
        .unwrap();

    server
        .push(Message::Text(r#"{"channel":"trade","price":"1.0"}"#.into()))
        .await;
    let text = session.read_text().await.unwrap();
    assert!(text.contains("trade"));

    // Give the server loop a moment to record the subscribe frame.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let received = server.received().await;
    assert_eq!(received.len(), 1);
    assert!(received[0].contains("subscribe"));
}

#[tokio::test]
async fn read_skips_transport_pings() {
    let server = MockServer::start().await;
    let config = SessionConfig::new(server.url());
    let shutdown = CancellationToken::new();
    let mut session = WsSession::connect_with_retry(&config, &shutdown)
        .await
        .unwrap();

    // A ping followed by a text frame: read_text must answer the ping
    // internally and hand back only the text.
    server.push(Message::Ping(vec![1, 2, 3].into())).await;
    server.push(Message::Text("payload".into())).await;
    assert_eq!(session.read_text().await.unwrap(), "payload");
}

#[tokio::test]
async fn server_close_maps_to_connection_closed() {
    let server = MockServer::start().await;
    let config = SessionConfig::new(server.url());
    let shutdown = CancellationToken::new();
    let mut session = WsSession::connect_with_retry(&config, &shutdown)
        .await
        .unwrap();

    server.push(Message::Close(None)).await;
    let err = session.read_text().await.unwrap_err();
    assert!(err.is_transport_closed());
}

#[tokio::test]
async fn unreachable_endpoint_exhausts_retries() {
    // A port nothing listens on; keep the retry budget tiny.
    let config = SessionConfig {
        url: "ws://127.0.0.1:1".to_string(),
        max_retry: 2,
        base_delay_ms: 10,
        max_delay_ms: 20,
    };
    let shutdown = CancellationToken::new();
    let err = WsSession::connect_with_retry(&config, &shutdown)
        .await
        .unwrap_err();
    assert!(matches!(err, WsError::MaxRetriesExceeded { attempts: 2 }));
}
