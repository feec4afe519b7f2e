//! Scripted WebSocket venue for scraper tests.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// A single-connection mock venue: records every text frame the scraper
/// sends and pushes scripted frames back.
pub(crate) struct MockVenueServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    outbound_tx: mpsc::Sender<Message>,
}

impl MockVenueServer {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(32);

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

    pub(crate) fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub(crate) async fn push_text(&self, text: &str) {
        self.outbound_tx
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    pub(crate) async fn received(&self) -> Vec<String> {
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
