//! WebSocket session with capped connect retry and serialized writes.
//!
//! The session splits the socket: the reader is exclusively owned by the
//! scraper's fetch loop, while all writes (subscribe, unsubscribe,
//! heartbeat) go through a cloneable [`WsWriteHandle`] that serializes them
//! behind one async mutex. Reads are never blocked by writes.

use crate::error::{WsError, WsResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum number of connection attempts before giving up.
pub const CONN_MAX_RETRY: u32 = 50;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Maximum connection attempts.
    pub max_retry: u32,
    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub max_delay_ms: u64,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_retry: CONN_MAX_RETRY,
            base_delay_ms: 1000,
            max_delay_ms: 60000,
        }
    }
}

/// An established WebSocket session.
#[derive(Debug)]
pub struct WsSession {
    reader: WsStream,
    write: WsWriteHandle,
}

impl WsSession {
    /// Dial the endpoint once.
    pub async fn connect(url: &str) -> WsResult<Self> {
        let (stream, _response) = connect_async_tls_with_config(url, None, true, None).await?;
        let (sink, reader) = stream.split();
        Ok(Self {
            reader,
            write: WsWriteHandle {
                sink: Arc::new(Mutex::new(sink)),
            },
        })
    }

    /// Dial the endpoint, retrying with exponential backoff up to the
    /// configured cap. Returns [`WsError::Cancelled`] when the shutdown
    /// token fires during a backoff wait.
    pub async fn connect_with_retry(
        config: &SessionConfig,
        shutdown: &CancellationToken,
    ) -> WsResult<Self> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match Self::connect(&config.url).await {
                Ok(session) => {
                    debug!(url = %config.url, attempt, "WebSocket connected");
                    return Ok(session);
                }
                Err(e) if attempt >= config.max_retry => {
                    warn!(url = %config.url, attempt, ?e, "Giving up on connection");
                    return Err(WsError::MaxRetriesExceeded { attempts: attempt });
                }
                Err(e) => {
                    let delay = backoff_delay(config, attempt);
                    warn!(url = %config.url, attempt, delay_ms = delay.as_millis(), ?e, "Reconnecting");
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = shutdown.cancelled() => return Err(WsError::Cancelled),
                    }
                }
            }
        }
    }

    /// A cloneable handle for writing to this session.
    pub fn write_handle(&self) -> WsWriteHandle {
        self.write.clone()
    }

    /// Read the next text frame.
    ///
    /// Transport pings are answered inline; pongs and binary frames are
    /// skipped. A close frame or stream end maps to
    /// [`WsError::ConnectionClosed`].
    pub async fn read_text(&mut self) -> WsResult<String> {
        loop {
            match self.reader.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Ping(payload))) => {
                    self.write.send_raw(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (f.code.into(), f.reason.to_string()))
                        .unwrap_or((1000, "Normal close".to_string()));
                    return Err(WsError::ConnectionClosed { code, reason });
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(WsError::ConnectionClosed {
                        code: 1006,
                        reason: "stream ended".to_string(),
                    })
                }
            }
        }
    }

    /// Read the next text frame and decode it as JSON.
    pub async fn read_json<T: DeserializeOwned>(&mut self) -> WsResult<T> {
        let text = self.read_text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Cloneable, mutex-serialized writer for a [`WsSession`].
#[derive(Clone, Debug)]
pub struct WsWriteHandle {
    sink: Arc<Mutex<WsSink>>,
}

impl WsWriteHandle {
    /// Send a JSON-encoded message.
    pub async fn send_json<T: Serialize + ?Sized>(&self, msg: &T) -> WsResult<()> {
        let text = serde_json::to_string(msg)?;
        self.send_raw(Message::Text(text.into())).await
    }

    /// Send a raw frame.
    pub async fn send_raw(&self, msg: Message) -> WsResult<()> {
        let mut sink = self.sink.lock().await;
        sink.send(msg).await?;
        Ok(())
    }

    /// Send a close frame. Errors are ignored; the peer may already be gone.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
    }
}

fn backoff_delay(config: &SessionConfig, attempt: u32) -> Duration {
    // base * 2^(attempt-1), capped
    let exponent = attempt.saturating_sub(1).min(10);
    let delay = config
        .base_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(config.max_delay_ms);
    Duration::from_millis(delay + jitter_ms())
}

/// Jitter (0-1000ms) derived from the wall clock's subsecond nanos.
fn jitter_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}
