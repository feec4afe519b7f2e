//! Crypto.com trade scraper.
//!
//! The venue rate-limits websocket requests (10 req/s), answers heartbeats
//! that must be echoed, and rejects bursts with error code 10006; rejected
//! subscribe/unsubscribe tasks are retried with the same payload after a
//! fixed backoff. Connection loss is recovered in-loop: dial again and
//! resubscribe everything this scraper owns.

use crate::{
    init_last_trade_times, resubscribe_loop, spawn_pair_watchdogs, touch_pair, ScraperError,
    ScraperResult, MAX_ERR_COUNT, RESTART_WAIT_TIME,
};
use chrono::Utc;
use feeder_models::exchange::CRYPTODOTCOM_EXCHANGE;
use feeder_models::{ticker_pair_map, Exchange, ExchangePair, Pair, Trade};
use feeder_ws::{
    RateLimiter, SessionConfig, SubscribeTask, SubscriptionTracker, TaskRegistry, WsResult,
    WsSession, WsWriteHandle, CONN_MAX_RETRY,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const WS_URL: &str = "wss://stream.crypto.com/v2/market";
/// Venue-documented request budget per second.
const WS_RATE_LIMIT_PER_SEC: u32 = 10;
/// Rate-limit rejection code.
const RATE_LIMIT_ERROR: i64 = 10006;
/// Backoff before retrying after a rate-limit rejection; also the settle
/// time after dialing, which the venue recommends to avoid instant 10006s.
const BACKOFF: Duration = Duration::from_secs(5);
const SPOT_TRADING_BUY: &str = "BUY";

#[derive(Debug, Serialize)]
struct WsRequest {
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<RequestParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<i64>,
}

#[derive(Debug, Serialize)]
struct RequestParams {
    channels: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WsResponse {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    method: String,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionResult {
    #[serde(default)]
    instrument_name: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireInstrument {
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "s")]
    side: String,
    #[serde(rename = "d")]
    trade_id: String,
    #[serde(rename = "t")]
    trade_time_ms: i64,
}

struct Scraper {
    write: RwLock<WsWriteHandle>,
    limiter: RateLimiter,
    tasks: TaskRegistry,
    /// Pairs this scraper currently owns, for resubscription after reconnect.
    subscribed: Mutex<HashMap<String, ExchangePair>>,
}

impl Scraper {
    async fn send_task(&self, task_id: u64, task: &SubscribeTask) -> WsResult<()> {
        self.limiter.acquire().await;
        let request = WsRequest {
            id: task_id,
            method: task.method.clone(),
            params: Some(RequestParams {
                channels: task.channels.clone(),
            }),
            nonce: Some(Utc::now().timestamp_micros()),
        };
        self.write.read().await.send_json(&request).await
    }

    /// Subscribe or unsubscribe a batch of pairs as one tracked task.
    async fn subscribe(&self, pairs: &[ExchangePair], subscribe: bool) -> WsResult<()> {
        let channels: Vec<String> = pairs
            .iter()
            .map(|p| format!("trade.{}", wire_ticker(&p.foreign_name)))
            .collect();
        {
            let mut subscribed = self.subscribed.lock();
            for pair in pairs {
                if subscribe {
                    subscribed.insert(pair.foreign_name.clone(), pair.clone());
                } else {
                    subscribed.remove(&pair.foreign_name);
                }
            }
        }
        let method = if subscribe { "subscribe" } else { "unsubscribe" };
        let task = SubscribeTask::new(method, channels);
        let task_id = self.tasks.register(task.clone());
        self.send_task(task_id, &task).await
    }

    async fn respond_heartbeat(&self, id: u64) -> WsResult<()> {
        self.limiter.acquire().await;
        // The response echoes the incoming request id.
        let request = WsRequest {
            id,
            method: "public/respond-heartbeat".to_string(),
            params: None,
            nonce: None,
        };
        self.write.read().await.send_json(&request).await
    }
}

/// `BTC-USDT` -> `BTC_USDT`.
fn wire_ticker(foreign_name: &str) -> String {
    foreign_name.replace('-', "_")
}

pub async fn run(
    pairs: Vec<ExchangePair>,
    trades_tx: mpsc::Sender<Trade>,
    shutdown: CancellationToken,
) -> ScraperResult<()> {
    info!("Started Crypto.com scraper");
    let ticker_map = ticker_pair_map(&pairs);
    let mut session = WsSession::connect(WS_URL).await?;
    // Settle before the first request to avoid instant rate-limit errors.
    tokio::time::sleep(BACKOFF).await;

    let scraper = Arc::new(Scraper {
        write: RwLock::new(session.write_handle()),
        limiter: RateLimiter::per_second(WS_RATE_LIMIT_PER_SEC),
        tasks: TaskRegistry::new(),
        subscribed: Mutex::new(HashMap::new()),
    });

    let subscriptions = Arc::new(SubscriptionTracker::new());
    if let Err(e) = scraper.subscribe(&pairs, true).await {
        error!(error = %e, "Crypto.com - subscribe");
    }
    for pair in &pairs {
        subscriptions.mark_subscribing(&pair.foreign_name);
    }

    let last_trade_times = init_last_trade_times(&pairs);
    let subscribe_rx = spawn_pair_watchdogs(&pairs, &last_trade_times, &shutdown);
    {
        let scraper = scraper.clone();
        let subscriptions = subscriptions.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            resubscribe_loop(
                CRYPTODOTCOM_EXCHANGE,
                subscribe_rx,
                subscriptions,
                shutdown,
                |pair, subscribe| {
                    let scraper = scraper.clone();
                    async move { scraper.subscribe(std::slice::from_ref(&pair), subscribe).await }
                },
            )
            .await;
        });
    }

    let mut err_count = 0u32;
    let mut conn_retry = 0u32;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                scraper.write.read().await.close().await;
                return Ok(());
            }
            message = session.read_text() => {
                let text = match message {
                    Ok(text) => text,
                    Err(e) if e.is_transport_closed() => {
                        conn_retry += 1;
                        if conn_retry > CONN_MAX_RETRY {
                            error!("Crypto.com - reached max connection retries");
                            return Err(e.into());
                        }
                        warn!(error = %e, attempt = conn_retry, "Crypto.com - reconnecting");
                        session = reconnect(&scraper, &shutdown).await?;
                        info!("Crypto.com - successfully created a new connection");
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "Crypto.com - read");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: CRYPTODOTCOM_EXCHANGE });
                        }
                        continue;
                    }
                };

                let response: WsResponse = match serde_json::from_str(&text) {
                    Ok(response) => response,
                    Err(e) => {
                        error!(error = %e, "Crypto.com - parse response");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: CRYPTODOTCOM_EXCHANGE });
                        }
                        continue;
                    }
                };

                if response.code == RATE_LIMIT_ERROR {
                    tokio::time::sleep(BACKOFF).await;
                    match scraper.tasks.retry(response.id) {
                        Ok(task) => {
                            warn!(task_id = response.id, task = %task, "Crypto.com - retrying task");
                            if let Err(e) = scraper.send_task(response.id, &task).await {
                                error!(error = %e, "Crypto.com - resend task");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Crypto.com - task retry failed");
                            return Err(e.into());
                        }
                    }
                    continue;
                }
                if response.code != 0 {
                    error!(code = response.code, "Crypto.com - non-retryable response code");
                    continue;
                }

                match response.method.as_str() {
                    "public/heartbeat" => {
                        if let Err(e) = scraper.respond_heartbeat(response.id).await {
                            error!(error = %e, "Crypto.com - heartbeat response");
                        }
                    }
                    "subscribe" => {
                        let Some(result) = response.result else { continue };
                        let result: SubscriptionResult = match serde_json::from_value(result) {
                            Ok(result) => result,
                            Err(e) => {
                                error!(error = %e, "Crypto.com - parse subscription result");
                                continue;
                            }
                        };
                        if result.channel != "trade" {
                            continue;
                        }
                        scraper.tasks.complete(response.id);
                        let pair = ticker_map
                            .get(&result.instrument_name.replace('_', ""))
                            .cloned()
                            .unwrap_or_default();
                        let foreign = result.instrument_name.replace('_', "-");
                        for raw in result.data {
                            match parse_trade(raw, &pair) {
                                Ok(trade) => {
                                    touch_pair(&last_trade_times, &foreign, trade.time);
                                    subscriptions.mark_live(&foreign);
                                    if trades_tx.send(trade).await.is_err() {
                                        return Err(ScraperError::ChannelClosed);
                                    }
                                }
                                Err(e) => error!(error = %e, "Crypto.com - parse trade"),
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Dial a fresh session and resubscribe everything this scraper owns.
async fn reconnect(scraper: &Scraper, shutdown: &CancellationToken) -> ScraperResult<WsSession> {
    let config = SessionConfig::new(WS_URL);
    let session = WsSession::connect_with_retry(&config, shutdown).await?;
    tokio::time::sleep(BACKOFF).await;
    *scraper.write.write().await = session.write_handle();

    let pairs: Vec<ExchangePair> = scraper.subscribed.lock().values().cloned().collect();
    if !pairs.is_empty() {
        scraper
            .subscribe(&pairs, true)
            .await
            .map_err(ScraperError::Ws)?;
    }
    Ok(session)
}

fn parse_trade(raw: serde_json::Value, pair: &Pair) -> ScraperResult<Trade> {
    let instrument: WireInstrument = serde_json::from_value(raw)?;
    let price = instrument.price.parse::<f64>()?;
    let mut volume = instrument.quantity.parse::<f64>()?;
    if instrument.side != SPOT_TRADING_BUY {
        volume = -volume;
    }
    let time = crate::binance::parse_time_ms(instrument.trade_time_ms)?;
    Ok(Trade {
        quote_token: pair.quote_token.clone(),
        base_token: pair.base_token.clone(),
        price,
        volume,
        time,
        exchange: Exchange::centralized(CRYPTODOTCOM_EXCHANGE),
        foreign_trade_id: instrument.trade_id,
        pool_address: String::new(),
    })
}
