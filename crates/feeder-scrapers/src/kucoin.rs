//! KuCoin trade scraper.
//!
//! The public websocket endpoint requires a token from the bullet-public
//! REST call, which also announces the server's ping interval. The scraper
//! pings every `min(pingInterval / 2, 10s)` under the write lock.

use crate::{
    init_last_trade_times, resubscribe_loop, spawn_pair_watchdogs, touch_pair, ScraperError,
    ScraperResult, MAX_ERR_COUNT, RESTART_WAIT_TIME,
};
use chrono::{DateTime, TimeZone, Utc};
use feeder_models::exchange::KUCOIN_EXCHANGE;
use feeder_models::{ticker_pair_map, Exchange, ExchangePair, Pair, Trade};
use feeder_ws::{Heartbeat, SessionConfig, SubscriptionTracker, WsResult, WsSession, WsWriteHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const WS_BASE: &str = "wss://ws-api-spot.kucoin.com/";
const TOKEN_URL: &str = "https://api.kucoin.com/api/v1/bullet-public";

#[derive(Debug, Serialize)]
struct SubscribeMessage {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    topic: String,
    #[serde(rename = "privateChannel")]
    private_channel: bool,
    response: bool,
}

#[derive(Debug, Serialize)]
struct PingMessage {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    data: WireTrade,
}

#[derive(Debug, Default, Deserialize)]
struct WireTrade {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    size: String,
    #[serde(rename = "tradeId", default)]
    trade_id: String,
    #[serde(default)]
    time: String,
}

#[derive(Debug, Deserialize)]
struct BulletResponse {
    #[serde(default)]
    code: String,
    data: BulletData,
}

#[derive(Debug, Deserialize)]
struct BulletData {
    token: String,
    #[serde(rename = "instanceServers", default)]
    instance_servers: Vec<InstanceServer>,
}

#[derive(Debug, Deserialize)]
struct InstanceServer {
    #[serde(rename = "pingInterval")]
    ping_interval: i64,
}

pub async fn run(
    pairs: Vec<ExchangePair>,
    trades_tx: mpsc::Sender<Trade>,
    shutdown: CancellationToken,
) -> ScraperResult<()> {
    info!("Started KuCoin scraper");
    let ticker_map = ticker_pair_map(&pairs);

    let (token, ping_interval_ms) = fetch_public_token(TOKEN_URL).await?;
    let config = SessionConfig::new(format!("{WS_BASE}?token={token}"));
    let mut session = WsSession::connect_with_retry(&config, &shutdown).await?;
    let write = session.write_handle();

    let subscriptions = Arc::new(SubscriptionTracker::new());
    for pair in &pairs {
        if let Err(e) = send_subscribe(write.clone(), pair.clone(), true).await {
            error!(pair = %pair.foreign_name, error = %e, "KuCoin - subscribe");
        } else {
            info!(pair = %pair.foreign_name, "KuCoin - subscribed to pair");
            subscriptions.mark_subscribing(&pair.foreign_name);
        }
    }

    // Client heartbeat under the write lock.
    {
        let write = write.clone();
        let shutdown = shutdown.clone();
        let heartbeat = Heartbeat::from_server_interval_ms(ping_interval_ms);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = heartbeat.wait() => {
                        let ping = PingMessage { id: String::new(), kind: "ping" };
                        if let Err(e) = write.send_json(&ping).await {
                            error!(error = %e, "KuCoin - send ping");
                            return;
                        }
                    }
                }
            }
        });
    }

    let last_trade_times = init_last_trade_times(&pairs);
    let subscribe_rx = spawn_pair_watchdogs(&pairs, &last_trade_times, &shutdown);
    {
        let write = write.clone();
        let subscriptions = subscriptions.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            resubscribe_loop(
                KUCOIN_EXCHANGE,
                subscribe_rx,
                subscriptions,
                shutdown,
                |pair, subscribe| send_subscribe(write.clone(), pair, subscribe),
            )
            .await;
        });
    }

    let mut err_count = 0u32;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                write.close().await;
                return Ok(());
            }
            message = session.read_text() => {
                let text = match message {
                    Ok(text) => text,
                    Err(e) if e.is_transport_closed() => return Err(e.into()),
                    Err(e) => {
                        error!(error = %e, "KuCoin - read");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: KUCOIN_EXCHANGE });
                        }
                        continue;
                    }
                };
                match parse_message(&text, &ticker_map) {
                    Ok(Some(trade)) => {
                        let foreign = format!(
                            "{}-{}",
                            trade.quote_token.symbol, trade.base_token.symbol
                        );
                        touch_pair(&last_trade_times, &foreign, trade.time);
                        subscriptions.mark_live(&foreign);
                        if trades_tx.send(trade).await.is_err() {
                            return Err(ScraperError::ChannelClosed);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(error = %e, "KuCoin - parse message");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: KUCOIN_EXCHANGE });
                        }
                    }
                }
            }
        }
    }
}

/// Fetch the public websocket token and the server ping interval (ms).
async fn fetch_public_token(url: &str) -> ScraperResult<(String, i64)> {
    let client = reqwest::Client::new();
    let response: BulletResponse = client
        .post(url)
        .json(&serde_json::json!({}))
        .send()
        .await?
        .json()
        .await?;
    if response.code != "200000" {
        warn!(code = %response.code, "KuCoin - unexpected bullet-public code");
    }
    let ping_interval_ms = response
        .data
        .instance_servers
        .first()
        .map(|s| s.ping_interval)
        .unwrap_or(10_000);
    Ok((response.data.token, ping_interval_ms))
}

async fn send_subscribe(write: WsWriteHandle, pair: ExchangePair, subscribe: bool) -> WsResult<()> {
    let message = SubscribeMessage {
        id: String::new(),
        kind: if subscribe { "subscribe" } else { "unsubscribe" },
        topic: format!("/market/match:{}", pair.foreign_name),
        private_channel: false,
        response: false,
    };
    write.send_json(&message).await
}

fn parse_message(text: &str, ticker_map: &HashMap<String, Pair>) -> ScraperResult<Option<Trade>> {
    let message: WireMessage = serde_json::from_str(text)?;
    if message.kind != "message" {
        // Pongs and welcome/ack frames.
        return Ok(None);
    }
    if !message.subject.contains("trade") && !message.topic.contains("/market/match") {
        return Ok(None);
    }
    Ok(Some(parse_trade(message.data, ticker_map)?))
}

fn parse_trade(data: WireTrade, ticker_map: &HashMap<String, Pair>) -> ScraperResult<Trade> {
    let price = data.price.parse::<f64>()?;
    let mut volume = data.size.parse::<f64>()?;
    // Side folded into the volume by convention.
    if data.side == "sell" {
        volume -= 1.0;
    }
    let time = parse_time_ns(&data.time)?;
    let pair = ticker_map
        .get(&data.symbol.replace('-', ""))
        .cloned()
        .unwrap_or_default();
    Ok(Trade {
        quote_token: pair.quote_token,
        base_token: pair.base_token,
        price,
        volume,
        time,
        exchange: Exchange::centralized(KUCOIN_EXCHANGE),
        foreign_trade_id: data.trade_id,
        pool_address: String::new(),
    })
}

/// The venue timestamps trades in nanoseconds, as a decimal string.
fn parse_time_ns(raw: &str) -> ScraperResult<DateTime<Utc>> {
    let nanos = raw
        .parse::<i64>()
        .map_err(|_| ScraperError::Timestamp(raw.to_string()))?;
    Ok(Utc.timestamp_nanos(nanos))
}
