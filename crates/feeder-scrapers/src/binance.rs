//! Binance trade scraper.
//!
//! Subscribes through the stream path (`/ws/<sym>@trade/...`) at connect
//! time; resubscriptions for individual pairs go through SUBSCRIBE /
//! UNSUBSCRIBE frames.

use crate::{
    init_last_trade_times, resubscribe_loop, spawn_pair_watchdogs, touch_pair, ScraperError,
    ScraperResult, MAX_ERR_COUNT, RESTART_WAIT_TIME,
};
use chrono::{DateTime, TimeZone, Utc};
use feeder_models::exchange::BINANCE_EXCHANGE;
use feeder_models::{ticker_pair_map, Exchange, ExchangePair, Pair, Trade};
use feeder_ws::{SessionConfig, SubscriptionTracker, WsResult, WsSession, WsWriteHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const WS_BASE: &str = "wss://stream.binance.com:9443/ws";

#[derive(Debug, Serialize)]
struct SubscribeMessage {
    method: &'static str,
    params: Vec<String>,
    id: u32,
}

/// Trade event; subscription acks lack the `e` discriminator and are skipped.
#[derive(Debug, Default, Deserialize)]
struct TradeMessage {
    #[serde(rename = "e", default)]
    event: Option<String>,
    #[serde(rename = "T", default)]
    time_ms: i64,
    #[serde(rename = "p", default)]
    price: String,
    #[serde(rename = "q", default)]
    volume: String,
    #[serde(rename = "t", default)]
    foreign_trade_id: i64,
    #[serde(rename = "s", default)]
    foreign_name: String,
    #[serde(rename = "m", default)]
    buyer_is_maker: bool,
}

pub async fn run(
    pairs: Vec<ExchangePair>,
    trades_tx: mpsc::Sender<Trade>,
    shutdown: CancellationToken,
) -> ScraperResult<()> {
    info!("Started Binance scraper");
    let ticker_map = ticker_pair_map(&pairs);
    let config = SessionConfig::new(stream_url(&pairs));
    let mut session = WsSession::connect_with_retry(&config, &shutdown).await?;
    let write = session.write_handle();

    let subscriptions = Arc::new(SubscriptionTracker::new());
    for pair in &pairs {
        subscriptions.mark_subscribing(&pair.foreign_name);
    }

    let last_trade_times = init_last_trade_times(&pairs);
    let subscribe_rx = spawn_pair_watchdogs(&pairs, &last_trade_times, &shutdown);
    {
        let write = write.clone();
        let subscriptions = subscriptions.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            resubscribe_loop(
                BINANCE_EXCHANGE,
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
                        error!(error = %e, "Binance - read");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: BINANCE_EXCHANGE });
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
                        error!(error = %e, "Binance - parse message");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: BINANCE_EXCHANGE });
                        }
                    }
                }
            }
        }
    }
}

/// Stream URL subscribing all pairs at connect time.
fn stream_url(pairs: &[ExchangePair]) -> String {
    let mut url = String::from(WS_BASE);
    for pair in pairs {
        url.push('/');
        url.push_str(&wire_ticker(&pair.foreign_name));
        url.push_str("@trade");
    }
    url
}

/// `BTC-USDT` -> `btcusdt`.
fn wire_ticker(foreign_name: &str) -> String {
    foreign_name.replace('-', "").to_lowercase()
}

async fn send_subscribe(write: WsWriteHandle, pair: ExchangePair, subscribe: bool) -> WsResult<()> {
    let message = SubscribeMessage {
        method: if subscribe { "SUBSCRIBE" } else { "UNSUBSCRIBE" },
        params: vec![format!("{}@trade", wire_ticker(&pair.foreign_name))],
        id: 1,
    };
    write.send_json(&message).await
}

fn parse_message(text: &str, ticker_map: &HashMap<String, Pair>) -> ScraperResult<Option<Trade>> {
    let message: TradeMessage = serde_json::from_str(text)?;
    if message.event.is_none() {
        return Ok(None);
    }
    Ok(Some(parse_trade(message, ticker_map)?))
}

fn parse_trade(
    message: TradeMessage,
    ticker_map: &HashMap<String, Pair>,
) -> ScraperResult<Trade> {
    let price = message.price.parse::<f64>()?;
    let mut volume = message.volume.parse::<f64>()?;
    // Side folded into the volume by convention.
    if !message.buyer_is_maker {
        volume -= 1.0;
    }
    let time = parse_time_ms(message.time_ms)?;
    let pair = ticker_map
        .get(&message.foreign_name)
        .cloned()
        .unwrap_or_default();
    Ok(Trade {
        quote_token: pair.quote_token,
        base_token: pair.base_token,
        price,
        volume,
        time,
        exchange: Exchange::centralized(BINANCE_EXCHANGE),
        foreign_trade_id: message.foreign_trade_id.to_string(),
        pool_address: String::new(),
    })
}

pub(crate) fn parse_time_ms(ms: i64) -> ScraperResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ScraperError::Timestamp(format!("{ms}ms")))
}
