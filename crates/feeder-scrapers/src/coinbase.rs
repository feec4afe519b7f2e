//! CoinBase trade scraper.

use crate::{
    init_last_trade_times, resubscribe_loop, spawn_pair_watchdogs, touch_pair, ScraperError,
    ScraperResult, MAX_ERR_COUNT, RESTART_WAIT_TIME,
};
use chrono::{DateTime, Utc};
use feeder_models::exchange::COINBASE_EXCHANGE;
use feeder_models::{ticker_pair_map, Exchange, ExchangePair, Pair, Trade};
use feeder_ws::{SessionConfig, SubscriptionTracker, WsResult, WsSession, WsWriteHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const WS_URL: &str = "wss://ws-feed.exchange.coinbase.com";

#[derive(Debug, Serialize)]
struct SubscribeMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    channels: Vec<Channel>,
}

#[derive(Debug, Serialize)]
struct Channel {
    name: &'static str,
    product_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    trade_id: i64,
    #[serde(default)]
    time: String,
    #[serde(default)]
    product_id: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    side: String,
}

pub async fn run(
    pairs: Vec<ExchangePair>,
    trades_tx: mpsc::Sender<Trade>,
    shutdown: CancellationToken,
) -> ScraperResult<()> {
    info!("Started CoinBase scraper");
    let ticker_map = ticker_pair_map(&pairs);
    let config = SessionConfig::new(WS_URL);
    let mut session = WsSession::connect_with_retry(&config, &shutdown).await?;
    let write = session.write_handle();

    let subscriptions = Arc::new(SubscriptionTracker::new());
    for pair in &pairs {
        if let Err(e) = send_subscribe(write.clone(), pair.clone(), true).await {
            error!(pair = %pair.foreign_name, error = %e, "CoinBase - subscribe");
        } else {
            info!(pair = %pair.foreign_name, "CoinBase - subscribed to pair");
            subscriptions.mark_subscribing(&pair.foreign_name);
        }
    }

    let last_trade_times = init_last_trade_times(&pairs);
    let subscribe_rx = spawn_pair_watchdogs(&pairs, &last_trade_times, &shutdown);
    {
        let write = write.clone();
        let subscriptions = subscriptions.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            resubscribe_loop(
                COINBASE_EXCHANGE,
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
                        error!(error = %e, "CoinBase - read");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: COINBASE_EXCHANGE });
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
                        error!(error = %e, "CoinBase - parse message");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: COINBASE_EXCHANGE });
                        }
                    }
                }
            }
        }
    }
}

async fn send_subscribe(write: WsWriteHandle, pair: ExchangePair, subscribe: bool) -> WsResult<()> {
    let message = SubscribeMessage {
        kind: if subscribe { "subscribe" } else { "unsubscribe" },
        channels: vec![Channel {
            name: "matches",
            product_ids: vec![pair.foreign_name],
        }],
    };
    write.send_json(&message).await
}

fn parse_message(text: &str, ticker_map: &HashMap<String, Pair>) -> ScraperResult<Option<Trade>> {
    let message: WireMessage = serde_json::from_str(text)?;
    if message.kind != "match" {
        return Ok(None);
    }
    Ok(Some(parse_trade(message, ticker_map)?))
}

fn parse_trade(message: WireMessage, ticker_map: &HashMap<String, Pair>) -> ScraperResult<Trade> {
    let price = message.price.parse::<f64>()?;
    let mut volume = message.size.parse::<f64>()?;
    // Side folded into the volume by convention.
    if message.side == "sell" {
        volume -= 1.0;
    }
    let time = parse_rfc3339(&message.time)?;
    let pair = ticker_map
        .get(&message.product_id.replace('-', ""))
        .cloned()
        .unwrap_or_default();
    Ok(Trade {
        quote_token: pair.quote_token,
        base_token: pair.base_token,
        price,
        volume,
        time,
        exchange: Exchange::centralized(COINBASE_EXCHANGE),
        foreign_trade_id: message.trade_id.to_string(),
        pool_address: String::new(),
    })
}

/// RFC3339 with fractional seconds, i.e. `2024-05-01T12:00:00.123456Z`.
pub(crate) fn parse_rfc3339(raw: &str) -> ScraperResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ScraperError::Timestamp(format!("{raw}: {e}")))
}
