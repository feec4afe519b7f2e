//! GateIO trade scraper.

use crate::{
    init_last_trade_times, resubscribe_loop, spawn_pair_watchdogs, touch_pair, ScraperError,
    ScraperResult, MAX_ERR_COUNT, RESTART_WAIT_TIME,
};
use chrono::{TimeZone, Utc};
use feeder_models::exchange::GATEIO_EXCHANGE;
use feeder_models::{ticker_pair_map, Exchange, ExchangePair, Pair, Trade};
use feeder_ws::{SessionConfig, SubscriptionTracker, WsResult, WsSession, WsWriteHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const WS_URL: &str = "wss://api.gateio.ws/ws/v4/";

#[derive(Debug, Serialize)]
struct SubscribeMessage {
    time: i64,
    channel: &'static str,
    event: &'static str,
    payload: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    channel: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    result: Option<WireTrade>,
}

#[derive(Debug, Default, Deserialize)]
struct WireTrade {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    create_time: i64,
    #[serde(default)]
    side: String,
    #[serde(default)]
    currency_pair: String,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    price: String,
}

pub async fn run(
    pairs: Vec<ExchangePair>,
    trades_tx: mpsc::Sender<Trade>,
    shutdown: CancellationToken,
) -> ScraperResult<()> {
    run_with_url(WS_URL.to_string(), pairs, trades_tx, shutdown).await
}

async fn run_with_url(
    url: String,
    pairs: Vec<ExchangePair>,
    trades_tx: mpsc::Sender<Trade>,
    shutdown: CancellationToken,
) -> ScraperResult<()> {
    info!("Started GateIO scraper");
    let ticker_map = ticker_pair_map(&pairs);
    let config = SessionConfig::new(url);
    let mut session = WsSession::connect_with_retry(&config, &shutdown).await?;
    let write = session.write_handle();

    let subscriptions = Arc::new(SubscriptionTracker::new());
    for pair in &pairs {
        if let Err(e) = send_subscribe(write.clone(), pair.clone(), true).await {
            error!(pair = %pair.foreign_name, error = %e, "GateIO - subscribe");
        } else {
            info!(pair = %pair.foreign_name, "GateIO - subscribed to pair");
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
                GATEIO_EXCHANGE,
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
                        error!(error = %e, "GateIO - read");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: GATEIO_EXCHANGE });
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
                        error!(error = %e, "GateIO - parse message");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: GATEIO_EXCHANGE });
                        }
                    }
                }
            }
        }
    }
}

async fn send_subscribe(write: WsWriteHandle, pair: ExchangePair, subscribe: bool) -> WsResult<()> {
    let message = SubscribeMessage {
        time: Utc::now().timestamp(),
        channel: "spot.trades",
        event: if subscribe { "subscribe" } else { "unsubscribe" },
        payload: vec![wire_ticker(&pair.foreign_name)],
    };
    write.send_json(&message).await
}

/// `BTC-USDT` -> `BTC_USDT`.
fn wire_ticker(foreign_name: &str) -> String {
    foreign_name.replace('-', "_")
}

fn parse_message(text: &str, ticker_map: &HashMap<String, Pair>) -> ScraperResult<Option<Trade>> {
    let message: WireMessage = serde_json::from_str(text)?;
    if message.channel != "spot.trades" || message.event != "update" {
        return Ok(None);
    }
    let Some(result) = message.result else {
        return Ok(None);
    };
    if result.currency_pair.is_empty() {
        return Ok(None);
    }
    Ok(Some(parse_trade(result, ticker_map)?))
}

fn parse_trade(result: WireTrade, ticker_map: &HashMap<String, Pair>) -> ScraperResult<Trade> {
    let price = result.price.parse::<f64>()?;
    let mut volume = result.amount.parse::<f64>()?;
    if result.side == "sell" {
        volume = -volume;
    }
    let time = Utc
        .timestamp_opt(result.create_time, 0)
        .single()
        .ok_or_else(|| ScraperError::Timestamp(format!("{}s", result.create_time)))?;
    let pair = ticker_map
        .get(&result.currency_pair.replace('_', ""))
        .cloned()
        .unwrap_or_default();
    Ok(Trade {
        quote_token: pair.quote_token,
        base_token: pair.base_token,
        price,
        volume,
        time,
        exchange: Exchange::centralized(GATEIO_EXCHANGE),
        foreign_trade_id: format!("{:x}", result.id),
        pool_address: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use feeder_models::Asset;

    fn ticker_map() -> HashMap<String, Pair> {
        let mut map = HashMap::new();
        map.insert(
            "ETHUSDT".to_string(),
            Pair::new(
                Asset {
                    symbol: "ETH".to_string(),
                    ..Default::default()
                },
                Asset {
                    symbol: "USDT".to_string(),
                    ..Default::default()
                },
            ),
        );
        map
    }

    #[test]
    fn test_parse_trade_update() {
        let text = r#"{"time":1700000000,"channel":"spot.trades","event":"update","result":{"id":255,"create_time":1700000000,"create_time_ms":"1700000000123","side":"buy","currency_pair":"ETH_USDT","amount":"1.5","price":"2000.25"}}"#;
        let trade = parse_message(text, &ticker_map()).unwrap().unwrap();
        assert_eq!(trade.price, 2000.25);
        assert_eq!(trade.volume, 1.5);
        assert_eq!(trade.quote_token.symbol, "ETH");
        // Foreign trade id is hex-formatted.
        assert_eq!(trade.foreign_trade_id, "ff");
        assert_eq!(trade.time.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_sell_negates_volume() {
        let text = r#"{"time":1700000000,"channel":"spot.trades","event":"update","result":{"id":1,"create_time":1700000000,"side":"sell","currency_pair":"ETH_USDT","amount":"2.0","price":"2000"}}"#;
        let trade = parse_message(text, &ticker_map()).unwrap().unwrap();
        assert_eq!(trade.volume, -2.0);
    }

    #[test]
    fn test_subscribe_ack_skipped() {
        let ack = r#"{"time":1700000000,"channel":"spot.trades","event":"subscribe","result":{"status":"success"}}"#;
        assert!(parse_message(ack, &ticker_map()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scraper_against_mock_venue() {
        use crate::testutil::MockVenueServer;

        let server = MockVenueServer::start().await;
        let pair = ExchangePair {
            exchange: GATEIO_EXCHANGE.to_string(),
            foreign_name: "ETH-USDT".to_string(),
            underlying_pair: ticker_map()["ETHUSDT"].clone(),
            watchdog_delay: 0,
        };
        let (trades_tx, mut trades_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_with_url(
            server.url(),
            vec![pair],
            trades_tx,
            shutdown.clone(),
        ));

        server
            .push_text(r#"{"time":1700000000,"channel":"spot.trades","event":"update","result":{"id":42,"create_time":1700000000,"side":"sell","currency_pair":"ETH_USDT","amount":"1.25","price":"2001.5"}}"#)
            .await;

        let trade = trades_rx.recv().await.unwrap();
        assert_eq!(trade.price, 2001.5);
        assert_eq!(trade.volume, -1.25);
        assert_eq!(trade.quote_token.symbol, "ETH");
        assert_eq!(trade.exchange.name, GATEIO_EXCHANGE);

        // The subscription went out over the socket.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let sent = server.received().await;
        assert!(sent.iter().any(|m| m.contains("spot.trades") && m.contains("ETH_USDT")));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
