//! Kraken trade scraper (v2 websocket API).

use crate::coinbase::parse_rfc3339;
use crate::{
    init_last_trade_times, resubscribe_loop, spawn_pair_watchdogs, touch_pair, ScraperError,
    ScraperResult, MAX_ERR_COUNT, RESTART_WAIT_TIME,
};
use feeder_models::exchange::KRAKEN_EXCHANGE;
use feeder_models::{ticker_pair_map, Exchange, ExchangePair, Pair, Trade};
use feeder_ws::{SessionConfig, SubscriptionTracker, WsResult, WsSession, WsWriteHandle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const WS_URL: &str = "wss://ws.kraken.com/v2";

#[derive(Debug, Serialize)]
struct SubscribeMessage {
    method: &'static str,
    params: SubscribeParams,
}

#[derive(Debug, Serialize)]
struct SubscribeParams {
    channel: &'static str,
    symbol: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    channel: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    data: Vec<WireTrade>,
}

#[derive(Debug, Default, Deserialize)]
struct WireTrade {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    price: f64,
    #[serde(rename = "qty", default)]
    qty: f64,
    #[serde(rename = "trade_id", default)]
    trade_id: i64,
    #[serde(default)]
    timestamp: String,
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
    info!("Started Kraken scraper");
    let ticker_map = ticker_pair_map(&pairs);
    let config = SessionConfig::new(url);
    let mut session = WsSession::connect_with_retry(&config, &shutdown).await?;
    let write = session.write_handle();

    let subscriptions = Arc::new(SubscriptionTracker::new());
    for pair in &pairs {
        if let Err(e) = send_subscribe(write.clone(), pair.clone(), true).await {
            error!(pair = %pair.foreign_name, error = %e, "Kraken - subscribe");
        } else {
            info!(pair = %pair.foreign_name, "Kraken - subscribed to pair");
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
                KRAKEN_EXCHANGE,
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
                        error!(error = %e, "Kraken - read");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: KRAKEN_EXCHANGE });
                        }
                        continue;
                    }
                };
                match parse_message(&text, &ticker_map) {
                    Ok(trades) => {
                        for trade in trades {
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
                    }
                    Err(e) => {
                        error!(error = %e, "Kraken - parse message");
                        err_count += 1;
                        if err_count > MAX_ERR_COUNT {
                            tokio::time::sleep(RESTART_WAIT_TIME).await;
                            return Err(ScraperError::TooManyReadErrors { exchange: KRAKEN_EXCHANGE });
                        }
                    }
                }
            }
        }
    }
}

async fn send_subscribe(write: WsWriteHandle, pair: ExchangePair, subscribe: bool) -> WsResult<()> {
    // Kraken symbols are built from the underlying pair, i.e. `BTC/USD`.
    let symbol = format!(
        "{}/{}",
        pair.underlying_pair.quote_token.symbol, pair.underlying_pair.base_token.symbol
    );
    let message = SubscribeMessage {
        method: if subscribe { "subscribe" } else { "unsubscribe" },
        params: SubscribeParams {
            channel: "trade",
            symbol: vec![symbol],
        },
    };
    write.send_json(&message).await
}

fn parse_message(text: &str, ticker_map: &HashMap<String, Pair>) -> ScraperResult<Vec<Trade>> {
    let message: WireMessage = serde_json::from_str(text)?;
    if message.channel != "trade" {
        return Ok(Vec::new());
    }
    let mut trades = Vec::with_capacity(message.data.len());
    for data in message.data {
        trades.push(parse_trade(data, ticker_map)?);
    }
    Ok(trades)
}

fn parse_trade(data: WireTrade, ticker_map: &HashMap<String, Pair>) -> ScraperResult<Trade> {
    let price = data.price;
    let mut volume = data.qty;
    // Side folded into the volume by convention.
    if data.side == "sell" {
        volume -= 1.0;
    }
    let time = parse_rfc3339(&data.timestamp)?;
    let pair = ticker_map
        .get(&data.symbol.replace('/', ""))
        .cloned()
        .unwrap_or_default();
    Ok(Trade {
        quote_token: pair.quote_token,
        base_token: pair.base_token,
        price,
        volume,
        time,
        exchange: Exchange::centralized(KRAKEN_EXCHANGE),
        foreign_trade_id: data.trade_id.to_string(),
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
            "BTCUSD".to_string(),
            Pair::new(
                Asset {
                    symbol: "BTC".to_string(),
                    ..Default::default()
                },
                Asset::fiat_usd(),
            ),
        );
        map
    }

    #[test]
    fn test_parse_trade_batch() {
        let text = r#"{"channel":"trade","type":"update","data":[
            {"symbol":"BTC/USD","side":"buy","price":65000.5,"qty":0.1,"ord_type":"market","trade_id":77,"timestamp":"2024-05-01T12:00:00.123456Z"},
            {"symbol":"BTC/USD","side":"sell","price":65001.0,"qty":2.0,"ord_type":"limit","trade_id":78,"timestamp":"2024-05-01T12:00:01.000000Z"}
        ]}"#;
        let trades = parse_message(text, &ticker_map()).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].price, 65000.5);
        assert_eq!(trades[0].volume, 0.1);
        // Sell side folded into the volume.
        assert_eq!(trades[1].volume, 1.0);
        assert_eq!(trades[1].foreign_trade_id, "78");
    }

    #[test]
    fn test_non_trade_channel_skipped() {
        let status = r#"{"channel":"status","type":"update","data":[]}"#;
        assert!(parse_message(status, &ticker_map()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scraper_against_mock_venue() {
        use crate::testutil::MockVenueServer;

        let server = MockVenueServer::start().await;
        let pair = ExchangePair {
            exchange: KRAKEN_EXCHANGE.to_string(),
            foreign_name: "BTC-USD".to_string(),
            underlying_pair: ticker_map()["BTCUSD"].clone(),
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
            .push_text(r#"{"channel":"trade","type":"update","data":[{"symbol":"BTC/USD","side":"buy","price":64999.5,"qty":0.2,"ord_type":"market","trade_id":9,"timestamp":"2024-05-01T12:00:00.123456Z"}]}"#)
            .await;

        let trade = trades_rx.recv().await.unwrap();
        assert_eq!(trade.price, 64999.5);
        assert_eq!(trade.volume, 0.2);
        assert!(trade.base_token.is_fiat_usd());

        // The subscription symbol is built from the underlying pair.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let sent = server.received().await;
        assert!(sent.iter().any(|m| m.contains(r#""BTC/USD""#) && m.contains("subscribe")));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
