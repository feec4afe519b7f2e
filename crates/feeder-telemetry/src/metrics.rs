//! Feeder metrics.
//!
//! A small set of gauges pushed to a Pushgateway with basic auth, plus an
//! optional HTTP server exposing `/metrics` for pull-based setups.

use crate::error::{TelemetryError, TelemetryResult};
use chrono::Utc;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const NAMESPACE: &str = "feeder";
/// Push cadence.
const PUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Gauges describing one feeder process.
pub struct FeederMetrics {
    registry: Registry,
    pub uptime_hours: Gauge,
    pub contract: GaugeVec,
    pub exchange_pairs: GaugeVec,
    pub pools: GaugeVec,
    pub gas_balance: Gauge,
    pub last_update_time: Gauge,
    started: Instant,
}

impl FeederMetrics {
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let uptime_hours = Gauge::with_opts(
            Opts::new("uptime_hours", "Feeder uptime in hours.").namespace(NAMESPACE),
        )?;
        let contract = GaugeVec::new(
            Opts::new("contract_info", "Feeder contract information.").namespace(NAMESPACE),
            &["contract"],
        )?;
        let exchange_pairs = GaugeVec::new(
            Opts::new("exchange_pairs", "Exchange pairs fed by this node.").namespace(NAMESPACE),
            &["exchange_pair"],
        )?;
        let pools = GaugeVec::new(
            Opts::new("pools", "Pools fed by this node.").namespace(NAMESPACE),
            &["exchange", "pool_address"],
        )?;
        let gas_balance = Gauge::with_opts(
            Opts::new("gas_balance", "Gas wallet balance in native units.").namespace(NAMESPACE),
        )?;
        let last_update_time = Gauge::with_opts(
            Opts::new("last_update_time", "Unix timestamp of the last oracle update.")
                .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(uptime_hours.clone()))?;
        registry.register(Box::new(contract.clone()))?;
        registry.register(Box::new(exchange_pairs.clone()))?;
        registry.register(Box::new(pools.clone()))?;
        registry.register(Box::new(gas_balance.clone()))?;
        registry.register(Box::new(last_update_time.clone()))?;

        Ok(Self {
            registry,
            uptime_hours,
            contract,
            exchange_pairs,
            pools,
            gas_balance,
            last_update_time,
            started: Instant::now(),
        })
    }

    /// Refresh the derived gauges.
    pub fn tick(&self) {
        self.uptime_hours
            .set(self.started.elapsed().as_secs_f64() / 3600.0);
    }

    pub fn record_oracle_update(&self) {
        self.last_update_time.set(Utc::now().timestamp() as f64);
    }

    /// Text exposition of all registered metrics.
    pub fn gather(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Job name for the Pushgateway: `<operator>_<hostname>` when an operator
/// name is configured, the bare hostname otherwise.
pub fn make_job_name(hostname: &str, operator_name: &str) -> String {
    if operator_name.is_empty() {
        hostname.to_string()
    } else {
        format!("{operator_name}_{hostname}")
    }
}

/// Push the metrics to a Pushgateway every 30 seconds until shutdown.
pub async fn push_loop(
    metrics: Arc<FeederMetrics>,
    pushgateway_url: String,
    job_name: String,
    auth_user: String,
    auth_password: String,
    shutdown: CancellationToken,
) {
    let client = reqwest::Client::new();
    let url = format!(
        "{}/metrics/job/{}",
        pushgateway_url.trim_end_matches('/'),
        job_name
    );
    info!(url = %url, "Metrics pushing enabled");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(PUSH_INTERVAL) => {
                metrics.tick();
                if let Err(e) = push_once(&client, &url, &auth_user, &auth_password, &metrics).await {
                    error!(error = %e, "Could not push metrics to Pushgateway");
                }
            }
        }
    }
}

async fn push_once(
    client: &reqwest::Client,
    url: &str,
    auth_user: &str,
    auth_password: &str,
    metrics: &FeederMetrics,
) -> TelemetryResult<()> {
    let body = metrics.gather()?;
    let response = client
        .put(url)
        .basic_auth(auth_user, Some(auth_password))
        .header("Content-Type", "text/plain")
        .body(body)
        .send()
        .await?;
    if !response.status().is_success() {
        warn!(status = %response.status(), "Pushgateway rejected metrics");
    }
    Ok(())
}

/// Serve `/metrics` over HTTP until shutdown.
pub async fn serve_metrics(
    metrics: Arc<FeederMetrics>,
    port: u16,
    shutdown: CancellationToken,
) -> TelemetryResult<()> {
    use axum::{extract::State, routing::get, Router};

    async fn metrics_handler(State(metrics): State<Arc<FeederMetrics>>) -> String {
        metrics.tick();
        metrics.gather().unwrap_or_default()
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|_| TelemetryError::ListenAddr(addr.clone()))?;
    info!(addr = %addr, "Metrics server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
