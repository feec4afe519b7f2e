//! Application wiring.
//!
//! Builds the channel topology (trigger -> collector -> processor ->
//! oracle updater), loads markets from the environment or config files,
//! starts the config watcher and metrics, and finally blocks on the
//! oracle update executor.

use crate::trigger::{self, TriggerSlot};
use crate::Args;
use alloy::primitives::U256;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feeder_config::{env_or, pairs_from_combined, watcher, CombinedPairsFile};
use feeder_models::{exchange_by_name, ExchangePair, FilterPoint, Pool};
use feeder_onchain::{
    load_signer, make_provider, parse_address, ContractWriter, OnchainResult, OracleWriter,
    RouterQuoter,
};
use feeder_processor::{DiaApiQuoter, ProcessorConfig, UsdQuoter};
use feeder_scrapers::ScraperDeps;
use feeder_telemetry::FeederMetrics;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Uniswap V2 router on Ethereum mainnet.
const DEFAULT_ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";
/// Settle time between cancelling the old processor stack and starting the
/// new one on config reload.
const RELOAD_SETTLE: Duration = Duration::from_secs(2);

pub async fn run(args: Args) -> Result<()> {
    // On-chain environment. The key material stays in a zeroizing wrapper
    // until the signer consumes it.
    let deployed_contract = env_or("DEPLOYED_CONTRACT", "");
    let private_key = Zeroizing::new(env_or("PRIVATE_KEY", ""));
    let blockchain_node = env_or("BLOCKCHAIN_NODE", "https://testnet-rpc.diadata.org");
    let backup_node = env_or("BACKUP_NODE", "https://testnet-rpc.diadata.org");
    let chain_id: i64 = env_or("CHAIN_ID", "100640")
        .parse()
        .context("parse CHAIN_ID")?;
    let frequency_seconds: u64 = env_or(
        "FREQUENCY_SECONDS",
        &feeder_config::DEFAULT_FREQUENCY_SECONDS.to_string(),
    )
    .parse()
    .context("parse FREQUENCY_SECONDS")?;

    // Markets.
    let config_dir = PathBuf::from(&args.config_dir);
    let (exchange_pairs, pools) = load_markets(&args, &config_dir)?;
    info!(
        pairs = exchange_pairs.len(),
        pools = pools.len(),
        "Markets loaded"
    );

    // Key, providers, contract writers.
    let signer = load_signer(private_key).context("load PRIVATE_KEY")?;
    let operator = signer.address();
    let contract_address = parse_address(&deployed_contract).context("parse DEPLOYED_CONTRACT")?;
    let provider = make_provider(&blockchain_node, signer.clone()).context("primary provider")?;
    let backup_provider = make_provider(&backup_node, signer).context("backup provider")?;
    let primary = Arc::new(ContractWriter::new(
        provider.clone(),
        contract_address,
        chain_id,
        "primary",
    ));
    let backup: Arc<dyn OracleWriter> = Arc::new(ContractWriter::new(
        backup_provider,
        contract_address,
        chain_id,
        "backup",
    ));

    // Simulation quoter, only when pools are configured.
    let deps = if pools.is_empty() {
        ScraperDeps::default()
    } else {
        let router =
            parse_address(&env_or("SIMULATION_ROUTER", DEFAULT_ROUTER)).context("router address")?;
        ScraperDeps {
            quoter: Some(Arc::new(RouterQuoter::new(provider.clone(), router))),
        }
    };

    let shutdown = CancellationToken::new();

    // Trigger source with a swappable sink.
    let (initial_trigger_tx, initial_trigger_rx) = mpsc::channel::<DateTime<Utc>>(1);
    let trigger_slot: TriggerSlot = Arc::new(RwLock::new(initial_trigger_tx));
    tokio::spawn(trigger::run_trigger(
        Duration::from_secs(frequency_seconds),
        trigger_slot.clone(),
        shutdown.clone(),
    ));

    // Processor stack.
    let (filters_tx, filters_rx) = mpsc::channel::<Vec<FilterPoint>>(1);
    let quoter: Arc<dyn UsdQuoter> = Arc::new(DiaApiQuoter::new());
    let processor_token = spawn_processor(
        exchange_pairs.clone(),
        pools.clone(),
        filters_tx.clone(),
        Some(initial_trigger_rx),
        &trigger_slot,
        quoter.clone(),
        deps.clone(),
        &shutdown,
    )
    .await;

    // Config hot reload, only meaningful for file-based configuration.
    if args.config_files {
        spawn_reload_handler(
            config_dir.clone(),
            pools.clone(),
            filters_tx.clone(),
            trigger_slot.clone(),
            quoter.clone(),
            deps.clone(),
            shutdown.clone(),
            processor_token,
        );
    }

    // Metrics.
    let metrics = start_metrics(
        &exchange_pairs,
        &pools,
        &deployed_contract,
        primary.clone(),
        operator,
        &shutdown,
    )?;
    let primary_writer: Arc<dyn OracleWriter> = match metrics {
        Some(metrics) => Arc::new(InstrumentedWriter {
            inner: primary,
            metrics,
        }),
        None => primary,
    };

    // The executor is the final, blocking loop.
    feeder_onchain::run_oracle_updater(filters_rx, primary_writer, backup, shutdown.clone()).await;
    Ok(())
}

/// Spawn a processor (and its collector/scrapers) under a fresh child
/// token. When @trigger_rx is None a new trigger channel is created and
/// swapped into the slot.
#[allow(clippy::too_many_arguments)]
async fn spawn_processor(
    exchange_pairs: Vec<ExchangePair>,
    pools: Vec<Pool>,
    filters_tx: mpsc::Sender<Vec<FilterPoint>>,
    trigger_rx: Option<mpsc::Receiver<DateTime<Utc>>>,
    trigger_slot: &TriggerSlot,
    quoter: Arc<dyn UsdQuoter>,
    deps: ScraperDeps,
    shutdown: &CancellationToken,
) -> CancellationToken {
    let trigger_rx = match trigger_rx {
        Some(rx) => rx,
        None => {
            let (tx, rx) = mpsc::channel(1);
            *trigger_slot.write().await = tx;
            rx
        }
    };
    let token = shutdown.child_token();
    tokio::spawn(feeder_processor::run_processor(
        exchange_pairs,
        pools,
        filters_tx,
        trigger_rx,
        token.clone(),
        quoter,
        deps,
        ProcessorConfig::from_env(),
    ));
    token
}

/// Watch the combined pairs file and restart the processor stack on change.
#[allow(clippy::too_many_arguments)]
fn spawn_reload_handler(
    config_dir: PathBuf,
    pools: Vec<Pool>,
    filters_tx: mpsc::Sender<Vec<FilterPoint>>,
    trigger_slot: TriggerSlot,
    quoter: Arc<dyn UsdQuoter>,
    deps: ScraperDeps,
    shutdown: CancellationToken,
    mut processor_token: CancellationToken,
) {
    let pairs_path = config_dir.join("exchange_pairs").join("pairs.json");
    let seed = match watcher::read_pairs_file(&pairs_path) {
        Ok(config) => watcher::config_hash(&config),
        Err(e) => {
            warn!(path = %pairs_path.display(), error = %e, "No combined pairs file, hot reload disabled");
            return;
        }
    };

    let (changes_tx, mut changes_rx) = mpsc::channel::<CombinedPairsFile>(1);
    tokio::spawn(watcher::watch_pairs_file(
        pairs_path,
        Duration::from_secs(feeder_config::CONFIG_RELOAD_SECONDS),
        seed,
        changes_tx,
        shutdown.clone(),
    ));

    tokio::spawn(async move {
        while let Some(config) = changes_rx.recv().await {
            let exchange_pairs = pairs_from_combined(&config, &config_dir);
            info!(pairs = exchange_pairs.len(), "Detected config change, restarting processor");

            // Cancel the old stack, let its channels drain, then rebuild.
            processor_token.cancel();
            tokio::time::sleep(RELOAD_SETTLE).await;

            processor_token = spawn_processor(
                exchange_pairs,
                pools.clone(),
                filters_tx.clone(),
                None,
                &trigger_slot,
                quoter.clone(),
                deps.clone(),
                &shutdown,
            )
            .await;
        }
    });
}

/// Load markets from the environment or from the config directory.
fn load_markets(args: &Args, config_dir: &Path) -> Result<(Vec<ExchangePair>, Vec<Pool>)> {
    if !args.config_files {
        let raw_pairs = env_or("EXCHANGEPAIRS", "Crypto.com:BTC-USDT,Crypto.com:BTC-USD");
        let venues: HashSet<String> = raw_pairs
            .split(',')
            .filter_map(|entry| entry.trim().split(':').next())
            .map(str::to_string)
            .collect();
        let symbol_maps: HashMap<String, _> = venues
            .into_iter()
            .map(|venue| {
                let symbols = feeder_config::symbol_map(config_dir, &venue);
                (venue, symbols)
            })
            .collect();
        let pairs = feeder_config::exchange_pairs_from_env(&raw_pairs, &symbol_maps)
            .context("parse EXCHANGEPAIRS")?;
        let pools = feeder_config::pools_from_env(&env_or("POOLS", "")).context("parse POOLS")?;
        return Ok((pairs, pools));
    }

    let mut pairs = Vec::new();
    let mut pools = Vec::new();
    for venue in env_or("EXCHANGES", "UniswapV2,Binance,Simulation").split(',') {
        let venue = venue.trim();
        let exchange = exchange_by_name(venue)
            .with_context(|| format!("scraper for {venue} not available"))?;
        if exchange.centralized {
            pairs.extend(
                feeder_config::pairs_from_config(config_dir, venue)
                    .with_context(|| format!("pairs config for {venue}"))?,
            );
        } else {
            pools.extend(
                feeder_config::pools_from_config(config_dir, venue)
                    .with_context(|| format!("pools config for {venue}"))?,
            );
        }
    }
    Ok((pairs, pools))
}

/// Start metrics pushing/serving when configured. Returns the metrics
/// handle when pushing is enabled so oracle updates can be recorded.
fn start_metrics(
    exchange_pairs: &[ExchangePair],
    pools: &[Pool],
    deployed_contract: &str,
    balance_source: Arc<ContractWriter>,
    operator: alloy::primitives::Address,
    shutdown: &CancellationToken,
) -> Result<Option<Arc<FeederMetrics>>> {
    let pushgateway_url = env_or("PUSHGATEWAY_URL", "");
    let auth_user = env_or("PUSHGATEWAY_USER", "");
    let auth_password = env_or("PUSHGATEWAY_PASSWORD", "");
    let push_enabled = !pushgateway_url.is_empty() && !auth_user.is_empty() && !auth_password.is_empty();
    let serve_enabled = env_or("ENABLE_METRICS_SERVER", "false").to_lowercase() == "true";

    if !push_enabled && !serve_enabled {
        info!("Metrics disabled");
        return Ok(None);
    }

    let metrics = Arc::new(FeederMetrics::new()?);
    metrics
        .contract
        .with_label_values(&[deployed_contract])
        .set(1.0);
    for pair in exchange_pairs {
        metrics
            .exchange_pairs
            .with_label_values(&[&pair.identifier()])
            .set(1.0);
    }
    for pool in pools {
        metrics
            .pools
            .with_label_values(&[&pool.exchange.name, &pool.address])
            .set(1.0);
    }

    // Gas wallet balance, refreshed on the push cadence.
    {
        let metrics = metrics.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = tokio::time::sleep(Duration::from_secs(30)) => {
                        match balance_source.native_balance(operator).await {
                            Ok(balance) => metrics.gas_balance.set(balance),
                            Err(e) => warn!(error = %e, "Failed to fetch gas balance"),
                        }
                    }
                }
            }
        });
    }

    if push_enabled {
        let hostname = env_or("HOSTNAME", "feeder");
        let job_name =
            feeder_telemetry::make_job_name(&hostname, &env_or("NODE_OPERATOR_NAME", ""));
        tokio::spawn(feeder_telemetry::push_loop(
            metrics.clone(),
            pushgateway_url,
            job_name,
            auth_user,
            auth_password,
            shutdown.clone(),
        ));
    }
    if serve_enabled {
        let port: u16 = env_or("METRICS_PORT", "9090").parse().context("parse METRICS_PORT")?;
        let metrics = metrics.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = feeder_telemetry::serve_metrics(metrics, port, shutdown).await {
                warn!(error = %e, "Metrics server stopped");
            }
        });
    }

    Ok(Some(metrics))
}

/// Oracle writer that stamps the last-update gauge on success.
struct InstrumentedWriter {
    inner: Arc<ContractWriter>,
    metrics: Arc<FeederMetrics>,
}

#[async_trait]
impl OracleWriter for InstrumentedWriter {
    async fn set_multiple_values(
        &self,
        keys: Vec<String>,
        values: Vec<U256>,
    ) -> OnchainResult<String> {
        let tx_hash = self.inner.set_multiple_values(keys, values).await?;
        self.metrics.record_oracle_update();
        Ok(tx_hash)
    }
}
