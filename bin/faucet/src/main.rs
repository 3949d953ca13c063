use alloy::network::EthereumWallet;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use eyre::{eyre, Result};
use faucet::chain::{AlloyTransport, EventSource, LogWatcherSource, ReactiveSource};
use faucet::claim::{ClaimMachine, ClaimState};
use faucet::clock::SystemClock;
use faucet::config::{FaucetConfig, FeedMode};
use faucet::display::{format_countdown, truncate_address};
use faucet::eligibility::{EligibilityEngine, EligibilitySnapshot};
use faucet::feed::{FeedEntry, FeedKind, LiveFeed};
use faucet::stats::StatsMonitor;
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration directory
    #[arg(long, default_value = "./configs/dev")]
    config_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print eligibility and faucet stats once
    Status {
        /// Account to check
        #[arg(long)]
        address: Option<String>,
    },
    /// Follow eligibility, the live feed and stats until Ctrl-C
    Watch {
        /// Account to follow
        #[arg(long)]
        address: Option<String>,
    },
    /// Claim from the faucet with the key in PRIVATE_KEY
    Claim,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting faucet client");

    let config = load_config(&cli.config_path).await?;
    let rpc_url: Url = config
        .network
        .rpc_url
        .parse()
        .map_err(|e| eyre!("Invalid RPC URL {}: {}", config.network.rpc_url, e))?;
    let transport_config = config.transport_config()?;

    tracing::info!(
        rpc_url = %config.network.rpc_url,
        chain_id = config.network.chain_id,
        request = %transport_config.request_address,
        handler = %transport_config.handler_address,
        feed_mode = ?config.feed.mode,
        "Config loaded"
    );

    match cli.command {
        Command::Status { address } => {
            let provider = ProviderBuilder::new().connect_http(rpc_url);
            let transport = Arc::new(AlloyTransport::new(transport_config, provider));
            run_status(&config, transport, parse_address(address)?).await
        }
        Command::Watch { address } => {
            let provider = ProviderBuilder::new().connect_http(rpc_url);
            let transport = Arc::new(AlloyTransport::new(transport_config, provider));
            run_watch(&config, transport, parse_address(address)?).await
        }
        Command::Claim => {
            let private_key = std::env::var("PRIVATE_KEY")
                .map_err(|_| eyre!("PRIVATE_KEY must be set to claim"))?;
            let signer: PrivateKeySigner = private_key.parse()?;
            let address = signer.address();
            let wallet = EthereumWallet::from(signer);

            let provider = ProviderBuilder::new().wallet(wallet).connect_http(rpc_url);
            let transport = Arc::new(AlloyTransport::new(transport_config, provider));
            run_claim(&config, transport, address).await
        }
    }
}

async fn load_config(config_path: &str) -> Result<FaucetConfig> {
    let path = PathBuf::from(config_path).join("faucet.json");

    let config = if path.exists() {
        FaucetConfig::load_from_file(&path).await?
    } else {
        tracing::warn!(path = %path.display(), "faucet.json not found, using defaults");
        FaucetConfig::default()
    };

    Ok(config.with_env_overrides())
}

fn parse_address(address: Option<String>) -> Result<Option<Address>> {
    address
        .map(|a| Address::from_str(&a).map_err(|e| eyre!("Invalid address {}: {}", a, e)))
        .transpose()
}

fn log_snapshot(snapshot: &EligibilitySnapshot) {
    tracing::info!(
        address = ?snapshot.address,
        eligible = snapshot.eligible,
        countdown = %format_countdown(snapshot.seconds_remaining),
        progress = %format!("{:.0}%", snapshot.cooldown_progress() * 100.0),
        balance = %snapshot.current_balance.unwrap_or_default(),
        cap = %snapshot.balance_cap,
        blocked = snapshot.blocked_reason().unwrap_or("-"),
        "Eligibility"
    );
}

fn log_feed_entry(entry: &FeedEntry) {
    match entry.kind {
        FeedKind::Granted => tracing::info!(
            address = %truncate_address(&entry.address),
            amount = %entry.amount.unwrap_or_default(),
            "💧 Granted"
        ),
        FeedKind::Denied => tracing::info!(
            address = %truncate_address(&entry.address),
            reason = entry.reason.as_deref().unwrap_or_default(),
            "🚫 Denied"
        ),
    }
}

async fn run_status<P>(
    config: &FaucetConfig,
    transport: Arc<AlloyTransport<P>>,
    address: Option<Address>,
) -> Result<()>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    if let Err(e) = transport.ensure_chain(config.network.chain_id).await {
        tracing::warn!("⚠️ {}", e);
    }

    let engine = EligibilityEngine::new(transport.clone(), config.engine_config(), Arc::new(SystemClock));
    engine.set_address(address);
    let snapshot = engine.refetch().await;
    log_snapshot(&snapshot);

    let stats = StatsMonitor::new(transport, Duration::from_secs(config.stats.refresh_secs));
    match stats.refresh().await {
        Some(stats) => tracing::info!(
            faucet_balance = %stats.faucet_balance,
            total_granted = %stats.total_granted,
            total_claimers = stats.total_claimers,
            "Faucet stats"
        ),
        None => tracing::warn!("Faucet stats unavailable"),
    }

    Ok(())
}

async fn run_watch<P>(
    config: &FaucetConfig,
    transport: Arc<AlloyTransport<P>>,
    address: Option<Address>,
) -> Result<()>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    if let Err(e) = transport.ensure_chain(config.network.chain_id).await {
        tracing::warn!("⚠️ {}", e);
    }

    let engine = Arc::new(EligibilityEngine::new(
        transport.clone(),
        config.engine_config(),
        Arc::new(SystemClock),
    ));
    engine.set_address(address);
    let _engine_handle = engine.start();

    let source: Arc<dyn EventSource> = match config.feed.mode {
        FeedMode::Watcher => Arc::new(LogWatcherSource::new(
            config.log_watcher_config(),
            transport.provider().clone(),
        )),
        FeedMode::Reactive => Arc::new(ReactiveSource::new(config.reactive_config())),
    };
    let feed = LiveFeed::start(source, transport.config().handler_address);

    let stats = Arc::new(StatsMonitor::new(
        transport.clone(),
        Duration::from_secs(config.stats.refresh_secs),
    ));
    let _stats_task = stats.start();

    let mut snapshot_rx = engine.subscribe();
    let mut feed_rx = feed.subscribe();
    let mut stats_rx = stats.subscribe();
    let mut seen: HashSet<String> = HashSet::new();

    tracing::info!("👀 Watching, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            Ok(()) = snapshot_rx.changed() => {
                let snapshot = *snapshot_rx.borrow_and_update();
                // Countdown ticks are only logged on whole minutes
                if !snapshot.on_cooldown || snapshot.seconds_remaining % 60 == 0 {
                    log_snapshot(&snapshot);
                }
            }
            Ok(()) = feed_rx.changed() => {
                let entries = feed_rx.borrow_and_update().clone();
                for entry in entries.iter().rev().filter(|e| !seen.contains(&e.id)) {
                    log_feed_entry(entry);
                }
                seen = entries.into_iter().map(|e| e.id).collect();
            }
            Ok(()) = stats_rx.changed() => {
                let latest = *stats_rx.borrow_and_update();
                if let Some(stats) = latest {
                    tracing::info!(
                        faucet_balance = %stats.faucet_balance,
                        total_granted = %stats.total_granted,
                        total_claimers = stats.total_claimers,
                        "📊 Faucet stats"
                    );
                }
            }
        }
    }

    Ok(())
}

async fn run_claim<P>(
    config: &FaucetConfig,
    transport: Arc<AlloyTransport<P>>,
    address: Address,
) -> Result<()>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    transport.ensure_chain(config.network.chain_id).await?;

    let engine = Arc::new(EligibilityEngine::new(
        transport.clone(),
        config.engine_config(),
        Arc::new(SystemClock),
    ));
    engine.set_address(Some(address));
    let snapshot = engine.refetch().await;
    log_snapshot(&snapshot);

    if !snapshot.eligible {
        return Err(eyre!(
            "Not eligible to claim: {}",
            snapshot.blocked_reason().unwrap_or("unknown")
        ));
    }

    let _engine_handle = engine.start();
    let refetch = engine.clone();
    let machine = Arc::new(
        ClaimMachine::new(transport.clone(), config.claim_config())
            .with_on_success(Arc::new(move || refetch.request_refetch())),
    );

    let mut rx = machine.subscribe();
    if !machine.initiate_claim() {
        return Err(eyre!("A claim is already in progress"));
    }

    let mut last_state = ClaimState::Idle;
    let outcome = loop {
        let attempt = rx.borrow_and_update().clone();
        if attempt.state != last_state {
            tracing::info!(state = %attempt.state, tx_hash = ?attempt.tx_hash, "Claim state");
            last_state = attempt.state;
        }
        if attempt.state.is_terminal() {
            break attempt;
        }
        rx.changed().await?;
    };

    rx.wait_for(|a| a.state == ClaimState::Idle).await?;

    match outcome.state {
        ClaimState::Success => {
            let snapshot = engine.refetch().await;
            log_snapshot(&snapshot);
            tracing::info!(tx_hash = ?outcome.tx_hash, "✅ Claim complete");
            Ok(())
        }
        _ => Err(eyre!(
            "Claim failed: {}",
            outcome.error_message.unwrap_or_else(|| outcome.state.to_string())
        )),
    }
}
