//! TON bridge executor - sweeps USDT jetton balances into bridge treasuries
//!
//! The executor watches the USDT jetton wallets of every configured route and,
//! once a wallet holds at least the route's minimum, sends a bridge request to
//! the route's treasury with enough TON attached to cover the bridge fees.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod chain;
mod config;
mod contracts;
mod error;
mod fees;
mod metrics;
mod tasks;
mod tvm;
mod tx;
mod wallet;

use chain::{ChainRpc, TonCenterProvider, TransactionWaiter};
use config::Settings;
use metrics::MetricsServer;
use tasks::{RouteTask, Scheduler};
use tvm::TonAddress;
use tx::QueryIdSource;
use wallet::{SigningWallet, WalletV3R2};

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up .env before anything reads the environment
    dotenvy::dotenv().ok();

    // Initialize logging
    init_logging();

    info!("Starting TON bridge executor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} routes",
        settings.enabled_routes().len()
    );

    let cancel = CancellationToken::new();

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        let shutdown = cancel.clone();
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Chain access
    let provider: Arc<dyn ChainRpc> = Arc::new(
        TonCenterProvider::new(settings.chain.clone())
            .context("Failed to create toncenter client")?,
    );
    let block = provider
        .current_block()
        .await
        .context("Failed to reach toncenter")?;
    info!("Connected to TON, masterchain block {}", block.seqno);

    let waiter = TransactionWaiter::new(
        provider.clone(),
        settings.executor.tx_poll_interval(),
        settings.executor.tx_timeout(),
    );
    let query_ids = Arc::new(QueryIdSource::new(settings.executor.query_id));

    // Wallets are shared by every route that signs with the same address
    let mut wallets: HashMap<TonAddress, Arc<dyn SigningWallet>> = HashMap::new();
    let mut routes = Vec::new();

    for (name, route) in settings.enabled_routes() {
        let wallet_config = settings.wallet_for(route);
        let address = tvm::parse_address(&wallet_config.address)
            .with_context(|| format!("Invalid wallet address for route {}", name))?;

        let wallet = match wallets.get(&address) {
            Some(wallet) => wallet.clone(),
            None => {
                let wallet: Arc<dyn SigningWallet> = Arc::new(
                    WalletV3R2::connect(provider.clone(), wallet_config, waiter.clone())
                        .await
                        .with_context(|| format!("Failed to open wallet for route {}", name))?,
                );
                wallets.insert(address, wallet.clone());
                wallet
            }
        };

        let task = RouteTask::from_config(
            name,
            route,
            &settings.executor,
            provider.clone(),
            wallet,
            query_ids.clone(),
            waiter.clone(),
        )
        .context("Invalid route configuration")?;
        routes.push(task);
    }

    if routes.is_empty() {
        anyhow::bail!("No route is enabled");
    }
    info!("{} routes initialized", routes.len());

    // Start scheduler
    let scheduler = Scheduler::new(
        routes,
        settings.executor.poll_interval(),
        settings.executor.abort_on_startup_failure,
    );
    let mut scheduler_handle = tokio::spawn(scheduler.run(cancel.clone()));

    info!("TON bridge executor is running");

    // Wait for shutdown signal or the scheduler giving up
    let outcome = tokio::select! {
        res = &mut scheduler_handle => res,
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping...");
            cancel.cancel();
            scheduler_handle.await
        }
    };

    // Graceful shutdown
    cancel.cancel();
    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    outcome
        .context("Scheduler task panicked")?
        .context("Scheduler stopped")?;

    info!("TON bridge executor stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,ton_bridge_executor=debug,reqwest=warn,hyper=warn")
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
