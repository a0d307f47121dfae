//! Per-route evaluation and execution

use crate::chain::{ChainRpc, TransactionWaiter};
use crate::config::{ExecutorConfig, RouteConfig};
use crate::contracts::{JettonWallet, Treasury};
use crate::error::{ExecutorError, ExecutorResult};
use crate::fees::{FeeSnapshot, ValueStrategy};
use crate::metrics;
use crate::tvm;
use crate::tx::{verifier, BridgeTrigger, QueryIdSource};
use crate::wallet::SigningWallet;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What a single run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// Balance below the threshold, nothing sent
    Skipped { balance: u128, min_bridge_amount: u128 },
    Bridged {
        amount: u128,
        value: u128,
        tx_hash: String,
    },
}

impl RunReport {
    pub fn outcome(&self) -> &'static str {
        match self {
            RunReport::Skipped { .. } => "skipped",
            RunReport::Bridged { .. } => "bridged",
        }
    }
}

/// Sweeps one source jetton wallet into one treasury
pub struct RouteTask {
    name: String,
    source: JettonWallet,
    treasury: Treasury,
    trigger: BridgeTrigger,
    strategy: ValueStrategy,
    min_bridge_amount: u128,
    /// `None` until the treasury fees have been read once
    snapshot: Option<FeeSnapshot>,
    /// Re-read the snapshot once it is older than this
    snapshot_max_age: Option<Duration>,
}

impl std::fmt::Debug for RouteTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTask")
            .field("name", &self.name)
            .field("strategy", &self.strategy)
            .field("min_bridge_amount", &self.min_bridge_amount)
            .field("snapshot", &self.snapshot)
            .field("snapshot_max_age", &self.snapshot_max_age)
            .finish_non_exhaustive()
    }
}

impl RouteTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        source: JettonWallet,
        treasury: Treasury,
        trigger: BridgeTrigger,
        strategy: ValueStrategy,
        min_bridge_amount: u128,
        snapshot: Option<FeeSnapshot>,
        snapshot_max_age: Option<Duration>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            treasury,
            trigger,
            strategy,
            min_bridge_amount,
            snapshot,
            snapshot_max_age,
        }
    }

    /// Build an unbound route from its configuration.
    ///
    /// Nothing is read from the chain here: the fee snapshot is loaded by the
    /// first run, and retried by every later run until it succeeds.
    pub fn from_config(
        name: &str,
        route: &RouteConfig,
        executor: &ExecutorConfig,
        rpc: Arc<dyn ChainRpc>,
        wallet: Arc<dyn SigningWallet>,
        query_ids: Arc<QueryIdSource>,
        waiter: TransactionWaiter,
    ) -> ExecutorResult<Self> {
        Self::configure(name, route, executor, rpc, wallet, query_ids, waiter)
            .map_err(|e| e.for_route(name))
    }

    fn configure(
        name: &str,
        route: &RouteConfig,
        executor: &ExecutorConfig,
        rpc: Arc<dyn ChainRpc>,
        wallet: Arc<dyn SigningWallet>,
        query_ids: Arc<QueryIdSource>,
        waiter: TransactionWaiter,
    ) -> ExecutorResult<Self> {
        let treasury_address = tvm::parse_address(&route.treasury_address)?;
        let source_address = tvm::parse_address(&route.source_wallet_address)?;
        let min_bridge_amount = route.min_bridge_amount()?;
        let strategy = route.value_strategy()?;

        info!(
            "Route {}: {} -> {} ({} treasury, {:?}, min {}, signer {})",
            name,
            source_address,
            treasury_address,
            route.kind,
            strategy,
            min_bridge_amount,
            wallet.address()
        );

        let treasury = Treasury::new(route.kind, treasury_address.clone(), rpc.clone());
        let source = JettonWallet::new(source_address, rpc);

        let destination_waiter = executor.verify_destination.then_some(waiter);
        let trigger = BridgeTrigger::new(
            route.kind,
            treasury_address,
            wallet,
            query_ids,
            destination_waiter,
        );

        Ok(Self::new(
            name,
            source,
            treasury,
            trigger,
            strategy,
            min_bridge_amount,
            None,
            executor.fee_snapshot_max_age(),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate the route once and bridge when the balance allows it
    pub async fn run(&mut self, cancel: &CancellationToken) -> ExecutorResult<RunReport> {
        if self.snapshot.is_none() {
            self.snapshot = Some(self.load_snapshot().await?);
            info!("Route {}: treasury fees loaded", self.name);
        }

        let balance = self.source.balance().await?;
        metrics::record_source_balance(&self.name, balance);

        if balance < self.min_bridge_amount {
            debug!(
                "Route {}: balance {} below minimum {}",
                self.name, balance, self.min_bridge_amount
            );
            return Ok(RunReport::Skipped {
                balance,
                min_bridge_amount: self.min_bridge_amount,
            });
        }

        let treasury_balance = if self.strategy.needs_treasury_balance() {
            let b = self.treasury.native_balance().await?;
            metrics::record_treasury_balance(&self.name, b);
            b
        } else {
            0
        };

        // A failed refresh leaves the route unbound until the next run
        let snapshot = match self.snapshot.take() {
            Some(current) if !self.is_stale(&current) => current,
            Some(stale) => {
                debug!(
                    "Route {}: fee snapshot is {:?} old, refreshing",
                    self.name,
                    stale.age()
                );
                self.load_snapshot().await?
            }
            None => self.load_snapshot().await?,
        };

        let amount = match snapshot.max_bridge_amount() {
            Some(max) if balance > max => {
                info!(
                    "Route {}: balance {} above treasury cap, bridging {}",
                    self.name, balance, max
                );
                max
            }
            _ => balance,
        };
        let value = self.strategy.required_value(&snapshot, treasury_balance);
        self.snapshot = Some(snapshot);

        let record = self.trigger.send(amount, value, cancel).await?;
        verifier::classify(record.as_ref()).into_result("wallet transaction", |_| None)?;

        // Success implies a record
        let tx = record.ok_or_else(|| ExecutorError::TransactionMissing {
            context: "wallet transaction".to_string(),
        })?;
        self.trigger.verify_destination(&tx, cancel).await?;

        metrics::record_bridge(&self.name, amount, value);
        info!(
            "Route {}: bridged {} with {} nanoton in tx {}",
            self.name, amount, value, tx.hash
        );

        Ok(RunReport::Bridged {
            amount,
            value,
            tx_hash: tx.hash,
        })
    }

    fn is_stale(&self, snapshot: &FeeSnapshot) -> bool {
        self.snapshot_max_age
            .is_some_and(|max_age| snapshot.is_stale(max_age))
    }

    async fn load_snapshot(&self) -> ExecutorResult<FeeSnapshot> {
        let snapshot = self.treasury.fetch_fee_snapshot().await?;
        metrics::record_fee_refresh(&self.name);
        Ok(snapshot)
    }
}
