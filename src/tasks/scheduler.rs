//! Periodic execution of all routes
//!
//! Every route runs once at startup, then on each tick of a fixed interval.
//! Routes run one after another; a failing route is logged and the others
//! still run. A route whose treasury fees could not be read stays scheduled
//! and reads them again on its next run.

use super::route::RouteTask;
use crate::error::{ExecutorError, ExecutorResult};
use crate::metrics;

use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Scheduler {
    routes: Vec<RouteTask>,
    interval: Duration,
    /// Stop when any route fails during the startup run
    abort_on_startup_failure: bool,
}

impl Scheduler {
    pub fn new(routes: Vec<RouteTask>, interval: Duration, abort_on_startup_failure: bool) -> Self {
        Self {
            routes,
            interval,
            abort_on_startup_failure,
        }
    }

    /// Run until `cancel` fires.
    ///
    /// Returns the first startup failure when the startup policy says so.
    pub async fn run(mut self, cancel: CancellationToken) -> ExecutorResult<()> {
        info!(
            "Scheduler started: {} routes every {:?}",
            self.routes.len(),
            self.interval
        );

        let mut failures = self.run_all(&cancel).await;
        if self.abort_on_startup_failure && !failures.is_empty() {
            error!("{} routes failed at startup, aborting", failures.len());
            return Err(failures.swap_remove(0));
        }

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_all(&cancel).await;
                }
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// One pass over every route, returning the failures
    async fn run_all(&mut self, cancel: &CancellationToken) -> Vec<ExecutorError> {
        let mut failures = Vec::new();

        for route in &mut self.routes {
            if cancel.is_cancelled() {
                break;
            }

            match route.run(cancel).await {
                Ok(report) => metrics::record_run(route.name(), report.outcome()),
                Err(ExecutorError::Cancelled) => {
                    info!("Route {} interrupted by shutdown", route.name());
                    break;
                }
                Err(e) => {
                    let e = e.for_route(route.name());
                    metrics::record_failure(route.name(), &e);
                    if e.is_retryable() {
                        warn!("{}", e);
                    } else {
                        error!("{}", e);
                    }
                    failures.push(e);
                }
            }
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainRpc;
    use crate::contracts::TreasuryKind;
    use crate::tasks::route::tests::{
        chain_with_balance, expect_treasury, route, snapshot, unbound_route, wallet_tx,
    };
    use crate::wallet::MockSigningWallet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn failing_route() -> RouteTask {
        let mut rpc = MockChainRpc::new();
        rpc.expect_run_get_method().returning(|_, _, _, _| {
            Err(ExecutorError::Rpc {
                endpoint: "test".into(),
                message: "unavailable".into(),
            })
        });
        route(rpc, MockSigningWallet::new(), TreasuryKind::Eth, snapshot(None))
    }

    fn counting_route(balance: u64, lookups: Arc<AtomicUsize>) -> RouteTask {
        let mut wallet = MockSigningWallet::new();
        wallet
            .expect_send_and_wait()
            .returning(|_, _| Ok(Some(wallet_tx(0))));
        route(
            chain_with_balance(balance, lookups),
            wallet,
            TreasuryKind::Tac,
            snapshot(None),
        )
    }

    #[tokio::test]
    async fn test_startup_failure_aborts_when_configured() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(
            vec![failing_route(), counting_route(1, lookups.clone())],
            Duration::from_secs(10),
            true,
        );

        let err = scheduler.run(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("Route test_eth"));
        // The healthy route still ran
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_isolated_and_ticks_repeat() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(
            vec![failing_route(), counting_route(200_000_000, lookups.clone())],
            Duration::from_secs(10),
            false,
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(cancel.clone()));

        // Startup run plus ticks at 10s and 20s
        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();

        assert!(handle.await.unwrap().is_ok());
        assert_eq!(lookups.load(Ordering::SeqCst), 3);
    }

    /// Route whose treasury fees fail to load `failures` times
    fn unreachable_treasury_route(failures: usize, lookups: Arc<AtomicUsize>) -> RouteTask {
        let mut rpc = chain_with_balance(200_000_000, lookups);
        expect_treasury(&mut rpc, failures);
        let mut wallet = MockSigningWallet::new();
        wallet
            .expect_send_and_wait()
            .returning(|_, _| Ok(Some(wallet_tx(0))));
        unbound_route(rpc, wallet, TreasuryKind::Tac)
    }

    #[tokio::test]
    async fn test_unreadable_treasury_aborts_startup_when_configured() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(
            vec![unreachable_treasury_route(1, lookups.clone())],
            Duration::from_secs(10),
            true,
        );

        let err = scheduler.run(CancellationToken::new()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Route test_tac"));
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_treasury_is_retried_on_next_tick() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(
            vec![unreachable_treasury_route(1, lookups.clone())],
            Duration::from_secs(10),
            false,
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(cancel.clone()));

        // Startup read fails, the 10s tick loads the fees and bridges
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(lookups.load(Ordering::SeqCst), 1);

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(
            vec![counting_route(1, lookups.clone())],
            Duration::from_secs(10),
            true,
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(scheduler.run(cancel).await.is_ok());
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
    }
}
