//! Waiting for message inclusion
//!
//! TON messages are fire-and-forget: the only way to learn what happened is to
//! look up the transaction that consumed the message once the indexer has seen
//! it. Indexed transactions belong to committed masterchain blocks, so a found
//! record is treated as final.

use super::{ChainRpc, TransactionRecord};
use crate::error::{ExecutorError, ExecutorResult};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polls the indexer until the transaction caused by a message shows up
#[derive(Clone)]
pub struct TransactionWaiter {
    /// Chain access
    rpc: Arc<dyn ChainRpc>,
    /// Delay between lookups
    poll_interval: Duration,
    /// Give up after this long
    timeout: Duration,
}

impl TransactionWaiter {
    /// Create a new waiter
    pub fn new(rpc: Arc<dyn ChainRpc>, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            rpc,
            poll_interval,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for the transaction that consumed `msg_hash`.
    ///
    /// Returns `Ok(None)` when nothing was indexed before the timeout. Lookup
    /// errors are logged and retried until the deadline; cancellation aborts
    /// the wait with `ExecutorError::Cancelled`.
    pub async fn wait_for(
        &self,
        msg_hash: &str,
        cancel: &CancellationToken,
    ) -> ExecutorResult<Option<TransactionRecord>> {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.rpc.transactions_by_message(msg_hash).await {
                Ok(mut txs) if !txs.is_empty() => {
                    // Lowest lt is the transaction that consumed the message
                    txs.sort_by_key(|tx| tx.lt);
                    let tx = txs.swap_remove(0);
                    info!(
                        "Message {} included in tx {} (lt {}) after {} lookups",
                        msg_hash, tx.hash, tx.lt, attempts
                    );
                    return Ok(Some(tx));
                }
                Ok(_) => {
                    debug!("Message {} not indexed yet (lookup {})", msg_hash, attempts);
                }
                Err(e) => {
                    warn!("Lookup for message {} failed: {}", msg_hash, e);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Message {} not found within {:?}",
                    msg_hash, self.timeout
                );
                return Ok(None);
            }

            let pause = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
