//! Bridge trigger: builds the treasury message and sends it through the wallet

use super::query_id::QueryIdSource;
use super::verifier;
use crate::chain::{TransactionRecord, TransactionWaiter};
use crate::contracts::TreasuryKind;
use crate::error::{ExecutorError, ExecutorResult};
use crate::tvm::{self, Cell, CellBuilder, TonAddress};
use crate::wallet::{OutgoingMessage, SendMode, SigningWallet};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Sends bridge requests to one treasury
pub struct BridgeTrigger {
    kind: TreasuryKind,
    treasury: TonAddress,
    /// Signing wallet
    wallet: Arc<dyn SigningWallet>,
    query_ids: Arc<QueryIdSource>,
    /// Set when the treasury transaction should be checked too
    destination_waiter: Option<TransactionWaiter>,
}

impl BridgeTrigger {
    pub fn new(
        kind: TreasuryKind,
        treasury: TonAddress,
        wallet: Arc<dyn SigningWallet>,
        query_ids: Arc<QueryIdSource>,
        destination_waiter: Option<TransactionWaiter>,
    ) -> Self {
        Self {
            kind,
            treasury,
            wallet,
            query_ids,
            destination_waiter,
        }
    }

    /// `op:uint32 query_id:uint64 amount:Coins extension:(Maybe ^Cell)`
    pub fn build_body(opcode: u32, query_id: u64, amount: u128) -> ExecutorResult<Cell> {
        let mut builder = CellBuilder::new();
        builder
            .store_u32(32, opcode)?
            .store_u64(64, query_id)?
            .store_coins(&tvm::coins(amount))?
            .store_bit(false)?; // no extension
        Ok(builder.build()?)
    }

    /// Send `amount` jettons worth of bridge request with `value` nanotons
    /// attached and wait for the wallet transaction
    pub async fn send(
        &self,
        amount: u128,
        value: u128,
        cancel: &CancellationToken,
    ) -> ExecutorResult<Option<TransactionRecord>> {
        let query_id = self.query_ids.next();
        let body = Self::build_body(self.kind.opcode(), query_id, amount)?;

        info!(
            "Triggering {} bridge of {} to {} with {} nanoton (query id {})",
            self.kind, amount, self.treasury, value, query_id
        );

        let message = OutgoingMessage {
            mode: SendMode::PAY_GAS_SEPARATELY,
            destination: self.treasury.clone(),
            bounce: true,
            value,
            body,
        };
        self.wallet.send_and_wait(message, cancel).await
    }

    /// Follow the bridge message out of `wallet_tx` and check the treasury
    /// transaction it caused
    pub async fn verify_destination(
        &self,
        wallet_tx: &TransactionRecord,
        cancel: &CancellationToken,
    ) -> ExecutorResult<()> {
        let Some(waiter) = &self.destination_waiter else {
            return Ok(());
        };

        let msg_hash = wallet_tx.out_msg_hashes.first().ok_or_else(|| {
            ExecutorError::Wallet(format!(
                "wallet transaction {} emitted no bridge message",
                wallet_tx.hash
            ))
        })?;
        debug!("Following bridge message {} to {}", msg_hash, self.treasury);

        let treasury_tx = waiter.wait_for(msg_hash, cancel).await?;
        let kind = self.kind;
        verifier::classify(treasury_tx.as_ref()).into_result(
            &format!("treasury transaction for message {}", msg_hash),
            |code| kind.describe_exit_code(code),
        )?;

        if let Some(tx) = treasury_tx {
            info!("Treasury {} accepted bridge in tx {}", self.treasury, tx.hash);
        }
        Ok(())
    }
}
