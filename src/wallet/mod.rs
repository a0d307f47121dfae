//! Signing wallet
//!
//! The route tasks only see the `SigningWallet` trait: hand it an internal
//! message, get back the finalized transaction of the wallet (or `None` when
//! it never showed up).

pub mod mnemonic;
pub mod v3r2;

pub use v3r2::WalletV3R2;

use crate::chain::TransactionRecord;
use crate::error::ExecutorResult;
use crate::tvm::{Cell, TonAddress};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

/// Send mode flags of an outgoing internal message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendMode(u8);

impl SendMode {
    /// Forward fees are paid from the wallet balance, not from the value
    pub const PAY_GAS_SEPARATELY: SendMode = SendMode(1);

    pub fn bits(&self) -> u8 {
        self.0
    }
}

/// Internal message the wallet should emit
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub mode: SendMode,
    pub destination: TonAddress,
    pub bounce: bool,
    /// Nanotons
    pub value: u128,
    pub body: Cell,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SigningWallet: Send + Sync {
    /// Address of the wallet contract
    fn address(&self) -> TonAddress;

    /// Sign and broadcast `message`, then wait for the wallet transaction
    async fn send_and_wait(
        &self,
        message: OutgoingMessage,
        cancel: &CancellationToken,
    ) -> ExecutorResult<Option<TransactionRecord>>;
}
