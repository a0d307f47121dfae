//! Contract bindings
//!
//! Every binding wraps a `ContractView`, the single get-method capability
//! shared by the jetton wallet and the treasury contracts.

pub mod jetton_wallet;
pub mod treasury;

pub use jetton_wallet::JettonWallet;
pub use treasury::{Treasury, TreasuryKind};

use crate::chain::{BlockRef, ChainRpc, StackValue, ViewResult};
use crate::error::{ExecutorError, ExecutorResult};
use crate::tvm::TonAddress;

use std::sync::Arc;
use tracing::debug;

/// Read-only handle on a deployed contract
#[derive(Clone)]
pub struct ContractView {
    name: String,
    address: TonAddress,
    rpc: Arc<dyn ChainRpc>,
}

impl ContractView {
    pub fn new(name: impl Into<String>, address: TonAddress, rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            name: name.into(),
            address,
            rpc,
        }
    }

    pub fn address(&self) -> &TonAddress {
        &self.address
    }

    pub fn rpc(&self) -> &Arc<dyn ChainRpc> {
        &self.rpc
    }

    /// Run a get-method against the latest state
    pub async fn view(&self, method: &str, args: Vec<StackValue>) -> ExecutorResult<ViewResult> {
        self.call(method, args, None).await
    }

    /// Run a get-method against the state at `block`
    pub async fn view_at(
        &self,
        block: BlockRef,
        method: &str,
        args: Vec<StackValue>,
    ) -> ExecutorResult<ViewResult> {
        self.call(method, args, Some(block)).await
    }

    /// TVM treats both 0 and 1 as a successful computation; anything else
    /// is a `GetMethod` error.
    async fn call(
        &self,
        method: &str,
        args: Vec<StackValue>,
        at: Option<BlockRef>,
    ) -> ExecutorResult<ViewResult> {
        let result = self
            .rpc
            .run_get_method(&self.address, method, args, at)
            .await?;
        debug!(
            "{}.{} -> exit {} ({} stack entries)",
            self.name,
            method,
            result.exit_code,
            result.stack.len()
        );

        if result.exit_code != 0 && result.exit_code != 1 {
            return Err(ExecutorError::GetMethod {
                contract: format!("{} ({})", self.name, self.address),
                method: method.to_string(),
                exit_code: result.exit_code,
            });
        }
        Ok(result)
    }

    /// Native balance of the contract in nanotons
    pub async fn native_balance(&self) -> ExecutorResult<u128> {
        self.rpc.native_balance(&self.address).await
    }
}
