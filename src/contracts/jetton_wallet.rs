//! Source jetton wallet binding

use super::ContractView;
use crate::chain::ChainRpc;
use crate::error::ExecutorResult;
use crate::tvm::TonAddress;

use std::sync::Arc;

/// Jetton wallet holding the USDT to bridge
#[derive(Clone)]
pub struct JettonWallet {
    view: ContractView,
}

impl JettonWallet {
    pub fn new(address: TonAddress, rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            view: ContractView::new("jetton_wallet", address, rpc),
        }
    }

    /// Current jetton balance: first entry of `get_wallet_data`
    /// (balance, owner, master, wallet code)
    pub async fn balance(&self) -> ExecutorResult<u128> {
        self.view.view("get_wallet_data", vec![]).await?.coins(0)
    }
}
