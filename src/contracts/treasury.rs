//! Bridge treasury contracts
//!
//! Each treasury kind exposes `get_full_data` with its own stack layout. The
//! layout tables below drive the decoding into a `FeeSnapshot`.

use super::ContractView;
use crate::chain::{BlockRef, ChainRpc, ViewResult};
use crate::error::ExecutorResult;
use crate::fees::{FeeComponent, FeeSnapshot, MetadataValue, ValueStrategy};
use crate::tvm::TonAddress;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Storage reserve attached on top of the balance-adjusted value
const ETH_STORAGE_MARGIN: u128 = 5_000_000;

/// Which bridge a treasury feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreasuryKind {
    /// TAC via the cross-chain layer jetton proxy
    Tac,
    /// Ethereum via a LayerZero OApp
    Eth,
}

/// One entry of a `get_full_data` stack
#[derive(Debug, Clone, Copy)]
enum Slot {
    Fee { name: &'static str, mandatory: bool },
    MaxBridgeAmount,
    Address(&'static str),
    Cell(&'static str),
    Int(&'static str),
}

const TAC_LAYOUT: &[Slot] = &[
    Slot::Cell("evm_data"),
    Slot::Address("ccl_jetton_proxy"),
    Slot::Address("jetton_master"),
    Slot::Cell("jetton_wallet_code"),
    Slot::Fee {
        name: "protocol_fee",
        mandatory: false,
    },
    Slot::Fee {
        name: "tac_executors_fee",
        mandatory: false,
    },
    Slot::Fee {
        name: "ton_executors_fee",
        mandatory: false,
    },
    Slot::Fee {
        name: "jetton_transfer_ton_amount",
        mandatory: true,
    },
    Slot::Fee {
        name: "treasury_fee",
        mandatory: true,
    },
];

const ETH_LAYOUT: &[Slot] = &[
    Slot::Address("jetton_master"),
    Slot::Cell("jetton_wallet_code"),
    Slot::Address("oapp"),
    Slot::Int("dst_evm_address"),
    Slot::Int("eth_eid"),
    Slot::MaxBridgeAmount,
    Slot::Fee {
        name: "native_fee",
        mandatory: false,
    },
    Slot::Fee {
        name: "estimated_gas_cost",
        mandatory: false,
    },
    Slot::Fee {
        name: "jetton_transfer_gas_cost",
        mandatory: true,
    },
    Slot::Fee {
        name: "treasury_fee",
        mandatory: true,
    },
];

impl TreasuryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreasuryKind::Tac => "tac",
            TreasuryKind::Eth => "eth",
        }
    }

    /// Operation selector of the bridge message
    pub fn opcode(&self) -> u32 {
        match self {
            TreasuryKind::Tac => 0x1d35_0b50,
            TreasuryKind::Eth => 0x6e6c_1865,
        }
    }

    pub fn default_strategy(&self) -> ValueStrategy {
        match self {
            TreasuryKind::Tac => ValueStrategy::Fixed,
            TreasuryKind::Eth => ValueStrategy::BalanceAdjusted {
                storage_margin: ETH_STORAGE_MARGIN,
            },
        }
    }

    /// Meaning of a treasury exit code
    pub fn describe_exit_code(&self, exit_code: i32) -> Option<&'static str> {
        match exit_code {
            100 => Some("not enough msg value"),
            101 => Some("not enough msg value for additional fee"),
            102 if *self == TreasuryKind::Eth => Some("bridge amount too big"),
            _ => None,
        }
    }

    fn layout(&self) -> &'static [Slot] {
        match self {
            TreasuryKind::Tac => TAC_LAYOUT,
            TreasuryKind::Eth => ETH_LAYOUT,
        }
    }

    /// Decode a `get_full_data` result read at `block`
    pub fn decode_full_data(
        &self,
        result: &ViewResult,
        block: Option<BlockRef>,
    ) -> ExecutorResult<FeeSnapshot> {
        let mut components = Vec::new();
        let mut max_bridge_amount = None;
        let mut metadata = BTreeMap::new();

        for (index, slot) in self.layout().iter().enumerate() {
            match *slot {
                Slot::Fee { name, mandatory } => components.push(FeeComponent {
                    name,
                    amount: result.coins(index)?,
                    mandatory,
                }),
                Slot::MaxBridgeAmount => max_bridge_amount = Some(result.coins(index)?),
                Slot::Address(name) => {
                    metadata.insert(name, MetadataValue::Address(result.address(index)?));
                }
                Slot::Cell(name) => {
                    metadata.insert(name, MetadataValue::Cell(result.cell(index)?.clone()));
                }
                Slot::Int(name) => {
                    metadata.insert(name, MetadataValue::Int(result.int(index)?.clone()));
                }
            }
        }

        Ok(FeeSnapshot::new(components, max_bridge_amount, metadata, block))
    }
}

impl fmt::Display for TreasuryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination treasury of a route
#[derive(Clone)]
pub struct Treasury {
    kind: TreasuryKind,
    view: ContractView,
}

impl Treasury {
    pub fn new(kind: TreasuryKind, address: TonAddress, rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            kind,
            view: ContractView::new(format!("{}_treasury", kind), address, rpc),
        }
    }

    pub fn address(&self) -> &TonAddress {
        self.view.address()
    }

    /// Read the fee breakdown from the state of the latest masterchain block
    pub async fn fetch_fee_snapshot(&self) -> ExecutorResult<FeeSnapshot> {
        let block = self.view.rpc().current_block().await?;
        let result = self.view.view_at(block, "get_full_data", vec![]).await?;
        let snapshot = self.kind.decode_full_data(&result, Some(block))?;

        info!(
            "Fee snapshot for {} treasury {} at block {:?}: total {} min {} cap {:?}",
            self.kind,
            self.address(),
            snapshot.block().map(|b| b.seqno),
            snapshot.total_required_value(),
            snapshot.minimum_required_value(),
            snapshot.max_bridge_amount()
        );
        for component in snapshot.components() {
            debug!("  {} = {}", component.name, component.amount);
        }
        for (key, value) in snapshot.metadata() {
            debug!("  {}: {}", key, value);
        }

        Ok(snapshot)
    }

    /// Native balance of the treasury in nanotons
    pub async fn native_balance(&self) -> ExecutorResult<u128> {
        self.view.native_balance().await
    }
}
