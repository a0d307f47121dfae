//! Chain module - access to the TON network
//!
//! This module provides:
//! - The `ChainRpc` seam every contract binding and wallet talks through
//! - A toncenter HTTP provider with endpoint failover
//! - A waiter that blocks until a message's transaction is indexed

pub mod finality;
pub mod provider;

pub use finality::TransactionWaiter;
pub use provider::TonCenterProvider;

use crate::error::{ExecutorError, ExecutorResult};
use crate::tvm::{self, Cell, TonAddress};

use async_trait::async_trait;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

#[cfg(test)]
use mockall::automock;

/// Reference to a masterchain block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub seqno: u32,
}

/// One entry of a TVM stack
#[derive(Debug, Clone, PartialEq)]
pub enum StackValue {
    Int(BigInt),
    Cell(Cell),
    Slice(Cell),
    Null,
}

impl StackValue {
    fn type_name(&self) -> &'static str {
        match self {
            StackValue::Int(_) => "int",
            StackValue::Cell(_) => "cell",
            StackValue::Slice(_) => "slice",
            StackValue::Null => "null",
        }
    }
}

/// Result of a get-method call
#[derive(Debug, Clone, PartialEq)]
pub struct ViewResult {
    pub exit_code: i32,
    pub stack: Vec<StackValue>,
}

impl ViewResult {
    fn entry(&self, index: usize, expected: &'static str) -> ExecutorResult<&StackValue> {
        self.stack.get(index).ok_or_else(|| ExecutorError::StackDecode {
            index,
            expected,
            found: format!("end of stack ({} entries)", self.stack.len()),
        })
    }

    /// Integer at `index`
    pub fn int(&self, index: usize) -> ExecutorResult<&BigInt> {
        match self.entry(index, "int")? {
            StackValue::Int(v) => Ok(v),
            other => Err(ExecutorError::StackDecode {
                index,
                expected: "int",
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Non-negative integer at `index` that fits the coins range
    pub fn coins(&self, index: usize) -> ExecutorResult<u128> {
        let value = self.int(index)?;
        if value.is_negative() {
            return Err(ExecutorError::StackDecode {
                index,
                expected: "non-negative amount",
                found: value.to_string(),
            });
        }
        value
            .to_u128()
            .filter(|v| *v <= tvm::MAX_COINS)
            .ok_or_else(|| ExecutorError::StackDecode {
                index,
                expected: "amount within coins range",
                found: value.to_string(),
            })
    }

    /// Cell at `index` (slices are accepted as well)
    pub fn cell(&self, index: usize) -> ExecutorResult<&Cell> {
        match self.entry(index, "cell")? {
            StackValue::Cell(c) | StackValue::Slice(c) => Ok(c),
            other => Err(ExecutorError::StackDecode {
                index,
                expected: "cell",
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Standard address stored in the slice at `index`
    pub fn address(&self, index: usize) -> ExecutorResult<TonAddress> {
        let cell = match self.entry(index, "slice")? {
            StackValue::Slice(c) | StackValue::Cell(c) => c,
            other => {
                return Err(ExecutorError::StackDecode {
                    index,
                    expected: "slice",
                    found: other.type_name().to_string(),
                })
            }
        };
        tvm::load_address(cell)?.ok_or_else(|| ExecutorError::StackDecode {
                index,
                expected: "address",
                found: "addr_none".to_string(),
            })
    }
}

/// Compute phase of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputePhase {
    Executed { success: bool, exit_code: i32 },
    Skipped { reason: String },
}

/// Finalized transaction as reported by the indexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub account: String,
    pub hash: String,
    pub lt: u64,
    pub aborted: bool,
    pub compute_phase: Option<ComputePhase>,
    /// Hashes of outgoing internal messages
    pub out_msg_hashes: Vec<String>,
}

/// Everything the executor needs from a TON node or indexer
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Latest masterchain block
    async fn current_block(&self) -> ExecutorResult<BlockRef>;

    /// Run a get-method against the account state at `at`, or the latest
    /// state when `at` is `None`
    async fn run_get_method(
        &self,
        address: &TonAddress,
        method: &str,
        args: Vec<StackValue>,
        at: Option<BlockRef>,
    ) -> ExecutorResult<ViewResult>;

    /// Native balance of an account in nanotons
    async fn native_balance(&self, address: &TonAddress) -> ExecutorResult<u128>;

    /// Broadcast a serialized external message, returning its hash for lookups
    async fn send_message(&self, boc: Vec<u8>) -> ExecutorResult<String>;

    /// Transactions that consumed a message
    async fn transactions_by_message(&self, msg_hash: &str) -> ExecutorResult<Vec<TransactionRecord>>;
}
