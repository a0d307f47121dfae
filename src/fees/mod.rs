//! Fee snapshots and attached-value computation
//!
//! A `FeeSnapshot` is the fee breakdown a treasury reports through
//! `get_full_data`. It is immutable: a refresh builds a new one.

pub mod strategy;

pub use strategy::ValueStrategy;

use crate::chain::BlockRef;
use crate::tvm::{Cell, TonAddress};

use num_bigint::BigInt;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// One named fee or cost the attached value has to cover
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeComponent {
    pub name: &'static str,
    /// Nanotons
    pub amount: u128,
    /// Part of the minimum the treasury accepts regardless of its own balance
    pub mandatory: bool,
}

/// Routing data carried next to the fees
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Address(TonAddress),
    Cell(Cell),
    Int(BigInt),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Address(address) => write!(f, "{}", address),
            MetadataValue::Cell(cell) => write!(f, "cell {}", hex::encode(cell.cell_hash())),
            MetadataValue::Int(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeeSnapshot {
    components: Vec<FeeComponent>,
    max_bridge_amount: Option<u128>,
    metadata: BTreeMap<&'static str, MetadataValue>,
    block: Option<BlockRef>,
    fetched_at: Instant,
}

impl FeeSnapshot {
    pub fn new(
        components: Vec<FeeComponent>,
        max_bridge_amount: Option<u128>,
        metadata: BTreeMap<&'static str, MetadataValue>,
        block: Option<BlockRef>,
    ) -> Self {
        Self {
            components,
            max_bridge_amount,
            metadata,
            block,
            fetched_at: Instant::now(),
        }
    }

    /// Sum of every component
    pub fn total_required_value(&self) -> u128 {
        self.components
            .iter()
            .fold(0u128, |acc, c| acc.saturating_add(c.amount))
    }

    /// Sum of the mandatory components only
    pub fn minimum_required_value(&self) -> u128 {
        self.components
            .iter()
            .filter(|c| c.mandatory)
            .fold(0u128, |acc, c| acc.saturating_add(c.amount))
    }

    /// Largest amount the treasury accepts in one bridge, if it declares one
    pub fn max_bridge_amount(&self) -> Option<u128> {
        self.max_bridge_amount
    }

    pub fn components(&self) -> &[FeeComponent] {
        &self.components
    }

    /// Routing data in key order
    pub fn metadata(&self) -> impl Iterator<Item = (&'static str, &MetadataValue)> + '_ {
        self.metadata.iter().map(|(k, v)| (*k, v))
    }

    /// Masterchain block whose state the fees were read from
    pub fn block(&self) -> Option<BlockRef> {
        self.block
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() >= max_age
    }
}
