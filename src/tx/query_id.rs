//! Query id allocation for bridge messages
//!
//! Handles:
//! - Random ids (default)
//! - Monotonic ids derived from wall-clock milliseconds, strictly increasing
//!   within the process

use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIdStrategy {
    #[default]
    Random,
    Monotonic,
}

/// Hands out 64-bit query ids
#[derive(Debug)]
pub struct QueryIdSource {
    strategy: QueryIdStrategy,
    /// Last monotonic id handed out
    last: AtomicU64,
}

impl QueryIdSource {
    pub fn new(strategy: QueryIdStrategy) -> Self {
        Self {
            strategy,
            last: AtomicU64::new(0),
        }
    }

    /// Next query id
    pub fn next(&self) -> u64 {
        let id = match self.strategy {
            QueryIdStrategy::Random => rand::random::<u64>(),
            QueryIdStrategy::Monotonic => self.next_monotonic(),
        };
        debug!("Allocated query id {}", id);
        id
    }

    fn next_monotonic(&self) -> u64 {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        // Low 16 bits leave room for ids issued within the same millisecond
        let candidate = millis << 16;

        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate.max(last.wrapping_add(1)))
            })
            .unwrap_or_else(|last| last);
        candidate.max(previous.wrapping_add(1))
    }
}

impl Default for QueryIdSource {
    fn default() -> Self {
        Self::new(QueryIdStrategy::default())
    }
}
