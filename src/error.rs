//! Error types for the TON bridge executor

use thiserror::Error;
use tonlib_core::cell::TonCellError;

/// Main error type for the executor
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error from {endpoint}: {message}")]
    Rpc { endpoint: String, message: String },

    #[error("Rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    #[error("Get-method {method} on {contract} failed with exit code {exit_code}")]
    GetMethod {
        contract: String,
        method: String,
        exit_code: i32,
    },

    #[error("Stack entry {index}: expected {expected}, found {found}")]
    StackDecode {
        index: usize,
        expected: &'static str,
        found: String,
    },

    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Cell error: {0}")]
    Cell(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("transaction failed with exit_code: {exit_code}{}", .detail.map(|d| format!(" ({d})")).unwrap_or_default())]
    ComputeFailed {
        exit_code: i32,
        detail: Option<&'static str>,
    },

    #[error("compute phase skipped due to: {reason}")]
    ComputeSkipped { reason: String },

    #[error("transaction is missing: {context}")]
    TransactionMissing { context: String },

    #[error("Route {route}: {source}")]
    Route {
        route: String,
        #[source]
        source: Box<ExecutorError>,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl ExecutorError {
    /// Check if error is transient and should simply be retried on the next tick
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecutorError::Rpc { .. }
            | ExecutorError::RateLimited { .. }
            | ExecutorError::TransactionMissing { .. } => true,
            ExecutorError::Route { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Stable label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorError::Config(_) => "config",
            ExecutorError::Rpc { .. } => "rpc",
            ExecutorError::RateLimited { .. } => "rate_limited",
            ExecutorError::GetMethod { .. } => "get_method",
            ExecutorError::StackDecode { .. } => "stack_decode",
            ExecutorError::Address(_) => "address",
            ExecutorError::Cell(_) => "cell",
            ExecutorError::Wallet(_) => "wallet",
            ExecutorError::ComputeFailed { .. } => "compute_failed",
            ExecutorError::ComputeSkipped { .. } => "compute_skipped",
            ExecutorError::TransactionMissing { .. } => "transaction_missing",
            ExecutorError::Route { source, .. } => source.kind(),
            ExecutorError::Cancelled => "cancelled",
        }
    }

    /// Attach the route name to an error raised while running or building a route
    pub fn for_route(self, route: &str) -> Self {
        match self {
            ExecutorError::Route { .. } | ExecutorError::Cancelled => self,
            other => ExecutorError::Route {
                route: route.to_string(),
                source: Box::new(other),
            },
        }
    }
}

impl From<TonCellError> for ExecutorError {
    fn from(err: TonCellError) -> Self {
        ExecutorError::Cell(err.to_string())
    }
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_failed_message_includes_detail() {
        let plain = ExecutorError::ComputeFailed {
            exit_code: 2,
            detail: None,
        };
        assert_eq!(plain.to_string(), "transaction failed with exit_code: 2");

        let described = ExecutorError::ComputeFailed {
            exit_code: 102,
            detail: Some("bridge amount too big"),
        };
        assert_eq!(
            described.to_string(),
            "transaction failed with exit_code: 102 (bridge amount too big)"
        );
    }

    #[test]
    fn test_route_wrapper_keeps_kind_and_retryability() {
        let err = ExecutorError::Rpc {
            endpoint: "https://toncenter.com".to_string(),
            message: "connection reset".to_string(),
        }
        .for_route("ton_to_eth");

        assert!(err.is_retryable());
        assert_eq!(err.kind(), "rpc");
        assert!(err.to_string().starts_with("Route ton_to_eth: RPC error"));

        // Wrapping twice does not nest
        let again = err.for_route("other");
        assert!(again.to_string().starts_with("Route ton_to_eth"));
    }
}
