//! Classification of finalized transactions

use crate::chain::{ComputePhase, TransactionRecord};
use crate::error::{ExecutorError, ExecutorResult};

/// Verdict for one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Success,
    ComputeFailed(i32),
    ComputeSkipped(String),
    Missing,
}

impl TransactionOutcome {
    /// Convert to a result. `describe` names exit codes the callee defines
    /// and `context` says which transaction went missing.
    pub fn into_result(
        self,
        context: &str,
        describe: impl Fn(i32) -> Option<&'static str>,
    ) -> ExecutorResult<()> {
        match self {
            TransactionOutcome::Success => Ok(()),
            TransactionOutcome::ComputeFailed(exit_code) => Err(ExecutorError::ComputeFailed {
                exit_code,
                detail: describe(exit_code),
            }),
            TransactionOutcome::ComputeSkipped(reason) => {
                Err(ExecutorError::ComputeSkipped { reason })
            }
            TransactionOutcome::Missing => Err(ExecutorError::TransactionMissing {
                context: context.to_string(),
            }),
        }
    }
}

/// Classify an optional transaction record
pub fn classify(record: Option<&TransactionRecord>) -> TransactionOutcome {
    let Some(record) = record else {
        return TransactionOutcome::Missing;
    };

    match &record.compute_phase {
        Some(ComputePhase::Executed { exit_code: 0, .. }) => TransactionOutcome::Success,
        Some(ComputePhase::Executed { exit_code, .. }) => {
            TransactionOutcome::ComputeFailed(*exit_code)
        }
        Some(ComputePhase::Skipped { reason }) => TransactionOutcome::ComputeSkipped(reason.clone()),
        None => TransactionOutcome::ComputeSkipped("no compute phase".to_string()),
    }
}
