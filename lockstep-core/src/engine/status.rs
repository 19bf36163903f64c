//! Run status machine and the status-update channel payload.

use serde::{Deserialize, Serialize};

/// State of a run. Transitions flow from `WarmingUp`/`Running` into exactly
/// one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmStatus {
    /// Replaying history to prime state; orders are not accepted.
    WarmingUp,
    Running,
    /// Operator-issued stop. Terminal.
    Stopped,
    /// A fatal error was stored; the loop exited after the current slice.
    /// Terminal.
    RuntimeError,
    /// Positions were force-closed on request (live mode). Terminal.
    Liquidated,
    /// Operator deleted the run. Terminal.
    Deleted,
    /// The feed ended normally. Terminal.
    Completed,
}

impl AlgorithmStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AlgorithmStatus::Stopped
                | AlgorithmStatus::RuntimeError
                | AlgorithmStatus::Liquidated
                | AlgorithmStatus::Deleted
                | AlgorithmStatus::Completed
        )
    }
}

/// Payload sent on the status channel at every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: AlgorithmStatus,
    pub message: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: AlgorithmStatus) -> Self {
        Self {
            status,
            message: None,
        }
    }

    pub fn with_message(status: AlgorithmStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }
}

/// External stop requests, polled once per slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Stop processing; leave positions as they are.
    Stop,
    /// Close every position, then stop (live mode).
    Liquidate,
    /// The run was deleted by the operator.
    Delete,
}
