use std::fmt;

use biznesplan_core::{DomainError, OrderStatus};
use biznesplan_storage::StorageError;

/// Errors that can occur while driving an order through its lifecycle.
#[derive(Debug)]
pub enum PipelineError {
    /// Validation, decode, or state machine violation from the domain layer.
    Domain(DomainError),
    /// The order was cancelled; the caller must stop without further side
    /// effects.
    OrderCancelled { order_id: String },
    /// The order already reached `completed` or `failed`; no further
    /// transitions exist.
    TerminalState {
        order_id: String,
        status: OrderStatus,
    },
    /// The operation expects the order in one specific stage.
    WrongStage {
        order_id: String,
        expected: OrderStatus,
        found: OrderStatus,
    },
    /// The operation only applies while the order sits in an active
    /// pipeline stage (fetching_data, generating, reviewing, refining).
    NotAnActiveStage {
        order_id: String,
        status: OrderStatus,
    },
    /// Progress went backwards within an active stage.
    ProgressRegression {
        order_id: String,
        from: u8,
        to: u8,
    },
    /// The operation requires a child record that was never attached.
    MissingChildRecord {
        order_id: String,
        record: String,
    },
    /// Underlying storage failure, including OCC conflicts surfaced to the
    /// caller for retry.
    Storage(StorageError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Domain(e) => write!(f, "{}", e),
            PipelineError::OrderCancelled { order_id } => {
                write!(f, "order {} is cancelled", order_id)
            }
            PipelineError::TerminalState { order_id, status } => {
                write!(f, "order {} is terminal ({})", order_id, status)
            }
            PipelineError::WrongStage {
                order_id,
                expected,
                found,
            } => {
                write!(
                    f,
                    "order {} is in '{}', operation expects '{}'",
                    order_id, found, expected
                )
            }
            PipelineError::NotAnActiveStage { order_id, status } => {
                write!(
                    f,
                    "order {} is in '{}', which is not an active pipeline stage",
                    order_id, status
                )
            }
            PipelineError::ProgressRegression { order_id, from, to } => {
                write!(
                    f,
                    "progress for order {} went backwards: {}% -> {}%",
                    order_id, from, to
                )
            }
            PipelineError::MissingChildRecord { order_id, record } => {
                write!(f, "order {} has no {} record", order_id, record)
            }
            PipelineError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<DomainError> for PipelineError {
    fn from(value: DomainError) -> Self {
        PipelineError::Domain(value)
    }
}

impl From<StorageError> for PipelineError {
    fn from(value: StorageError) -> Self {
        PipelineError::Storage(value)
    }
}
