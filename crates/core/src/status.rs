//! Order lifecycle states and audit log severity levels.
//!
//! Both enums persist as lowercase strings. Decoding goes through
//! [`OrderStatus::decode`] / [`LogLevel::decode`], which fail loudly on an
//! unrecognized string -- an unknown persisted value is a
//! forward-compatibility error, never a silent default.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Processing status of an order.
///
/// The forward path is pending -> fetching_data -> generating -> reviewing
/// -> refining -> completed, where reviewing and refining may cycle.
/// `failed` and `cancelled` are reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created, processing not started.
    Pending,
    /// Fetching registry data and market research.
    FetchingData,
    /// Generating the business plan document.
    Generating,
    /// Reviewer checking quality.
    Reviewing,
    /// Generator applying reviewer feedback.
    Refining,
    /// Document ready.
    Completed,
    /// Unrecoverable error, `error_message` populated.
    Failed,
    /// Cancelled on external request.
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::FetchingData => "fetching_data",
            OrderStatus::Generating => "generating",
            OrderStatus::Reviewing => "reviewing",
            OrderStatus::Refining => "refining",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Decode a persisted status string.
    pub fn decode(value: &str) -> Result<OrderStatus, DomainError> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "fetching_data" => Ok(OrderStatus::FetchingData),
            "generating" => Ok(OrderStatus::Generating),
            "reviewing" => Ok(OrderStatus::Reviewing),
            "refining" => Ok(OrderStatus::Refining),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::UnknownStatus {
                value: other.to_string(),
            }),
        }
    }

    /// Terminal states have no outgoing edges.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    /// Active pipeline stages: progress-bearing and retryable in place.
    pub fn is_active_stage(self) -> bool {
        matches!(
            self,
            OrderStatus::FetchingData
                | OrderStatus::Generating
                | OrderStatus::Reviewing
                | OrderStatus::Refining
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edges of the lifecycle state machine.
///
/// Active stages carry a self-edge for in-stage retry. An order leaving
/// `generating` can only enter `reviewing` on the forward path -- there is
/// no shortcut to `refining` or `completed`.
pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Pending => &[FetchingData, Failed, Cancelled],
        FetchingData => &[FetchingData, Generating, Failed, Cancelled],
        Generating => &[Generating, Reviewing, Failed, Cancelled],
        Reviewing => &[Reviewing, Refining, Completed, Failed, Cancelled],
        Refining => &[Refining, Reviewing, Failed, Cancelled],
        Completed | Failed | Cancelled => &[],
    }
}

/// Validate a single status change against the lifecycle edges.
pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), DomainError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(DomainError::IllegalTransition { from, to })
    }
}

/// Severity of a process log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    /// Decode a persisted level string.
    pub fn decode(value: &str) -> Result<LogLevel, DomainError> {
        match value {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(DomainError::UnknownLogLevel {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        let all = [
            OrderStatus::Pending,
            OrderStatus::FetchingData,
            OrderStatus::Generating,
            OrderStatus::Reviewing,
            OrderStatus::Refining,
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
        ];
        for status in all {
            assert_eq!(OrderStatus::decode(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_string_is_an_error() {
        let err = OrderStatus::decode("archived").unwrap_err();
        assert_eq!(
            err,
            DomainError::UnknownStatus {
                value: "archived".to_string()
            }
        );
    }

    #[test]
    fn terminal_states_have_no_edges() {
        for status in [
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
        ] {
            assert!(allowed_transitions(status).is_empty());
        }
    }

    #[test]
    fn generating_cannot_skip_review() {
        assert!(validate_transition(OrderStatus::Generating, OrderStatus::Completed).is_err());
        assert!(validate_transition(OrderStatus::Generating, OrderStatus::Refining).is_err());
        assert!(validate_transition(OrderStatus::Generating, OrderStatus::Reviewing).is_ok());
    }

    #[test]
    fn review_and_refine_cycle() {
        assert!(validate_transition(OrderStatus::Reviewing, OrderStatus::Refining).is_ok());
        assert!(validate_transition(OrderStatus::Refining, OrderStatus::Reviewing).is_ok());
    }

    #[test]
    fn cancel_reachable_from_every_non_terminal() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::FetchingData,
            OrderStatus::Generating,
            OrderStatus::Reviewing,
            OrderStatus::Refining,
        ] {
            assert!(validate_transition(status, OrderStatus::Cancelled).is_ok());
        }
    }

    #[test]
    fn active_stages_can_retry_in_place() {
        for status in [
            OrderStatus::FetchingData,
            OrderStatus::Generating,
            OrderStatus::Reviewing,
            OrderStatus::Refining,
        ] {
            assert!(validate_transition(status, status).is_ok());
        }
        assert!(validate_transition(OrderStatus::Pending, OrderStatus::Pending).is_err());
    }

    #[test]
    fn log_level_decode_is_loud() {
        assert_eq!(LogLevel::decode("info").unwrap(), LogLevel::Info);
        assert!(LogLevel::decode("fatal").is_err());
    }
}
