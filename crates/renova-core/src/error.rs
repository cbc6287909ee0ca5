//! Error types for renewal engine operations.
//!
//! This module defines the single error surface shared by the domain
//! computations and the async engine. Errors carry enough context to be
//! actionable at the call site and classify themselves for retry and
//! monitoring decisions.
//!
//! # Classification
//!
//! - **Transient** errors (network resets, command-bus timeouts,
//!   rate limits) are retried by the command dispatcher.
//! - **Permanent** errors (command-bus rejections) propagate unchanged.
//! - **NotFound** is usually a benign race: the entity disappeared between
//!   the triggering event and the reconcile that handled it.
//! - **InconsistentState** aborts the current operation and leaves the
//!   surface unchanged; the caller decides whether to alarm.

use std::fmt;

use thiserror::Error;

/// Errors that can occur during engine operations.
///
/// These cover the full lifecycle of a reconcile: graph-store reads,
/// domain validation, command dispatch, and deadline enforcement.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    /// A contract or opportunity was unexpectedly absent.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity kind that was missing.
        entity: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// Stored state violated an engine invariant.
    #[error("inconsistent state: {reason}")]
    InconsistentState {
        /// Which invariant was violated.
        reason: String,
    },

    /// The requested operation is forbidden by policy.
    #[error("operation not allowed: {reason}")]
    OperationNotAllowed {
        /// Why the operation was refused.
        reason: String,
    },

    /// A retryable failure from a collaborator.
    #[error("transient failure in {operation}: {reason}")]
    Transient {
        /// The operation that failed.
        operation: String,
        /// The underlying failure.
        reason: String,
    },

    /// A non-retryable rejection from a collaborator.
    #[error("permanent failure in {operation}: {reason}")]
    Permanent {
        /// The operation that failed.
        operation: String,
        /// The underlying rejection.
        reason: String,
    },

    /// The caller's deadline elapsed before the operation completed.
    #[error("deadline exceeded in {operation}")]
    Canceled {
        /// The operation that was cut off.
        operation: String,
    },
}

/// Convenience alias used throughout both crates.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Creates a new not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a new inconsistent-state error.
    #[must_use]
    pub fn inconsistent(reason: impl Into<String>) -> Self {
        Self::InconsistentState {
            reason: reason.into(),
        }
    }

    /// Creates a new operation-not-allowed error.
    #[must_use]
    pub fn not_allowed(reason: impl Into<String>) -> Self {
        Self::OperationNotAllowed {
            reason: reason.into(),
        }
    }

    /// Creates a new transient error.
    #[must_use]
    pub fn transient(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new permanent error.
    #[must_use]
    pub fn permanent(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permanent {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new canceled error.
    #[must_use]
    pub fn canceled(operation: impl Into<String>) -> Self {
        Self::Canceled {
            operation: operation.into(),
        }
    }

    /// Returns `true` if the dispatcher should retry this failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns `true` if this error is a benign race rather than a defect.
    ///
    /// NotFound races resolve themselves on the next triggering event; every
    /// other kind needs operator attention or caller handling.
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the error classification for metrics and monitoring.
    #[must_use]
    pub const fn error_class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::Lookup,
            Self::InconsistentState { .. } => ErrorClass::State,
            Self::OperationNotAllowed { .. } => ErrorClass::Policy,
            Self::Transient { .. } | Self::Permanent { .. } => ErrorClass::Transport,
            Self::Canceled { .. } => ErrorClass::Deadline,
        }
    }
}

/// Error classification for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Entity lookup failures.
    Lookup,
    /// Invariant violations in stored state.
    State,
    /// Policy refusals.
    Policy,
    /// Collaborator transport failures.
    Transport,
    /// Deadline expiry.
    Deadline,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup => write!(f, "lookup"),
            Self::State => write!(f, "state"),
            Self::Policy => write!(f, "policy"),
            Self::Transport => write!(f, "transport"),
            Self::Deadline => write!(f, "deadline"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_benign_and_not_retryable() {
        let err = EngineError::not_found("contract", "c-123");
        assert!(err.to_string().contains("contract"));
        assert!(err.to_string().contains("c-123"));
        assert!(err.is_benign());
        assert!(!err.is_transient());
        assert_eq!(err.error_class(), ErrorClass::Lookup);
    }

    #[test]
    fn transient_is_retryable() {
        let err = EngineError::transient("update_opportunity", "connection reset");
        assert!(err.is_transient());
        assert!(!err.is_benign());
        assert_eq!(err.error_class(), ErrorClass::Transport);
    }

    #[test]
    fn permanent_is_not_retryable() {
        let err = EngineError::permanent("update_opportunity", "rejected by aggregate");
        assert!(!err.is_transient());
        assert_eq!(err.error_class(), ErrorClass::Transport);
    }

    #[test]
    fn inconsistent_state_carries_reason() {
        let err = EngineError::inconsistent("2 open renewal opportunities for contract c-1");
        assert!(err.to_string().contains("2 open renewal opportunities"));
        assert_eq!(err.error_class(), ErrorClass::State);
    }

    #[test]
    fn not_allowed_and_canceled_classes() {
        assert_eq!(
            EngineError::not_allowed("contract has invoices").error_class(),
            ErrorClass::Policy
        );
        assert_eq!(
            EngineError::canceled("reconcile_arr").error_class(),
            ErrorClass::Deadline
        );
    }

    #[test]
    fn error_class_display() {
        assert_eq!(ErrorClass::Lookup.to_string(), "lookup");
        assert_eq!(ErrorClass::State.to_string(), "state");
        assert_eq!(ErrorClass::Policy.to_string(), "policy");
        assert_eq!(ErrorClass::Transport.to_string(), "transport");
        assert_eq!(ErrorClass::Deadline.to_string(), "deadline");
    }
}
