use crate::domain::identity::{BookingId, PaymentId, Role, UserId};
use thiserror::Error;

/// Broad classes of failure, used by callers to decide whether to retry,
/// refresh or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input shape. Never retried.
    Validation,
    /// Transition not legal for the current state or actor. Refresh and re-evaluate.
    State,
    /// An external collaborator failed or timed out. Safe to retry.
    Collaborator,
    /// Stored data broke an invariant. Indicates a bug.
    Invariant,
    /// I/O, storage or configuration failure.
    Internal,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
    #[error("Student and tutor must be different users")]
    SameParty,
    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
    #[error("Proof reference required to confirm a payment")]
    ProofRequired,
    #[error("Reason required to reject a payment")]
    ReasonRequired,
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Amount out of range: {0}")]
    AmountOverflow(String),

    #[error("Cannot {action} a {entity} in status {from}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        action: &'static str,
    },
    #[error("User {actor} does not own booking {booking} and cannot {action}")]
    NotOwner {
        actor: UserId,
        booking: BookingId,
        action: &'static str,
    },
    #[error("Role {role} is not allowed to {action}")]
    Unauthorized { role: Role, action: &'static str },
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Session for booking {0} has already been rated")]
    AlreadyRated(BookingId),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Booking {0} already has an active collection payment")]
    DuplicateCollection(BookingId),
    #[error("Booking {0} already has a payout payment")]
    DuplicatePayout(BookingId),
    #[error("Payout {0} has already been paid")]
    AlreadyPaid(PaymentId),
    #[error("Booking {0} not found")]
    BookingNotFound(BookingId),
    #[error("Payment {0} not found")]
    PaymentNotFound(PaymentId),
    #[error("Tutor {0} not found in catalog")]
    UnknownTutor(UserId),
    #[error("Proof {0} not found in proof store")]
    UnknownProof(String),
    #[error("Concurrent modification of {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    #[error("{service} unavailable: {message}")]
    Collaborator {
        service: &'static str,
        message: String,
    },
    #[error("{service} timed out after {after_ms}ms")]
    Timeout { service: &'static str, after_ms: u64 },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::InvalidDuration(_)
            | LedgerError::SameParty
            | LedgerError::InvalidRating(_)
            | LedgerError::ProofRequired
            | LedgerError::ReasonRequired
            | LedgerError::ValidationError(_)
            | LedgerError::AmountOverflow(_)
            | LedgerError::UnknownProof(_) => ErrorCategory::Validation,
            LedgerError::InvalidTransition { .. }
            | LedgerError::NotOwner { .. }
            | LedgerError::Unauthorized { .. }
            | LedgerError::PreconditionFailed(_)
            | LedgerError::AlreadyRated(_)
            | LedgerError::InvalidState(_)
            | LedgerError::DuplicateCollection(_)
            | LedgerError::DuplicatePayout(_)
            | LedgerError::AlreadyPaid(_)
            | LedgerError::BookingNotFound(_)
            | LedgerError::PaymentNotFound(_)
            | LedgerError::UnknownTutor(_)
            | LedgerError::Conflict { .. } => ErrorCategory::State,
            LedgerError::Collaborator { .. } | LedgerError::Timeout { .. } => {
                ErrorCategory::Collaborator
            }
            LedgerError::InvariantViolation(_) => ErrorCategory::Invariant,
            _ => ErrorCategory::Internal,
        }
    }

    /// Only collaborator failures are worth retrying; everything else is a
    /// business-rule rejection or a bug.
    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Collaborator
    }

    pub(crate) fn invalid_transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        action: &'static str,
    ) -> Self {
        LedgerError::InvalidTransition {
            entity,
            from: from.to_string(),
            action,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        LedgerError::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_collaborator_errors_are_transient() {
        let timeout = LedgerError::Timeout {
            service: "catalog",
            after_ms: 10,
        };
        assert!(timeout.is_transient());
        assert!(!LedgerError::ProofRequired.is_transient());
        assert!(!LedgerError::invalid_transition("booking", "declined", "accept").is_transient());
        assert_eq!(
            LedgerError::InvariantViolation("x".into()).category(),
            ErrorCategory::Invariant
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = LedgerError::invalid_transition("booking", "completed", "cancel");
        assert_eq!(err.to_string(), "Cannot cancel a booking in status completed");
    }
}
