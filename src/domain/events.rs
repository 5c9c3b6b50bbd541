use super::identity::{BookingId, PaymentId, UserId};
use super::money::Money;
use super::payment::DisputeStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle notifications handed to the notifier. Emitted only after the
/// transition that caused them has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    BookingRequested {
        booking_id: BookingId,
        student: UserId,
        tutor: UserId,
        at: DateTime<Utc>,
    },
    BookingAccepted {
        booking_id: BookingId,
        collection_id: PaymentId,
        amount: Money,
        at: DateTime<Utc>,
    },
    BookingDeclined {
        booking_id: BookingId,
        at: DateTime<Utc>,
    },
    BookingCancelled {
        booking_id: BookingId,
        by: UserId,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        booking_id: BookingId,
        at: DateTime<Utc>,
    },
    SessionRated {
        booking_id: BookingId,
        rating: u8,
        at: DateTime<Utc>,
    },
    PaymentProofSubmitted {
        payment_id: PaymentId,
        booking_id: BookingId,
        at: DateTime<Utc>,
    },
    PaymentConfirmed {
        payment_id: PaymentId,
        booking_id: BookingId,
        amount: Money,
        at: DateTime<Utc>,
    },
    PaymentRejected {
        payment_id: PaymentId,
        booking_id: BookingId,
        reason: String,
        at: DateTime<Utc>,
    },
    PaymentRefunded {
        payment_id: PaymentId,
        booking_id: BookingId,
        amount: Money,
        at: DateTime<Utc>,
    },
    DisputeOpened {
        payment_id: PaymentId,
        booking_id: BookingId,
        at: DateTime<Utc>,
    },
    DisputeUpdated {
        payment_id: PaymentId,
        booking_id: BookingId,
        status: DisputeStatus,
        at: DateTime<Utc>,
    },
    PayoutCreated {
        payment_id: PaymentId,
        booking_id: BookingId,
        tutor: UserId,
        amount: Money,
        at: DateTime<Utc>,
    },
    PayoutPaid {
        payment_id: PaymentId,
        booking_id: BookingId,
        tutor: UserId,
        amount: Money,
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::BookingRequested { .. } => "booking_requested",
            LifecycleEvent::BookingAccepted { .. } => "booking_accepted",
            LifecycleEvent::BookingDeclined { .. } => "booking_declined",
            LifecycleEvent::BookingCancelled { .. } => "booking_cancelled",
            LifecycleEvent::SessionCompleted { .. } => "session_completed",
            LifecycleEvent::SessionRated { .. } => "session_rated",
            LifecycleEvent::PaymentProofSubmitted { .. } => "payment_proof_submitted",
            LifecycleEvent::PaymentConfirmed { .. } => "payment_confirmed",
            LifecycleEvent::PaymentRejected { .. } => "payment_rejected",
            LifecycleEvent::PaymentRefunded { .. } => "payment_refunded",
            LifecycleEvent::DisputeOpened { .. } => "dispute_opened",
            LifecycleEvent::DisputeUpdated { .. } => "dispute_updated",
            LifecycleEvent::PayoutCreated { .. } => "payout_created",
            LifecycleEvent::PayoutPaid { .. } => "payout_paid",
        }
    }

    pub fn booking_id(&self) -> BookingId {
        match self {
            LifecycleEvent::BookingRequested { booking_id, .. }
            | LifecycleEvent::BookingAccepted { booking_id, .. }
            | LifecycleEvent::BookingDeclined { booking_id, .. }
            | LifecycleEvent::BookingCancelled { booking_id, .. }
            | LifecycleEvent::SessionCompleted { booking_id, .. }
            | LifecycleEvent::SessionRated { booking_id, .. }
            | LifecycleEvent::PaymentProofSubmitted { booking_id, .. }
            | LifecycleEvent::PaymentConfirmed { booking_id, .. }
            | LifecycleEvent::PaymentRejected { booking_id, .. }
            | LifecycleEvent::PaymentRefunded { booking_id, .. }
            | LifecycleEvent::DisputeOpened { booking_id, .. }
            | LifecycleEvent::DisputeUpdated { booking_id, .. }
            | LifecycleEvent::PayoutCreated { booking_id, .. }
            | LifecycleEvent::PayoutPaid { booking_id, .. } => *booking_id,
        }
    }
}
