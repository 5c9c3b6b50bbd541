use super::events::EventPublisher;
use crate::domain::booking::BookingRequest;
use crate::domain::events::LifecycleEvent;
use crate::domain::identity::{BookingId, PaymentId};
use crate::domain::payment::{Payment, PaymentKind};
use crate::domain::ports::{ChangeSet, PaymentFilter, StoreRef};
use crate::error::{LedgerError, Result};
use std::future::Future;
use tracing::{debug, error};

/// The outcome of planning one transition: rows to write, events to emit
/// once written, and the value handed back to the caller.
pub struct Planned<T> {
    pub changes: ChangeSet,
    pub events: Vec<LifecycleEvent>,
    pub output: T,
}

impl<T> Planned<T> {
    pub fn new(changes: ChangeSet, output: T) -> Self {
        Self {
            changes,
            events: Vec::new(),
            output,
        }
    }

    pub fn with_event(mut self, event: LifecycleEvent) -> Self {
        self.events.push(event);
        self
    }
}

/// Read-validate-write against the store with optimistic versioning.
///
/// A plan reads the current rows, validates the transition and stages the
/// new rows. If the commit loses a race the plan is run again against fresh
/// state, so the loser observes the winner's write and fails validation.
#[derive(Clone)]
pub struct UnitOfWork {
    store: StoreRef,
    events: EventPublisher,
    attempts: u32,
}

impl UnitOfWork {
    pub fn new(store: StoreRef, events: EventPublisher, attempts: u32) -> Self {
        Self {
            store,
            events,
            attempts: attempts.max(1),
        }
    }

    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut plan: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Planned<T>>>,
    {
        let mut attempt = 1;
        loop {
            let planned = plan().await?;
            match self.store.commit(planned.changes).await {
                Ok(()) => {
                    for event in planned.events {
                        self.events.publish(event);
                    }
                    return Ok(planned.output);
                }
                Err(LedgerError::Conflict { entity, id }) if attempt < self.attempts => {
                    debug!(operation, entity, id = %id, attempt, "version conflict; re-planning");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn booking(&self, id: BookingId) -> Result<BookingRequest> {
        self.store
            .booking(id)
            .await?
            .ok_or(LedgerError::BookingNotFound(id))
    }

    pub async fn payment(&self, id: PaymentId) -> Result<Payment> {
        self.store
            .payment(id)
            .await?
            .ok_or(LedgerError::PaymentNotFound(id))
    }

    /// The booking that owns `payment`. A missing owner is an invariant
    /// violation.
    pub async fn owner_of(&self, payment: &Payment) -> Result<BookingRequest> {
        match self.store.booking(payment.booking_id).await? {
            Some(booking) => Ok(booking),
            None => Err(invariant(format!(
                "payment {} references missing booking {}",
                payment.id, payment.booking_id
            ))),
        }
    }

    pub async fn payments_of(&self, booking: BookingId, kind: PaymentKind) -> Result<Vec<Payment>> {
        let filter = PaymentFilter {
            booking: Some(booking),
            kind: Some(kind),
            status: None,
        };
        let mut payments = self.store.payments(&filter).await?;
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    /// The active collection if there is one, otherwise the latest closed one.
    pub async fn current_collection(&self, booking: BookingId) -> Result<Option<Payment>> {
        let collections = self.payments_of(booking, PaymentKind::Collection).await?;
        let active = collections.iter().rev().find(|p| p.is_active()).cloned();
        Ok(active.or_else(|| collections.last().cloned()))
    }

    pub async fn payout(&self, booking: BookingId) -> Result<Option<Payment>> {
        Ok(self
            .payments_of(booking, PaymentKind::Payout)
            .await?
            .into_iter()
            .last())
    }
}

/// Logs loudly and builds the error for a broken invariant.
pub fn invariant(message: String) -> LedgerError {
    error!(invariant = %message, "invariant violated; aborting operation");
    LedgerError::InvariantViolation(message)
}
