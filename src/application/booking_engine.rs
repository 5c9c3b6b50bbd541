use super::collaborators::{CatalogGateway, ProofGate};
use super::unit_of_work::{Planned, UnitOfWork, invariant};
use crate::domain::booking::{
    BookingRequest, BookingStatus, Decision, DurationLimits, NewBooking,
};
use crate::domain::events::LifecycleEvent;
use crate::domain::identity::{Actor, BookingId, UserId};
use crate::domain::money::{ProofRef, Rating};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{BookingFilter, ChangeSet};
use crate::domain::settlement::SettlementCalculator;
use crate::error::Result;
use chrono::Utc;
use tracing::info;

/// Owns the booking state machine: creation, tutor response, completion,
/// rating and cancellation.
#[derive(Clone)]
pub struct BookingEngine {
    uow: UnitOfWork,
    catalog: CatalogGateway,
    proofs: ProofGate,
    calculator: SettlementCalculator,
    limits: DurationLimits,
}

impl BookingEngine {
    pub fn new(
        uow: UnitOfWork,
        catalog: CatalogGateway,
        proofs: ProofGate,
        calculator: SettlementCalculator,
        limits: DurationLimits,
    ) -> Self {
        Self {
            uow,
            catalog,
            proofs,
            calculator,
            limits,
        }
    }

    /// Creates a `pending` booking, snapshotting the tutor's rate and name.
    pub async fn create_booking(
        &self,
        actor: &Actor,
        request: NewBooking,
    ) -> Result<BookingRequest> {
        request.validate(actor, self.limits)?;
        let tutor = self.catalog.tutor(&request.tutor).await?;
        let tutor = &tutor;

        let booking = self
            .uow
            .run("create_booking", || {
                let request = request.clone();
                async move {
                    let now = Utc::now();
                    let booking =
                        BookingRequest::request(actor, request, tutor, self.limits, now)?;
                    let mut changes = ChangeSet::new();
                    let booking = changes.insert_booking(booking);
                    let event = LifecycleEvent::BookingRequested {
                        booking_id: booking.id,
                        student: booking.student.clone(),
                        tutor: booking.tutor.clone(),
                        at: now,
                    };
                    Ok(Planned::new(changes, booking).with_event(event))
                }
            })
            .await?;

        info!(
            booking_id = %booking.id,
            student = %booking.student,
            tutor = %booking.tutor,
            hours = %booking.duration,
            "booking requested"
        );
        Ok(booking)
    }

    /// Tutor accepts or declines a `pending` booking. Accepting opens the
    /// collection payment in the same commit.
    pub async fn respond_to_booking(
        &self,
        actor: &Actor,
        booking_id: BookingId,
        decision: Decision,
    ) -> Result<BookingRequest> {
        let booking = self
            .uow
            .run("respond_to_booking", || async move {
                let now = Utc::now();
                let mut booking = self.uow.booking(booking_id).await?;
                let mut changes = ChangeSet::new();

                match decision {
                    Decision::Accept => {
                        booking.accept(actor, now)?;
                        if let Some(existing) = self.uow.current_collection(booking_id).await?
                            && existing.is_active()
                        {
                            return Err(invariant(format!(
                                "pending booking {} already has active collection {}",
                                booking_id, existing.id
                            )));
                        }
                        let amount = self
                            .calculator
                            .gross_amount(booking.hourly_rate, booking.duration)?;
                        let collection =
                            changes.insert_payment(Payment::collection(&booking, amount, now));
                        let booking = changes.update_booking(booking);
                        let event = LifecycleEvent::BookingAccepted {
                            booking_id,
                            collection_id: collection.id,
                            amount,
                            at: now,
                        };
                        Ok(Planned::new(changes, booking).with_event(event))
                    }
                    Decision::Decline => {
                        booking.decline(actor, now)?;
                        let booking = changes.update_booking(booking);
                        let event = LifecycleEvent::BookingDeclined { booking_id, at: now };
                        Ok(Planned::new(changes, booking).with_event(event))
                    }
                }
            })
            .await?;

        info!(booking_id = %booking.id, status = %booking.status, "tutor responded to booking");
        Ok(booking)
    }

    /// Tutor (or admin) records that the session took place. Requires a
    /// confirmed collection and a session proof.
    pub async fn submit_session_proof(
        &self,
        actor: &Actor,
        booking_id: BookingId,
        proof: Option<ProofRef>,
    ) -> Result<BookingRequest> {
        if let Some(proof) = &proof {
            self.proofs.ensure_exists(proof).await?;
        }

        let booking = self
            .uow
            .run("submit_session_proof", || {
                let proof = proof.clone();
                async move {
                    let now = Utc::now();
                    let mut booking = self.uow.booking(booking_id).await?;
                    let collection = self.uow.current_collection(booking_id).await?;
                    if booking.status == BookingStatus::PaymentApproved && collection.is_none() {
                        return Err(invariant(format!(
                            "booking {} is payment_approved without a collection",
                            booking_id
                        )));
                    }
                    let confirmed = collection
                        .as_ref()
                        .is_some_and(|c| c.status == PaymentStatus::Confirmed);

                    booking.complete(actor, proof, confirmed, now)?;
                    let mut changes = ChangeSet::new();
                    let booking = changes.update_booking(booking);
                    let event = LifecycleEvent::SessionCompleted { booking_id, at: now };
                    Ok(Planned::new(changes, booking).with_event(event))
                }
            })
            .await?;

        info!(booking_id = %booking.id, "session completed");
        Ok(booking)
    }

    /// Student rates a completed session, once.
    pub async fn rate_session(
        &self,
        actor: &Actor,
        booking_id: BookingId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<BookingRequest> {
        let rating = Rating::new(rating)?;
        self.uow
            .run("rate_session", || {
                let comment = comment.clone();
                async move {
                    let now = Utc::now();
                    let mut booking = self.uow.booking(booking_id).await?;
                    booking.rate(actor, rating, comment, now)?;
                    let mut changes = ChangeSet::new();
                    let booking = changes.update_booking(booking);
                    let event = LifecycleEvent::SessionRated {
                        booking_id,
                        rating: rating.value(),
                        at: now,
                    };
                    Ok(Planned::new(changes, booking).with_event(event))
                }
            })
            .await
    }

    /// Student or admin cancels before payment is approved. A pending
    /// collection is closed in the same commit.
    pub async fn cancel_booking(
        &self,
        actor: &Actor,
        booking_id: BookingId,
    ) -> Result<BookingRequest> {
        let booking = self
            .uow
            .run("cancel_booking", || async move {
                let now = Utc::now();
                let mut booking = self.uow.booking(booking_id).await?;
                let was_awaiting_payment = booking.status == BookingStatus::AwaitingPayment;
                booking.cancel(actor, now)?;

                let mut changes = ChangeSet::new();
                if was_awaiting_payment
                    && let Some(mut collection) = self.uow.current_collection(booking_id).await?
                    && collection.status == PaymentStatus::Pending
                {
                    collection.close_for_cancellation(actor, now);
                    changes.update_payment(collection);
                }
                let booking = changes.update_booking(booking);
                let event = LifecycleEvent::BookingCancelled {
                    booking_id,
                    by: actor.id.clone(),
                    at: now,
                };
                Ok(Planned::new(changes, booking).with_event(event))
            })
            .await?;

        info!(booking_id = %booking.id, by = %actor.id, "booking cancelled");
        Ok(booking)
    }

    pub async fn booking(&self, booking_id: BookingId) -> Result<BookingRequest> {
        self.uow.booking(booking_id).await
    }

    /// Bookings matching `filter`, oldest first.
    pub async fn bookings(&self, filter: &BookingFilter) -> Result<Vec<BookingRequest>> {
        let mut bookings = self.uow.store().bookings(filter).await?;
        bookings.sort_by_key(|b| b.created_at);
        Ok(bookings)
    }

    pub async fn bookings_for_party(&self, user: &UserId) -> Result<Vec<BookingRequest>> {
        self.bookings(&BookingFilter {
            party: Some(user.clone()),
            ..BookingFilter::default()
        })
        .await
    }

    pub async fn bookings_by_status(&self, status: BookingStatus) -> Result<Vec<BookingRequest>> {
        self.bookings(&BookingFilter {
            status: Some(status),
            ..BookingFilter::default()
        })
        .await
    }
}
