use super::collaborators::ProofGate;
use super::unit_of_work::{Planned, UnitOfWork, invariant};
use crate::domain::booking::{BookingRequest, BookingStatus, ensure_role};
use crate::domain::events::LifecycleEvent;
use crate::domain::identity::{Actor, BookingId, PaymentId, Role};
use crate::domain::money::{Money, ProofRef};
use crate::domain::payment::{
    DisputeStatus, Payment, PaymentKind, PaymentStatus, VerificationOutcome,
};
use crate::domain::ports::{ChangeSet, PaymentFilter};
use crate::domain::settlement::{SettlementCalculator, payout_for};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use tracing::info;

/// Verification, dispute and payout workflow over collection and payout
/// payments.
#[derive(Clone)]
pub struct PaymentLedger {
    uow: UnitOfWork,
    proofs: ProofGate,
    calculator: SettlementCalculator,
}

impl PaymentLedger {
    pub fn new(uow: UnitOfWork, proofs: ProofGate, calculator: SettlementCalculator) -> Self {
        Self {
            uow,
            proofs,
            calculator,
        }
    }

    /// Opens a fresh `pending` collection for a booking in
    /// `awaiting_payment`, e.g. after the previous one was rejected. The
    /// amount always comes from the booking's rate snapshot.
    pub async fn open_collection(&self, actor: &Actor, booking_id: BookingId) -> Result<Payment> {
        ensure_role(actor, &[Role::Admin], "open a collection")?;

        let collection = self
            .uow
            .run("open_collection", || async move {
                let now = Utc::now();
                let booking = self.uow.booking(booking_id).await?;
                if booking.status != BookingStatus::AwaitingPayment {
                    return Err(LedgerError::InvalidState(format!(
                        "collections can only be opened for bookings awaiting payment, {} is {}",
                        booking_id, booking.status
                    )));
                }
                if let Some(existing) = self.uow.current_collection(booking_id).await?
                    && existing.is_active()
                {
                    return Err(LedgerError::DuplicateCollection(booking_id));
                }

                let amount = self.gross_for(&booking)?;
                let mut changes = ChangeSet::new();
                let collection =
                    changes.insert_payment(Payment::collection(&booking, amount, now));
                // Re-stage the booking unchanged so a concurrent cancel conflicts.
                changes.update_booking(booking);
                Ok(Planned::new(changes, collection))
            })
            .await?;

        info!(
            payment_id = %collection.id,
            booking_id = %booking_id,
            amount = %collection.amount,
            "collection opened"
        );
        Ok(collection)
    }

    /// Payer evidence: the student for a collection, the platform (admin)
    /// for a payout.
    pub async fn submit_proof(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
        proof: ProofRef,
    ) -> Result<Payment> {
        self.proofs.ensure_exists(&proof).await?;

        let payment = self
            .uow
            .run("submit_payment_proof", || {
                let proof = proof.clone();
                async move {
                    let now = Utc::now();
                    let mut payment = self.uow.payment(payment_id).await?;
                    let booking = self.uow.owner_of(&payment).await?;
                    // A rejected collection may only reopen while it is still
                    // the booking's current one.
                    let current = match payment.kind {
                        PaymentKind::Collection => self
                            .uow
                            .current_collection(booking.id)
                            .await?
                            .is_some_and(|c| c.id == payment_id),
                        PaymentKind::Payout => false,
                    };
                    let awaiting = current && booking.status == BookingStatus::AwaitingPayment;
                    let reopening = payment.kind == PaymentKind::Collection
                        && payment.status == PaymentStatus::Rejected;
                    payment.submit_proof(actor, proof, awaiting, now)?;

                    let mut changes = ChangeSet::new();
                    let payment = changes.update_payment(payment);
                    if reopening {
                        // Reopening races open_collection and cancel_booking,
                        // which both write the booking row.
                        changes.update_booking(booking);
                    }
                    let event = LifecycleEvent::PaymentProofSubmitted {
                        payment_id,
                        booking_id: payment.booking_id,
                        at: now,
                    };
                    Ok(Planned::new(changes, payment).with_event(event))
                }
            })
            .await?;

        info!(payment_id = %payment.id, kind = %payment.kind, "payment proof submitted");
        Ok(payment)
    }

    /// Admin verification. Confirming moves the owning booking to
    /// `payment_approved` in the same commit; rejecting leaves it in
    /// `awaiting_payment`.
    pub async fn verify(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
        outcome: VerificationOutcome,
        admin_proof: Option<ProofRef>,
        rejection_reason: Option<String>,
    ) -> Result<Payment> {
        ensure_role(actor, &[Role::Admin], "verify a payment")?;
        if outcome == VerificationOutcome::Confirmed
            && let Some(proof) = &admin_proof
        {
            self.proofs.ensure_exists(proof).await?;
        }

        let payment = self
            .uow
            .run("verify_payment", || {
                let admin_proof = admin_proof.clone();
                let rejection_reason = rejection_reason.clone();
                async move {
                    let now = Utc::now();
                    let mut payment = self.uow.payment(payment_id).await?;
                    let mut booking = self.uow.owner_of(&payment).await?;
                    payment.verify(actor, outcome, admin_proof, rejection_reason, now)?;

                    let mut changes = ChangeSet::new();
                    let event = match outcome {
                        VerificationOutcome::Confirmed => {
                            let expected = self.gross_for(&booking)?;
                            if payment.amount != expected {
                                return Err(invariant(format!(
                                    "collection {} amount {} does not match booking gross {}",
                                    payment_id, payment.amount, expected
                                )));
                            }
                            if booking.status != BookingStatus::AwaitingPayment {
                                return Err(invariant(format!(
                                    "pending collection {} belongs to booking {} in status {}",
                                    payment_id, booking.id, booking.status
                                )));
                            }
                            booking.approve_payment(actor, now)?;
                            changes.update_booking(booking);
                            LifecycleEvent::PaymentConfirmed {
                                payment_id,
                                booking_id: payment.booking_id,
                                amount: payment.amount,
                                at: now,
                            }
                        }
                        VerificationOutcome::Rejected => LifecycleEvent::PaymentRejected {
                            payment_id,
                            booking_id: payment.booking_id,
                            reason: payment.rejection_reason.clone().unwrap_or_default(),
                            at: now,
                        },
                    };
                    let payment = changes.update_payment(payment);
                    Ok(Planned::new(changes, payment).with_event(event))
                }
            })
            .await?;

        info!(payment_id = %payment.id, status = %payment.status, "payment verified");
        Ok(payment)
    }

    pub async fn open_dispute(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
        proof: Option<ProofRef>,
        note: Option<String>,
    ) -> Result<Payment> {
        if let Some(proof) = &proof {
            self.proofs.ensure_exists(proof).await?;
        }

        let payment = self
            .uow
            .run("open_dispute", || {
                let proof = proof.clone();
                let note = note.clone();
                async move {
                    let now = Utc::now();
                    let mut payment = self.uow.payment(payment_id).await?;
                    self.uow.owner_of(&payment).await?;
                    payment.open_dispute(actor, proof, note, now)?;

                    let mut changes = ChangeSet::new();
                    let payment = changes.update_payment(payment);
                    let event = LifecycleEvent::DisputeOpened {
                        payment_id,
                        booking_id: payment.booking_id,
                        at: now,
                    };
                    Ok(Planned::new(changes, payment).with_event(event))
                }
            })
            .await?;

        info!(payment_id = %payment.id, by = %actor.id, "dispute opened");
        Ok(payment)
    }

    /// Admin moves a dispute along `open → under_review → {resolved | rejected}`.
    pub async fn resolve_dispute(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
        to: DisputeStatus,
        admin_note: Option<String>,
    ) -> Result<Payment> {
        let payment = self
            .uow
            .run("resolve_dispute", || {
                let admin_note = admin_note.clone();
                async move {
                    let now = Utc::now();
                    let mut payment = self.uow.payment(payment_id).await?;
                    payment.advance_dispute(actor, to, admin_note, now)?;

                    let mut changes = ChangeSet::new();
                    let payment = changes.update_payment(payment);
                    let event = LifecycleEvent::DisputeUpdated {
                        payment_id,
                        booking_id: payment.booking_id,
                        status: to,
                        at: now,
                    };
                    Ok(Planned::new(changes, payment).with_event(event))
                }
            })
            .await?;

        info!(payment_id = %payment.id, dispute = %payment.dispute_status, "dispute updated");
        Ok(payment)
    }

    /// Returns a confirmed collection after its dispute was resolved, before
    /// the session took place. The booking is cancelled in the same commit.
    pub async fn refund(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
        admin_proof: Option<ProofRef>,
    ) -> Result<Payment> {
        ensure_role(actor, &[Role::Admin], "refund a payment")?;
        if let Some(proof) = &admin_proof {
            self.proofs.ensure_exists(proof).await?;
        }

        let payment = self
            .uow
            .run("refund_payment", || {
                let admin_proof = admin_proof.clone();
                async move {
                    let now = Utc::now();
                    let mut payment = self.uow.payment(payment_id).await?;
                    let mut booking = self.uow.owner_of(&payment).await?;
                    if self.uow.payout(booking.id).await?.is_some() {
                        return Err(LedgerError::PreconditionFailed(format!(
                            "booking {} already has a payout",
                            booking.id
                        )));
                    }
                    payment.refund(actor, admin_proof, now)?;
                    booking.cancel_for_refund(actor, now)?;

                    let mut changes = ChangeSet::new();
                    changes.update_booking(booking);
                    let payment = changes.update_payment(payment);
                    let event = LifecycleEvent::PaymentRefunded {
                        payment_id,
                        booking_id: payment.booking_id,
                        amount: payment.amount,
                        at: now,
                    };
                    Ok(Planned::new(changes, payment).with_event(event))
                }
            })
            .await?;

        info!(payment_id = %payment.id, amount = %payment.amount, "collection refunded");
        Ok(payment)
    }

    /// Opens the tutor payout for a completed booking with a confirmed
    /// collection. At most one payout exists per booking.
    pub async fn create_payout(&self, actor: &Actor, booking_id: BookingId) -> Result<Payment> {
        ensure_role(actor, &[Role::Admin], "create a payout")?;

        let payout = self
            .uow
            .run("create_payout", || async move {
                let now = Utc::now();
                let booking = self.uow.booking(booking_id).await?;
                let collection = self.uow.current_collection(booking_id).await?;
                let Some(collection) =
                    collection.filter(|c| c.status == PaymentStatus::Confirmed)
                else {
                    return Err(LedgerError::PreconditionFailed(format!(
                        "booking {} has no confirmed collection",
                        booking_id
                    )));
                };
                if booking.status != BookingStatus::Completed {
                    return Err(LedgerError::PreconditionFailed(format!(
                        "booking {} is {}, payouts need a completed session",
                        booking_id, booking.status
                    )));
                }
                if self.uow.payout(booking_id).await?.is_some() {
                    return Err(LedgerError::DuplicatePayout(booking_id));
                }
                let gross = self.gross_for(&booking)?;
                if collection.amount != gross {
                    return Err(invariant(format!(
                        "collection {} amount {} does not match booking gross {}",
                        collection.id, collection.amount, gross
                    )));
                }

                let amount = self.calculator.payout_amount(collection.amount)?;
                let fee_rate = self.calculator.fee_rate();
                let mut changes = ChangeSet::new();
                let payout =
                    changes.insert_payment(Payment::payout(&booking, amount, fee_rate, now));
                // Guards the one-payout rule against a concurrent create.
                changes.update_booking(booking);
                let event = LifecycleEvent::PayoutCreated {
                    payment_id: payout.id,
                    booking_id,
                    tutor: payout.counterparty.clone(),
                    amount: payout.amount,
                    at: now,
                };
                Ok(Planned::new(changes, payout).with_event(event))
            })
            .await?;

        info!(
            payment_id = %payout.id,
            booking_id = %booking_id,
            amount = %payout.amount,
            "payout created"
        );
        Ok(payout)
    }

    /// pending → admin_paid. A second call fails with `AlreadyPaid`.
    pub async fn mark_payout_paid(&self, actor: &Actor, payment_id: PaymentId) -> Result<Payment> {
        let payout = self
            .uow
            .run("mark_payout_paid", || async move {
                let now = Utc::now();
                let mut payout = self.uow.payment(payment_id).await?;
                payout.mark_paid(actor, now)?;
                self.uow.owner_of(&payout).await?;

                let collection = self
                    .uow
                    .current_collection(payout.booking_id)
                    .await?
                    .filter(|c| c.status == PaymentStatus::Confirmed)
                    .ok_or_else(|| {
                        invariant(format!(
                            "payout {} has no confirmed collection on booking {}",
                            payment_id, payout.booking_id
                        ))
                    })?;
                let fee_rate = payout.fee_rate.unwrap_or(self.calculator.fee_rate());
                let expected = payout_for(collection.amount, fee_rate)?;
                if payout.amount != expected {
                    return Err(invariant(format!(
                        "payout {} amount {} does not match fee formula {}",
                        payment_id, payout.amount, expected
                    )));
                }

                let mut changes = ChangeSet::new();
                let payout = changes.update_payment(payout);
                let event = LifecycleEvent::PayoutPaid {
                    payment_id,
                    booking_id: payout.booking_id,
                    tutor: payout.counterparty.clone(),
                    amount: payout.amount,
                    at: now,
                };
                Ok(Planned::new(changes, payout).with_event(event))
            })
            .await?;

        info!(payment_id = %payout.id, amount = %payout.amount, "payout marked paid");
        Ok(payout)
    }

    pub async fn payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.uow.payment(payment_id).await
    }

    /// Payments matching `filter`, oldest first.
    pub async fn payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        let mut payments = self.uow.store().payments(filter).await?;
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    pub async fn payments_for_booking(&self, booking_id: BookingId) -> Result<Vec<Payment>> {
        self.payments(&PaymentFilter::for_booking(booking_id)).await
    }

    pub async fn payments_by(
        &self,
        kind: Option<PaymentKind>,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>> {
        self.payments(&PaymentFilter {
            booking: None,
            kind,
            status,
        })
        .await
    }

    /// The active collection for a booking, or its latest closed one.
    pub async fn collection_for(&self, booking_id: BookingId) -> Result<Option<Payment>> {
        self.uow.current_collection(booking_id).await
    }

    fn gross_for(&self, booking: &BookingRequest) -> Result<Money> {
        self.calculator
            .gross_amount(booking.hourly_rate, booking.duration)
    }
}
