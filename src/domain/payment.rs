use super::audit::StatusChange;
use super::booking::{BookingRequest, ensure_role};
use super::identity::{Actor, BookingId, PaymentId, Role, UserId};
use super::money::{FeeRate, Money, ProofRef};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason recorded on a collection closed because its booking was cancelled.
pub const CANCELLED_REASON: &str = "booking cancelled";

/// Direction of the money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    /// Student to platform.
    Collection,
    /// Platform to tutor.
    Payout,
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaymentKind::Collection => "collection",
            PaymentKind::Payout => "payout",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Rejected,
    Refunded,
    /// Payouts only: the platform has sent the money.
    AdminPaid,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Confirmed,
        PaymentStatus::Rejected,
        PaymentStatus::Refunded,
        PaymentStatus::AdminPaid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::AdminPaid => "admin_paid",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    #[default]
    None,
    Open,
    UnderReview,
    Resolved,
    Rejected,
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DisputeStatus::None => "none",
            DisputeStatus::Open => "open",
            DisputeStatus::UnderReview => "under_review",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationOutcome {
    Confirmed,
    Rejected,
}

/// One money movement attached to a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub kind: PaymentKind,
    pub booking_id: BookingId,
    /// The student for a collection, the tutor for a payout.
    pub counterparty: UserId,
    /// Written once at creation.
    pub amount: Money,
    /// Fee rate the payout amount was computed with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_rate: Option<FeeRate>,
    pub status: PaymentStatus,
    pub proof_reference: Option<ProofRef>,
    pub admin_proof_reference: Option<ProofRef>,
    /// Latest rejection reason. Never cleared by a later confirmation.
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub dispute_status: DisputeStatus,
    pub dispute_proof_reference: Option<ProofRef>,
    pub dispute_note: Option<String>,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<StatusChange<PaymentStatus>>,
    #[serde(default)]
    pub dispute_history: Vec<StatusChange<DisputeStatus>>,
    #[serde(default)]
    pub version: u64,
}

impl Payment {
    fn open(
        kind: PaymentKind,
        booking_id: BookingId,
        counterparty: UserId,
        amount: Money,
        fee_rate: Option<FeeRate>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::generate(),
            kind,
            booking_id,
            counterparty,
            amount,
            fee_rate,
            status: PaymentStatus::Pending,
            proof_reference: None,
            admin_proof_reference: None,
            rejection_reason: None,
            dispute_status: DisputeStatus::None,
            dispute_proof_reference: None,
            dispute_note: None,
            admin_note: None,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
            dispute_history: Vec::new(),
            version: 0,
        }
    }

    pub fn collection(booking: &BookingRequest, amount: Money, now: DateTime<Utc>) -> Self {
        Self::open(
            PaymentKind::Collection,
            booking.id,
            booking.student.clone(),
            amount,
            None,
            now,
        )
    }

    pub fn payout(
        booking: &BookingRequest,
        amount: Money,
        fee_rate: FeeRate,
        now: DateTime<Utc>,
    ) -> Self {
        Self::open(
            PaymentKind::Payout,
            booking.id,
            booking.tutor.clone(),
            amount,
            Some(fee_rate),
            now,
        )
    }

    /// Whether this row blocks opening another payment of the same kind for
    /// its booking.
    pub fn is_active(&self) -> bool {
        match self.kind {
            PaymentKind::Collection => {
                matches!(self.status, PaymentStatus::Pending | PaymentStatus::Confirmed)
            }
            PaymentKind::Payout => true,
        }
    }

    /// Attaches the payer's proof. A rejected collection goes back to
    /// pending so it can be verified again; `booking_awaiting_payment`
    /// guards that against cancelled bookings.
    pub fn submit_proof(
        &mut self,
        actor: &Actor,
        proof: ProofRef,
        booking_awaiting_payment: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self.kind {
            PaymentKind::Collection => {
                ensure_role(actor, &[Role::Student], "submit payment proof")?;
                if actor.id != self.counterparty {
                    return Err(LedgerError::NotOwner {
                        actor: actor.id.clone(),
                        booking: self.booking_id,
                        action: "submit payment proof",
                    });
                }
            }
            PaymentKind::Payout => ensure_role(actor, &[Role::Admin], "submit payout proof")?,
        }

        match self.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Rejected
                if self.kind == PaymentKind::Collection && booking_awaiting_payment =>
            {
                self.transition(PaymentStatus::Pending, actor, now, Some("proof resubmitted"));
            }
            status => {
                return Err(LedgerError::InvalidState(format!(
                    "proof can only be submitted for a pending payment, {} {} is {}",
                    self.kind, self.id, status
                )));
            }
        }
        self.proof_reference = Some(proof);
        self.updated_at = now;
        Ok(())
    }

    /// Admin verification of a pending collection.
    pub fn verify(
        &mut self,
        actor: &Actor,
        outcome: VerificationOutcome,
        admin_proof: Option<ProofRef>,
        rejection_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        ensure_role(actor, &[Role::Admin], "verify a payment")?;
        self.expect_collection("verify")?;
        if self.status != PaymentStatus::Pending {
            return Err(LedgerError::InvalidState(format!(
                "only pending collections can be verified, {} is {}",
                self.id, self.status
            )));
        }

        match outcome {
            VerificationOutcome::Confirmed => {
                let proof = admin_proof.ok_or(LedgerError::ProofRequired)?;
                self.admin_proof_reference = Some(proof);
                self.transition(PaymentStatus::Confirmed, actor, now, None);
            }
            VerificationOutcome::Rejected => {
                let reason = rejection_reason
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .ok_or(LedgerError::ReasonRequired)?;
                self.rejection_reason = Some(reason.clone());
                self.transition(PaymentStatus::Rejected, actor, now, Some(reason.as_str()));
            }
        }
        Ok(())
    }

    /// Closes a pending collection whose booking is being cancelled.
    pub fn close_for_cancellation(&mut self, actor: &Actor, now: DateTime<Utc>) {
        if self.kind == PaymentKind::Collection && self.status == PaymentStatus::Pending {
            self.rejection_reason = Some(CANCELLED_REASON.to_string());
            self.transition(PaymentStatus::Rejected, actor, now, Some(CANCELLED_REASON));
        }
    }

    /// confirmed → refunded, only after a dispute on it was resolved.
    pub fn refund(
        &mut self,
        actor: &Actor,
        admin_proof: Option<ProofRef>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        ensure_role(actor, &[Role::Admin], "refund a payment")?;
        self.expect_collection("refund")?;
        if self.status != PaymentStatus::Confirmed {
            return Err(LedgerError::InvalidState(format!(
                "only confirmed collections can be refunded, {} is {}",
                self.id, self.status
            )));
        }
        if self.dispute_status != DisputeStatus::Resolved {
            return Err(LedgerError::PreconditionFailed(format!(
                "refund requires a resolved dispute, {} dispute is {}",
                self.id, self.dispute_status
            )));
        }
        let proof = admin_proof.ok_or(LedgerError::ProofRequired)?;
        self.admin_proof_reference = Some(proof);
        self.transition(PaymentStatus::Refunded, actor, now, None);
        Ok(())
    }

    /// Opens a dispute against a verified collection.
    pub fn open_dispute(
        &mut self,
        actor: &Actor,
        proof: Option<ProofRef>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match actor.role {
            Role::Admin => {}
            Role::Student if actor.id == self.counterparty => {}
            Role::Student => {
                return Err(LedgerError::NotOwner {
                    actor: actor.id.clone(),
                    booking: self.booking_id,
                    action: "dispute a payment",
                });
            }
            role => {
                return Err(LedgerError::Unauthorized {
                    role,
                    action: "dispute a payment",
                });
            }
        }
        self.expect_collection("dispute")?;
        if !matches!(self.status, PaymentStatus::Confirmed | PaymentStatus::Rejected) {
            return Err(LedgerError::InvalidState(format!(
                "only confirmed or rejected collections can be disputed, {} is {}",
                self.id, self.status
            )));
        }
        if self.dispute_status != DisputeStatus::None {
            return Err(LedgerError::invalid_transition(
                "dispute",
                self.dispute_status,
                "open",
            ));
        }
        let proof = proof.ok_or(LedgerError::ProofRequired)?;
        self.dispute_proof_reference = Some(proof);
        self.dispute_note = note.filter(|n| !n.trim().is_empty());
        self.dispute_transition(DisputeStatus::Open, actor, now);
        Ok(())
    }

    /// open → under_review → {resolved | rejected}
    pub fn advance_dispute(
        &mut self,
        actor: &Actor,
        to: DisputeStatus,
        admin_note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        ensure_role(actor, &[Role::Admin], "resolve a dispute")?;
        let allowed = matches!(
            (self.dispute_status, to),
            (DisputeStatus::Open, DisputeStatus::UnderReview)
                | (DisputeStatus::UnderReview, DisputeStatus::Resolved)
                | (DisputeStatus::UnderReview, DisputeStatus::Rejected)
        );
        if !allowed {
            return Err(LedgerError::invalid_transition(
                "dispute",
                self.dispute_status,
                dispute_action(to),
            ));
        }
        if let Some(note) = admin_note.filter(|n| !n.trim().is_empty()) {
            self.admin_note = Some(note);
        }
        self.dispute_transition(to, actor, now);
        Ok(())
    }

    /// pending → admin_paid for payouts.
    pub fn mark_paid(&mut self, actor: &Actor, now: DateTime<Utc>) -> Result<()> {
        ensure_role(actor, &[Role::Admin], "mark a payout paid")?;
        if self.kind != PaymentKind::Payout {
            return Err(LedgerError::InvalidState(format!(
                "{} is a {}, not a payout",
                self.id, self.kind
            )));
        }
        match self.status {
            PaymentStatus::Pending => {
                self.transition(PaymentStatus::AdminPaid, actor, now, None);
                Ok(())
            }
            PaymentStatus::AdminPaid => Err(LedgerError::AlreadyPaid(self.id)),
            status => Err(LedgerError::InvalidState(format!(
                "payout {} is {}",
                self.id, status
            ))),
        }
    }

    fn expect_collection(&self, action: &str) -> Result<()> {
        if self.kind == PaymentKind::Collection {
            Ok(())
        } else {
            Err(LedgerError::InvalidState(format!(
                "cannot {} payout {}",
                action, self.id
            )))
        }
    }

    fn transition(
        &mut self,
        to: PaymentStatus,
        actor: &Actor,
        now: DateTime<Utc>,
        note: Option<&str>,
    ) {
        let mut change = StatusChange::new(self.status, to, actor, now);
        if let Some(note) = note {
            change = change.with_note(note);
        }
        self.history.push(change);
        self.status = to;
        self.updated_at = now;
    }

    fn dispute_transition(&mut self, to: DisputeStatus, actor: &Actor, now: DateTime<Utc>) {
        self.dispute_history
            .push(StatusChange::new(self.dispute_status, to, actor, now));
        self.dispute_status = to;
        self.updated_at = now;
    }
}

fn dispute_action(to: DisputeStatus) -> &'static str {
    match to {
        DisputeStatus::None => "clear",
        DisputeStatus::Open => "open",
        DisputeStatus::UnderReview => "review",
        DisputeStatus::Resolved => "resolve",
        DisputeStatus::Rejected => "reject",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::{DurationLimits, NewBooking, TutorProfile};
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal_macros::dec;

    fn booking() -> BookingRequest {
        BookingRequest::request(
            &Actor::student("student-1"),
            NewBooking {
                tutor: UserId::new("tutor-1"),
                subject: "Physics".into(),
                date: NaiveDate::from_ymd_opt(2026, 11, 3).unwrap(),
                start_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                duration_hours: dec!(2),
                notes: None,
            },
            &TutorProfile {
                tutor: UserId::new("tutor-1"),
                display_name: "Tutor".into(),
                hourly_rate: Money::new(dec!(300)).unwrap(),
            },
            DurationLimits {
                min_hours: dec!(1),
                max_hours: dec!(8),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn collection() -> Payment {
        Payment::collection(&booking(), Money::new(dec!(600)).unwrap(), Utc::now())
    }

    fn proof(name: &str) -> Option<ProofRef> {
        ProofRef::new(name)
    }

    #[test]
    fn test_new_collection_defaults() {
        let payment = collection();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.dispute_status, DisputeStatus::None);
        assert_eq!(payment.counterparty, UserId::new("student-1"));
        assert!(payment.is_active());
    }

    #[test]
    fn test_verify_requires_evidence() {
        let admin = Actor::admin("admin");
        let mut payment = collection();

        let err = payment
            .verify(&admin, VerificationOutcome::Confirmed, None, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::ProofRequired));
        assert_eq!(payment.status, PaymentStatus::Pending);

        let err = payment
            .verify(&admin, VerificationOutcome::Rejected, None, Some("  ".into()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::ReasonRequired));
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_reject_resubmit_confirm_keeps_reason() {
        let admin = Actor::admin("admin");
        let student = Actor::student("student-1");
        let mut payment = collection();

        payment
            .verify(&admin, VerificationOutcome::Rejected, None, Some("x".into()), Utc::now())
            .unwrap();
        assert!(!payment.is_active());

        payment
            .submit_proof(&student, proof("p2").unwrap(), true, Utc::now())
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);

        payment
            .verify(&admin, VerificationOutcome::Confirmed, proof("receipt"), None, Utc::now())
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Confirmed);
        assert_eq!(payment.rejection_reason.as_deref(), Some("x"));
        assert_eq!(payment.history.len(), 3);
    }

    #[test]
    fn test_submit_proof_guards() {
        let mut payment = collection();
        let err = payment
            .submit_proof(&Actor::student("student-2"), proof("p").unwrap(), true, Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotOwner { .. }));

        payment.close_for_cancellation(&Actor::student("student-1"), Utc::now());
        assert_eq!(payment.status, PaymentStatus::Rejected);
        let err = payment
            .submit_proof(&Actor::student("student-1"), proof("p").unwrap(), false, Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }

    #[test]
    fn test_dispute_state_machine() {
        let admin = Actor::admin("admin");
        let student = Actor::student("student-1");
        let mut payment = collection();

        let err = payment
            .open_dispute(&student, proof("d"), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));

        payment
            .verify(&admin, VerificationOutcome::Confirmed, proof("r"), None, Utc::now())
            .unwrap();
        payment
            .open_dispute(&student, proof("d"), Some("charged twice".into()), Utc::now())
            .unwrap();
        assert_eq!(payment.dispute_status, DisputeStatus::Open);

        let err = payment
            .advance_dispute(&admin, DisputeStatus::Resolved, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));

        payment
            .advance_dispute(&admin, DisputeStatus::UnderReview, None, Utc::now())
            .unwrap();
        payment
            .advance_dispute(
                &admin,
                DisputeStatus::Rejected,
                Some("no evidence".into()),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(payment.dispute_status, DisputeStatus::Rejected);
        assert_eq!(payment.admin_note.as_deref(), Some("no evidence"));

        let err = payment
            .advance_dispute(&admin, DisputeStatus::UnderReview, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert_eq!(payment.status, PaymentStatus::Confirmed);
    }

    #[test]
    fn test_mark_paid_only_once() {
        let admin = Actor::admin("admin");
        let mut payout = Payment::payout(
            &booking(),
            Money::new(dec!(522)).unwrap(),
            FeeRate::new(dec!(0.13)).unwrap(),
            Utc::now(),
        );
        payout.mark_paid(&admin, Utc::now()).unwrap();
        let err = payout.mark_paid(&admin, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyPaid(_)));
        assert_eq!(payout.amount.value(), dec!(522.00));

        let err = collection().mark_paid(&admin, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }
}
