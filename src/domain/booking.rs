use super::audit::StatusChange;
use super::identity::{Actor, BookingId, Role, UserId};
use super::money::{Money, ProofRef, Rating, SessionHours};
use crate::error::{LedgerError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

const ENTITY: &str = "booking";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Declined,
    AwaitingPayment,
    PaymentApproved,
    /// Kept so rows written by older clients still deserialize. No
    /// transition enters it.
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 8] = [
        BookingStatus::Pending,
        BookingStatus::Accepted,
        BookingStatus::Declined,
        BookingStatus::AwaitingPayment,
        BookingStatus::PaymentApproved,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Declined => "declined",
            BookingStatus::AwaitingPayment => "awaiting_payment",
            BookingStatus::PaymentApproved => "payment_approved",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Declined | BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Decline,
}

/// Immutable tutor data read from the catalog when a booking is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorProfile {
    pub tutor: UserId,
    pub display_name: String,
    pub hourly_rate: Money,
}

impl TutorProfile {
    /// Highest hourly rate a catalog entry may carry.
    pub const MAX_HOURLY_RATE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

    pub fn validate(&self) -> Result<()> {
        if self.hourly_rate.value() > Self::MAX_HOURLY_RATE {
            return Err(LedgerError::ValidationError(format!(
                "hourly rate {} for tutor {} exceeds {}",
                self.hourly_rate,
                self.tutor,
                Self::MAX_HOURLY_RATE
            )));
        }
        Ok(())
    }
}

/// Inclusive bounds on a session's length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationLimits {
    pub min_hours: Decimal,
    pub max_hours: Decimal,
}

impl DurationLimits {
    pub fn check(&self, hours: SessionHours) -> Result<()> {
        let value = hours.value();
        if value < self.min_hours || value > self.max_hours {
            return Err(LedgerError::InvalidDuration(format!(
                "duration must be between {} and {} hours, got {}",
                self.min_hours, self.max_hours, value
            )));
        }
        Ok(())
    }
}

/// What the student asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBooking {
    pub tutor: UserId,
    pub subject: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_hours: Decimal,
    pub notes: Option<String>,
}

impl NewBooking {
    /// Checks that need nothing from the catalog.
    pub fn validate(&self, student: &Actor, limits: DurationLimits) -> Result<SessionHours> {
        ensure_role(student, &[Role::Student], "create a booking")?;
        if student.id == self.tutor {
            return Err(LedgerError::SameParty);
        }
        let duration = SessionHours::new(self.duration_hours)?;
        limits.check(duration)?;
        if self.subject.trim().is_empty() {
            return Err(LedgerError::ValidationError(
                "subject must not be empty".to_string(),
            ));
        }
        Ok(duration)
    }
}

/// A proposed tutoring session between one student and one tutor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: BookingId,
    pub student: UserId,
    pub tutor: UserId,
    /// Tutor display name at creation time.
    pub tutor_name: String,
    /// Tutor hourly rate at creation time; all amounts derive from it.
    pub hourly_rate: Money,
    pub subject: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration: SessionHours,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub session_proof: Option<ProofRef>,
    pub tutee_rating: Option<Rating>,
    pub tutee_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<StatusChange<BookingStatus>>,
    /// Optimistic concurrency token, bumped on every committed write.
    #[serde(default)]
    pub version: u64,
}

impl BookingRequest {
    pub fn request(
        student: &Actor,
        request: NewBooking,
        tutor: &TutorProfile,
        limits: DurationLimits,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let duration = request.validate(student, limits)?;
        if tutor.tutor != request.tutor {
            return Err(LedgerError::internal(format!(
                "catalog returned tutor {} for request of {}",
                tutor.tutor, request.tutor
            )));
        }
        let subject = request.subject.trim().to_string();

        Ok(Self {
            id: BookingId::generate(),
            student: student.id.clone(),
            tutor: request.tutor,
            tutor_name: tutor.display_name.clone(),
            hourly_rate: tutor.hourly_rate,
            subject,
            date: request.date,
            start_time: request.start_time,
            duration,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            status: BookingStatus::Pending,
            session_proof: None,
            tutee_rating: None,
            tutee_comment: None,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
            version: 0,
        })
    }

    pub fn is_party(&self, user: &UserId) -> bool {
        &self.student == user || &self.tutor == user
    }

    /// pending → accepted → awaiting_payment. The caller must open the
    /// collection payment in the same commit.
    pub fn accept(&mut self, actor: &Actor, now: DateTime<Utc>) -> Result<()> {
        self.ensure_tutor_owner(actor, "accept")?;
        self.expect_status(&[BookingStatus::Pending], "accept")?;
        self.transition(BookingStatus::Accepted, actor, now, None);
        self.transition(BookingStatus::AwaitingPayment, actor, now, None);
        Ok(())
    }

    /// pending → declined
    pub fn decline(&mut self, actor: &Actor, now: DateTime<Utc>) -> Result<()> {
        self.ensure_tutor_owner(actor, "decline")?;
        self.expect_status(&[BookingStatus::Pending], "decline")?;
        self.transition(BookingStatus::Declined, actor, now, None);
        Ok(())
    }

    /// awaiting_payment → payment_approved, driven by the ledger confirming
    /// the collection.
    pub fn approve_payment(&mut self, actor: &Actor, now: DateTime<Utc>) -> Result<()> {
        ensure_role(actor, &[Role::Admin], "approve a payment")?;
        self.expect_status(&[BookingStatus::AwaitingPayment], "approve payment for")?;
        self.transition(BookingStatus::PaymentApproved, actor, now, None);
        Ok(())
    }

    /// payment_approved → completed. `collection_confirmed` is the status of
    /// the sibling collection payment as read in the same unit of work.
    pub fn complete(
        &mut self,
        actor: &Actor,
        proof: Option<ProofRef>,
        collection_confirmed: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if actor.role != Role::Admin {
            self.ensure_tutor_owner(actor, "complete")?;
        }
        if self.status == BookingStatus::AwaitingPayment {
            return Err(LedgerError::PreconditionFailed(format!(
                "booking {} is still awaiting a confirmed payment",
                self.id
            )));
        }
        self.expect_status(&[BookingStatus::PaymentApproved], "complete")?;
        if !collection_confirmed {
            return Err(LedgerError::PreconditionFailed(format!(
                "collection payment for booking {} is not confirmed",
                self.id
            )));
        }
        let proof = proof.ok_or_else(|| {
            LedgerError::PreconditionFailed("session proof is required to complete".to_string())
        })?;
        self.session_proof = Some(proof);
        self.transition(BookingStatus::Completed, actor, now, None);
        Ok(())
    }

    /// Attaches the student's rating once; no status change.
    pub fn rate(
        &mut self,
        actor: &Actor,
        rating: Rating,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        ensure_role(actor, &[Role::Student], "rate a session")?;
        self.ensure_student_owner(actor, "rate")?;
        if self.status != BookingStatus::Completed {
            return Err(LedgerError::InvalidState(format!(
                "only completed sessions can be rated, booking {} is {}",
                self.id, self.status
            )));
        }
        if self.tutee_rating.is_some() {
            return Err(LedgerError::AlreadyRated(self.id));
        }
        self.tutee_rating = Some(rating);
        self.tutee_comment = comment.filter(|c| !c.trim().is_empty());
        self.updated_at = now;
        Ok(())
    }

    /// {pending, awaiting_payment} → cancelled, by the student or an admin.
    pub fn cancel(&mut self, actor: &Actor, now: DateTime<Utc>) -> Result<()> {
        match actor.role {
            Role::Admin => {}
            Role::Student => self.ensure_student_owner(actor, "cancel")?,
            role => {
                return Err(LedgerError::Unauthorized {
                    role,
                    action: "cancel a booking",
                });
            }
        }
        self.expect_status(
            &[BookingStatus::Pending, BookingStatus::AwaitingPayment],
            "cancel",
        )?;
        self.transition(BookingStatus::Cancelled, actor, now, None);
        Ok(())
    }

    /// payment_approved → cancelled when an admin refunds the collection
    /// before the session took place.
    pub fn cancel_for_refund(&mut self, actor: &Actor, now: DateTime<Utc>) -> Result<()> {
        ensure_role(actor, &[Role::Admin], "refund a booking")?;
        self.expect_status(&[BookingStatus::PaymentApproved], "refund")?;
        self.transition(BookingStatus::Cancelled, actor, now, Some("refunded"));
        Ok(())
    }

    fn transition(
        &mut self,
        to: BookingStatus,
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

    fn expect_status(&self, allowed: &[BookingStatus], action: &'static str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(LedgerError::invalid_transition(ENTITY, self.status, action))
        }
    }

    fn ensure_tutor_owner(&self, actor: &Actor, action: &'static str) -> Result<()> {
        ensure_role(actor, &[Role::Tutor], action)?;
        if actor.id != self.tutor {
            return Err(LedgerError::NotOwner {
                actor: actor.id.clone(),
                booking: self.id,
                action,
            });
        }
        Ok(())
    }

    fn ensure_student_owner(&self, actor: &Actor, action: &'static str) -> Result<()> {
        if actor.id != self.student {
            return Err(LedgerError::NotOwner {
                actor: actor.id.clone(),
                booking: self.id,
                action,
            });
        }
        Ok(())
    }
}

pub(crate) fn ensure_role(actor: &Actor, allowed: &[Role], action: &'static str) -> Result<()> {
    if allowed.contains(&actor.role) {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized {
            role: actor.role,
            action,
        })
    }
}
