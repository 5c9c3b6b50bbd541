use super::command_reader::{JournalEntry, Op};
use crate::application::Services;
use crate::domain::booking::{Decision, NewBooking};
use crate::domain::identity::{Actor, BookingId, PaymentId, Role};
use crate::domain::money::ProofRef;
use crate::domain::payment::{DisputeStatus, Payment, PaymentKind, VerificationOutcome};
use crate::error::{LedgerError, Result};
use chrono::NaiveTime;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Counts of journal rows applied and rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Applies journal rows to the services, one at a time and in order.
/// Booking aliases from the journal are mapped to generated booking ids.
pub struct Replayer {
    services: Services,
    aliases: HashMap<String, BookingId>,
}

impl Replayer {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            aliases: HashMap::new(),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Booking id to journal alias, for labelling report rows.
    pub fn labels(&self) -> HashMap<BookingId, String> {
        self.aliases
            .iter()
            .map(|(alias, id)| (*id, alias.clone()))
            .collect()
    }

    /// Replays every row. Rejected rows are logged and skipped; they never
    /// stop the replay.
    pub async fn replay(
        &mut self,
        entries: impl IntoIterator<Item = Result<JournalEntry>>,
    ) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        // Line 1 is the header.
        for (line, entry) in (2..).zip(entries) {
            let outcome = match entry {
                Ok(entry) => self.apply(entry).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => summary.applied += 1,
                Err(err) => {
                    summary.rejected += 1;
                    warn!(line, category = ?err.category(), error = %err, "journal row rejected");
                }
            }
        }
        summary
    }

    pub async fn apply(&mut self, entry: JournalEntry) -> Result<()> {
        let op = entry
            .op
            .ok_or_else(|| LedgerError::ValidationError("journal row has no op".to_string()))?;
        let role: Role = entry.role.parse().map_err(LedgerError::ValidationError)?;
        let actor = Actor::new(entry.actor.as_str(), role);
        debug!(?op, actor = %actor.id, "applying journal row");

        let bookings = &self.services.bookings;
        let payments = &self.services.payments;
        match op {
            Op::CreateBooking => {
                let alias = required(&entry.booking, "booking")?;
                if self.aliases.contains_key(alias) {
                    return Err(LedgerError::ValidationError(format!(
                        "booking alias '{}' is already bound",
                        alias
                    )));
                }
                let request = NewBooking {
                    tutor: required(&entry.tutor, "tutor")?.into(),
                    subject: required(&entry.subject, "subject")?.to_string(),
                    date: entry.date.ok_or_else(|| missing("date"))?,
                    start_time: parse_time(required(&entry.time, "time")?)?,
                    duration_hours: entry.hours.ok_or_else(|| missing("hours"))?,
                    notes: entry.notes.clone(),
                };
                let booking = bookings.create_booking(&actor, request).await?;
                self.aliases.insert(alias.to_string(), booking.id);
            }
            Op::Respond => {
                let decision = parse_decision(required(&entry.decision, "decision")?)?;
                bookings
                    .respond_to_booking(&actor, self.booking(&entry)?, decision)
                    .await?;
            }
            Op::SubmitSessionProof => {
                bookings
                    .submit_session_proof(&actor, self.booking(&entry)?, proof(&entry))
                    .await?;
            }
            Op::Rate => {
                let rating = entry.rating.ok_or_else(|| missing("rating"))?;
                bookings
                    .rate_session(&actor, self.booking(&entry)?, rating, entry.comment.clone())
                    .await?;
            }
            Op::Cancel => {
                bookings
                    .cancel_booking(&actor, self.booking(&entry)?)
                    .await?;
            }
            Op::OpenCollection => {
                payments
                    .open_collection(&actor, self.booking(&entry)?)
                    .await?;
            }
            Op::SubmitPaymentProof => {
                let payment = self.payment(&entry, PaymentKind::Collection).await?;
                let proof = proof(&entry).ok_or(LedgerError::ProofRequired)?;
                payments.submit_proof(&actor, payment, proof).await?;
            }
            Op::Verify => {
                let payment = self.payment(&entry, PaymentKind::Collection).await?;
                let outcome = parse_outcome(required(&entry.outcome, "outcome")?)?;
                payments
                    .verify(&actor, payment, outcome, proof(&entry), entry.reason.clone())
                    .await?;
            }
            Op::OpenDispute => {
                let payment = self.payment(&entry, PaymentKind::Collection).await?;
                payments
                    .open_dispute(&actor, payment, proof(&entry), entry.notes.clone())
                    .await?;
            }
            Op::ResolveDispute => {
                let payment = self.payment(&entry, PaymentKind::Collection).await?;
                let status = parse_dispute_status(required(&entry.status, "status")?)?;
                payments
                    .resolve_dispute(&actor, payment, status, entry.notes.clone())
                    .await?;
            }
            Op::Refund => {
                let payment = self.payment(&entry, PaymentKind::Collection).await?;
                payments.refund(&actor, payment, proof(&entry)).await?;
            }
            Op::CreatePayout => {
                payments
                    .create_payout(&actor, self.booking(&entry)?)
                    .await?;
            }
            Op::MarkPayoutPaid => {
                let payment = self.payment(&entry, PaymentKind::Payout).await?;
                payments.mark_payout_paid(&actor, payment).await?;
            }
        }
        Ok(())
    }

    /// Resolves the `booking` column: a journal alias, or a booking id from
    /// an earlier run against the same database.
    fn booking(&self, entry: &JournalEntry) -> Result<BookingId> {
        let value = required(&entry.booking, "booking")?;
        if let Some(id) = self.aliases.get(value) {
            return Ok(*id);
        }
        value.parse().map_err(|_| {
            LedgerError::ValidationError(format!("unknown booking alias '{}'", value))
        })
    }

    /// Resolves the `payment` column. Empty means the booking's current
    /// payment of `default_kind`.
    async fn payment(&self, entry: &JournalEntry, default_kind: PaymentKind) -> Result<PaymentId> {
        let kind = match entry.payment.as_deref() {
            None | Some("") => default_kind,
            Some("collection") => PaymentKind::Collection,
            Some("payout") => PaymentKind::Payout,
            Some(id) => {
                return id.parse().map_err(|_| {
                    LedgerError::ValidationError(format!("invalid payment reference '{}'", id))
                });
            }
        };

        let booking = self.booking(entry)?;
        let payment: Option<Payment> = match kind {
            PaymentKind::Collection => self.services.payments.collection_for(booking).await?,
            PaymentKind::Payout => self
                .services
                .payments
                .payments_for_booking(booking)
                .await?
                .into_iter()
                .rfind(|p| p.kind == PaymentKind::Payout),
        };
        payment.map(|p| p.id).ok_or_else(|| {
            LedgerError::ValidationError(format!("booking {} has no {} payment", booking, kind))
        })
    }
}

fn required<'a>(value: &'a Option<String>, column: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(column))
}

fn missing(column: &str) -> LedgerError {
    LedgerError::ValidationError(format!("column '{}' is required for this op", column))
}

fn proof(entry: &JournalEntry) -> Option<ProofRef> {
    entry.reference.as_deref().and_then(ProofRef::new)
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|e| LedgerError::ValidationError(format!("invalid time '{}': {}", value, e)))
}

fn parse_decision(value: &str) -> Result<Decision> {
    match value.to_ascii_lowercase().as_str() {
        "accept" | "accepted" => Ok(Decision::Accept),
        "decline" | "declined" => Ok(Decision::Decline),
        other => Err(LedgerError::ValidationError(format!(
            "unknown decision '{}'",
            other
        ))),
    }
}

fn parse_outcome(value: &str) -> Result<VerificationOutcome> {
    match value.to_ascii_lowercase().as_str() {
        "confirm" | "confirmed" => Ok(VerificationOutcome::Confirmed),
        "reject" | "rejected" => Ok(VerificationOutcome::Rejected),
        other => Err(LedgerError::ValidationError(format!(
            "unknown verification outcome '{}'",
            other
        ))),
    }
}

fn parse_dispute_status(value: &str) -> Result<DisputeStatus> {
    match value.to_ascii_lowercase().as_str() {
        "under_review" => Ok(DisputeStatus::UnderReview),
        "resolved" => Ok(DisputeStatus::Resolved),
        "rejected" => Ok(DisputeStatus::Rejected),
        other => Err(LedgerError::ValidationError(format!(
            "dispute cannot be moved to '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::EventPublisher;
    use crate::config::Settings;
    use crate::domain::booking::{BookingStatus, TutorProfile};
    use crate::domain::identity::UserId;
    use crate::domain::money::Money;
    use crate::infrastructure::in_memory::{InMemoryCatalog, InMemoryProofStore, InMemoryStore};
    use crate::interfaces::csv::command_reader::CommandReader;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn replayer() -> Replayer {
        let catalog = InMemoryCatalog::with_tutors([TutorProfile {
            tutor: UserId::new("t1"),
            display_name: "Ada Reyes".into(),
            hourly_rate: Money::new(dec!(300)).unwrap(),
        }]);
        let services = Services::new(
            &Settings::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(catalog),
            Arc::new(InMemoryProofStore::permissive()),
            EventPublisher::disabled(),
        )
        .unwrap();
        Replayer::new(services)
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(
            parse_time("09:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert!(parse_time("9.30").is_err());
        assert_eq!(parse_decision("Accept").unwrap(), Decision::Accept);
        assert_eq!(parse_outcome("rejected").unwrap(), VerificationOutcome::Rejected);
        assert!(parse_dispute_status("open").is_err());
    }

    #[tokio::test]
    async fn test_replay_full_lifecycle() {
        let data = "\
op,actor,role,booking,payment,tutor,subject,date,time,hours,decision,reference,outcome,reason
create_booking,s1,student,b1,,t1,Algebra,2026-11-02,14:00,2,,,,
respond,t1,tutor,b1,,,,,,,accept,,,
submit_payment_proof,s1,tutee,b1,,,,,,,,gcash.png,,
verify,admin,admin,b1,,,,,,,,receipt.png,confirmed,
submit_session_proof,t1,tutor,b1,,,,,,,,session.png,,
create_payout,admin,admin,b1,,,,,,,,,,
mark_payout_paid,admin,admin,b1,payout,,,,,,,,,
mark_payout_paid,admin,admin,b1,payout,,,,,,,,,";
        let mut replayer = replayer();
        let summary = replayer
            .replay(CommandReader::new(data.as_bytes()).entries())
            .await;

        assert_eq!(summary, ReplaySummary { applied: 7, rejected: 1 });
        let id = replayer.aliases["b1"];
        let booking = replayer.services().bookings.booking(id).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Completed);
        assert_eq!(replayer.labels()[&id], "b1");
    }

    #[tokio::test]
    async fn test_unknown_alias_is_rejected() {
        let mut replayer = replayer();
        let err = replayer
            .apply(JournalEntry {
                op: Some(Op::Cancel),
                actor: "s1".into(),
                role: "student".into(),
                booking: Some("nope".into()),
                ..JournalEntry::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ValidationError(_)));
    }
}
