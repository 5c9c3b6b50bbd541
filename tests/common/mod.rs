#![allow(dead_code)]

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use session_ledger::application::Services;
use session_ledger::application::events::{EventPublisher, EventStream};
use session_ledger::config::Settings;
use session_ledger::domain::booking::{BookingRequest, Decision, NewBooking, TutorProfile};
use session_ledger::domain::events::LifecycleEvent;
use session_ledger::domain::identity::{Actor, UserId};
use session_ledger::domain::money::{Money, ProofRef};
use session_ledger::domain::payment::{Payment, VerificationOutcome};
use session_ledger::infrastructure::in_memory::{
    InMemoryCatalog, InMemoryProofStore, InMemoryStore,
};
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Arc;

pub const STUDENT: &str = "student-1";
pub const TUTOR: &str = "tutor-1";
pub const ADMIN: &str = "admin-1";

pub fn student() -> Actor {
    Actor::student(STUDENT)
}

pub fn tutor() -> Actor {
    Actor::tutor(TUTOR)
}

pub fn admin() -> Actor {
    Actor::admin(ADMIN)
}

pub fn proof(reference: &str) -> ProofRef {
    ProofRef::new(reference).unwrap()
}

/// Services over in-memory adapters, with the event stream kept so tests can
/// inspect what was published.
pub struct Harness {
    pub services: Services,
    pub store: Arc<InMemoryStore>,
    pub catalog: InMemoryCatalog,
    pub proofs: InMemoryProofStore,
    pub events: EventStream,
}

pub struct HarnessBuilder {
    settings: Settings,
    tutors: Vec<TutorProfile>,
    proofs: Vec<String>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            tutors: vec![tutor_profile(TUTOR, dec!(300))],
            proofs: [
                "proofs/gcash.png",
                "proofs/receipt.png",
                "proofs/session.png",
                "proofs/dispute.png",
                "proofs/refund.png",
                "proofs/payout.png",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }

    pub fn fee_rate(mut self, rate: Decimal) -> Self {
        self.settings.platform_fee_rate = rate;
        self
    }

    pub fn tutor(mut self, id: &str, hourly_rate: Decimal) -> Self {
        self.tutors.push(tutor_profile(id, hourly_rate));
        self
    }

    pub async fn build(self) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let catalog = InMemoryCatalog::with_tutors(self.tutors);
        let proofs = InMemoryProofStore::new();
        for reference in self.proofs {
            proofs.register(reference).await;
        }
        let (publisher, events) = EventPublisher::channel();
        let services = Services::new(
            &self.settings,
            store.clone(),
            Arc::new(catalog.clone()),
            Arc::new(proofs.clone()),
            publisher,
        )
        .unwrap();
        Harness {
            services,
            store,
            catalog,
            proofs,
            events,
        }
    }
}

pub async fn harness() -> Harness {
    HarnessBuilder::new().build().await
}

pub fn tutor_profile(id: &str, hourly_rate: Decimal) -> TutorProfile {
    TutorProfile {
        tutor: UserId::new(id),
        display_name: format!("Tutor {}", id),
        hourly_rate: Money::new(hourly_rate).unwrap(),
    }
}

pub fn new_booking(hours: Decimal) -> NewBooking {
    NewBooking {
        tutor: UserId::new(TUTOR),
        subject: "Calculus".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
        start_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        duration_hours: hours,
        notes: Some("limits and derivatives".to_string()),
    }
}

impl Harness {
    pub async fn pending_booking(&self, hours: Decimal) -> BookingRequest {
        self.services
            .bookings
            .create_booking(&student(), new_booking(hours))
            .await
            .unwrap()
    }

    /// A booking in `awaiting_payment` with its pending collection.
    pub async fn awaiting_payment(&self, hours: Decimal) -> (BookingRequest, Payment) {
        let booking = self.pending_booking(hours).await;
        let booking = self
            .services
            .bookings
            .respond_to_booking(&tutor(), booking.id, Decision::Accept)
            .await
            .unwrap();
        let collection = self
            .services
            .payments
            .collection_for(booking.id)
            .await
            .unwrap()
            .unwrap();
        (booking, collection)
    }

    /// A booking in `payment_approved` with its confirmed collection.
    pub async fn payment_approved(&self, hours: Decimal) -> (BookingRequest, Payment) {
        let (booking, collection) = self.awaiting_payment(hours).await;
        self.services
            .payments
            .submit_proof(&student(), collection.id, proof("proofs/gcash.png"))
            .await
            .unwrap();
        let collection = self
            .services
            .payments
            .verify(
                &admin(),
                collection.id,
                VerificationOutcome::Confirmed,
                Some(proof("proofs/receipt.png")),
                None,
            )
            .await
            .unwrap();
        let booking = self.services.bookings.booking(booking.id).await.unwrap();
        (booking, collection)
    }

    /// A `completed` booking with its confirmed collection.
    pub async fn completed(&self, hours: Decimal) -> (BookingRequest, Payment) {
        let (booking, collection) = self.payment_approved(hours).await;
        let booking = self
            .services
            .bookings
            .submit_session_proof(&tutor(), booking.id, Some(proof("proofs/session.png")))
            .await
            .unwrap();
        (booking, collection)
    }

    /// Every event published so far.
    pub fn drain_events(&mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn write_file(path: &Path, lines: &[&str]) -> Result<(), Error> {
    let mut file = File::create(path)?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    Ok(())
}
