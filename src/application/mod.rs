//! Application layer: the booking engine, the payment ledger and the
//! dashboard aggregates, all running on top of the storage ports.
//!
//! Every state transition goes through [`unit_of_work::UnitOfWork`]: read the
//! current rows, validate the transition in the domain, stage the new rows,
//! and commit them atomically with a version check. Lifecycle events are
//! published only after the commit succeeds.

pub mod booking_engine;
pub mod collaborators;
pub mod events;
pub mod payment_ledger;
pub mod statistics;
pub mod unit_of_work;

use crate::config::Settings;
use crate::domain::ports::{CatalogRef, ProofStoreRef, StoreRef};
use crate::domain::settlement::SettlementCalculator;
use crate::error::Result;
use booking_engine::BookingEngine;
use collaborators::{CatalogGateway, ProofGate};
use events::EventPublisher;
use payment_ledger::PaymentLedger;
use statistics::Statistics;
use unit_of_work::UnitOfWork;

/// The services sharing one store and one event publisher.
#[derive(Clone)]
pub struct Services {
    pub bookings: BookingEngine,
    pub payments: PaymentLedger,
    pub statistics: Statistics,
}

impl Services {
    pub fn new(
        settings: &Settings,
        store: StoreRef,
        catalog: CatalogRef,
        proofs: ProofStoreRef,
        events: EventPublisher,
    ) -> Result<Self> {
        settings.validate()?;
        let calculator = SettlementCalculator::new(settings.fee_rate()?);
        let policy = settings.retry_policy();
        let uow = UnitOfWork::new(store.clone(), events, settings.commit_attempts);
        let proof_gate = ProofGate::new(proofs, policy);

        Ok(Self {
            bookings: BookingEngine::new(
                uow.clone(),
                CatalogGateway::new(catalog, policy),
                proof_gate.clone(),
                calculator,
                settings.duration_limits(),
            ),
            payments: PaymentLedger::new(uow, proof_gate, calculator),
            statistics: Statistics::new(store),
        })
    }
}
