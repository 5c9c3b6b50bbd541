use super::booking::{BookingRequest, BookingStatus, TutorProfile};
use super::identity::{BookingId, PaymentId, UserId};
use super::money::ProofRef;
use super::payment::{Payment, PaymentKind, PaymentStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Read filter for bookings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
    pub student: Option<UserId>,
    pub tutor: Option<UserId>,
    /// Matches either side of the booking.
    pub party: Option<UserId>,
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &BookingRequest) -> bool {
        self.student.as_ref().is_none_or(|s| &booking.student == s)
            && self.tutor.as_ref().is_none_or(|t| &booking.tutor == t)
            && self.party.as_ref().is_none_or(|p| booking.is_party(p))
            && self.status.is_none_or(|s| booking.status == s)
    }
}

/// Read filter for payments. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentFilter {
    pub booking: Option<BookingId>,
    pub kind: Option<PaymentKind>,
    pub status: Option<PaymentStatus>,
}

impl PaymentFilter {
    pub fn for_booking(booking: BookingId) -> Self {
        Self {
            booking: Some(booking),
            ..Self::default()
        }
    }

    pub fn matches(&self, payment: &Payment) -> bool {
        self.booking.is_none_or(|b| payment.booking_id == b)
            && self.kind.is_none_or(|k| payment.kind == k)
            && self.status.is_none_or(|s| payment.status == s)
    }
}

/// A row write inside a [`ChangeSet`]. `expected_version` is `None` for an
/// insert; otherwise the stored row must still carry that version.
#[derive(Debug, Clone, PartialEq)]
pub struct Write<T> {
    pub expected_version: Option<u64>,
    pub row: T,
}

/// Writes applied by [`Store::commit`] as one atomic unit: either every row
/// version matches and all rows are written, or nothing is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub bookings: Vec<Write<BookingRequest>>,
    pub payments: Vec<Write<Payment>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a new booking and returns it as it will be stored.
    pub fn insert_booking(&mut self, mut booking: BookingRequest) -> BookingRequest {
        booking.version = 1;
        self.bookings.push(Write {
            expected_version: None,
            row: booking.clone(),
        });
        booking
    }

    pub fn update_booking(&mut self, mut booking: BookingRequest) -> BookingRequest {
        let expected = booking.version;
        booking.version += 1;
        self.bookings.push(Write {
            expected_version: Some(expected),
            row: booking.clone(),
        });
        booking
    }

    pub fn insert_payment(&mut self, mut payment: Payment) -> Payment {
        payment.version = 1;
        self.payments.push(Write {
            expected_version: None,
            row: payment.clone(),
        });
        payment
    }

    pub fn update_payment(&mut self, mut payment: Payment) -> Payment {
        let expected = payment.version;
        payment.version += 1;
        self.payments.push(Write {
            expected_version: Some(expected),
            row: payment.clone(),
        });
        payment
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn booking(&self, id: BookingId) -> Result<Option<BookingRequest>>;
    async fn bookings(&self, filter: &BookingFilter) -> Result<Vec<BookingRequest>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>>;
    async fn payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>>;
}

/// Durable rows for bookings and payments, with an atomic multi-row commit.
#[async_trait]
pub trait Store: BookingStore + PaymentStore {
    /// Fails with `LedgerError::Conflict` when any expected version is stale
    /// or an insert collides with an existing row; nothing is written then.
    async fn commit(&self, changes: ChangeSet) -> Result<()>;
}

/// Catalog/identity provider: tutor display name and hourly rate.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn tutor(&self, tutor: &UserId) -> Result<Option<TutorProfile>>;
}

/// External blob store holding uploaded evidence. The core only checks that
/// a reference resolves.
#[async_trait]
pub trait ProofStore: Send + Sync {
    async fn contains(&self, reference: &ProofRef) -> Result<bool>;
}

pub type StoreRef = Arc<dyn Store>;
pub type CatalogRef = Arc<dyn Catalog>;
pub type ProofStoreRef = Arc<dyn ProofStore>;
