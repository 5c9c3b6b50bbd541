use crate::domain::booking::{BookingRequest, TutorProfile};
use crate::domain::identity::{BookingId, PaymentId, UserId};
use crate::domain::money::ProofRef;
use crate::domain::payment::Payment;
use crate::domain::ports::{
    BookingFilter, BookingStore, Catalog, ChangeSet, PaymentFilter, PaymentStore, ProofStore,
    Store, Write,
};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    bookings: HashMap<BookingId, BookingRequest>,
    payments: HashMap<PaymentId, Payment>,
}

/// A thread-safe in-memory store for bookings and payments.
///
/// Both tables sit behind one `RwLock`, so a commit checks every expected
/// version and applies every write while holding the write guard.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

trait Versioned {
    type Key: Eq + Hash + Copy + std::fmt::Display;
    const ENTITY: &'static str;
    fn key(&self) -> Self::Key;
    fn version(&self) -> u64;
}

impl Versioned for BookingRequest {
    type Key = BookingId;
    const ENTITY: &'static str = "booking";
    fn key(&self) -> BookingId {
        self.id
    }
    fn version(&self) -> u64 {
        self.version
    }
}

impl Versioned for Payment {
    type Key = PaymentId;
    const ENTITY: &'static str = "payment";
    fn key(&self) -> PaymentId {
        self.id
    }
    fn version(&self) -> u64 {
        self.version
    }
}

/// Rejects the whole batch if any write is stale, or if two writes in the
/// batch touch the same row.
fn check_writes<T: Versioned>(table: &HashMap<T::Key, T>, writes: &[Write<T>]) -> Result<()> {
    let mut seen = HashSet::new();
    for write in writes {
        let key = write.row.key();
        let current = table.get(&key).map(Versioned::version);
        if !seen.insert(key) || current != write.expected_version {
            return Err(LedgerError::Conflict {
                entity: T::ENTITY,
                id: key.to_string(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn booking(&self, id: BookingId) -> Result<Option<BookingRequest>> {
        let tables = self.tables.read().await;
        Ok(tables.bookings.get(&id).cloned())
    }

    async fn bookings(&self, filter: &BookingFilter) -> Result<Vec<BookingRequest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.get(&id).cloned())
    }

    async fn payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut tables = self.tables.write().await;
        check_writes(&tables.bookings, &changes.bookings)?;
        check_writes(&tables.payments, &changes.payments)?;

        for write in changes.bookings {
            tables.bookings.insert(write.row.id, write.row);
        }
        for write in changes.payments {
            tables.payments.insert(write.row.id, write.row);
        }
        Ok(())
    }
}

/// Tutor catalog backed by a map, seeded from the tutor CSV or by tests.
#[derive(Default, Clone)]
pub struct InMemoryCatalog {
    tutors: Arc<RwLock<HashMap<UserId, TutorProfile>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tutors(tutors: impl IntoIterator<Item = TutorProfile>) -> Self {
        let tutors = tutors.into_iter().map(|t| (t.tutor.clone(), t)).collect();
        Self {
            tutors: Arc::new(RwLock::new(tutors)),
        }
    }

    /// Adds or replaces a tutor. Existing bookings keep their snapshot.
    pub async fn upsert(&self, profile: TutorProfile) {
        self.tutors
            .write()
            .await
            .insert(profile.tutor.clone(), profile);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn tutor(&self, tutor: &UserId) -> Result<Option<TutorProfile>> {
        Ok(self.tutors.read().await.get(tutor).cloned())
    }
}

/// Proof store that knows which references were uploaded. In permissive
/// mode every non-blank reference resolves, which is what the CLI replay
/// uses since uploads happen outside the journal.
#[derive(Default, Clone)]
pub struct InMemoryProofStore {
    known: Arc<RwLock<HashSet<String>>>,
    permissive: bool,
}

impl InMemoryProofStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    pub async fn register(&self, reference: impl Into<String>) {
        self.known.write().await.insert(reference.into());
    }
}

#[async_trait]
impl ProofStore for InMemoryProofStore {
    async fn contains(&self, reference: &ProofRef) -> Result<bool> {
        if self.permissive {
            return Ok(true);
        }
        Ok(self.known.read().await.contains(reference.as_str()))
    }
}
