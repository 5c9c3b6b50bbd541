use crate::domain::booking::BookingRequest;
use crate::domain::identity::{BookingId, PaymentId};
use crate::domain::payment::Payment;
use crate::domain::ports::{
    BookingFilter, BookingStore, ChangeSet, PaymentFilter, PaymentStore, Store,
};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for booking rows.
pub const CF_BOOKINGS: &str = "bookings";
/// Column Family for payment rows, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent store implementation using RocksDB.
///
/// Rows are JSON values keyed by the 16 uuid bytes of their id. A commit
/// holds `commit_lock` while it checks versions, then writes the whole
/// change set as one `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path` with the "bookings" and
    /// "payments" column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_bookings = ColumnFamilyDescriptor::new(CF_BOOKINGS, Options::default());
        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_bookings, cf_payments])?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LedgerError::InternalError(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        keep: impl Fn(&T) -> bool,
    ) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let row: T = decode(&value)?;
            if keep(&row) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn check_version<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        entity: &'static str,
        key: &[u8],
        id: String,
        expected: Option<u64>,
        version_of: impl Fn(&T) -> u64,
    ) -> Result<()> {
        let current = self.get::<T>(cf_name, key)?.map(|row| version_of(&row));
        if current != expected {
            return Err(LedgerError::Conflict { entity, id });
        }
        Ok(())
    }
}

fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(row).map_err(|e| {
        LedgerError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {}", e),
        )))
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        LedgerError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

fn booking_key(id: BookingId) -> [u8; 16] {
    *id.as_uuid().as_bytes()
}

fn payment_key(id: PaymentId) -> [u8; 16] {
    *id.as_uuid().as_bytes()
}

#[async_trait]
impl BookingStore for RocksDBStore {
    async fn booking(&self, id: BookingId) -> Result<Option<BookingRequest>> {
        self.get(CF_BOOKINGS, &booking_key(id))
    }

    async fn bookings(&self, filter: &BookingFilter) -> Result<Vec<BookingRequest>> {
        self.scan(CF_BOOKINGS, |b| filter.matches(b))
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        self.get(CF_PAYMENTS, &payment_key(id))
    }

    async fn payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        self.scan(CF_PAYMENTS, |p| filter.matches(p))
    }
}

#[async_trait]
impl Store for RocksDBStore {
    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        let _guard = self.commit_lock.lock().await;

        let mut seen = HashSet::new();
        for write in &changes.bookings {
            let id = write.row.id;
            if !seen.insert(id.as_uuid()) {
                return Err(LedgerError::Conflict {
                    entity: "booking",
                    id: id.to_string(),
                });
            }
            self.check_version::<BookingRequest>(
                CF_BOOKINGS,
                "booking",
                &booking_key(id),
                id.to_string(),
                write.expected_version,
                |b| b.version,
            )?;
        }
        for write in &changes.payments {
            let id = write.row.id;
            if !seen.insert(id.as_uuid()) {
                return Err(LedgerError::Conflict {
                    entity: "payment",
                    id: id.to_string(),
                });
            }
            self.check_version::<Payment>(
                CF_PAYMENTS,
                "payment",
                &payment_key(id),
                id.to_string(),
                write.expected_version,
                |p| p.version,
            )?;
        }

        let mut batch = WriteBatch::default();
        let cf_bookings = self.cf(CF_BOOKINGS)?;
        for write in &changes.bookings {
            batch.put_cf(cf_bookings, booking_key(write.row.id), encode(&write.row)?);
        }
        let cf_payments = self.cf(CF_PAYMENTS)?;
        for write in &changes.payments {
            batch.put_cf(cf_payments, payment_key(write.row.id), encode(&write.row)?);
        }
        self.db.write(batch)?;

        Ok(())
    }
}
