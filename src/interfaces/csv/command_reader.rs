use crate::error::{LedgerError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// Operation named in the `op` column of a journal row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    CreateBooking,
    Respond,
    SubmitSessionProof,
    Rate,
    Cancel,
    OpenCollection,
    SubmitPaymentProof,
    Verify,
    OpenDispute,
    ResolveDispute,
    Refund,
    CreatePayout,
    MarkPayoutPaid,
}

/// One row of the command journal. Which columns matter depends on `op`;
/// the rest are left empty.
///
/// `booking` is a journal-local alias bound by `create_booking`. `payment`
/// is either `collection`, `payout` (the booking's current payment of that
/// kind) or a payment id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JournalEntry {
    pub op: Option<Op>,
    pub actor: String,
    pub role: String,
    #[serde(default)]
    pub booking: Option<String>,
    #[serde(default)]
    pub payment: Option<String>,
    #[serde(default)]
    pub tutor: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub hours: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Reads journal rows from a CSV source, trimming whitespace and tolerating
/// short rows.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows; a malformed row yields an error and the
    /// iterator carries on with the next one.
    pub fn entries(self) -> impl Iterator<Item = Result<JournalEntry>> {
        self.reader.into_deserialize().map(|result| {
            let entry: JournalEntry = result.map_err(LedgerError::from)?;
            if entry.op.is_none() {
                return Err(LedgerError::ValidationError(
                    "journal row has no op".to_string(),
                ));
            }
            Ok(entry)
        })
    }
}
