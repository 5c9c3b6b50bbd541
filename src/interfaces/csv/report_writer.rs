use crate::application::statistics::DashboardStats;
use crate::domain::booking::BookingRequest;
use crate::domain::identity::BookingId;
use crate::domain::payment::Payment;
use crate::error::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;

#[derive(Serialize)]
struct BookingRow<'a> {
    booking: String,
    student: &'a str,
    tutor: &'a str,
    tutor_name: &'a str,
    subject: &'a str,
    date: String,
    start: String,
    hours: String,
    hourly_rate: String,
    status: &'static str,
    rating: Option<u8>,
}

#[derive(Serialize)]
struct PaymentRow<'a> {
    booking: String,
    kind: String,
    counterparty: &'a str,
    amount: String,
    status: &'static str,
    dispute: String,
    rejection_reason: Option<&'a str>,
}

#[derive(Serialize)]
struct StatRow {
    metric: String,
    value: String,
}

/// Writes CSV reports. Bookings are labelled with their journal alias when
/// one is known, otherwise with their id.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_bookings(
        &mut self,
        bookings: &[BookingRequest],
        labels: &HashMap<BookingId, String>,
    ) -> Result<()> {
        for booking in bookings {
            self.writer.serialize(BookingRow {
                booking: label(labels, booking.id),
                student: booking.student.as_str(),
                tutor: booking.tutor.as_str(),
                tutor_name: &booking.tutor_name,
                subject: &booking.subject,
                date: booking.date.to_string(),
                start: booking.start_time.format("%H:%M").to_string(),
                hours: booking.duration.to_string(),
                hourly_rate: booking.hourly_rate.to_string(),
                status: booking.status.as_str(),
                rating: booking.tutee_rating.map(|r| r.value()),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_payments(
        &mut self,
        payments: &[Payment],
        labels: &HashMap<BookingId, String>,
    ) -> Result<()> {
        for payment in payments {
            self.writer.serialize(PaymentRow {
                booking: label(labels, payment.booking_id),
                kind: payment.kind.to_string(),
                counterparty: payment.counterparty.as_str(),
                amount: payment.amount.to_string(),
                status: payment.status.as_str(),
                dispute: payment.dispute_status.to_string(),
                rejection_reason: payment.rejection_reason.as_deref(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_stats(&mut self, stats: &DashboardStats) -> Result<()> {
        let mut rows = Vec::new();
        for (status, count) in &stats.bookings_by_status {
            rows.push(stat(format!("bookings.{}", status), count));
        }
        for (kind, status, count) in &stats.payments_by_status {
            rows.push(stat(format!("payments.{}.{}", kind, status), count));
        }
        rows.push(stat("gross_collected".into(), stats.gross_collected));
        rows.push(stat("refunded".into(), stats.refunded));
        rows.push(stat("paid_out".into(), stats.paid_out));
        rows.push(stat("outstanding_payouts".into(), stats.outstanding_payouts));
        rows.push(stat("platform_earnings".into(), stats.platform_earnings));
        rows.push(stat("open_disputes".into(), stats.open_disputes));

        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

fn label(labels: &HashMap<BookingId, String>, id: BookingId) -> String {
    labels.get(&id).cloned().unwrap_or_else(|| id.to_string())
}

fn stat(metric: String, value: impl ToString) -> StatRow {
    StatRow {
        metric,
        value: value.to_string(),
    }
}
