use crate::domain::booking::BookingStatus;
use crate::domain::identity::UserId;
use crate::domain::money::{Money, round_money};
use crate::domain::payment::{DisputeStatus, PaymentKind, PaymentStatus};
use crate::domain::ports::{BookingFilter, PaymentFilter, StoreRef};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Aggregates for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    /// One entry per booking status, including zero counts.
    pub bookings_by_status: Vec<(BookingStatus, usize)>,
    /// One entry per (kind, status) pair that occurs.
    pub payments_by_status: Vec<(PaymentKind, PaymentStatus, usize)>,
    /// Sum of confirmed collections.
    pub gross_collected: Money,
    pub refunded: Money,
    pub paid_out: Money,
    /// Sum of payouts created but not yet paid.
    pub outstanding_payouts: Money,
    /// Confirmed collections minus every payout owed against them.
    pub platform_earnings: Money,
    /// Disputes that are open or under review.
    pub open_disputes: usize,
}

impl DashboardStats {
    pub fn bookings_with(&self, status: BookingStatus) -> usize {
        self.bookings_by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, count)| *count)
    }

    pub fn payments_with(&self, kind: PaymentKind, status: PaymentStatus) -> usize {
        self.payments_by_status
            .iter()
            .find(|(k, s, _)| *k == kind && *s == status)
            .map_or(0, |(_, _, count)| *count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TutorSummary {
    pub tutor: UserId,
    pub completed_sessions: usize,
    pub earnings: Money,
    pub pending_earnings: Money,
    /// Mean of student ratings, rounded to two places.
    pub average_rating: Option<Decimal>,
    pub rating_count: usize,
}

/// Read-only aggregation over the store.
#[derive(Clone)]
pub struct Statistics {
    store: StoreRef,
}

impl Statistics {
    pub fn new(store: StoreRef) -> Self {
        Self { store }
    }

    pub async fn dashboard(&self) -> Result<DashboardStats> {
        let bookings = self.store.bookings(&BookingFilter::default()).await?;
        let payments = self.store.payments(&PaymentFilter::default()).await?;

        let mut booking_counts: HashMap<BookingStatus, usize> = HashMap::new();
        for booking in &bookings {
            *booking_counts.entry(booking.status).or_default() += 1;
        }
        let bookings_by_status = BookingStatus::ALL
            .iter()
            .map(|status| (*status, booking_counts.get(status).copied().unwrap_or(0)))
            .collect();

        let mut payment_counts: HashMap<(PaymentKind, PaymentStatus), usize> = HashMap::new();
        let mut stats = DashboardStats {
            bookings_by_status,
            payments_by_status: Vec::new(),
            gross_collected: Money::ZERO,
            refunded: Money::ZERO,
            paid_out: Money::ZERO,
            outstanding_payouts: Money::ZERO,
            platform_earnings: Money::ZERO,
            open_disputes: 0,
        };

        for payment in &payments {
            *payment_counts.entry((payment.kind, payment.status)).or_default() += 1;
            match (payment.kind, payment.status) {
                (PaymentKind::Collection, PaymentStatus::Confirmed) => {
                    stats.gross_collected += payment.amount
                }
                (PaymentKind::Collection, PaymentStatus::Refunded) => {
                    stats.refunded += payment.amount
                }
                (PaymentKind::Payout, PaymentStatus::AdminPaid) => stats.paid_out += payment.amount,
                (PaymentKind::Payout, PaymentStatus::Pending) => {
                    stats.outstanding_payouts += payment.amount
                }
                _ => {}
            }
            if matches!(
                payment.dispute_status,
                DisputeStatus::Open | DisputeStatus::UnderReview
            ) {
                stats.open_disputes += 1;
            }
        }

        stats.platform_earnings =
            stats.gross_collected - (stats.paid_out + stats.outstanding_payouts);
        for kind in [PaymentKind::Collection, PaymentKind::Payout] {
            for status in PaymentStatus::ALL {
                if let Some(count) = payment_counts.get(&(kind, status)) {
                    stats.payments_by_status.push((kind, status, *count));
                }
            }
        }
        Ok(stats)
    }

    pub async fn tutor_summary(&self, tutor: &UserId) -> Result<TutorSummary> {
        let bookings = self
            .store
            .bookings(&BookingFilter {
                tutor: Some(tutor.clone()),
                ..BookingFilter::default()
            })
            .await?;
        let payouts = self
            .store
            .payments(&PaymentFilter {
                kind: Some(PaymentKind::Payout),
                ..PaymentFilter::default()
            })
            .await?;

        let ratings: Vec<u8> = bookings
            .iter()
            .filter_map(|b| b.tutee_rating.map(|r| r.value()))
            .collect();
        let average_rating = if ratings.is_empty() {
            None
        } else {
            let total: u32 = ratings.iter().map(|r| u32::from(*r)).sum();
            Some(round_money(
                Decimal::from(total) / Decimal::from(ratings.len()),
            ))
        };

        let mut summary = TutorSummary {
            tutor: tutor.clone(),
            completed_sessions: bookings
                .iter()
                .filter(|b| b.status == BookingStatus::Completed)
                .count(),
            earnings: Money::ZERO,
            pending_earnings: Money::ZERO,
            average_rating,
            rating_count: ratings.len(),
        };
        for payout in payouts.iter().filter(|p| &p.counterparty == tutor) {
            match payout.status {
                PaymentStatus::AdminPaid => summary.earnings += payout.amount,
                PaymentStatus::Pending => summary.pending_earnings += payout.amount,
                _ => {}
            }
        }
        Ok(summary)
    }
}
