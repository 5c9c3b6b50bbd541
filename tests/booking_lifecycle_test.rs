mod common;

use common::*;
use rust_decimal_macros::dec;
use session_ledger::domain::booking::{BookingStatus, Decision};
use session_ledger::domain::events::LifecycleEvent;
use session_ledger::domain::identity::{Actor, BookingId, UserId};
use session_ledger::domain::payment::{CANCELLED_REASON, PaymentStatus};
use session_ledger::error::LedgerError;

#[tokio::test]
async fn test_create_booking_snapshots_rate() {
    let h = HarnessBuilder::new().build().await;
    let booking = h.pending_booking(dec!(2)).await;

    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.hourly_rate.value(), dec!(300.00));
    assert_eq!(booking.tutor_name, "Tutor tutor-1");
    assert_eq!(booking.version, 1);

    // A later rate change in the catalog does not touch the booking.
    h.catalog.upsert(tutor_profile(TUTOR, dec!(500))).await;
    let accepted = h
        .services
        .bookings
        .respond_to_booking(&tutor(), booking.id, Decision::Accept)
        .await
        .unwrap();
    let collection = h
        .services
        .payments
        .collection_for(booking.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(accepted.hourly_rate.value(), dec!(300.00));
    assert_eq!(collection.amount.value(), dec!(600.00));
}

#[tokio::test]
async fn test_create_booking_validation() {
    let h = harness().await;

    let err = h
        .services
        .bookings
        .create_booking(&Actor::student(TUTOR), new_booking(dec!(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::SameParty));

    for hours in [dec!(0), dec!(-2), dec!(12)] {
        let err = h
            .services
            .bookings
            .create_booking(&student(), new_booking(hours))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidDuration(_)), "{hours}");
    }

    let mut unknown = new_booking(dec!(2));
    unknown.tutor = UserId::new("ghost");
    let err = h
        .services
        .bookings
        .create_booking(&student(), unknown)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownTutor(_)));

    let all = h.services.bookings.bookings(&Default::default()).await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_catalog_rate_above_ceiling_is_refused() {
    let h = HarnessBuilder::new().tutor("tutor-9", dec!(5000000)).build().await;

    let mut request = new_booking(dec!(2));
    request.tutor = UserId::new("tutor-9");
    let err = h
        .services
        .bookings
        .create_booking(&student(), request)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)), "{err}");

    let all = h.services.bookings.bookings(&Default::default()).await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_accept_opens_collection_atomically() {
    let mut h = harness().await;
    let (booking, collection) = h.awaiting_payment(dec!(2)).await;

    assert_eq!(booking.status, BookingStatus::AwaitingPayment);
    let path: Vec<_> = booking.history.iter().map(|c| c.to).collect();
    assert_eq!(
        path,
        vec![BookingStatus::Accepted, BookingStatus::AwaitingPayment]
    );
    assert_eq!(collection.status, PaymentStatus::Pending);
    assert_eq!(collection.counterparty, UserId::new(STUDENT));
    assert_eq!(collection.amount.value(), dec!(600.00));

    let names: Vec<_> = h.drain_events().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["booking_requested", "booking_accepted"]);
}

#[tokio::test]
async fn test_decline_and_respond_twice() {
    let mut h = harness().await;
    let booking = h.pending_booking(dec!(1)).await;

    let err = h
        .services
        .bookings
        .respond_to_booking(&Actor::tutor("tutor-2"), booking.id, Decision::Decline)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotOwner { .. }));

    let declined = h
        .services
        .bookings
        .respond_to_booking(&tutor(), booking.id, Decision::Decline)
        .await
        .unwrap();
    assert_eq!(declined.status, BookingStatus::Declined);

    let err = h
        .services
        .bookings
        .respond_to_booking(&tutor(), booking.id, Decision::Accept)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    assert!(
        h.services
            .payments
            .payments_for_booking(booking.id)
            .await
            .unwrap()
            .is_empty()
    );

    let events = h.drain_events();
    assert!(matches!(
        events.last(),
        Some(LifecycleEvent::BookingDeclined { .. })
    ));
}

#[tokio::test]
async fn test_complete_requires_confirmed_collection_and_proof() {
    let h = harness().await;
    let (booking, _) = h.awaiting_payment(dec!(2)).await;

    let err = h
        .services
        .bookings
        .submit_session_proof(&tutor(), booking.id, Some(proof("proofs/session.png")))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::PreconditionFailed(_)));

    let (booking, _) = h.payment_approved(dec!(3)).await;
    let err = h
        .services
        .bookings
        .submit_session_proof(&tutor(), booking.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::PreconditionFailed(_)));

    let err = h
        .services
        .bookings
        .submit_session_proof(&tutor(), booking.id, Some(proof("proofs/unknown.png")))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownProof(_)));

    let completed = h
        .services
        .bookings
        .submit_session_proof(&tutor(), booking.id, Some(proof("proofs/session.png")))
        .await
        .unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);
    assert_eq!(
        completed.session_proof.as_ref().map(|p| p.as_str()),
        Some("proofs/session.png")
    );
}

#[tokio::test]
async fn test_rate_session_once() {
    let h = harness().await;
    let (booking, _) = h.payment_approved(dec!(2)).await;

    let err = h
        .services
        .bookings
        .rate_session(&student(), booking.id, 5, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));

    h.services
        .bookings
        .submit_session_proof(&tutor(), booking.id, Some(proof("proofs/session.png")))
        .await
        .unwrap();

    let err = h
        .services
        .bookings
        .rate_session(&student(), booking.id, 6, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidRating(6)));

    let rated = h
        .services
        .bookings
        .rate_session(&student(), booking.id, 4, Some("Very clear".into()))
        .await
        .unwrap();
    assert_eq!(rated.tutee_rating.map(|r| r.value()), Some(4));
    assert_eq!(rated.status, BookingStatus::Completed);

    let err = h
        .services
        .bookings
        .rate_session(&student(), booking.id, 3, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyRated(_)));
}

#[tokio::test]
async fn test_cancel_awaiting_payment_closes_collection() {
    let h = harness().await;
    let (booking, collection) = h.awaiting_payment(dec!(2)).await;

    let cancelled = h
        .services
        .bookings
        .cancel_booking(&student(), booking.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let collection = h.services.payments.payment(collection.id).await.unwrap();
    assert_eq!(collection.status, PaymentStatus::Rejected);
    assert_eq!(collection.rejection_reason.as_deref(), Some(CANCELLED_REASON));

    let err = h
        .services
        .payments
        .submit_proof(&student(), collection.id, proof("proofs/gcash.png"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
}

#[tokio::test]
async fn test_cancel_rules() {
    let h = harness().await;
    let booking = h.pending_booking(dec!(1)).await;

    let err = h
        .services
        .bookings
        .cancel_booking(&tutor(), booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { .. }));

    let cancelled = h
        .services
        .bookings
        .cancel_booking(&admin(), booking.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let (approved, _) = h.payment_approved(dec!(1)).await;
    let err = h
        .services
        .bookings
        .cancel_booking(&student(), approved.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_cancel_completed_booking_is_invalid_transition() {
    let h = harness().await;
    let (booking, _) = h.completed(dec!(2)).await;

    let err = h
        .services
        .bookings
        .cancel_booking(&student(), booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));
    let booking = h.services.bookings.booking(booking.id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Completed);
}

#[tokio::test]
async fn test_read_endpoints_filter() {
    let h = HarnessBuilder::new().tutor("tutor-2", dec!(200)).build().await;
    let first = h.pending_booking(dec!(1)).await;
    let mut other = new_booking(dec!(2));
    other.tutor = UserId::new("tutor-2");
    let second = h
        .services
        .bookings
        .create_booking(&student(), other)
        .await
        .unwrap();
    h.services
        .bookings
        .respond_to_booking(&tutor(), first.id, Decision::Decline)
        .await
        .unwrap();

    let mine = h
        .services
        .bookings
        .bookings_for_party(&UserId::new(STUDENT))
        .await
        .unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().any(|b| b.id == first.id));

    for (party, only) in [("tutor-2", second.id), (TUTOR, first.id)] {
        let theirs = h
            .services
            .bookings
            .bookings_for_party(&UserId::new(party))
            .await
            .unwrap();
        assert_eq!(theirs.iter().map(|b| b.id).collect::<Vec<_>>(), vec![only], "{party}");
    }

    let pending = h
        .services
        .bookings
        .bookings_by_status(BookingStatus::Pending)
        .await
        .unwrap();
    assert_eq!(pending.iter().map(|b| b.id).collect::<Vec<_>>(), vec![second.id]);

    let err = h
        .services
        .bookings
        .booking(BookingId::generate())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::BookingNotFound(_)));
}
