//! Cancellation saga: compensation, idempotence and partial failure.

#![allow(clippy::unwrap_used)]

mod common;

use common::{app, live_listing, moderator, request};
use experiences_marketplace::{
    ActorId, BookingService, CancelReservation, CancellationStage, CascadeStep, HostId, MarketplaceApp,
    MarketplaceError, Money, ReferralId, Reservation, ReservationCancellationCoordinator,
    ReservationId, ReservationStatus, StepOutcome, StoreError,
    ledgers::{
        AdjustmentOutcome, HostEarnings, HostEarningsLedger, LedgerEntry, Ledgers,
        PlatformAnalyticsLedger, PromoterAnalyticsLedger,
    },
    reservation::CascadeStatus,
    stores::{
        InMemoryHostDirectory, InMemoryHostEarnings, InMemoryListingRepository,
        InMemoryPlatformAnalytics, InMemoryPromoterAnalytics, InMemoryReservationStore,
        ReservationStore,
    },
};
use experiences_testing::test_clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Host earnings ledger whose credits or reversals can be switched off.
struct FlakyHostEarnings {
    inner: InMemoryHostEarnings,
    credits_down: AtomicBool,
    reversals_down: AtomicBool,
}

impl FlakyHostEarnings {
    fn wrapping(inner: &InMemoryHostEarnings) -> Self {
        Self {
            inner: inner.clone(),
            credits_down: AtomicBool::new(false),
            reversals_down: AtomicBool::new(true),
        }
    }

    fn refusing_credits(inner: &InMemoryHostEarnings) -> Self {
        Self {
            inner: inner.clone(),
            credits_down: AtomicBool::new(true),
            reversals_down: AtomicBool::new(false),
        }
    }

    fn recover(&self) {
        self.credits_down.store(false, Ordering::SeqCst);
        self.reversals_down.store(false, Ordering::SeqCst);
    }
}

impl HostEarningsLedger for FlakyHostEarnings {
    async fn record_booking(
        &self,
        host_id: &HostId,
        entry: &LedgerEntry,
    ) -> Result<AdjustmentOutcome, StoreError> {
        if self.credits_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("host ledger offline".into()));
        }
        self.inner.record_booking(host_id, entry).await
    }

    async fn reverse_booking(
        &self,
        host_id: &HostId,
        entry: &LedgerEntry,
    ) -> Result<AdjustmentOutcome, StoreError> {
        if self.reversals_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("host ledger offline".into()));
        }
        self.inner.reverse_booking(host_id, entry).await
    }

    async fn earnings(&self, host_id: &HostId) -> Result<HostEarnings, StoreError> {
        self.inner.earnings(host_id).await
    }
}

fn cancel(reservation: &Reservation, note: &str) -> CancelReservation {
    CancelReservation {
        reservation_id: reservation.id.clone(),
        actor: moderator(),
        note: note.into(),
        attachment: None,
    }
}

async fn booked(app: &MarketplaceApp) -> Reservation {
    let listing = live_listing(app, &HostId::new("h1")).await;
    app.bookings
        .book(request(&listing.id, 1, Some("p1")))
        .await
        .unwrap()
        .reservation
}

#[tokio::test]
async fn cancellation_reverses_every_ledger() {
    let app = app();
    let reservation = booked(&app).await;
    let host = HostId::new("h1");
    let promoter = ReferralId::new("p1");
    let day = reservation.booked_on;

    assert_eq!(reservation.total_price, Money::from_units(100));
    assert_eq!(
        app.ledgers.platform.snapshot().await.unwrap().day(day).revenue,
        Money::from_units(100)
    );
    assert_eq!(
        app.ledgers.hosts.earnings(&host).await.unwrap().total_earnings,
        Money::from_units(100)
    );
    assert_eq!(
        app.ledgers.promoters.stats(&promoter).await.unwrap().total_revenue,
        Money::from_units(100)
    );

    let report = app
        .cancellations
        .cancel(cancel(&reservation, "Guest no longer travelling"))
        .await
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(report.reservation, StepOutcome::Applied);
    assert_eq!(report.platform, StepOutcome::Applied);
    assert_eq!(report.host, StepOutcome::Applied);
    assert_eq!(report.referral, StepOutcome::Applied);

    let platform = app.ledgers.platform.snapshot().await.unwrap().day(day);
    assert_eq!(platform.revenue, Money::ZERO);
    assert_eq!(platform.fees, Money::ZERO);
    assert_eq!(platform.bookings, 0);
    assert_eq!(
        app.ledgers.hosts.earnings(&host).await.unwrap().total_earnings,
        Money::ZERO
    );
    let stats = app.ledgers.promoters.stats(&promoter).await.unwrap();
    assert_eq!(stats.total_revenue, Money::ZERO);
    assert_eq!(stats.total_bookings, 0);

    let stored = app.reservations.get(&reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Cancelled);
    let cancellation = stored.cancellation.unwrap();
    assert_eq!(cancellation.note, "Guest no longer travelling");
    assert!(cancellation.cascade.is_settled());
}

#[tokio::test]
async fn cancelling_twice_changes_nothing_the_second_time() {
    let app = app();
    let reservation = booked(&app).await;

    app.cancellations
        .cancel(cancel(&reservation, "First"))
        .await
        .unwrap();
    let platform = app.ledgers.platform.snapshot().await.unwrap();
    let stored = app.reservations.get(&reservation.id).await.unwrap();

    let again = app
        .cancellations
        .cancel(cancel(&reservation, "Second"))
        .await
        .unwrap();
    assert!(again.was_already_cancelled());
    assert!(again.is_complete());
    assert_eq!(again.platform, StepOutcome::AlreadyApplied);

    assert_eq!(app.ledgers.platform.snapshot().await.unwrap(), platform);
    assert_eq!(app.reservations.get(&reservation.id).await.unwrap(), stored);
}

#[tokio::test]
async fn host_ledger_failure_does_not_block_other_steps() {
    let app = app();
    let reservation = booked(&app).await;
    let host = HostId::new("h1");

    let flaky = Arc::new(FlakyHostEarnings::wrapping(&app.ledgers.hosts));
    let coordinator = ReservationCancellationCoordinator::new(
        Arc::clone(&app.reservations),
        Ledgers::new(
            Arc::clone(&app.ledgers.platform),
            Arc::clone(&flaky),
            Arc::clone(&app.ledgers.promoters),
        ),
        Arc::clone(&app.inbox) as _,
        Arc::new(test_clock()),
    );

    let report = coordinator
        .cancel(cancel(&reservation, "Venue closed"))
        .await
        .unwrap();
    assert_eq!(report.failed_steps(), vec![CascadeStep::HostEarnings]);
    assert_eq!(report.stage, CancellationStage::PlatformAdjusted);
    assert_eq!(report.platform, StepOutcome::Applied);
    assert_eq!(report.referral, StepOutcome::Applied);
    assert!(matches!(
        report.host,
        StepOutcome::Failed(MarketplaceError::AggregateAdjustmentFailure {
            step: CascadeStep::HostEarnings,
            ..
        })
    ));

    let stored = app.reservations.get(&reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Cancelled);
    assert!(matches!(
        stored.cancellation.as_ref().unwrap().cascade.host,
        CascadeStatus::Failed { .. }
    ));
    assert_eq!(
        app.ledgers.hosts.earnings(&host).await.unwrap().total_earnings,
        Money::from_units(100)
    );

    flaky.recover();
    let retried = coordinator.retry_pending_steps(&reservation.id).await.unwrap();
    assert!(retried.is_complete());
    assert_eq!(retried.host, StepOutcome::Applied);
    assert_eq!(retried.platform, StepOutcome::AlreadyApplied);
    assert_eq!(retried.referral, StepOutcome::AlreadyApplied);
    assert_eq!(
        app.ledgers.hosts.earnings(&host).await.unwrap().total_earnings,
        Money::ZERO
    );
    assert_eq!(
        app.ledgers
            .platform
            .snapshot()
            .await
            .unwrap()
            .day(reservation.booked_on)
            .revenue,
        Money::ZERO
    );
}

fn booking_with_host_ledger(
    app: &MarketplaceApp,
    hosts: &Arc<FlakyHostEarnings>,
) -> BookingService<
    InMemoryListingRepository,
    InMemoryHostDirectory,
    InMemoryReservationStore,
    InMemoryPlatformAnalytics,
    FlakyHostEarnings,
    InMemoryPromoterAnalytics,
> {
    BookingService::new(
        Arc::clone(&app.lifecycle),
        Arc::clone(&app.reservations),
        Ledgers::new(
            Arc::clone(&app.ledgers.platform),
            Arc::clone(hosts),
            Arc::clone(&app.ledgers.promoters),
        ),
        app.config.loyalty.clone(),
        app.config.timezone,
        Arc::new(test_clock()),
    )
}

#[tokio::test]
async fn cancelling_after_a_lost_host_credit_leaves_the_host_at_zero() {
    let app = app();
    let host = HostId::new("h1");
    let listing = live_listing(&app, &host).await;
    let flaky = Arc::new(FlakyHostEarnings::refusing_credits(&app.ledgers.hosts));
    let bookings = booking_with_host_ledger(&app, &flaky);

    let receipt = bookings
        .book(request(&listing.id, 1, Some("p1")))
        .await
        .unwrap();
    let steps: Vec<_> = receipt.ledger_failures.iter().map(|(step, _)| *step).collect();
    assert_eq!(steps, vec![CascadeStep::HostEarnings]);
    let reservation = receipt.reservation;
    let stored = app.reservations.get(&reservation.id).await.unwrap().unwrap();
    assert!(matches!(stored.ledger_credits.host, CascadeStatus::Failed { .. }));
    assert_eq!(stored.ledger_credits.platform, CascadeStatus::Applied);

    let report = app
        .cancellations
        .cancel(cancel(&reservation, "Host unreachable"))
        .await
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(report.host, StepOutcome::Skipped);
    assert_eq!(report.platform, StepOutcome::Applied);
    assert_eq!(report.referral, StepOutcome::Applied);

    let earnings = app.ledgers.hosts.earnings(&host).await.unwrap();
    assert_eq!(earnings.total_earnings, Money::ZERO);
    assert_eq!(earnings.bookings, 0);
    let platform = app
        .ledgers
        .platform
        .snapshot()
        .await
        .unwrap()
        .day(reservation.booked_on);
    assert_eq!(platform.revenue, Money::ZERO);
    assert_eq!(platform.bookings, 0);
    let stats = app.ledgers.promoters.stats(&ReferralId::new("p1")).await.unwrap();
    assert_eq!(stats.total_bookings, 0);

    // A credit landing after the reversal is dropped.
    flaky.recover();
    let entry = LedgerEntry::for_reservation(&reservation);
    assert_eq!(
        flaky.record_booking(&host, &entry).await.unwrap(),
        AdjustmentOutcome::Superseded
    );
    assert_eq!(
        app.ledgers.hosts.earnings(&host).await.unwrap().total_earnings,
        Money::ZERO
    );
}

#[tokio::test]
async fn pending_host_credit_is_retried_before_cancellation() {
    let app = app();
    let host = HostId::new("h1");
    let listing = live_listing(&app, &host).await;
    let flaky = Arc::new(FlakyHostEarnings::refusing_credits(&app.ledgers.hosts));
    let bookings = booking_with_host_ledger(&app, &flaky);

    let reservation = bookings
        .book(request(&listing.id, 1, Some("p1")))
        .await
        .unwrap()
        .reservation;
    assert_eq!(
        app.ledgers.hosts.earnings(&host).await.unwrap().total_earnings,
        Money::ZERO
    );

    flaky.recover();
    let retried = bookings.retry_pending_credits(&reservation.id).await.unwrap();
    assert!(retried.ledger_failures.is_empty());
    assert_eq!(retried.reservation.ledger_credits.host, CascadeStatus::Applied);
    let stored = app.reservations.get(&reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.ledger_credits, retried.reservation.ledger_credits);
    assert_eq!(
        app.ledgers.hosts.earnings(&host).await.unwrap().total_earnings,
        Money::from_units(100)
    );
    // Platform was credited once at booking time.
    assert_eq!(
        app.ledgers
            .platform
            .snapshot()
            .await
            .unwrap()
            .day(reservation.booked_on)
            .bookings,
        1
    );

    let report = app
        .cancellations
        .cancel(cancel(&reservation, "Guest request"))
        .await
        .unwrap();
    assert_eq!(report.host, StepOutcome::Applied);
    assert_eq!(
        app.ledgers.hosts.earnings(&host).await.unwrap().total_earnings,
        Money::ZERO
    );
    assert_eq!(
        bookings.retry_pending_credits(&reservation.id).await,
        Err(MarketplaceError::AlreadyCancelled {
            reservation_id: reservation.id.clone()
        })
    );
}

#[tokio::test]
async fn retry_requires_a_cancelled_reservation() {
    let app = app();
    let reservation = booked(&app).await;
    assert_eq!(
        app.cancellations.retry_pending_steps(&reservation.id).await,
        Err(MarketplaceError::ReservationNotCancelled {
            reservation_id: reservation.id.clone()
        })
    );
}

#[tokio::test]
async fn steps_without_counterpart_are_skipped() {
    let app = app();
    let listing = live_listing(&app, &HostId::new("h1")).await;
    let reservation = app
        .bookings
        .book(request(&listing.id, 1, None))
        .await
        .unwrap()
        .reservation;

    let report = app
        .cancellations
        .cancel(cancel(&reservation, "Duplicate"))
        .await
        .unwrap();
    assert_eq!(report.referral, StepOutcome::Skipped);
    assert!(report.is_complete());
}

#[tokio::test]
async fn moderator_note_is_mandatory() {
    let app = app();
    let reservation = booked(&app).await;

    assert_eq!(
        app.cancellations.cancel(cancel(&reservation, "   ")).await,
        Err(MarketplaceError::MissingCancellationNote {
            reservation_id: reservation.id.clone()
        })
    );
    let stored = app.reservations.get(&reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Confirmed);
}

#[tokio::test]
async fn unknown_reservation_is_reported() {
    let app = app();
    let missing = ReservationId::new("nope");
    assert_eq!(
        app.cancellations
            .cancel(CancelReservation {
                reservation_id: missing.clone(),
                actor: moderator(),
                note: "Cleanup".into(),
                attachment: None,
            })
            .await,
        Err(MarketplaceError::ReservationNotFound(missing))
    );
}

#[tokio::test]
async fn guest_request_only_notifies_moderators() {
    let app = app();
    let reservation = booked(&app).await;
    let before = app.ledgers.platform.snapshot().await.unwrap();

    let request = app
        .cancellations
        .request_cancellation(&reservation.id, ActorId::new("guest-1"), "Flight cancelled".into())
        .await
        .unwrap();
    assert_eq!(request.reason, "Flight cancelled");

    let inbox = app.inbox.requests().unwrap();
    assert_eq!(inbox, vec![request]);
    let stored = app.reservations.get(&reservation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReservationStatus::Confirmed);
    assert_eq!(app.ledgers.platform.snapshot().await.unwrap(), before);

    app.cancellations
        .cancel(cancel(&reservation, "Approved guest request"))
        .await
        .unwrap();
    let late = app
        .cancellations
        .request_cancellation(&reservation.id, ActorId::new("guest-1"), "Again".into())
        .await
        .unwrap_err();
    assert!(late.is_success_equivalent());
}

#[tokio::test]
async fn cancelled_reservations_share_the_ledger_with_live_ones() {
    let app = app();
    let listing = live_listing(&app, &HostId::new("h1")).await;
    let first = app
        .bookings
        .book(request(&listing.id, 1, Some("p1")))
        .await
        .unwrap()
        .reservation;
    let second = app
        .bookings
        .book(request(&listing.id, 2, Some("p1")))
        .await
        .unwrap()
        .reservation;

    app.cancellations
        .cancel(cancel(&first, "Overbooked"))
        .await
        .unwrap();

    let stats = app.ledgers.promoters.stats(&ReferralId::new("p1")).await.unwrap();
    assert_eq!(stats.total_bookings, 1);
    assert_eq!(stats.total_revenue, second.total_price);
}
