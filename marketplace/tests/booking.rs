//! Quotes and bookings end to end.

#![allow(clippy::unwrap_used)]

mod common;

use chrono::NaiveDate;
use common::{app, booking_date, content_priced, host_actor, live_listing, moderator, request, ten_am};
use experiences_marketplace::{
    HostId, ListingStatus, MarketplaceApp, MarketplaceConfig, MarketplaceError, Money, PriceTier,
    Pricing, ReferralId, ReservationStatus, TimeOfDay,
    ledgers::{HostEarningsLedger, PlatformAnalyticsLedger, PromoterAnalyticsLedger},
    stores::ReservationStore,
};
use experiences_testing::{ManualClock, test_clock};
use experiences_core::environment::Clock;
use rust_decimal::Decimal;
use std::sync::Arc;

#[tokio::test]
async fn booking_freezes_price_and_credits_every_ledger() {
    let app = app();
    let host = HostId::new("h1");
    let listing = live_listing(&app, &host).await;

    let receipt = app
        .bookings
        .book(request(&listing.id, 2, Some("p1")))
        .await
        .unwrap();
    assert!(receipt.ledger_failures.is_empty());

    let reservation = receipt.reservation;
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert_eq!(reservation.total_price, Money::from_units(200));
    assert_eq!(reservation.platform_fee, Money::from_units(20));
    assert_eq!(reservation.host_id, Some(host.clone()));
    assert_eq!(reservation.booked_on, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());

    let stored = app.reservations.get(&reservation.id).await.unwrap().unwrap();
    assert_eq!(stored, reservation);

    let day = app
        .ledgers
        .platform
        .snapshot()
        .await
        .unwrap()
        .day(reservation.booked_on);
    assert_eq!(day.revenue, Money::from_units(200));
    assert_eq!(day.fees, Money::from_units(20));
    assert_eq!(day.bookings, 1);
    assert_eq!(
        app.ledgers.hosts.earnings(&host).await.unwrap().total_earnings,
        Money::from_units(200)
    );
    let promoter = app.ledgers.promoters.stats(&ReferralId::new("p1")).await.unwrap();
    assert_eq!(promoter.total_bookings, 1);
    assert_eq!(promoter.total_revenue, Money::from_units(200));
}

#[tokio::test]
async fn quote_uses_tier_fallback_and_punti_commission() {
    let app = app();
    let host = HostId::new("h1");
    let mut content = content_priced(100);
    content.pricing = Some(Pricing::Custom {
        custom_pricing: vec![
            PriceTier::new(1, 2, Decimal::from(10)),
            PriceTier::new(5, 8, Decimal::from(25)),
        ],
    });
    let draft = app.lifecycle.create_draft(host.clone(), content).await.unwrap();
    app.lifecycle.submit(&draft.id, host_actor(&host)).await.unwrap();
    app.lifecycle.approve(&draft.id, moderator()).await.unwrap();
    app.loyalty
        .increase_punti(&moderator(), &draft.id, 100)
        .await
        .unwrap();

    let quote = app.bookings.quote(&request(&draft.id, 3, None)).await.unwrap();
    assert_eq!(quote.price.unit_price, Money::from_units(10));
    assert_eq!(quote.price.chargeable_total, Money::from_units(30));
    assert_eq!(quote.commission_percent, Decimal::from(20));
    assert_eq!(quote.platform_fee, Money::from_units(6));
}

#[tokio::test]
async fn price_change_after_booking_leaves_reservation_untouched() {
    let app = app();
    let host = HostId::new("h1");
    let listing = live_listing(&app, &host).await;
    let receipt = app.bookings.book(request(&listing.id, 1, None)).await.unwrap();

    app.lifecycle
        .stage_revision(&listing.id, host_actor(&host), content_priced(150))
        .await
        .unwrap();
    let during_review = app.bookings.quote(&request(&listing.id, 1, None)).await.unwrap();
    assert_eq!(during_review.price.chargeable_total, Money::from_units(100));

    app.lifecycle.approve(&listing.id, moderator()).await.unwrap();
    let after = app.bookings.quote(&request(&listing.id, 1, None)).await.unwrap();
    assert_eq!(after.price.chargeable_total, Money::from_units(150));

    let stored = app
        .reservations
        .get(&receipt.reservation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_price, Money::from_units(100));
}

#[tokio::test]
async fn slot_outside_schedule_or_notice_is_unavailable() {
    let app = app();
    let listing = live_listing(&app, &HostId::new("h1")).await;

    let mut wrong_time = request(&listing.id, 1, None);
    wrong_time.time = TimeOfDay::new(11, 0).unwrap();
    assert!(matches!(
        app.bookings.book(wrong_time).await,
        Err(MarketplaceError::SlotUnavailable { .. })
    ));

    let mut too_soon = request(&listing.id, 1, None);
    too_soon.date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
    too_soon.time = ten_am();
    assert!(matches!(
        app.bookings.book(too_soon).await,
        Err(MarketplaceError::SlotUnavailable { .. })
    ));

    let snapshot = app.ledgers.platform.snapshot().await.unwrap();
    assert_eq!(snapshot.day(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()).bookings, 0);
}

#[tokio::test]
async fn closed_specific_date_rejects_booking() {
    let app = app();
    let host = HostId::new("h1");
    let mut content = content_priced(100);
    content
        .availability_rules
        .specific_dates
        .insert(booking_date().to_string(), Vec::new());
    let draft = app.lifecycle.create_draft(host.clone(), content).await.unwrap();
    app.lifecycle.submit(&draft.id, host_actor(&host)).await.unwrap();
    app.lifecycle.approve(&draft.id, moderator()).await.unwrap();

    assert!(matches!(
        app.bookings.quote(&request(&draft.id, 1, None)).await,
        Err(MarketplaceError::SlotUnavailable { .. })
    ));
}

#[tokio::test]
async fn hidden_or_suspended_listings_cannot_be_booked() {
    let app = app();
    let host = HostId::new("h1");
    let draft = app
        .lifecycle
        .create_draft(host.clone(), content_priced(100))
        .await
        .unwrap();
    assert_eq!(
        app.bookings.quote(&request(&draft.id, 1, None)).await,
        Err(MarketplaceError::ListingNotBookable {
            listing_id: draft.id.clone(),
            status: ListingStatus::Draft,
        })
    );

    let listing = live_listing(&app, &host).await;
    app.lifecycle.suspend_host(&host, &moderator()).await.unwrap();
    assert_eq!(
        app.bookings.book(request(&listing.id, 1, None)).await.map(|_| ()),
        Err(MarketplaceError::HostSuspended { host_id: host })
    );
}

#[tokio::test]
async fn zero_guests_rejected_before_any_lookup() {
    let app = app();
    let missing = experiences_marketplace::ListingId::new("does-not-exist");
    assert_eq!(
        app.bookings.quote(&request(&missing, 0, None)).await,
        Err(MarketplaceError::InvalidGuestCount { guest_count: 0 })
    );
}

#[tokio::test]
async fn slot_closes_once_notice_runs_out() {
    let clock = Arc::new(ManualClock::new(test_clock().now()));
    let app = MarketplaceApp::in_memory(MarketplaceConfig::default(), Arc::clone(&clock) as _);
    let listing = live_listing(&app, &HostId::new("h1")).await;
    assert!(app.bookings.quote(&request(&listing.id, 1, None)).await.is_ok());

    // 2026-01-10 10:00 Rome is 09:00 UTC; 24h notice ends 2026-01-09 09:00 UTC
    clock.advance(chrono::Duration::days(4));
    assert!(app.bookings.quote(&request(&listing.id, 1, None)).await.is_ok());
    clock.advance(chrono::Duration::seconds(1));
    assert!(matches!(
        app.bookings.quote(&request(&listing.id, 1, None)).await,
        Err(MarketplaceError::SlotUnavailable { .. })
    ));
}
