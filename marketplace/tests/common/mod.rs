//! Shared fixtures for marketplace integration tests.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use chrono::NaiveDate;
use experiences_marketplace::{
    ActorId, AvailabilityRules, BookingRequest, HostId, Listing, ListingContent, ListingId,
    MarketplaceApp, MarketplaceConfig, Pricing, ReferralId, TimeOfDay,
};
use experiences_testing::test_clock;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Monday 2026-01-05 09:00 UTC, 10:00 in Rome
pub fn app() -> MarketplaceApp {
    MarketplaceApp::in_memory(MarketplaceConfig::default(), Arc::new(test_clock()))
}

pub fn ten_am() -> TimeOfDay {
    TimeOfDay::new(10, 0).unwrap()
}

/// Fixed price of `price` per person, open every day at 10:00, 24h notice
pub fn content_priced(price: i64) -> ListingContent {
    ListingContent {
        title: "Sunset kayak tour".into(),
        category: Some("outdoor".into()),
        location: Some("Amalfi".into()),
        images: vec!["https://img.example/kayak.jpg".into()],
        description: Some("Two hours along the coast".into()),
        pricing: Some(Pricing::Fixed {
            price: Decimal::from(price),
        }),
        availability_rules: AvailabilityRules {
            default_times: [ten_am()].into_iter().collect(),
            ..AvailabilityRules::default()
        },
        hours_in_advance: 24,
    }
}

pub fn host_actor(host: &HostId) -> ActorId {
    ActorId::new(host.as_str())
}

pub fn moderator() -> ActorId {
    ActorId::new("moderator-1")
}

/// Draft, submit and approve a listing priced at 100
pub async fn live_listing(app: &MarketplaceApp, host: &HostId) -> Listing {
    let draft = app
        .lifecycle
        .create_draft(host.clone(), content_priced(100))
        .await
        .unwrap();
    app.lifecycle.submit(&draft.id, host_actor(host)).await.unwrap();
    app.lifecycle.approve(&draft.id, moderator()).await.unwrap();
    app.lifecycle.listing(&draft.id).await.unwrap()
}

/// Saturday, comfortably past the 24h notice
pub fn booking_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()
}

pub fn request(listing_id: &ListingId, guest_count: u32, referral: Option<&str>) -> BookingRequest {
    BookingRequest {
        listing_id: listing_id.clone(),
        guest_id: ActorId::new("guest-1"),
        guest_count,
        date: booking_date(),
        time: ten_am(),
        referral_id: referral.map(ReferralId::new),
    }
}
