//! Marketplace demo.
//!
//! Walks one listing from draft to live, books it through a promoter's
//! referral, then cancels the booking as a moderator and prints the ledgers
//! before and after the cascade.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info,experiences_marketplace=debug cargo run --bin marketplace-demo
//! ```

use chrono::Duration;
use experiences_core::environment::{Clock, SystemClock};
use experiences_marketplace::{
    ActorId, AvailabilityRules, BookingRequest, CancelReservation, HostId, ListingContent,
    MarketplaceApp, MarketplaceConfig, Pricing, ReferralId, TimeOfDay,
    ledgers::{HostEarningsLedger, PlatformAnalyticsLedger, PromoterAnalyticsLedger},
    metrics::register_business_metrics,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let config = MarketplaceConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    register_business_metrics();

    println!("\n============================================");
    println!("   Experiences Marketplace - Live Demo");
    println!("============================================\n");

    let clock = Arc::new(SystemClock);
    let app = MarketplaceApp::in_memory(config, clock.clone());

    let host = HostId::new("h1");
    let moderator = ActorId::new("moderator-1");
    let promoter = ReferralId::new("p1");

    // Step 1: draft, submit, approve
    println!("1. Creating and approving a listing...");
    let slot: TimeOfDay = "10:00".parse()?;
    let content = ListingContent {
        title: "Sunset kayak tour".into(),
        category: Some("outdoor".into()),
        location: Some("Amalfi".into()),
        images: vec!["https://img.example/kayak.jpg".into()],
        description: Some("Two hours along the coast".into()),
        pricing: Some(Pricing::Fixed {
            price: Decimal::from(100),
        }),
        availability_rules: AvailabilityRules {
            default_times: [slot].into_iter().collect(),
            ..AvailabilityRules::default()
        },
        hours_in_advance: 24,
    };
    let listing = app.lifecycle.create_draft(host.clone(), content).await?;
    app.lifecycle
        .submit(&listing.id, ActorId::new(host.as_str()))
        .await?;
    app.lifecycle.approve(&listing.id, moderator.clone()).await?;
    println!("   listing {} is live\n", listing.id);

    // Step 2: book a week ahead
    println!("2. Booking one guest through promoter {promoter}...");
    let date = clock.now().with_timezone(&app.config.timezone).date_naive() + Duration::days(7);
    let receipt = app
        .bookings
        .book(BookingRequest {
            listing_id: listing.id.clone(),
            guest_id: ActorId::new("guest-1"),
            guest_count: 1,
            date,
            time: slot,
            referral_id: Some(promoter.clone()),
        })
        .await?;
    let reservation = receipt.reservation;
    println!(
        "   reservation {} total {} fee {}\n",
        reservation.id, reservation.total_price, reservation.platform_fee
    );
    print_ledgers(&app, &host, &promoter, reservation.booked_on).await?;

    // Step 3: moderator cancellation
    println!("\n3. Cancelling as moderator...");
    let report = app
        .cancellations
        .cancel(CancelReservation {
            reservation_id: reservation.id.clone(),
            actor: moderator.clone(),
            note: "Weather warning issued for the coast".into(),
            attachment: None,
        })
        .await?;
    println!("   stage {:?}, failed steps {:?}", report.stage, report.failed_steps());
    print_ledgers(&app, &host, &promoter, reservation.booked_on).await?;

    // Step 4: repeat, nothing is applied twice
    println!("\n4. Cancelling again...");
    let again = app
        .cancellations
        .cancel(CancelReservation {
            reservation_id: reservation.id.clone(),
            actor: moderator,
            note: "Duplicate click".into(),
            attachment: None,
        })
        .await?;
    println!("   already cancelled: {}", again.was_already_cancelled());
    print_ledgers(&app, &host, &promoter, reservation.booked_on).await?;

    println!("\n============================================");
    println!("   Demo complete");
    println!("============================================\n");
    Ok(())
}

async fn print_ledgers(
    app: &MarketplaceApp,
    host: &HostId,
    promoter: &ReferralId,
    day: chrono::NaiveDate,
) -> Result<(), Box<dyn std::error::Error>> {
    let platform = app.ledgers.platform.snapshot().await?.day(day);
    let earnings = app.ledgers.hosts.earnings(host).await?;
    let referrals = app.ledgers.promoters.stats(promoter).await?;
    println!(
        "   platform[{day}] revenue {} fees {} bookings {}",
        platform.revenue, platform.fees, platform.bookings
    );
    println!("   host {host} earnings {}", earnings.total_earnings);
    println!(
        "   promoter {promoter} revenue {} bookings {}",
        referrals.total_revenue, referrals.total_bookings
    );
    Ok(())
}
