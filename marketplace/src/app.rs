//! Service wiring.
//!
//! [`MarketplaceApp`] builds every service over one shared set of stores so
//! that a booking, a lifecycle change and a cancellation all see the same data.

use crate::booking::BookingService;
use crate::cancellation::ReservationCancellationCoordinator;
use crate::config::MarketplaceConfig;
use crate::ledgers::Ledgers;
use crate::lifecycle::{LifecycleEnvironment, ListingLifecycle};
use crate::loyalty::LoyaltyScoreEngine;
use crate::stores::{
    InMemoryCancellationInbox, InMemoryHostDirectory, InMemoryHostEarnings,
    InMemoryListingEventLog, InMemoryListingRepository, InMemoryPlatformAnalytics,
    InMemoryPromoterAnalytics, InMemoryReservationStore,
};
use experiences_core::environment::Clock;
use std::sync::Arc;

/// Lifecycle service over in-memory stores
pub type InMemoryLifecycle = ListingLifecycle<InMemoryListingRepository, InMemoryHostDirectory>;

/// In-memory ledgers
pub type InMemoryLedgers =
    Ledgers<InMemoryPlatformAnalytics, InMemoryHostEarnings, InMemoryPromoterAnalytics>;

/// Booking service over in-memory stores
pub type InMemoryBookingService = BookingService<
    InMemoryListingRepository,
    InMemoryHostDirectory,
    InMemoryReservationStore,
    InMemoryPlatformAnalytics,
    InMemoryHostEarnings,
    InMemoryPromoterAnalytics,
>;

/// Cancellation coordinator over in-memory stores
pub type InMemoryCancellationCoordinator = ReservationCancellationCoordinator<
    InMemoryReservationStore,
    InMemoryPlatformAnalytics,
    InMemoryHostEarnings,
    InMemoryPromoterAnalytics,
>;

/// Every marketplace service, sharing in-memory stores.
pub struct MarketplaceApp {
    /// Configuration the services were built with
    pub config: MarketplaceConfig,
    /// Listing lifecycle and host suspension
    pub lifecycle: Arc<InMemoryLifecycle>,
    /// Punti and commission
    pub loyalty: LoyaltyScoreEngine<InMemoryListingRepository>,
    /// Quotes and bookings
    pub bookings: InMemoryBookingService,
    /// Cancellation saga
    pub cancellations: InMemoryCancellationCoordinator,
    /// Listing store
    pub listings: Arc<InMemoryListingRepository>,
    /// Reservation store
    pub reservations: Arc<InMemoryReservationStore>,
    /// Ledgers
    pub ledgers: InMemoryLedgers,
    /// Listing audit log
    pub events: Arc<InMemoryListingEventLog>,
    /// Guest cancellation requests
    pub inbox: Arc<InMemoryCancellationInbox>,
}

impl MarketplaceApp {
    /// Wire all services over fresh in-memory stores
    #[must_use]
    pub fn in_memory(config: MarketplaceConfig, clock: Arc<dyn Clock>) -> Self {
        let listings = Arc::new(InMemoryListingRepository::new());
        let hosts = Arc::new(InMemoryHostDirectory::new());
        let reservations = Arc::new(InMemoryReservationStore::new());
        let events = Arc::new(InMemoryListingEventLog::new());
        let inbox = Arc::new(InMemoryCancellationInbox::new());
        let ledgers = Ledgers::new(
            Arc::new(InMemoryPlatformAnalytics::new()),
            Arc::new(InMemoryHostEarnings::new()),
            Arc::new(InMemoryPromoterAnalytics::new()),
        );

        let lifecycle = Arc::new(ListingLifecycle::new(
            Arc::clone(&listings),
            hosts,
            LifecycleEnvironment::new(Arc::clone(&clock), Arc::clone(&events) as _),
        ));
        let loyalty = LoyaltyScoreEngine::new(config.loyalty.clone(), Arc::clone(&listings));
        let bookings = BookingService::new(
            Arc::clone(&lifecycle),
            Arc::clone(&reservations),
            ledgers.clone(),
            config.loyalty.clone(),
            config.timezone,
            Arc::clone(&clock),
        );
        let cancellations = ReservationCancellationCoordinator::new(
            Arc::clone(&reservations),
            ledgers.clone(),
            Arc::clone(&inbox) as _,
            clock,
        );

        tracing::info!(timezone = %config.timezone, "Marketplace services wired");
        Self {
            config,
            lifecycle,
            loyalty,
            bookings,
            cancellations,
            listings,
            reservations,
            ledgers,
            events,
            inbox,
        }
    }
}
