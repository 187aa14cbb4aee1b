//! # Experiences Marketplace
//!
//! Listing lifecycle, pricing, availability, loyalty and cancellation
//! consistency for a marketplace of bookable experiences.
//!
//! ## Modules
//!
//! - [`lifecycle`]: listing status machine, run as a reducer and committed
//!   with a status compare-and-swap
//! - [`pricing`]: fixed, group and tiered prices resolved for a guest count
//! - [`availability`]: layered schedule overrides and booking lead time
//! - [`loyalty`]: capped punti and the partner commission they buy
//! - [`booking`]: quotes and reservations with frozen prices
//! - [`cancellation`]: the cancellation saga and its ledger reversals
//! - [`stores`]: persistence ports and their in-memory implementations
//!
//! ## Example
//!
//! ```ignore
//! let app = MarketplaceApp::in_memory(MarketplaceConfig::from_env()?, Arc::new(SystemClock));
//! let listing = app.lifecycle.create_draft(host_id, content).await?;
//! app.lifecycle.submit(&listing.id, host_actor).await?;
//! app.lifecycle.approve(&listing.id, moderator).await?;
//! let receipt = app.bookings.book(request).await?;
//! ```

pub mod app;
pub mod availability;
pub mod booking;
pub mod cancellation;
pub mod config;
pub mod error;
pub mod ledgers;
pub mod lifecycle;
pub mod listing;
pub mod loyalty;
pub mod metrics;
pub mod pricing;
pub mod reservation;
pub mod stores;
pub mod types;

pub use app::MarketplaceApp;
pub use availability::{AvailabilityResolver, AvailabilityRules, DayAvailability, OverrideSource};
pub use booking::{BookingReceipt, BookingRequest, BookingService, Quote};
pub use cancellation::{
    CancelReservation, CancellationReport, CancellationRequest, CancellationStage, CascadeStep,
    ReservationCancellationCoordinator, StepOutcome,
};
pub use config::{ConfigError, MarketplaceConfig};
pub use error::{MarketplaceError, Result, StoreError};
pub use lifecycle::{Initiator, ListingLifecycle, TransitionKind, TransitionOutcome};
pub use listing::{Listing, ListingContent, ListingStatus};
pub use loyalty::{LoyaltyConfig, LoyaltyScoreEngine, PuntiIncrease};
pub use pricing::{PriceQuote, PriceTier, Pricing, PricingResolver};
pub use reservation::{Reservation, ReservationStatus};
pub use types::{ActorId, HostId, ListingId, Money, ReferralId, ReservationId, TimeOfDay};
