//! Error types for the marketplace.

use crate::cancellation::CascadeStep;
use crate::lifecycle::TransitionKind;
use crate::listing::ListingStatus;
use crate::types::{HostId, ListingId, ReservationId, TimeOfDay};
use chrono::NaiveDate;
use thiserror::Error;

/// Result type for marketplace operations
pub type Result<T> = std::result::Result<T, MarketplaceError>;

/// Failures reported by persistence adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness or concurrency constraint rejected the write
    #[error("write conflict: {0}")]
    Conflict(String),

    /// A stored record could not be read back or updated consistently
    #[error("stored record is corrupted: {0}")]
    Corrupted(String),
}

/// Errors surfaced to callers of marketplace operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketplaceError {
    /// A lifecycle transition is not allowed from the listing's current status
    #[error("listing {listing_id} is {current}; cannot {requested}")]
    StateViolation {
        /// Listing the transition targeted
        listing_id: ListingId,
        /// Status the listing was in
        current: ListingStatus,
        /// Transition that was requested
        requested: TransitionKind,
    },

    /// Guest count must be at least one
    #[error("guest count must be at least 1, got {guest_count}")]
    InvalidGuestCount {
        /// The rejected value
        guest_count: u32,
    },

    /// Pricing data is malformed
    #[error("invalid pricing configuration: {reason}")]
    InvalidPricingConfiguration {
        /// What is wrong with it
        reason: String,
    },

    /// Availability rules are malformed
    #[error("invalid availability configuration: {reason}")]
    InvalidAvailabilityConfiguration {
        /// What is wrong with them
        reason: String,
    },

    /// A cancellation compensation step failed
    #[error("{step} adjustment failed: {reason}")]
    AggregateAdjustmentFailure {
        /// Which ledger could not be adjusted
        step: CascadeStep,
        /// Underlying failure
        reason: String,
    },

    /// The reservation was cancelled before; nothing was re-applied
    #[error("reservation {reservation_id} is already cancelled")]
    AlreadyCancelled {
        /// Reservation that was already cancelled
        reservation_id: ReservationId,
    },

    /// The reservation has not been cancelled yet
    #[error("reservation {reservation_id} has not been cancelled")]
    ReservationNotCancelled {
        /// Reservation that is still confirmed
        reservation_id: ReservationId,
    },

    /// No listing with that id
    #[error("listing {0} not found")]
    ListingNotFound(ListingId),

    /// No reservation with that id
    #[error("reservation {0} not found")]
    ReservationNotFound(ReservationId),

    /// Listing content lacks fields required for review
    #[error("listing {listing_id} is missing required fields: {}", .missing.join(", "))]
    IncompleteListing {
        /// Listing that was submitted
        listing_id: ListingId,
        /// Names of the missing fields
        missing: Vec<&'static str>,
    },

    /// The host is suspended, so none of their listings are bookable
    #[error("host {host_id} is suspended")]
    HostSuspended {
        /// Suspended host
        host_id: HostId,
    },

    /// The listing is not live
    #[error("listing {listing_id} is {status} and cannot be booked")]
    ListingNotBookable {
        /// Listing requested
        listing_id: ListingId,
        /// Its current status
        status: ListingStatus,
    },

    /// The requested slot is closed, booked out, or too close to now
    #[error("listing {listing_id} has no bookable slot at {date} {time}")]
    SlotUnavailable {
        /// Listing requested
        listing_id: ListingId,
        /// Requested date
        date: NaiveDate,
        /// Requested start time
        time: TimeOfDay,
    },

    /// Moderator cancellations require a non-empty note
    #[error("cancelling reservation {reservation_id} requires a moderator note")]
    MissingCancellationNote {
        /// Reservation being cancelled
        reservation_id: ReservationId,
    },

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MarketplaceError {
    /// Whether the caller may treat this outcome as success
    ///
    /// Cancelling an already-cancelled reservation is a no-op, not a failure.
    #[must_use]
    pub const fn is_success_equivalent(&self) -> bool {
        matches!(self, Self::AlreadyCancelled { .. })
    }

    /// Whether retrying the same call later might succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::Unavailable(_)) | Self::AggregateAdjustmentFailure { .. }
        )
    }
}
