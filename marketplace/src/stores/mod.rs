//! Persistence ports.
//!
//! Services are generic over these traits; [`memory`] provides the in-process
//! implementations used by the demo binary and the tests. Every method is a
//! single atomic operation on the backing store.

use crate::error::StoreError;
use crate::listing::{Listing, ListingStatus};
use crate::reservation::{Cancellation, CascadeStatus, Reservation};
use crate::cancellation::CascadeStep;
use crate::types::{HostId, ListingId, ReservationId};
use chrono::{DateTime, Utc};
use std::future::Future;

/// In-memory implementations
pub mod memory;

pub use memory::{
    InMemoryCancellationInbox, InMemoryHostDirectory, InMemoryHostEarnings,
    InMemoryListingEventLog, InMemoryListingRepository, InMemoryPlatformAnalytics,
    InMemoryPromoterAnalytics, InMemoryReservationStore,
};

/// Result of a conditional status write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored status matched and the write went through
    Applied,
    /// Another writer changed the status first
    Conflict {
        /// Status found in the store
        actual: ListingStatus,
    },
    /// No such listing
    Missing,
}

/// Storage for listings.
pub trait ListingRepository: Send + Sync {
    /// Load a listing
    fn get(
        &self,
        id: &ListingId,
    ) -> impl Future<Output = Result<Option<Listing>, StoreError>> + Send;

    /// Insert a new listing; fails with [`StoreError::Conflict`] if the id exists
    fn insert(&self, listing: Listing) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Write the lifecycle-owned fields of `listing` if the stored status is still `expected`
    ///
    /// Lifecycle-owned fields are status, content, staged revision, rejection
    /// reason and `updated_at`. `punti` is never written here.
    fn compare_and_swap(
        &self,
        expected: ListingStatus,
        listing: &Listing,
    ) -> impl Future<Output = Result<CasOutcome, StoreError>> + Send;

    /// Atomically raise `punti` by up to `delta`, never past `cap`
    ///
    /// Returns `(previous, total)`, or `None` if the listing does not exist.
    fn add_punti_capped(
        &self,
        id: &ListingId,
        delta: u32,
        cap: u32,
    ) -> impl Future<Output = Result<Option<(u32, u32)>, StoreError>> + Send;

    /// Sum of `punti` over live listings
    fn live_punti_total(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Host suspension flags, kept apart from listing status.
pub trait HostDirectory: Send + Sync {
    /// Whether the host is currently suspended
    fn is_suspended(&self, host_id: &HostId)
    -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Set or clear the suspension flag
    fn set_suspended(
        &self,
        host_id: &HostId,
        suspended: bool,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Result of the atomic cancel-if-confirmed write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelMark {
    /// This call moved the reservation to cancelled
    Cancelled(Reservation),
    /// It was cancelled before; the stored record is returned untouched
    AlreadyCancelled(Reservation),
    /// No such reservation
    NotFound,
}

/// Storage for reservations.
pub trait ReservationStore: Send + Sync {
    /// Load a reservation
    fn get(
        &self,
        id: &ReservationId,
    ) -> impl Future<Output = Result<Option<Reservation>, StoreError>> + Send;

    /// Insert a new reservation; fails with [`StoreError::Conflict`] if the id exists
    fn insert(&self, reservation: Reservation)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically mark a confirmed reservation cancelled
    fn mark_cancelled(
        &self,
        id: &ReservationId,
        cancellation: Cancellation,
    ) -> impl Future<Output = Result<CancelMark, StoreError>> + Send;

    /// Persist the outcome of one booking credit
    fn record_credit(
        &self,
        id: &ReservationId,
        step: CascadeStep,
        status: CascadeStatus,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist the outcome of one compensation step
    fn record_step(
        &self,
        id: &ReservationId,
        step: CascadeStep,
        status: CascadeStatus,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
