//! In-memory stores.
//!
//! `HashMap`-backed implementations of every persistence port. Each trait
//! method takes the lock once, so the atomicity each port promises holds
//! within a process. A poisoned lock surfaces as [`StoreError::Unavailable`].

use super::{CancelMark, CasOutcome, HostDirectory, ListingRepository, ReservationStore};
use crate::cancellation::{CancellationRequest, CancellationRequestNotifier, CascadeStep};
use crate::error::StoreError;
use crate::ledgers::{
    AdjustmentOutcome, Direction, HostEarnings, HostEarningsLedger, LedgerEntry,
    PlatformAnalytics, PlatformAnalyticsLedger, PromoterAnalyticsLedger, PromoterStats,
};
use crate::lifecycle::{ListingEvent, ListingEventSink};
use crate::listing::{Listing, ListingStatus};
use crate::loyalty::capped_increase;
use crate::reservation::{Cancellation, CascadeStatus, Reservation, ReservationStatus};
use crate::types::{HostId, ListingId, ReferralId, ReservationId};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
}

// ============================================================================
// Listings
// ============================================================================

/// Listings keyed by id.
#[derive(Clone, Debug, Default)]
pub struct InMemoryListingRepository {
    listings: Arc<RwLock<HashMap<ListingId, Listing>>>,
}

impl InMemoryListingRepository {
    /// Empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored listings
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(read(&self.listings)?.len())
    }

    /// Whether no listing is stored
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(read(&self.listings)?.is_empty())
    }
}

impl ListingRepository for InMemoryListingRepository {
    async fn get(&self, id: &ListingId) -> Result<Option<Listing>, StoreError> {
        Ok(read(&self.listings)?.get(id).cloned())
    }

    async fn insert(&self, listing: Listing) -> Result<(), StoreError> {
        let mut listings = write(&self.listings)?;
        if listings.contains_key(&listing.id) {
            return Err(StoreError::Conflict(format!("listing {} already exists", listing.id)));
        }
        listings.insert(listing.id.clone(), listing);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected: ListingStatus,
        listing: &Listing,
    ) -> Result<CasOutcome, StoreError> {
        let mut listings = write(&self.listings)?;
        let Some(stored) = listings.get_mut(&listing.id) else {
            return Ok(CasOutcome::Missing);
        };
        if stored.status != expected {
            return Ok(CasOutcome::Conflict {
                actual: stored.status,
            });
        }
        stored.status = listing.status;
        stored.content = listing.content.clone();
        stored.staged_revision = listing.staged_revision.clone();
        stored.rejection_reason = listing.rejection_reason.clone();
        stored.updated_at = listing.updated_at;
        Ok(CasOutcome::Applied)
    }

    async fn add_punti_capped(
        &self,
        id: &ListingId,
        delta: u32,
        cap: u32,
    ) -> Result<Option<(u32, u32)>, StoreError> {
        let mut listings = write(&self.listings)?;
        Ok(listings.get_mut(id).map(|listing| {
            let previous = listing.punti;
            let (total, _) = capped_increase(previous, delta, cap);
            listing.punti = total;
            (previous, total)
        }))
    }

    async fn live_punti_total(&self) -> Result<u64, StoreError> {
        Ok(read(&self.listings)?
            .values()
            .filter(|listing| listing.is_live())
            .map(|listing| u64::from(listing.punti))
            .sum())
    }
}

/// Suspension flags keyed by host, with the time they were set.
#[derive(Clone, Debug, Default)]
pub struct InMemoryHostDirectory {
    suspended: Arc<RwLock<HashMap<HostId, DateTime<Utc>>>>,
}

impl InMemoryHostDirectory {
    /// Empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When the host was suspended, if they are
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the lock is poisoned.
    pub fn suspended_since(&self, host_id: &HostId) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(read(&self.suspended)?.get(host_id).copied())
    }
}

impl HostDirectory for InMemoryHostDirectory {
    async fn is_suspended(&self, host_id: &HostId) -> Result<bool, StoreError> {
        Ok(read(&self.suspended)?.contains_key(host_id))
    }

    async fn set_suspended(
        &self,
        host_id: &HostId,
        suspended: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut hosts = write(&self.suspended)?;
        if suspended {
            hosts.entry(host_id.clone()).or_insert(at);
        } else {
            hosts.remove(host_id);
        }
        Ok(())
    }
}

/// Audit log that keeps every published event.
#[derive(Clone, Debug, Default)]
pub struct InMemoryListingEventLog {
    events: Arc<RwLock<Vec<ListingEvent>>>,
}

impl InMemoryListingEventLog {
    /// Empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event, in publish order
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the lock is poisoned.
    pub fn events(&self) -> Result<Vec<ListingEvent>, StoreError> {
        Ok(read(&self.events)?.clone())
    }

    /// Events for one listing, in publish order
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the lock is poisoned.
    pub fn events_for(&self, listing_id: &ListingId) -> Result<Vec<ListingEvent>, StoreError> {
        Ok(read(&self.events)?
            .iter()
            .filter(|event| &event.listing_id == listing_id)
            .cloned()
            .collect())
    }
}

impl ListingEventSink for InMemoryListingEventLog {
    fn publish(
        &self,
        event: ListingEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move { write(&self.events).map(|mut events| events.push(event)) })
    }
}

// ============================================================================
// Reservations
// ============================================================================

/// Reservations keyed by id.
#[derive(Clone, Debug, Default)]
pub struct InMemoryReservationStore {
    reservations: Arc<RwLock<HashMap<ReservationId, Reservation>>>,
}

impl InMemoryReservationStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReservationStore for InMemoryReservationStore {
    async fn get(&self, id: &ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(read(&self.reservations)?.get(id).cloned())
    }

    async fn insert(&self, reservation: Reservation) -> Result<(), StoreError> {
        let mut reservations = write(&self.reservations)?;
        if reservations.contains_key(&reservation.id) {
            return Err(StoreError::Conflict(format!(
                "reservation {} already exists",
                reservation.id
            )));
        }
        reservations.insert(reservation.id.clone(), reservation);
        Ok(())
    }

    async fn mark_cancelled(
        &self,
        id: &ReservationId,
        cancellation: Cancellation,
    ) -> Result<CancelMark, StoreError> {
        let mut reservations = write(&self.reservations)?;
        let Some(reservation) = reservations.get_mut(id) else {
            return Ok(CancelMark::NotFound);
        };
        if reservation.is_cancelled() {
            return Ok(CancelMark::AlreadyCancelled(reservation.clone()));
        }
        reservation.status = ReservationStatus::Cancelled;
        reservation.cancellation = Some(cancellation);
        Ok(CancelMark::Cancelled(reservation.clone()))
    }

    async fn record_credit(
        &self,
        id: &ReservationId,
        step: CascadeStep,
        status: CascadeStatus,
    ) -> Result<(), StoreError> {
        let mut reservations = write(&self.reservations)?;
        let reservation = reservations
            .get_mut(id)
            .ok_or_else(|| StoreError::Corrupted(format!("reservation {id} does not exist")))?;
        reservation.ledger_credits.set(step, status);
        Ok(())
    }

    async fn record_step(
        &self,
        id: &ReservationId,
        step: CascadeStep,
        status: CascadeStatus,
    ) -> Result<(), StoreError> {
        let mut reservations = write(&self.reservations)?;
        let cancellation = reservations
            .get_mut(id)
            .and_then(|reservation| reservation.cancellation.as_mut())
            .ok_or_else(|| {
                StoreError::Corrupted(format!("reservation {id} has no cancellation record"))
            })?;
        cancellation.cascade.set(step, status);
        Ok(())
    }
}

// ============================================================================
// Ledgers
// ============================================================================

/// Reservation ids already written in each direction.
///
/// Both sets only grow. A persistent ledger keeps the same two flags on a
/// row keyed by reservation id, next to the totals it guards.
#[derive(Debug, Default)]
struct Applied {
    recorded: HashSet<ReservationId>,
    reversed: HashSet<ReservationId>,
}

impl Applied {
    /// Claim the write
    ///
    /// `None` means the caller must apply it; `Some` is the outcome of a write
    /// that changes nothing. A reversal of an uncounted booking still claims
    /// the id so a late credit for it is dropped.
    fn claim(&mut self, reservation_id: &ReservationId, direction: Direction) -> Option<AdjustmentOutcome> {
        match direction {
            Direction::Credit if self.reversed.contains(reservation_id) => {
                Some(AdjustmentOutcome::Superseded)
            },
            Direction::Credit => {
                (!self.recorded.insert(reservation_id.clone())).then_some(AdjustmentOutcome::AlreadyApplied)
            },
            Direction::Debit => {
                if self.reversed.insert(reservation_id.clone()) {
                    (!self.recorded.contains(reservation_id)).then_some(AdjustmentOutcome::NotRecorded)
                } else {
                    Some(AdjustmentOutcome::AlreadyApplied)
                }
            },
        }
    }

    fn release(&mut self, reservation_id: &ReservationId, direction: Direction) {
        match direction {
            Direction::Credit => self.recorded.remove(reservation_id),
            Direction::Debit => self.reversed.remove(reservation_id),
        };
    }
}

#[derive(Debug, Default)]
struct PlatformState {
    analytics: PlatformAnalytics,
    applied: Applied,
}

/// Platform analytics held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPlatformAnalytics {
    state: Arc<RwLock<PlatformState>>,
}

impl InMemoryPlatformAnalytics {
    /// Empty analytics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn adjust(&self, entry: &LedgerEntry, direction: Direction) -> Result<AdjustmentOutcome, StoreError> {
        let mut state = write(&self.state)?;
        if let Some(outcome) = state.applied.claim(&entry.reservation_id, direction) {
            return Ok(outcome);
        }
        if let Err(error) = state.analytics.apply(entry, direction) {
            state.applied.release(&entry.reservation_id, direction);
            return Err(error);
        }
        Ok(AdjustmentOutcome::Applied)
    }
}

impl PlatformAnalyticsLedger for InMemoryPlatformAnalytics {
    async fn record_booking(&self, entry: &LedgerEntry) -> Result<AdjustmentOutcome, StoreError> {
        self.adjust(entry, Direction::Credit)
    }

    async fn reverse_booking(&self, entry: &LedgerEntry) -> Result<AdjustmentOutcome, StoreError> {
        self.adjust(entry, Direction::Debit)
    }

    async fn snapshot(&self) -> Result<PlatformAnalytics, StoreError> {
        Ok(read(&self.state)?.analytics.clone())
    }
}

#[derive(Debug)]
struct KeyedState<K, V> {
    totals: HashMap<K, V>,
    applied: Applied,
}

impl<K, V> Default for KeyedState<K, V> {
    fn default() -> Self {
        Self {
            totals: HashMap::new(),
            applied: Applied::default(),
        }
    }
}

/// Host earnings held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryHostEarnings {
    state: Arc<RwLock<KeyedState<HostId, HostEarnings>>>,
}

impl InMemoryHostEarnings {
    /// Empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn adjust(
        &self,
        host_id: &HostId,
        entry: &LedgerEntry,
        direction: Direction,
    ) -> Result<AdjustmentOutcome, StoreError> {
        let mut state = write(&self.state)?;
        if let Some(outcome) = state.applied.claim(&entry.reservation_id, direction) {
            return Ok(outcome);
        }
        let result = state
            .totals
            .entry(host_id.clone())
            .or_default()
            .apply(entry, direction);
        if let Err(error) = result {
            state.applied.release(&entry.reservation_id, direction);
            return Err(error);
        }
        Ok(AdjustmentOutcome::Applied)
    }
}

impl HostEarningsLedger for InMemoryHostEarnings {
    async fn record_booking(
        &self,
        host_id: &HostId,
        entry: &LedgerEntry,
    ) -> Result<AdjustmentOutcome, StoreError> {
        self.adjust(host_id, entry, Direction::Credit)
    }

    async fn reverse_booking(
        &self,
        host_id: &HostId,
        entry: &LedgerEntry,
    ) -> Result<AdjustmentOutcome, StoreError> {
        self.adjust(host_id, entry, Direction::Debit)
    }

    async fn earnings(&self, host_id: &HostId) -> Result<HostEarnings, StoreError> {
        Ok(read(&self.state)?
            .totals
            .get(host_id)
            .copied()
            .unwrap_or_default())
    }
}

/// Promoter analytics held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPromoterAnalytics {
    state: Arc<RwLock<KeyedState<ReferralId, PromoterStats>>>,
}

impl InMemoryPromoterAnalytics {
    /// Empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn adjust(
        &self,
        referral_id: &ReferralId,
        entry: &LedgerEntry,
        direction: Direction,
    ) -> Result<AdjustmentOutcome, StoreError> {
        let mut state = write(&self.state)?;
        if let Some(outcome) = state.applied.claim(&entry.reservation_id, direction) {
            return Ok(outcome);
        }
        let result = state
            .totals
            .entry(referral_id.clone())
            .or_default()
            .apply(entry, direction);
        if let Err(error) = result {
            state.applied.release(&entry.reservation_id, direction);
            return Err(error);
        }
        Ok(AdjustmentOutcome::Applied)
    }
}

impl PromoterAnalyticsLedger for InMemoryPromoterAnalytics {
    async fn record_booking(
        &self,
        referral_id: &ReferralId,
        entry: &LedgerEntry,
    ) -> Result<AdjustmentOutcome, StoreError> {
        self.adjust(referral_id, entry, Direction::Credit)
    }

    async fn reverse_booking(
        &self,
        referral_id: &ReferralId,
        entry: &LedgerEntry,
    ) -> Result<AdjustmentOutcome, StoreError> {
        self.adjust(referral_id, entry, Direction::Debit)
    }

    async fn stats(&self, referral_id: &ReferralId) -> Result<PromoterStats, StoreError> {
        Ok(read(&self.state)?
            .totals
            .get(referral_id)
            .copied()
            .unwrap_or_default())
    }
}

// ============================================================================
// Guest cancellation requests
// ============================================================================

/// Moderator inbox for guest cancellation requests.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCancellationInbox {
    requests: Arc<RwLock<Vec<CancellationRequest>>>,
}

impl InMemoryCancellationInbox {
    /// Empty inbox
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests received, oldest first
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the lock is poisoned.
    pub fn requests(&self) -> Result<Vec<CancellationRequest>, StoreError> {
        Ok(read(&self.requests)?.clone())
    }
}

impl CancellationRequestNotifier for InMemoryCancellationInbox {
    fn notify(
        &self,
        request: &CancellationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let request = request.clone();
        Box::pin(async move { write(&self.requests).map(|mut requests| requests.push(request)) })
    }
}
