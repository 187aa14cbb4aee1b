//! Aggregate ledgers fed by bookings and reversed by cancellations.
//!
//! Every booking adds to three ledgers; cancelling it subtracts exactly what
//! was added. Writes are keyed by reservation id so a retried reversal is
//! recognised and not applied twice, and a reversal only subtracts a credit
//! the ledger actually holds.

use crate::error::StoreError;
use crate::reservation::Reservation;
use crate::types::{HostId, Money, ReferralId, ReservationId};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Amounts one reservation contributes to the ledgers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Idempotency key
    pub reservation_id: ReservationId,
    /// Frozen total price
    pub amount: Money,
    /// Frozen platform fee
    pub platform_fee: Money,
    /// Bucket date in the marketplace timezone
    pub booked_on: NaiveDate,
}

impl LedgerEntry {
    /// Entry for a reservation's frozen amounts
    #[must_use]
    pub fn for_reservation(reservation: &Reservation) -> Self {
        Self {
            reservation_id: reservation.id.clone(),
            amount: reservation.total_price,
            platform_fee: reservation.platform_fee,
            booked_on: reservation.booked_on,
        }
    }
}

/// Whether a ledger write changed anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdjustmentOutcome {
    /// The write was applied now
    Applied,
    /// The same write was applied before; nothing changed
    AlreadyApplied,
    /// Reversal of a booking this ledger never counted; nothing subtracted
    NotRecorded,
    /// Credit for a booking the ledger has already seen reversed; dropped
    Superseded,
}

/// Sign of a ledger write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Booking
    Credit,
    /// Cancellation
    Debit,
}

/// Revenue, fees and booking count for one period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsBucket {
    /// Sum of booking totals
    pub revenue: Money,
    /// Sum of platform fees
    pub fees: Money,
    /// Number of bookings
    pub bookings: i64,
}

impl AnalyticsBucket {
    fn apply(&mut self, entry: &LedgerEntry, direction: Direction) -> Result<(), StoreError> {
        self.revenue = shift(self.revenue, entry.amount, direction)?;
        self.fees = shift(self.fees, entry.platform_fee, direction)?;
        self.bookings += match direction {
            Direction::Credit => 1,
            Direction::Debit => -1,
        };
        Ok(())
    }
}

/// Platform-wide analytics bucketed by day, month and year.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformAnalytics {
    /// Keyed by date
    pub daily: BTreeMap<NaiveDate, AnalyticsBucket>,
    /// Keyed `YYYY-MM`
    pub monthly: BTreeMap<String, AnalyticsBucket>,
    /// Keyed by year
    pub yearly: BTreeMap<i32, AnalyticsBucket>,
}

impl PlatformAnalytics {
    /// Add or subtract an entry in all three buckets
    ///
    /// # Errors
    ///
    /// [`StoreError::Corrupted`] if an amount overflows.
    pub fn apply(&mut self, entry: &LedgerEntry, direction: Direction) -> Result<(), StoreError> {
        let day = entry.booked_on;
        self.daily.entry(day).or_default().apply(entry, direction)?;
        self.monthly
            .entry(day.format("%Y-%m").to_string())
            .or_default()
            .apply(entry, direction)?;
        self.yearly
            .entry(day.year())
            .or_default()
            .apply(entry, direction)
    }

    /// Bucket for a day (zero if nothing was booked)
    #[must_use]
    pub fn day(&self, date: NaiveDate) -> AnalyticsBucket {
        self.daily.get(&date).copied().unwrap_or_default()
    }

    /// Bucket for the month containing `date`
    #[must_use]
    pub fn month(&self, date: NaiveDate) -> AnalyticsBucket {
        self.monthly
            .get(&date.format("%Y-%m").to_string())
            .copied()
            .unwrap_or_default()
    }

    /// Bucket for a year
    #[must_use]
    pub fn year(&self, year: i32) -> AnalyticsBucket {
        self.yearly.get(&year).copied().unwrap_or_default()
    }
}

/// A host's lifetime earnings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEarnings {
    /// Sum of booking totals
    pub total_earnings: Money,
    /// Number of bookings
    pub bookings: i64,
}

impl HostEarnings {
    /// Add or subtract an entry
    ///
    /// # Errors
    ///
    /// [`StoreError::Corrupted`] if an amount overflows.
    pub fn apply(&mut self, entry: &LedgerEntry, direction: Direction) -> Result<(), StoreError> {
        self.total_earnings = shift(self.total_earnings, entry.amount, direction)?;
        self.bookings += match direction {
            Direction::Credit => 1,
            Direction::Debit => -1,
        };
        Ok(())
    }
}

/// A promoter's referral totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoterStats {
    /// Referred bookings
    pub total_bookings: i64,
    /// Revenue of referred bookings
    pub total_revenue: Money,
}

impl PromoterStats {
    /// Add or subtract an entry
    ///
    /// # Errors
    ///
    /// [`StoreError::Corrupted`] if an amount overflows.
    pub fn apply(&mut self, entry: &LedgerEntry, direction: Direction) -> Result<(), StoreError> {
        self.total_revenue = shift(self.total_revenue, entry.amount, direction)?;
        self.total_bookings += match direction {
            Direction::Credit => 1,
            Direction::Debit => -1,
        };
        Ok(())
    }
}

fn shift(current: Money, by: Money, direction: Direction) -> Result<Money, StoreError> {
    match direction {
        Direction::Credit => current.checked_add(by),
        Direction::Debit => current.checked_sub(by),
    }
    .ok_or_else(|| StoreError::Corrupted(format!("ledger amount overflow applying {by}")))
}

/// Platform analytics ledger.
pub trait PlatformAnalyticsLedger: Send + Sync {
    /// Count a booking
    fn record_booking(
        &self,
        entry: &LedgerEntry,
    ) -> impl Future<Output = Result<AdjustmentOutcome, StoreError>> + Send;

    /// Reverse a booking, at most once per reservation
    fn reverse_booking(
        &self,
        entry: &LedgerEntry,
    ) -> impl Future<Output = Result<AdjustmentOutcome, StoreError>> + Send;

    /// Current totals
    fn snapshot(&self) -> impl Future<Output = Result<PlatformAnalytics, StoreError>> + Send;
}

/// Host earnings ledger.
pub trait HostEarningsLedger: Send + Sync {
    /// Credit a host for a booking
    fn record_booking(
        &self,
        host_id: &HostId,
        entry: &LedgerEntry,
    ) -> impl Future<Output = Result<AdjustmentOutcome, StoreError>> + Send;

    /// Reverse a booking credit, at most once per reservation
    fn reverse_booking(
        &self,
        host_id: &HostId,
        entry: &LedgerEntry,
    ) -> impl Future<Output = Result<AdjustmentOutcome, StoreError>> + Send;

    /// A host's totals
    fn earnings(
        &self,
        host_id: &HostId,
    ) -> impl Future<Output = Result<HostEarnings, StoreError>> + Send;
}

/// Promoter analytics ledger.
pub trait PromoterAnalyticsLedger: Send + Sync {
    /// Credit a promoter for a referred booking
    fn record_booking(
        &self,
        referral_id: &ReferralId,
        entry: &LedgerEntry,
    ) -> impl Future<Output = Result<AdjustmentOutcome, StoreError>> + Send;

    /// Reverse a referral credit, at most once per reservation
    fn reverse_booking(
        &self,
        referral_id: &ReferralId,
        entry: &LedgerEntry,
    ) -> impl Future<Output = Result<AdjustmentOutcome, StoreError>> + Send;

    /// A promoter's totals
    fn stats(
        &self,
        referral_id: &ReferralId,
    ) -> impl Future<Output = Result<PromoterStats, StoreError>> + Send;
}

/// The three ledgers a booking touches.
pub struct Ledgers<P, H, Q> {
    /// Platform analytics
    pub platform: Arc<P>,
    /// Host earnings
    pub hosts: Arc<H>,
    /// Promoter analytics
    pub promoters: Arc<Q>,
}

impl<P, H, Q> Ledgers<P, H, Q> {
    /// Bundle the ledgers
    #[must_use]
    pub const fn new(platform: Arc<P>, hosts: Arc<H>, promoters: Arc<Q>) -> Self {
        Self {
            platform,
            hosts,
            promoters,
        }
    }
}

impl<P, H, Q> Clone for Ledgers<P, H, Q> {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            hosts: Arc::clone(&self.hosts),
            promoters: Arc::clone(&self.promoters),
        }
    }
}
