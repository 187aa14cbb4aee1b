//! Confirmed bookings and their cancellation record.

use crate::cancellation::CascadeStep;
use crate::types::{ActorId, HostId, ListingId, Money, ReferralId, ReservationId, TimeOfDay};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Reservation status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Booked and counted in the ledgers
    Confirmed,
    /// Cancelled by a moderator
    Cancelled,
}

/// A booking. Price and fee are frozen at booking time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Identifier
    pub id: ReservationId,
    /// Booked listing
    pub listing_id: ListingId,
    /// Host credited with the earnings; legacy records may lack one
    pub host_id: Option<HostId>,
    /// Promoter credited with the booking
    pub referral_id: Option<ReferralId>,
    /// Who booked
    pub guest_id: ActorId,
    /// Party size
    pub guest_count: u32,
    /// What the guest paid
    pub total_price: Money,
    /// Platform commission taken from the total
    pub platform_fee: Money,
    /// Experience date
    pub start_date: NaiveDate,
    /// Experience start time
    pub time: TimeOfDay,
    /// Current status
    pub status: ReservationStatus,
    /// Booking instant
    pub booked_at: DateTime<Utc>,
    /// Booking date in the marketplace timezone (analytics bucket key)
    pub booked_on: NaiveDate,
    /// Per-ledger progress of the booking credits
    #[serde(default = "CascadeProgress::settled")]
    pub ledger_credits: CascadeProgress,
    /// Present once cancelled
    #[serde(default)]
    pub cancellation: Option<Cancellation>,
}

impl Reservation {
    /// Whether the reservation was cancelled
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.status, ReservationStatus::Cancelled)
    }
}

/// Who cancelled, why, and how far compensation got.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    /// Moderator who cancelled
    pub actor: ActorId,
    /// Mandatory moderator note
    pub note: String,
    /// Optional supporting attachment (URL or storage key)
    pub attachment: Option<String>,
    /// When the reservation was cancelled
    pub cancelled_at: DateTime<Utc>,
    /// Per-ledger compensation progress
    pub cascade: CascadeProgress,
}

/// Persisted status of one ledger write, credit or reversal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CascadeStatus {
    /// Not attempted yet, or interrupted
    Pending,
    /// Written
    Applied,
    /// Nothing to write for this reservation
    Skipped,
    /// Last attempt failed
    Failed {
        /// Failure message
        reason: String,
    },
}

impl CascadeStatus {
    /// Whether the step still has work to do
    #[must_use]
    pub const fn needs_work(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed { .. })
    }
}

/// Progress of each ledger, for the booking credits or the cancellation reversals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeProgress {
    /// Platform analytics
    pub platform: CascadeStatus,
    /// Host earnings
    pub host: CascadeStatus,
    /// Promoter analytics
    pub referral: CascadeStatus,
}

impl CascadeProgress {
    /// Initial progress: steps without a counterpart are skipped up front
    #[must_use]
    pub fn for_reservation(reservation: &Reservation) -> Self {
        let host = if reservation.host_id.is_none() || reservation.total_price.is_zero() {
            CascadeStatus::Skipped
        } else {
            CascadeStatus::Pending
        };
        let referral = if reservation.referral_id.is_none() {
            CascadeStatus::Skipped
        } else {
            CascadeStatus::Pending
        };
        Self {
            platform: CascadeStatus::Pending,
            host,
            referral,
        }
    }

    /// Every ledger written; records stored before credits were tracked read as this
    #[must_use]
    pub const fn settled() -> Self {
        Self {
            platform: CascadeStatus::Applied,
            host: CascadeStatus::Applied,
            referral: CascadeStatus::Applied,
        }
    }

    /// Status of one step
    #[must_use]
    pub const fn get(&self, step: CascadeStep) -> Option<&CascadeStatus> {
        match step {
            CascadeStep::PlatformAnalytics => Some(&self.platform),
            CascadeStep::HostEarnings => Some(&self.host),
            CascadeStep::PromoterAnalytics => Some(&self.referral),
            CascadeStep::Reservation => None,
        }
    }

    /// Overwrite one step's status
    pub fn set(&mut self, step: CascadeStep, status: CascadeStatus) {
        match step {
            CascadeStep::PlatformAnalytics => self.platform = status,
            CascadeStep::HostEarnings => self.host = status,
            CascadeStep::PromoterAnalytics => self.referral = status,
            CascadeStep::Reservation => {},
        }
    }

    /// Whether no step has work left
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !self.platform.needs_work() && !self.host.needs_work() && !self.referral.needs_work()
    }
}
