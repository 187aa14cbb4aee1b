//! Quotes and bookings.
//!
//! A booking freezes the resolved price and the platform fee at the moment it
//! is made, then credits the platform, host and promoter ledgers with those
//! frozen amounts. Later edits to the listing never change a reservation.

use crate::availability::AvailabilityResolver;
use crate::cancellation::CascadeStep;
use crate::error::{MarketplaceError, Result, StoreError};
use crate::ledgers::{
    AdjustmentOutcome, HostEarningsLedger, LedgerEntry, Ledgers, PlatformAnalyticsLedger,
    PromoterAnalyticsLedger,
};
use crate::lifecycle::ListingLifecycle;
use crate::listing::Listing;
use crate::loyalty::LoyaltyConfig;
use crate::metrics;
use crate::pricing::{PriceQuote, PricingResolver};
use crate::reservation::{CascadeProgress, CascadeStatus, Reservation, ReservationStatus};
use crate::stores::{HostDirectory, ListingRepository, ReservationStore};
use crate::types::{ActorId, ListingId, Money, ReferralId, ReservationId, TimeOfDay};
use chrono::NaiveDate;
use chrono_tz::Tz;
use experiences_core::environment::Clock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A guest's booking request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    /// Listing to book
    pub listing_id: ListingId,
    /// Who is booking
    pub guest_id: ActorId,
    /// Party size
    pub guest_count: u32,
    /// Experience date
    pub date: NaiveDate,
    /// Slot start
    pub time: TimeOfDay,
    /// Promoter who referred the guest
    #[serde(default)]
    pub referral_id: Option<ReferralId>,
}

/// Price a booking would be charged right now.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Listing quoted
    pub listing_id: ListingId,
    /// Resolved price
    pub price: PriceQuote,
    /// Commission percent taken by the platform
    pub commission_percent: Decimal,
    /// Platform share of the total
    pub platform_fee: Money,
}

/// A confirmed booking and any ledger credits that did not go through.
///
/// Failed credits stay pending on the reservation until
/// [`BookingService::retry_pending_credits`] lands them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingReceipt {
    /// Stored reservation
    pub reservation: Reservation,
    /// Ledgers that could not be credited
    pub ledger_failures: Vec<(CascadeStep, StoreError)>,
}

/// Quotes and books listings.
pub struct BookingService<L, D, R, P, H, Q> {
    lifecycle: Arc<ListingLifecycle<L, D>>,
    reservations: Arc<R>,
    ledgers: Ledgers<P, H, Q>,
    loyalty: LoyaltyConfig,
    timezone: Tz,
    clock: Arc<dyn Clock>,
}

impl<L, D, R, P, H, Q> BookingService<L, D, R, P, H, Q>
where
    L: ListingRepository,
    D: HostDirectory,
    R: ReservationStore,
    P: PlatformAnalyticsLedger,
    H: HostEarningsLedger,
    Q: PromoterAnalyticsLedger,
{
    /// Build the service
    #[must_use]
    pub fn new(
        lifecycle: Arc<ListingLifecycle<L, D>>,
        reservations: Arc<R>,
        ledgers: Ledgers<P, H, Q>,
        loyalty: LoyaltyConfig,
        timezone: Tz,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lifecycle,
            reservations,
            ledgers,
            loyalty,
            timezone,
            clock,
        }
    }

    /// Price a request without booking it
    ///
    /// # Errors
    ///
    /// Invalid guest count, listing not bookable, host suspended, slot
    /// unavailable, or pricing misconfigured.
    pub async fn quote(&self, request: &BookingRequest) -> Result<Quote> {
        let (_, quote) = self.checked_quote(request).await?;
        Ok(quote)
    }

    /// Book a slot and credit the ledgers
    ///
    /// The reservation is stored before the ledgers are credited; ledger
    /// failures are reported on the receipt and persisted on the reservation
    /// rather than undoing the booking.
    ///
    /// # Errors
    ///
    /// Everything [`BookingService::quote`] reports, and store failures
    /// writing the reservation.
    pub async fn book(&self, request: BookingRequest) -> Result<BookingReceipt> {
        let (listing, quote) = self.checked_quote(&request).await?;
        let booked_at = self.clock.now();

        let mut reservation = Reservation {
            id: ReservationId::generate(),
            listing_id: listing.id,
            host_id: Some(listing.host_id),
            referral_id: request.referral_id,
            guest_id: request.guest_id,
            guest_count: request.guest_count,
            total_price: quote.price.chargeable_total,
            platform_fee: quote.platform_fee,
            start_date: request.date,
            time: request.time,
            status: ReservationStatus::Confirmed,
            booked_at,
            booked_on: booked_at.with_timezone(&self.timezone).date_naive(),
            ledger_credits: CascadeProgress::settled(),
            cancellation: None,
        };
        reservation.ledger_credits = CascadeProgress::for_reservation(&reservation);
        self.reservations.insert(reservation.clone()).await?;
        metrics::record_booking();
        tracing::info!(
            reservation_id = %reservation.id,
            listing_id = %reservation.listing_id,
            total = %reservation.total_price,
            fee = %reservation.platform_fee,
            "Reservation confirmed"
        );

        let ledger_failures = self.credit_ledgers(&mut reservation).await;
        Ok(BookingReceipt {
            reservation,
            ledger_failures,
        })
    }

    /// Re-run ledger credits that are pending or failed
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::ReservationNotFound`],
    /// [`MarketplaceError::AlreadyCancelled`] once the booking was cancelled,
    /// or store failures loading the reservation.
    pub async fn retry_pending_credits(&self, reservation_id: &ReservationId) -> Result<BookingReceipt> {
        let mut reservation = self
            .reservations
            .get(reservation_id)
            .await?
            .ok_or_else(|| MarketplaceError::ReservationNotFound(reservation_id.clone()))?;
        if reservation.is_cancelled() {
            return Err(MarketplaceError::AlreadyCancelled {
                reservation_id: reservation_id.clone(),
            });
        }

        tracing::info!(%reservation_id, "Retrying pending ledger credits");
        let ledger_failures = self.credit_ledgers(&mut reservation).await;
        Ok(BookingReceipt {
            reservation,
            ledger_failures,
        })
    }

    async fn checked_quote(&self, request: &BookingRequest) -> Result<(Listing, Quote)> {
        PricingResolver::validate_guest_count(request.guest_count)?;
        let listing = self.lifecycle.ensure_bookable(&request.listing_id).await?;

        let availability = AvailabilityResolver::for_content(&listing.content, self.timezone);
        if !availability.is_bookable(request.date, request.time, self.clock.now()) {
            return Err(MarketplaceError::SlotUnavailable {
                listing_id: listing.id,
                date: request.date,
                time: request.time,
            });
        }

        let pricing = listing.content.pricing.as_ref().ok_or_else(|| {
            MarketplaceError::InvalidPricingConfiguration {
                reason: "listing has no pricing".into(),
            }
        })?;
        let price = PricingResolver::resolve(pricing, request.guest_count)?;

        let commission_percent = self.loyalty.partner_commission(listing.punti);
        let platform_fee = platform_fee(price.chargeable_total, commission_percent)?;

        let quote = Quote {
            listing_id: listing.id.clone(),
            price,
            commission_percent,
            platform_fee,
        };
        Ok((listing, quote))
    }

    async fn credit_ledgers(&self, reservation: &mut Reservation) -> Vec<(CascadeStep, StoreError)> {
        let entry = LedgerEntry::for_reservation(reservation);
        let progress = reservation.ledger_credits.clone();
        let host_id = reservation.host_id.clone().filter(|_| progress.host.needs_work());
        let referral_id = reservation.referral_id.clone().filter(|_| progress.referral.needs_work());

        let platform = async {
            if progress.platform.needs_work() {
                Some(self.ledgers.platform.record_booking(&entry).await)
            } else {
                None
            }
        };
        let host = async {
            match host_id.as_ref() {
                Some(host_id) => Some(self.ledgers.hosts.record_booking(host_id, &entry).await),
                None => None,
            }
        };
        let referral = async {
            match referral_id.as_ref() {
                Some(referral_id) => Some(self.ledgers.promoters.record_booking(referral_id, &entry).await),
                None => None,
            }
        };
        let (platform, host, referral) = futures::join!(platform, host, referral);

        let mut failures = Vec::new();
        for (step, result) in [
            (CascadeStep::PlatformAnalytics, platform),
            (CascadeStep::HostEarnings, host),
            (CascadeStep::PromoterAnalytics, referral),
        ] {
            let Some(result) = result else { continue };
            let status = match result {
                Ok(AdjustmentOutcome::Applied | AdjustmentOutcome::AlreadyApplied) => CascadeStatus::Applied,
                Ok(outcome @ (AdjustmentOutcome::NotRecorded | AdjustmentOutcome::Superseded)) => {
                    tracing::debug!(reservation_id = %reservation.id, %step, ?outcome, "Ledger credit dropped");
                    CascadeStatus::Skipped
                },
                Err(error) => {
                    tracing::error!(reservation_id = %reservation.id, %step, %error, "Ledger credit failed");
                    let status = CascadeStatus::Failed {
                        reason: error.to_string(),
                    };
                    failures.push((step, error));
                    status
                },
            };
            if let Err(error) = self
                .reservations
                .record_credit(&reservation.id, step, status.clone())
                .await
            {
                tracing::warn!(reservation_id = %reservation.id, %step, %error, "Could not persist credit progress");
            }
            reservation.ledger_credits.set(step, status);
        }
        failures
    }
}

/// Platform share of `total` at `commission_percent`
fn platform_fee(total: Money, commission_percent: Decimal) -> Result<Money> {
    total
        .amount()
        .checked_mul(commission_percent)
        .and_then(|fee| fee.checked_div(Decimal::ONE_HUNDRED))
        .map(Money::round_from)
        .ok_or_else(|| MarketplaceError::InvalidPricingConfiguration {
            reason: format!("platform fee on {total} overflows"),
        })
}
