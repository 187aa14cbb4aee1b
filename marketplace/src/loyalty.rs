//! Loyalty score ("punti") and the partner commission derived from it.
//!
//! Punti only go up, are capped at `max_partner_point_value`, and are written
//! with a single atomic capped increment so concurrent awards never overshoot.
//! The partner commission is interpolated linearly from the minimum (no punti)
//! to the maximum (capped punti).

use crate::error::{MarketplaceError, Result};
use crate::metrics;
use crate::stores::ListingRepository;
use crate::types::{ActorId, ListingId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Commission bounds and punti cap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyConfig {
    /// Commission percent at zero punti
    pub min_partner_commission: Decimal,
    /// Commission percent at the punti cap
    pub max_partner_commission: Decimal,
    /// Punti cap
    pub max_partner_point_value: u32,
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            min_partner_commission: Decimal::from(10),
            max_partner_commission: Decimal::from(20),
            max_partner_point_value: 100,
        }
    }
}

impl LoyaltyConfig {
    /// Commission percent for a punti value
    ///
    /// `min + (max - min) × punti / cap`, clamped to `[min, max]`.
    #[must_use]
    pub fn partner_commission(&self, punti: u32) -> Decimal {
        let low = self.min_partner_commission.min(self.max_partner_commission);
        let high = self.min_partner_commission.max(self.max_partner_commission);

        let ratio = Decimal::from(punti)
            .checked_div(Decimal::from(self.max_partner_point_value))
            .unwrap_or(Decimal::ONE)
            .clamp(Decimal::ZERO, Decimal::ONE);

        let spread = self.max_partner_commission - self.min_partner_commission;
        (self.min_partner_commission + spread * ratio).clamp(low, high)
    }
}

/// Apply a capped increase: `(new_total, applied_delta)`.
///
/// The total never decreases and never exceeds `cap` unless it already did.
#[must_use]
pub fn capped_increase(current: u32, requested: u32, cap: u32) -> (u32, u32) {
    let total = current.saturating_add(requested).min(cap).max(current);
    (total, total - current)
}

/// Result of a punti award.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PuntiIncrease {
    /// Listing awarded
    pub listing_id: ListingId,
    /// Punti before
    pub previous: u32,
    /// Punti asked for
    pub requested_delta: u32,
    /// Punti actually added
    pub applied_delta: u32,
    /// Punti after
    pub total: u32,
}

impl PuntiIncrease {
    /// Whether the cap cut the award short
    #[must_use]
    pub const fn was_truncated(&self) -> bool {
        self.applied_delta < self.requested_delta
    }
}

/// Awards punti and answers share and commission questions.
pub struct LoyaltyScoreEngine<L> {
    config: LoyaltyConfig,
    listings: Arc<L>,
}

impl<L: ListingRepository> LoyaltyScoreEngine<L> {
    /// Build the engine
    #[must_use]
    pub const fn new(config: LoyaltyConfig, listings: Arc<L>) -> Self {
        Self { config, listings }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &LoyaltyConfig {
        &self.config
    }

    /// Add up to `requested_delta` punti to a listing
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::ListingNotFound`] or store failures.
    pub async fn increase_punti(
        &self,
        actor: &ActorId,
        listing_id: &ListingId,
        requested_delta: u32,
    ) -> Result<PuntiIncrease> {
        let (previous, total) = self
            .listings
            .add_punti_capped(listing_id, requested_delta, self.config.max_partner_point_value)
            .await?
            .ok_or_else(|| MarketplaceError::ListingNotFound(listing_id.clone()))?;

        let increase = PuntiIncrease {
            listing_id: listing_id.clone(),
            previous,
            requested_delta,
            applied_delta: total - previous,
            total,
        };

        metrics::record_punti_applied(increase.applied_delta);
        if increase.was_truncated() {
            tracing::info!(
                %listing_id, %actor, requested_delta, applied = increase.applied_delta, total,
                "Punti award truncated at cap"
            );
        } else {
            tracing::info!(%listing_id, %actor, applied = increase.applied_delta, total, "Punti awarded");
        }
        Ok(increase)
    }

    /// Listing's share of all punti held by live listings
    ///
    /// Zero when the listing is not live or no live listing has punti.
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::ListingNotFound`] or store failures.
    pub async fn punti_share(&self, listing_id: &ListingId) -> Result<Decimal> {
        let listing = self
            .listings
            .get(listing_id)
            .await?
            .ok_or_else(|| MarketplaceError::ListingNotFound(listing_id.clone()))?;
        if !listing.is_live() {
            return Ok(Decimal::ZERO);
        }

        let total = self.listings.live_punti_total().await?;
        if total == 0 {
            return Ok(Decimal::ZERO);
        }
        Ok(Decimal::from(listing.punti)
            .checked_div(Decimal::from(total))
            .unwrap_or(Decimal::ZERO))
    }

    /// Commission percent for a punti value
    #[must_use]
    pub fn partner_commission(&self, punti: u32) -> Decimal {
        self.config.partner_commission(punti)
    }

    /// Commission percent a listing currently pays
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::ListingNotFound`] or store failures.
    pub async fn commission_for_listing(&self, listing_id: &ListingId) -> Result<Decimal> {
        let listing = self
            .listings
            .get(listing_id)
            .await?
            .ok_or_else(|| MarketplaceError::ListingNotFound(listing_id.clone()))?;
        Ok(self.partner_commission(listing.punti))
    }
}
