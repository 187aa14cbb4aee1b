//! Price resolution for a guest count.
//!
//! Three pricing models are supported:
//!
//! - **fixed**: one price per person
//! - **group**: one price for the whole party up to a group size
//! - **custom**: per-person price tiers keyed by guest-count ranges
//!
//! Amounts are computed exactly and rounded to cents once, at the end.

use crate::error::{MarketplaceError, Result};
use crate::types::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A per-person price that applies to an inclusive guest-count range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTier {
    /// Smallest party the tier applies to (at least 1)
    pub min_guests: u32,
    /// Largest party the tier applies to
    pub max_guests: u32,
    /// Per-person price
    pub price: Decimal,
}

impl PriceTier {
    /// Build a tier
    #[must_use]
    pub const fn new(min_guests: u32, max_guests: u32, price: Decimal) -> Self {
        Self {
            min_guests,
            max_guests,
            price,
        }
    }

    /// Whether `guest_count` falls inside this tier
    #[must_use]
    pub const fn covers(&self, guest_count: u32) -> bool {
        self.min_guests <= guest_count && guest_count <= self.max_guests
    }
}

/// Pricing model of a listing, tagged by `pricingType`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "pricingType", rename_all = "camelCase")]
pub enum Pricing {
    /// Same price for every guest
    Fixed {
        /// Per-person price
        price: Decimal,
    },
    /// Flat price for the whole party
    #[serde(rename_all = "camelCase")]
    Group {
        /// Price for the party
        group_price: Decimal,
        /// Party size the price is quoted for
        group_size: u32,
    },
    /// Per-person price tiers
    #[serde(rename_all = "camelCase")]
    Custom {
        /// Tiers in any order; see [`Pricing::normalized`]
        custom_pricing: Vec<PriceTier>,
    },
}

impl Pricing {
    /// Reject malformed pricing data
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::InvalidPricingConfiguration`] when a price is
    /// not positive, the tier list is empty, or a tier has `min > max` or `min < 1`.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Fixed { price } => ensure_positive(*price, "fixed price"),
            Self::Group { group_price, .. } => ensure_positive(*group_price, "group price"),
            Self::Custom { custom_pricing } => {
                if custom_pricing.is_empty() {
                    return Err(invalid("custom pricing needs at least one tier"));
                }
                for tier in custom_pricing {
                    if tier.min_guests < 1 {
                        return Err(invalid(format!(
                            "tier {}-{} must start at one guest or more",
                            tier.min_guests, tier.max_guests
                        )));
                    }
                    if tier.min_guests > tier.max_guests {
                        return Err(invalid(format!(
                            "tier {}-{} has min above max",
                            tier.min_guests, tier.max_guests
                        )));
                    }
                    ensure_positive(tier.price, "tier price")?;
                }
                Ok(())
            },
        }
    }

    /// Canonical form: custom tiers sorted by `min_guests`
    ///
    /// Ties keep their input order. Normalizing twice is the same as once.
    #[must_use]
    pub fn normalized(&self) -> Self {
        match self {
            Self::Custom { custom_pricing } => Self::Custom {
                custom_pricing: sorted_tiers(custom_pricing),
            },
            other => other.clone(),
        }
    }
}

/// Which part of the pricing produced a quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum PriceBasis {
    /// Fixed per-person price
    PerPerson,
    /// Flat group price
    Group {
        /// Effective group size (at least 1)
        group_size: u32,
    },
    /// A custom tier
    Tier {
        /// The tier that was used
        tier: PriceTier,
        /// How the tier was chosen
        matched: TierMatch,
    },
}

/// How a custom tier was selected for a guest count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierMatch {
    /// The guest count is inside the tier's range
    Exact,
    /// Fewer guests than any tier; the lowest tier was used
    BelowRange,
    /// More guests than any tier; the highest tier was used
    AboveRange,
    /// Between two tiers; the nearest tier below was used
    Gap,
}

/// Resolved price for a guest count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// Guests the quote is for
    pub guest_count: u32,
    /// Per-person (or per-group-member) price shown to the guest
    pub unit_price: Money,
    /// What the guest pays
    pub chargeable_total: Money,
    /// Human-readable price descriptor, e.g. "per person"
    pub descriptor: String,
    /// Which pricing rule produced the quote
    pub basis: PriceBasis,
}

/// Resolves listing pricing into quotes.
#[derive(Clone, Copy, Debug, Default)]
pub struct PricingResolver;

impl PricingResolver {
    /// Reject a zero guest count at the boundary
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::InvalidGuestCount`] for zero guests.
    pub const fn validate_guest_count(guest_count: u32) -> Result<()> {
        if guest_count == 0 {
            return Err(MarketplaceError::InvalidGuestCount { guest_count });
        }
        Ok(())
    }

    /// Resolve `pricing` for `guest_count` guests
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::InvalidGuestCount`] for zero guests and
    /// [`MarketplaceError::InvalidPricingConfiguration`] for malformed pricing.
    pub fn resolve(pricing: &Pricing, guest_count: u32) -> Result<PriceQuote> {
        Self::validate_guest_count(guest_count)?;
        pricing.validate()?;

        let guests = Decimal::from(guest_count);
        match pricing {
            Pricing::Fixed { price } => Ok(PriceQuote {
                guest_count,
                unit_price: Money::round_from(*price),
                chargeable_total: Money::round_from(multiply(*price, guests)?),
                descriptor: "per person".to_string(),
                basis: PriceBasis::PerPerson,
            }),
            Pricing::Group {
                group_price,
                group_size,
            } => {
                let group_size = (*group_size).max(1);
                let unit = group_price
                    .checked_div(Decimal::from(group_size))
                    .ok_or_else(|| invalid("group price cannot be split"))?;
                Ok(PriceQuote {
                    guest_count,
                    unit_price: Money::round_from(unit),
                    chargeable_total: Money::round_from(*group_price),
                    descriptor: format!("for up to {group_size} guests"),
                    basis: PriceBasis::Group { group_size },
                })
            },
            Pricing::Custom { custom_pricing } => {
                let (tier, matched) = select_tier(custom_pricing, guest_count)
                    .ok_or_else(|| invalid("custom pricing needs at least one tier"))?;
                Ok(PriceQuote {
                    guest_count,
                    unit_price: Money::round_from(tier.price),
                    chargeable_total: Money::round_from(multiply(tier.price, guests)?),
                    descriptor: format!(
                        "per person ({}-{} guests)",
                        tier.min_guests, tier.max_guests
                    ),
                    basis: PriceBasis::Tier {
                        tier: tier.clone(),
                        matched,
                    },
                })
            },
        }
    }
}

/// Pick the tier for `guest_count`.
///
/// An exact match wins. Otherwise the lowest tier is used below the covered
/// range, the highest above it, and the nearest tier below inside a gap.
fn select_tier(tiers: &[PriceTier], guest_count: u32) -> Option<(&PriceTier, TierMatch)> {
    let mut ordered: Vec<&PriceTier> = tiers.iter().collect();
    ordered.sort_by_key(|tier| tier.min_guests);

    if let Some(tier) = ordered.iter().find(|tier| tier.covers(guest_count)) {
        return Some((*tier, TierMatch::Exact));
    }

    let lowest = *ordered.first()?;
    if guest_count < lowest.min_guests {
        return Some((lowest, TierMatch::BelowRange));
    }

    let below = ordered
        .iter()
        .filter(|tier| tier.max_guests < guest_count)
        .max_by_key(|tier| tier.max_guests)
        .copied()?;
    let above_all = ordered.iter().all(|tier| tier.max_guests < guest_count);
    if above_all {
        Some((below, TierMatch::AboveRange))
    } else {
        Some((below, TierMatch::Gap))
    }
}

fn sorted_tiers(tiers: &[PriceTier]) -> Vec<PriceTier> {
    let mut sorted = tiers.to_vec();
    sorted.sort_by_key(|tier| tier.min_guests);
    sorted
}

fn multiply(price: Decimal, guests: Decimal) -> Result<Decimal> {
    price
        .checked_mul(guests)
        .ok_or_else(|| invalid("price times guest count overflows"))
}

fn ensure_positive(amount: Decimal, what: &str) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(invalid(format!("{what} must be positive, got {amount}")));
    }
    Ok(())
}

fn invalid(reason: impl Into<String>) -> MarketplaceError {
    MarketplaceError::InvalidPricingConfiguration {
        reason: reason.into(),
    }
}
