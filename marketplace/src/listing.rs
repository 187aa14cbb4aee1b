//! Listings and their publication status.

use crate::availability::AvailabilityRules;
use crate::error::{MarketplaceError, Result};
use crate::pricing::Pricing;
use crate::types::{HostId, ListingId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Publication status of a listing.
///
/// Host suspension is tracked separately (see [`crate::stores::HostDirectory`])
/// and never changes this value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Being written by the host
    Draft,
    /// Submitted, waiting for a moderator
    Pending,
    /// Public and bookable
    Active,
    /// Turned down by a moderator; may be resubmitted
    Rejected,
    /// Live with an edit waiting for review
    Revision,
    /// Reactivated after deactivation, waiting for a moderator
    AwaitingReapproval,
    /// Taken down
    Inactive,
}

impl ListingStatus {
    /// Every status, in lifecycle order
    pub const ALL: [Self; 7] = [
        Self::Draft,
        Self::Pending,
        Self::Active,
        Self::Rejected,
        Self::Revision,
        Self::AwaitingReapproval,
        Self::Inactive,
    ];

    /// Stored status code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Revision => "revision",
            Self::AwaitingReapproval => "awaiting_reapproval",
            Self::Inactive => "inactive",
        }
    }

    /// Whether the public sees the listing (its approved content)
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Revision)
    }

    /// Whether a moderator has something to decide
    #[must_use]
    pub const fn awaits_moderation(self) -> bool {
        matches!(self, Self::Pending | Self::Revision | Self::AwaitingReapproval)
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-editable content of a listing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingContent {
    /// Title shown in search
    #[serde(default)]
    pub title: String,
    /// Category slug
    #[serde(default)]
    pub category: Option<String>,
    /// Meeting point or city
    #[serde(default)]
    pub location: Option<String>,
    /// Image URLs
    #[serde(default)]
    pub images: Vec<String>,
    /// Long description
    #[serde(default)]
    pub description: Option<String>,
    /// Pricing model
    #[serde(default)]
    pub pricing: Option<Pricing>,
    /// Schedule
    #[serde(default)]
    pub availability_rules: AvailabilityRules,
    /// Minimum notice before a slot, in hours
    #[serde(default)]
    pub hours_in_advance: u32,
}

impl ListingContent {
    /// Names of required fields that are absent or blank
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let blank = |value: Option<&String>| value.is_none_or(|v| v.trim().is_empty());
        let mut missing = Vec::new();
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if blank(self.category.as_ref()) {
            missing.push("category");
        }
        if blank(self.location.as_ref()) {
            missing.push("location");
        }
        if self.images.is_empty() {
            missing.push("images");
        }
        if blank(self.description.as_ref()) {
            missing.push("description");
        }
        if self.pricing.is_none() {
            missing.push("pricing");
        }
        if self.availability_rules.is_empty() {
            missing.push("availabilityRules");
        }
        missing
    }

    /// Check the content can be put in front of a moderator
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::IncompleteListing`] when required fields are missing,
    /// otherwise any pricing or availability validation error.
    pub fn validate_for_review(&self, listing_id: &ListingId) -> Result<()> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(MarketplaceError::IncompleteListing {
                listing_id: listing_id.clone(),
                missing,
            });
        }
        if let Some(pricing) = &self.pricing {
            pricing.validate()?;
        }
        self.availability_rules.validate()
    }

    /// Content with pricing tiers and schedules in canonical order
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.pricing = self.pricing.as_ref().map(Pricing::normalized);
        self.availability_rules = self.availability_rules.normalized();
        self
    }
}

/// A listing record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Identifier
    pub id: ListingId,
    /// Owning host
    pub host_id: HostId,
    /// Publication status
    pub status: ListingStatus,
    /// Approved content (what guests see while live)
    pub content: ListingContent,
    /// Edit awaiting review while in `revision`
    #[serde(default)]
    pub staged_revision: Option<ListingContent>,
    /// Moderator note from the last rejection
    #[serde(default)]
    pub rejection_reason: Option<String>,
    /// Loyalty score, 0 to the configured cap
    #[serde(default)]
    pub punti: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// New draft listing
    #[must_use]
    pub fn draft(id: ListingId, host_id: HostId, content: ListingContent, now: DateTime<Utc>) -> Self {
        Self {
            id,
            host_id,
            status: ListingStatus::Draft,
            content: content.normalized(),
            staged_revision: None,
            rejection_reason: None,
            punti: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the listing is publicly visible
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.status.is_live()
    }
}
