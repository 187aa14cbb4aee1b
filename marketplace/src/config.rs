//! Configuration management for the marketplace.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::loyalty::LoyaltyConfig;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Minimum commission above maximum
    #[error("partner commission range is inverted: min {min} > max {max}")]
    InvalidCommissionRange {
        /// Configured minimum
        min: Decimal,
        /// Configured maximum
        max: Decimal,
    },

    /// A commission bound below zero
    #[error("partner commission must not be negative: {0}")]
    NegativeCommission(Decimal),

    /// Punti cap of zero
    #[error("PARTNER_MAX_POINT_VALUE must be greater than zero")]
    ZeroPointCap,

    /// Unparseable timezone name
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    /// Unparseable numeric variable
    #[error("{name} is not a valid number: {value}")]
    InvalidNumber {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
    },
}

/// Marketplace configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// Commission bounds and punti cap
    pub loyalty: LoyaltyConfig,
    /// Timezone for availability dates and analytics buckets
    pub timezone: Tz,
    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            loyalty: LoyaltyConfig::default(),
            timezone: Tz::Europe__Rome,
            log_level: "info".to_string(),
        }
    }
}

impl MarketplaceConfig {
    /// Load configuration from the environment
    ///
    /// Unset variables fall back to the defaults. Set but malformed values are
    /// errors rather than silently replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value does not parse or the result fails
    /// [`MarketplaceConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let timezone = match env::var("MARKETPLACE_TIMEZONE") {
            Ok(name) => name
                .parse::<Tz>()
                .map_err(|_| ConfigError::UnknownTimezone(name))?,
            Err(_) => defaults.timezone,
        };

        let config = Self {
            loyalty: LoyaltyConfig {
                min_partner_commission: parse_var(
                    "PARTNER_MIN_COMMISSION",
                    defaults.loyalty.min_partner_commission,
                )?,
                max_partner_commission: parse_var(
                    "PARTNER_MAX_COMMISSION",
                    defaults.loyalty.max_partner_commission,
                )?,
                max_partner_point_value: parse_var(
                    "PARTNER_MAX_POINT_VALUE",
                    defaults.loyalty.max_partner_point_value,
                )?,
            },
            timezone,
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the loyalty settings are coherent
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for negative or inverted commissions and a zero cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let LoyaltyConfig {
            min_partner_commission: min,
            max_partner_commission: max,
            max_partner_point_value,
        } = &self.loyalty;

        if min.is_sign_negative() {
            return Err(ConfigError::NegativeCommission(*min));
        }
        if max.is_sign_negative() {
            return Err(ConfigError::NegativeCommission(*max));
        }
        if min > max {
            return Err(ConfigError::InvalidCommissionRange {
                min: *min,
                max: *max,
            });
        }
        if *max_partner_point_value == 0 {
            return Err(ConfigError::ZeroPointCap);
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        Err(_) => Ok(default),
    }
}
