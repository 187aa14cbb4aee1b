//! Available start times for a listing on a date.
//!
//! Rules are layered from most to least specific:
//!
//! 1. `specificDates["YYYY-MM-DD"]`
//! 2. `months["YYYY-MM"]`
//! 3. `years["YYYY"]`
//! 4. `daysOfWeek[0..=6]` (0 = Sunday)
//! 5. `defaultTimes`
//!
//! The first layer with an entry for the date decides the day, even when its
//! list is empty (an empty override closes the day). Surviving times are then
//! filtered by the listing's lead time, measured in the marketplace timezone.

use crate::error::{MarketplaceError, Result};
use crate::listing::ListingContent;
use crate::types::TimeOfDay;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Weekly schedule plus date overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRules {
    /// Times used when nothing more specific matches
    #[serde(default)]
    pub default_times: BTreeSet<TimeOfDay>,
    /// Times per weekday, keyed 0 (Sunday) to 6 (Saturday)
    #[serde(default)]
    pub days_of_week: BTreeMap<u8, Vec<TimeOfDay>>,
    /// Times per month, keyed `YYYY-MM`
    #[serde(default)]
    pub months: BTreeMap<String, Vec<TimeOfDay>>,
    /// Times per year, keyed `YYYY`
    #[serde(default)]
    pub years: BTreeMap<String, Vec<TimeOfDay>>,
    /// Times per calendar date, keyed `YYYY-MM-DD`
    #[serde(default)]
    pub specific_dates: BTreeMap<String, Vec<TimeOfDay>>,
}

impl AvailabilityRules {
    /// Whether no time is scheduled anywhere
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default_times.is_empty()
            && self.days_of_week.values().all(Vec::is_empty)
            && self.months.values().all(Vec::is_empty)
            && self.years.values().all(Vec::is_empty)
            && self.specific_dates.values().all(Vec::is_empty)
    }

    /// Reject override keys that can never match a date
    ///
    /// Keys must be in the zero-padded form [`Self::scheduled`] looks up;
    /// `2026-1-1` parses but would never match.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::InvalidAvailabilityConfiguration`] naming the bad key.
    pub fn validate(&self) -> Result<()> {
        if let Some(day) = self.days_of_week.keys().find(|day| **day > 6) {
            return Err(invalid(format!("weekday key {day} is outside 0-6")));
        }
        if let Some(key) = self.specific_dates.keys().find(|key| canonical_date(key).as_deref() != Some(key.as_str())) {
            return Err(invalid(format!("date key {key:?} is not YYYY-MM-DD")));
        }
        if let Some(key) = self.months.keys().find(|key| canonical_month(key).as_deref() != Some(key.as_str())) {
            return Err(invalid(format!("month key {key:?} is not YYYY-MM")));
        }
        if let Some(key) = self.years.keys().find(|key| key.len() != 4 || !key.bytes().all(|b| b.is_ascii_digit())) {
            return Err(invalid(format!("year key {key:?} is not YYYY")));
        }
        Ok(())
    }

    /// Canonical form: date and month keys zero-padded, every override list
    /// sorted and deduplicated
    ///
    /// A key that does not parse is kept as is for [`Self::validate`] to
    /// report. When a padded and an unpadded key name the same day, the
    /// padded one wins.
    #[must_use]
    pub fn normalized(&self) -> Self {
        fn canon<K: Ord + Clone>(map: &BTreeMap<K, Vec<TimeOfDay>>) -> BTreeMap<K, Vec<TimeOfDay>> {
            map.iter()
                .map(|(key, times)| (key.clone(), sorted_unique(times)))
                .collect()
        }
        fn rekey(
            map: &BTreeMap<String, Vec<TimeOfDay>>,
            canonical: fn(&str) -> Option<String>,
        ) -> BTreeMap<String, Vec<TimeOfDay>> {
            let mut out = canon(map);
            for (key, times) in map {
                match canonical(key) {
                    Some(padded) if padded != *key => {
                        out.remove(key);
                        if !map.contains_key(&padded) {
                            out.insert(padded, sorted_unique(times));
                        }
                    },
                    _ => {},
                }
            }
            out
        }
        Self {
            default_times: self.default_times.clone(),
            days_of_week: canon(&self.days_of_week),
            months: rekey(&self.months, canonical_month),
            years: canon(&self.years),
            specific_dates: rekey(&self.specific_dates, canonical_date),
        }
    }

    /// Scheduled times for `date` before lead-time filtering
    #[must_use]
    pub fn scheduled(&self, date: NaiveDate) -> (OverrideSource, Vec<TimeOfDay>) {
        let layers = [
            (
                OverrideSource::SpecificDate,
                self.specific_dates.get(&date.format("%Y-%m-%d").to_string()),
            ),
            (
                OverrideSource::Month,
                self.months.get(&date.format("%Y-%m").to_string()),
            ),
            (
                OverrideSource::Year,
                self.years.get(&date.format("%Y").to_string()),
            ),
            (
                OverrideSource::Weekday,
                u8::try_from(date.weekday().num_days_from_sunday())
                    .ok()
                    .and_then(|day| self.days_of_week.get(&day)),
            ),
        ];

        layers
            .into_iter()
            .find_map(|(source, times)| times.map(|times| (source, sorted_unique(times))))
            .unwrap_or_else(|| {
                (
                    OverrideSource::Default,
                    self.default_times.iter().copied().collect(),
                )
            })
    }
}

/// Rule layer that decided a day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideSource {
    /// `specificDates`
    SpecificDate,
    /// `months`
    Month,
    /// `years`
    Year,
    /// `daysOfWeek`
    Weekday,
    /// `defaultTimes`
    Default,
}

/// Availability of one date.
///
/// `Closed` means nothing is scheduled; `BookedOut` means times are scheduled
/// but all of them are inside the lead time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DayAvailability {
    /// No times scheduled
    Closed {
        /// Layer that closed the day
        source: OverrideSource,
    },
    /// Times scheduled, none bookable yet
    BookedOut {
        /// Layer that scheduled the times
        source: OverrideSource,
        /// The times that were filtered out
        scheduled: Vec<TimeOfDay>,
    },
    /// At least one bookable time
    Open {
        /// Layer that scheduled the times
        source: OverrideSource,
        /// Bookable times, ascending
        slots: Vec<TimeOfDay>,
    },
}

impl DayAvailability {
    /// Bookable times (empty unless open)
    #[must_use]
    pub fn slots(&self) -> &[TimeOfDay] {
        match self {
            Self::Open { slots, .. } => slots,
            Self::Closed { .. } | Self::BookedOut { .. } => &[],
        }
    }

    /// Layer that decided the day
    #[must_use]
    pub const fn source(&self) -> OverrideSource {
        match self {
            Self::Closed { source } | Self::BookedOut { source, .. } | Self::Open { source, .. } => {
                *source
            },
        }
    }

    /// Whether nothing is scheduled
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// Resolves a listing's rules against dates and the current time.
#[derive(Clone, Copy, Debug)]
pub struct AvailabilityResolver<'a> {
    rules: &'a AvailabilityRules,
    hours_in_advance: u32,
    timezone: Tz,
}

impl<'a> AvailabilityResolver<'a> {
    /// Resolver over `rules` requiring `hours_in_advance` of notice
    #[must_use]
    pub const fn new(rules: &'a AvailabilityRules, hours_in_advance: u32, timezone: Tz) -> Self {
        Self {
            rules,
            hours_in_advance,
            timezone,
        }
    }

    /// Resolver over a listing's live content
    #[must_use]
    pub const fn for_content(content: &'a ListingContent, timezone: Tz) -> Self {
        Self::new(&content.availability_rules, content.hours_in_advance, timezone)
    }

    /// Availability of `date` as seen at `now`
    #[must_use]
    pub fn resolve(&self, date: NaiveDate, now: DateTime<Utc>) -> DayAvailability {
        let (source, scheduled) = self.rules.scheduled(date);
        if scheduled.is_empty() {
            return DayAvailability::Closed { source };
        }

        let slots: Vec<TimeOfDay> = scheduled
            .iter()
            .copied()
            .filter(|time| self.meets_lead_time(date, *time, now))
            .collect();

        if slots.is_empty() {
            DayAvailability::BookedOut { source, scheduled }
        } else {
            DayAvailability::Open { source, slots }
        }
    }

    /// Availability of `days` consecutive dates starting at `start`
    #[must_use]
    pub fn resolve_range(
        &self,
        start: NaiveDate,
        days: u32,
        now: DateTime<Utc>,
    ) -> Vec<(NaiveDate, DayAvailability)> {
        start
            .iter_days()
            .take(days as usize)
            .map(|date| (date, self.resolve(date, now)))
            .collect()
    }

    /// Whether `time` on `date` can be booked at `now`
    #[must_use]
    pub fn is_bookable(&self, date: NaiveDate, time: TimeOfDay, now: DateTime<Utc>) -> bool {
        self.resolve(date, now).slots().contains(&time)
    }

    /// Slot start minus now must be at least the lead time
    ///
    /// Local times that do not exist (spring-forward gap) are never bookable.
    fn meets_lead_time(&self, date: NaiveDate, time: TimeOfDay, now: DateTime<Utc>) -> bool {
        let local = date.and_time(time.as_naive());
        let Some(start) = self.timezone.from_local_datetime(&local).earliest() else {
            return false;
        };
        start.with_timezone(&Utc) - now >= Duration::hours(i64::from(self.hours_in_advance))
    }
}

fn sorted_unique(times: &[TimeOfDay]) -> Vec<TimeOfDay> {
    let mut times = times.to_vec();
    times.sort_unstable();
    times.dedup();
    times
}

/// `YYYY-MM-DD` spelling of a parseable date key
fn canonical_date(key: &str) -> Option<String> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d")
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}

/// `YYYY-MM` spelling of a parseable month key
fn canonical_month(key: &str) -> Option<String> {
    NaiveDate::parse_from_str(&format!("{key}-01"), "%Y-%m-%d")
        .ok()
        .map(|date| date.format("%Y-%m").to_string())
}

fn invalid(reason: String) -> MarketplaceError {
    MarketplaceError::InvalidAvailabilityConfiguration { reason }
}
