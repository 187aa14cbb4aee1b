//! # Experiences Testing
//!
//! Testing utilities for the experiences marketplace.
//!
//! Contents:
//! - Deterministic clocks for lead-time and ledger-bucket tests
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Effect assertion helpers
//!
//! ## Example
//!
//! ```ignore
//! use experiences_testing::{ReducerTest, clock_at};
//!
//! ReducerTest::new(ListingLifecycleReducer)
//!     .with_env(environment(clock_at("2026-03-02T09:00:00Z")))
//!     .given_state(ListingState::new(draft_listing()))
//!     .when_action(LifecycleAction::Submit { actor: host() })
//!     .then_state(|state| assert_eq!(state.listing.status, ListingStatus::Pending))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use experiences_core::environment::Clock;


/// Clocks for tests
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::RwLock;

    /// Clock stopped at one instant
    ///
    /// ```
    /// use experiences_core::environment::Clock;
    /// use experiences_testing::clock_at;
    ///
    /// let monday = clock_at("2026-01-05T09:00:00Z");
    /// assert_eq!(monday.now(), monday.now());
    /// ```
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        instant: DateTime<Utc>,
    }

    impl FixedClock {
        /// Stop the clock at `instant`
        #[must_use]
        pub const fn new(instant: DateTime<Utc>) -> Self {
            Self { instant }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.instant
        }
    }

    /// Clock that only moves when a test advances it
    ///
    /// Useful when one scenario books "now" and checks lead times later.
    #[derive(Debug)]
    pub struct ManualClock {
        time: RwLock<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: RwLock::new(time),
            }
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: Duration) {
            if let Ok(mut time) = self.time.write() {
                *time += by;
            }
        }

        /// Jump to an absolute instant
        pub fn set(&self, to: DateTime<Utc>) {
            if let Ok(mut time) = self.time.write() {
                *time = to;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time.read().map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// Create a fixed clock at an RFC 3339 instant
    ///
    /// # Panics
    ///
    /// Panics if `rfc3339` is not a valid timestamp. Only meant for literals in tests.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn clock_at(rfc3339: &str) -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339(rfc3339)
                .expect("test timestamp should be valid RFC 3339")
                .with_timezone(&Utc),
        )
    }

    /// Create a default fixed clock for tests (2026-01-05 09:00:00 UTC, a Monday)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        clock_at("2026-01-05T09:00:00Z")
    }
}

/// Effect assertions
pub use reducer_test::assertions;
pub use mocks::{FixedClock, ManualClock, clock_at, test_clock};
pub use reducer_test::ReducerTest;
