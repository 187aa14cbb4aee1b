//! Business metrics for the marketplace.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `experiences_listing_transitions_total{to}` - Committed lifecycle transitions by target status
//! - `experiences_state_violations_total{transition}` - Rejected lifecycle commands
//! - `experiences_bookings_total` - Confirmed reservations
//! - `experiences_punti_applied_total` - Punti actually added after capping
//! - `experiences_cancellations_total{outcome}` - Cancellations (complete, partial, already_cancelled)
//! - `experiences_cascade_step_failures_total{step}` - Failed ledger reversals

use crate::cancellation::CascadeStep;
use crate::lifecycle::TransitionKind;
use crate::listing::ListingStatus;
use metrics::describe_counter;

/// Register all metric descriptions.
///
/// Call once at startup, before any metric is recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "experiences_listing_transitions_total",
        "Committed listing lifecycle transitions by target status"
    );
    describe_counter!(
        "experiences_state_violations_total",
        "Lifecycle commands rejected because the listing was in the wrong status"
    );
    describe_counter!("experiences_bookings_total", "Confirmed reservations");
    describe_counter!(
        "experiences_punti_applied_total",
        "Punti added to listings after capping"
    );
    describe_counter!(
        "experiences_cancellations_total",
        "Reservation cancellations by outcome (complete, partial, already_cancelled)"
    );
    describe_counter!(
        "experiences_cascade_step_failures_total",
        "Ledger reversals that failed during a cancellation"
    );

    tracing::info!("Business metrics registered");
}

/// Record a committed transition.
pub fn record_transition(to: ListingStatus) {
    metrics::counter!("experiences_listing_transitions_total", "to" => to.as_str()).increment(1);
    tracing::debug!(%to, "Recorded listing_transition metric");
}

/// Record a rejected lifecycle command.
pub fn record_state_violation(transition: TransitionKind) {
    metrics::counter!("experiences_state_violations_total", "transition" => transition.as_str())
        .increment(1);
    tracing::debug!(%transition, "Recorded state_violation metric");
}

/// Record a confirmed booking.
pub fn record_booking() {
    metrics::counter!("experiences_bookings_total").increment(1);
    tracing::debug!("Recorded booking metric");
}

/// Record punti applied to a listing.
///
/// # Arguments
///
/// * `applied` - Punti actually added, after the cap
pub fn record_punti_applied(applied: u32) {
    metrics::counter!("experiences_punti_applied_total").increment(u64::from(applied));
    tracing::debug!(applied, "Recorded punti_applied metric");
}

/// Record a cancellation outcome.
pub fn record_cancellation(outcome: &'static str) {
    metrics::counter!("experiences_cancellations_total", "outcome" => outcome).increment(1);
    tracing::debug!(outcome, "Recorded cancellation metric");
}

/// Record a failed cascade step.
pub fn record_cascade_step_failure(step: CascadeStep) {
    metrics::counter!("experiences_cascade_step_failures_total", "step" => step.as_str())
        .increment(1);
    tracing::debug!(%step, "Recorded cascade_step_failure metric");
}
