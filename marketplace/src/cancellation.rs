//! Reservation cancellation with compensating ledger reversals.
//!
//! A moderator cancellation runs as a saga:
//!
//! 1. Atomically flip the reservation from confirmed to cancelled. If it was
//!    already cancelled, stop: no compensation is applied twice.
//! 2. Reverse the booking in platform analytics, host earnings and promoter
//!    analytics. The three reversals are independent and run concurrently;
//!    one failing does not stop the others. A ledger that never received the
//!    booking credit reports nothing to reverse and the step is skipped.
//! 3. Persist each step's outcome on the reservation so operators can see
//!    what is left and [`ReservationCancellationCoordinator::retry_pending_steps`]
//!    can finish the job.

use crate::error::{MarketplaceError, Result, StoreError};
use crate::ledgers::{
    AdjustmentOutcome, HostEarningsLedger, LedgerEntry, Ledgers, PlatformAnalyticsLedger,
    PromoterAnalyticsLedger,
};
use crate::metrics;
use crate::reservation::{Cancellation, CascadeProgress, CascadeStatus, Reservation};
use crate::stores::{CancelMark, ReservationStore};
use crate::types::{ActorId, ReservationId};
use chrono::{DateTime, Utc};
use experiences_core::environment::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A step of the cancellation cascade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    /// Flip the reservation to cancelled
    Reservation,
    /// Platform analytics reversal
    PlatformAnalytics,
    /// Host earnings reversal
    HostEarnings,
    /// Promoter analytics reversal
    PromoterAnalytics,
}

impl CascadeStep {
    /// Ledger steps, in reporting order
    pub const LEDGERS: [Self; 3] = [
        Self::PlatformAnalytics,
        Self::HostEarnings,
        Self::PromoterAnalytics,
    ];

    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reservation => "reservation",
            Self::PlatformAnalytics => "platform_analytics",
            Self::HostEarnings => "host_earnings",
            Self::PromoterAnalytics => "promoter_analytics",
        }
    }
}

impl fmt::Display for CascadeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far a cancellation got, in canonical order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationStage {
    /// Nothing committed
    Requested,
    /// Reservation marked cancelled
    ReservationReversed,
    /// Platform analytics reversed
    PlatformAdjusted,
    /// Host earnings reversed
    HostAdjusted,
    /// Promoter analytics reversed
    ReferralAdjusted,
    /// Every step done
    Complete,
}

/// Outcome of one step in this call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Applied by this call
    Applied,
    /// Applied by an earlier call
    AlreadyApplied,
    /// Nothing to do for this reservation
    Skipped,
    /// Attempted and failed
    Failed(MarketplaceError),
}

impl StepOutcome {
    /// Whether the step needs no further work
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    fn from_status(status: &CascadeStatus, step: CascadeStep) -> Self {
        match status {
            CascadeStatus::Applied => Self::AlreadyApplied,
            CascadeStatus::Skipped => Self::Skipped,
            CascadeStatus::Pending => Self::Failed(MarketplaceError::AggregateAdjustmentFailure {
                step,
                reason: "not attempted yet".into(),
            }),
            CascadeStatus::Failed { reason } => {
                Self::Failed(MarketplaceError::AggregateAdjustmentFailure {
                    step,
                    reason: reason.clone(),
                })
            },
        }
    }

    fn to_status(&self) -> CascadeStatus {
        match self {
            Self::Applied | Self::AlreadyApplied => CascadeStatus::Applied,
            Self::Skipped => CascadeStatus::Skipped,
            Self::Failed(error) => CascadeStatus::Failed {
                reason: error.to_string(),
            },
        }
    }
}

/// What a cancellation call did, step by step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancellationReport {
    /// Reservation cancelled
    pub reservation_id: ReservationId,
    /// Reservation flip
    pub reservation: StepOutcome,
    /// Platform analytics reversal
    pub platform: StepOutcome,
    /// Host earnings reversal
    pub host: StepOutcome,
    /// Promoter analytics reversal
    pub referral: StepOutcome,
    /// Furthest stage reached in canonical order
    pub stage: CancellationStage,
}

impl CancellationReport {
    fn new(
        reservation_id: ReservationId,
        reservation: StepOutcome,
        platform: StepOutcome,
        host: StepOutcome,
        referral: StepOutcome,
    ) -> Self {
        let mut stage = CancellationStage::ReservationReversed;
        for (outcome, reached) in [
            (&platform, CancellationStage::PlatformAdjusted),
            (&host, CancellationStage::HostAdjusted),
            (&referral, CancellationStage::ReferralAdjusted),
        ] {
            if !outcome.is_settled() {
                break;
            }
            stage = reached;
        }
        if stage == CancellationStage::ReferralAdjusted {
            stage = CancellationStage::Complete;
        }
        Self {
            reservation_id,
            reservation,
            platform,
            host,
            referral,
            stage,
        }
    }

    /// Outcome of one step
    #[must_use]
    pub const fn outcome(&self, step: CascadeStep) -> &StepOutcome {
        match step {
            CascadeStep::Reservation => &self.reservation,
            CascadeStep::PlatformAnalytics => &self.platform,
            CascadeStep::HostEarnings => &self.host,
            CascadeStep::PromoterAnalytics => &self.referral,
        }
    }

    /// Whether the reservation had been cancelled before this call
    #[must_use]
    pub const fn was_already_cancelled(&self) -> bool {
        matches!(self.reservation, StepOutcome::AlreadyApplied)
    }

    /// Steps that still need work
    #[must_use]
    pub fn failed_steps(&self) -> Vec<CascadeStep> {
        CascadeStep::LEDGERS
            .into_iter()
            .filter(|step| !self.outcome(*step).is_settled())
            .collect()
    }

    /// Errors of failed steps
    #[must_use]
    pub fn errors(&self) -> Vec<&MarketplaceError> {
        CascadeStep::LEDGERS
            .into_iter()
            .filter_map(|step| match self.outcome(step) {
                StepOutcome::Failed(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    /// Whether every step is done
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stage == CancellationStage::Complete
    }
}

/// A moderator's cancellation command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CancelReservation {
    /// Reservation to cancel
    pub reservation_id: ReservationId,
    /// Moderator cancelling
    pub actor: ActorId,
    /// Mandatory note
    pub note: String,
    /// Optional supporting attachment
    pub attachment: Option<String>,
}

/// A guest asking for a cancellation; nothing is changed by it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationRequest {
    /// Reservation concerned
    pub reservation_id: ReservationId,
    /// Guest asking
    pub guest_id: ActorId,
    /// Guest's reason
    pub reason: String,
    /// When
    pub requested_at: DateTime<Utc>,
}

/// Channel that forwards guest requests to moderators.
pub trait CancellationRequestNotifier: Send + Sync {
    /// Forward one request
    fn notify(
        &self,
        request: &CancellationRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), StoreError>> + Send + '_>>;
}

/// Runs the cancellation saga.
pub struct ReservationCancellationCoordinator<R, P, H, Q> {
    reservations: Arc<R>,
    ledgers: Ledgers<P, H, Q>,
    notifier: Arc<dyn CancellationRequestNotifier>,
    clock: Arc<dyn Clock>,
}

impl<R, P, H, Q> ReservationCancellationCoordinator<R, P, H, Q>
where
    R: ReservationStore,
    P: PlatformAnalyticsLedger,
    H: HostEarningsLedger,
    Q: PromoterAnalyticsLedger,
{
    /// Build the coordinator
    #[must_use]
    pub fn new(
        reservations: Arc<R>,
        ledgers: Ledgers<P, H, Q>,
        notifier: Arc<dyn CancellationRequestNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reservations,
            ledgers,
            notifier,
            clock,
        }
    }

    /// Cancel a reservation and reverse its ledger contributions
    ///
    /// Returns a report even when some reversals fail; check
    /// [`CancellationReport::is_complete`]. Cancelling twice returns a report
    /// with [`StepOutcome::AlreadyApplied`] for the reservation and applies nothing.
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::MissingCancellationNote`],
    /// [`MarketplaceError::ReservationNotFound`], or a store failure before the
    /// reservation was marked cancelled.
    pub async fn cancel(&self, command: CancelReservation) -> Result<CancellationReport> {
        let CancelReservation {
            reservation_id,
            actor,
            note,
            attachment,
        } = command;

        let note = note.trim().to_string();
        if note.is_empty() {
            return Err(MarketplaceError::MissingCancellationNote { reservation_id });
        }

        let Some(reservation) = self.reservations.get(&reservation_id).await? else {
            return Err(MarketplaceError::ReservationNotFound(reservation_id));
        };
        let cancellation = Cancellation {
            actor: actor.clone(),
            note,
            attachment: attachment.filter(|a| !a.trim().is_empty()),
            cancelled_at: self.clock.now(),
            cascade: CascadeProgress::for_reservation(&reservation),
        };

        match self.reservations.mark_cancelled(&reservation_id, cancellation).await? {
            CancelMark::NotFound => Err(MarketplaceError::ReservationNotFound(reservation_id)),
            CancelMark::AlreadyCancelled(existing) => {
                metrics::record_cancellation("already_cancelled");
                tracing::info!(%reservation_id, %actor, "Reservation already cancelled; nothing re-applied");
                Ok(Self::report_from_record(&existing, StepOutcome::AlreadyApplied))
            },
            CancelMark::Cancelled(cancelled) => {
                tracing::info!(%reservation_id, %actor, "Reservation cancelled");
                let report = self.run_cascade(&cancelled, StepOutcome::Applied).await;
                Self::record_report_metrics(&report);
                Ok(report)
            },
        }
    }

    /// Re-run ledger reversals that are pending or failed
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::ReservationNotFound`],
    /// [`MarketplaceError::ReservationNotCancelled`], or store failures.
    pub async fn retry_pending_steps(&self, reservation_id: &ReservationId) -> Result<CancellationReport> {
        let reservation = self
            .reservations
            .get(reservation_id)
            .await?
            .ok_or_else(|| MarketplaceError::ReservationNotFound(reservation_id.clone()))?;
        if !reservation.is_cancelled() {
            return Err(MarketplaceError::ReservationNotCancelled {
                reservation_id: reservation_id.clone(),
            });
        }

        tracing::info!(%reservation_id, "Retrying pending cancellation steps");
        let report = self.run_cascade(&reservation, StepOutcome::AlreadyApplied).await;
        Self::record_report_metrics(&report);
        Ok(report)
    }

    /// Forward a guest's cancellation request to moderators
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::ReservationNotFound`],
    /// [`MarketplaceError::AlreadyCancelled`], or notifier failures.
    pub async fn request_cancellation(
        &self,
        reservation_id: &ReservationId,
        guest_id: ActorId,
        reason: String,
    ) -> Result<CancellationRequest> {
        let reservation = self
            .reservations
            .get(reservation_id)
            .await?
            .ok_or_else(|| MarketplaceError::ReservationNotFound(reservation_id.clone()))?;
        if reservation.is_cancelled() {
            return Err(MarketplaceError::AlreadyCancelled {
                reservation_id: reservation_id.clone(),
            });
        }

        let request = CancellationRequest {
            reservation_id: reservation_id.clone(),
            guest_id,
            reason,
            requested_at: self.clock.now(),
        };
        self.notifier.notify(&request).await?;
        tracing::info!(%reservation_id, guest_id = %request.guest_id, "Cancellation requested by guest");
        Ok(request)
    }

    async fn run_cascade(&self, reservation: &Reservation, reservation_step: StepOutcome) -> CancellationReport {
        let entry = LedgerEntry::for_reservation(reservation);
        let progress = reservation
            .cancellation
            .as_ref()
            .map_or_else(|| CascadeProgress::for_reservation(reservation), |c| c.cascade.clone());

        let (platform, host, referral) = futures::join!(
            self.reverse_platform(&entry, &progress.platform),
            self.reverse_host(reservation, &entry, &progress.host),
            self.reverse_referral(reservation, &entry, &progress.referral),
        );

        for (step, outcome) in [
            (CascadeStep::PlatformAnalytics, &platform),
            (CascadeStep::HostEarnings, &host),
            (CascadeStep::PromoterAnalytics, &referral),
        ] {
            if let StepOutcome::Failed(error) = outcome {
                metrics::record_cascade_step_failure(step);
                tracing::error!(reservation_id = %reservation.id, %step, %error, "Cancellation step failed");
            }
            if let Err(error) = self
                .reservations
                .record_step(&reservation.id, step, outcome.to_status())
                .await
            {
                tracing::warn!(reservation_id = %reservation.id, %step, %error, "Could not persist cascade progress");
            }
        }

        CancellationReport::new(reservation.id.clone(), reservation_step, platform, host, referral)
    }

    async fn reverse_platform(&self, entry: &LedgerEntry, status: &CascadeStatus) -> StepOutcome {
        if !status.needs_work() {
            return StepOutcome::from_status(status, CascadeStep::PlatformAnalytics);
        }
        settle(
            CascadeStep::PlatformAnalytics,
            self.ledgers.platform.reverse_booking(entry).await,
        )
    }

    async fn reverse_host(
        &self,
        reservation: &Reservation,
        entry: &LedgerEntry,
        status: &CascadeStatus,
    ) -> StepOutcome {
        if !status.needs_work() {
            return StepOutcome::from_status(status, CascadeStep::HostEarnings);
        }
        let Some(host_id) = reservation.host_id.as_ref().filter(|_| !entry.amount.is_zero()) else {
            return StepOutcome::Skipped;
        };
        settle(
            CascadeStep::HostEarnings,
            self.ledgers.hosts.reverse_booking(host_id, entry).await,
        )
    }

    async fn reverse_referral(
        &self,
        reservation: &Reservation,
        entry: &LedgerEntry,
        status: &CascadeStatus,
    ) -> StepOutcome {
        if !status.needs_work() {
            return StepOutcome::from_status(status, CascadeStep::PromoterAnalytics);
        }
        let Some(referral_id) = reservation.referral_id.as_ref() else {
            return StepOutcome::Skipped;
        };
        settle(
            CascadeStep::PromoterAnalytics,
            self.ledgers.promoters.reverse_booking(referral_id, entry).await,
        )
    }

    fn report_from_record(reservation: &Reservation, reservation_step: StepOutcome) -> CancellationReport {
        let progress = reservation
            .cancellation
            .as_ref()
            .map_or_else(|| CascadeProgress::for_reservation(reservation), |c| c.cascade.clone());
        CancellationReport::new(
            reservation.id.clone(),
            reservation_step,
            StepOutcome::from_status(&progress.platform, CascadeStep::PlatformAnalytics),
            StepOutcome::from_status(&progress.host, CascadeStep::HostEarnings),
            StepOutcome::from_status(&progress.referral, CascadeStep::PromoterAnalytics),
        )
    }

    fn record_report_metrics(report: &CancellationReport) {
        if report.is_complete() {
            metrics::record_cancellation("complete");
        } else {
            metrics::record_cancellation("partial");
            tracing::warn!(
                reservation_id = %report.reservation_id,
                stage = ?report.stage,
                failed = ?report.failed_steps(),
                "Cancellation left steps pending"
            );
        }
    }
}

fn settle(step: CascadeStep, result: std::result::Result<AdjustmentOutcome, StoreError>) -> StepOutcome {
    match result {
        Ok(AdjustmentOutcome::Applied) => StepOutcome::Applied,
        Ok(AdjustmentOutcome::AlreadyApplied) => StepOutcome::AlreadyApplied,
        Ok(AdjustmentOutcome::NotRecorded | AdjustmentOutcome::Superseded) => StepOutcome::Skipped,
        Err(error) => StepOutcome::Failed(MarketplaceError::AggregateAdjustmentFailure {
            step,
            reason: error.to_string(),
        }),
    }
}
