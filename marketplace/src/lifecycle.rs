//! Listing lifecycle state machine.
//!
//! ```text
//! draft ──submit──► pending ──approve──► active ──stage──► revision
//!   ▲                  │                  │  ▲               │
//!   │               reject             deact │ approve/reject │
//!   │                  ▼                  ▼  └───────────────┘
//! rejected ◄──────── (submit again)    inactive ──reactivate──► awaiting_reapproval
//!                                                               │ approve → active
//!                                                               │ reject  → rejected
//! ```
//!
//! [`ListingLifecycleReducer`] holds the rules and touches no storage.
//! [`ListingLifecycle`] loads the listing, runs the reducer, commits with a
//! status compare-and-swap, and only then publishes the audit event.

use crate::error::{MarketplaceError, Result, StoreError};
use crate::listing::{Listing, ListingContent, ListingStatus};
use crate::metrics;
use crate::stores::{CasOutcome, HostDirectory, ListingRepository};
use crate::types::{ActorId, HostId, ListingId};
use chrono::{DateTime, Utc};
use experiences_core::effect::Effect;
use experiences_core::environment::Clock;
use experiences_core::reducer::Reducer;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

// ============================================================================
// Transitions
// ============================================================================

/// A requested lifecycle transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// Send for review
    Submit,
    /// Moderator approval
    Approve,
    /// Moderator rejection
    Reject,
    /// Host edits a live listing
    StageRevision,
    /// Take down
    Deactivate,
    /// Ask to be published again
    Reactivate,
}

impl TransitionKind {
    /// Label used in logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::StageRevision => "stage_revision",
            Self::Deactivate => "deactivate",
            Self::Reactivate => "reactivate",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for a deactivation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initiator {
    /// The listing's host
    Host,
    /// A marketplace moderator
    Moderator,
}

/// What a lifecycle command did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Nothing happened (the action was an error or a replayed no-op)
    #[default]
    Unchanged,
    /// The status moved
    Applied {
        /// Status before
        from: ListingStatus,
        /// Status after
        to: ListingStatus,
    },
    /// A moderator deactivated a listing that was already inactive
    AlreadyInactive,
}

// ============================================================================
// Actions
// ============================================================================

/// Commands and the events they produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    // Commands
    /// Submit a draft or rejected listing for review
    Submit {
        /// Host submitting
        actor: ActorId,
    },
    /// Approve a pending, re-approval or revision listing
    Approve {
        /// Moderator approving
        actor: ActorId,
    },
    /// Reject a pending, re-approval or revision listing
    Reject {
        /// Moderator rejecting
        actor: ActorId,
        /// Note for the host
        reason: Option<String>,
    },
    /// Stage an edit to an active listing
    StageRevision {
        /// Host editing
        actor: ActorId,
        /// Proposed content
        revision: Box<ListingContent>,
    },
    /// Take an active listing down
    Deactivate {
        /// Who is deactivating
        actor: ActorId,
        /// Host or moderator
        initiator: Initiator,
    },
    /// Ask for an inactive listing to be published again
    Reactivate {
        /// Host reactivating
        actor: ActorId,
    },

    // Events
    /// Listing went to `pending`
    Submitted {
        /// Who submitted
        actor: ActorId,
        /// When
        at: DateTime<Utc>,
    },
    /// Listing went live
    Approved {
        /// Who approved
        actor: ActorId,
        /// When
        at: DateTime<Utc>,
    },
    /// Staged revision replaced the live content
    RevisionApproved {
        /// Who approved
        actor: ActorId,
        /// When
        at: DateTime<Utc>,
    },
    /// Listing went to `rejected`
    Rejected {
        /// Who rejected
        actor: ActorId,
        /// Note for the host
        reason: Option<String>,
        /// When
        at: DateTime<Utc>,
    },
    /// Staged revision was discarded; the live content stays
    RevisionRejected {
        /// Who rejected
        actor: ActorId,
        /// Note for the host
        reason: Option<String>,
        /// When
        at: DateTime<Utc>,
    },
    /// Edit staged; listing stays live with its approved content
    RevisionStaged {
        /// Who edited
        actor: ActorId,
        /// Staged content
        revision: Box<ListingContent>,
        /// When
        at: DateTime<Utc>,
    },
    /// Listing went to `inactive`
    Deactivated {
        /// Who deactivated
        actor: ActorId,
        /// Host or moderator
        initiator: Initiator,
        /// When
        at: DateTime<Utc>,
    },
    /// Moderator deactivation of an inactive listing; nothing changes
    AlreadyInactive {
        /// Who asked
        actor: ActorId,
    },
    /// Listing went to `awaiting_reapproval`
    ReactivationRequested {
        /// Who asked
        actor: ActorId,
        /// When
        at: DateTime<Utc>,
    },
    /// Command refused
    ValidationFailed {
        /// Why
        error: MarketplaceError,
    },
}

impl LifecycleAction {
    /// The transition a command requests (`None` for events)
    #[must_use]
    pub const fn requested_transition(&self) -> Option<TransitionKind> {
        match self {
            Self::Submit { .. } => Some(TransitionKind::Submit),
            Self::Approve { .. } => Some(TransitionKind::Approve),
            Self::Reject { .. } => Some(TransitionKind::Reject),
            Self::StageRevision { .. } => Some(TransitionKind::StageRevision),
            Self::Deactivate { .. } => Some(TransitionKind::Deactivate),
            Self::Reactivate { .. } => Some(TransitionKind::Reactivate),
            _ => None,
        }
    }

    fn actor(&self) -> Option<&ActorId> {
        match self {
            Self::Submit { actor }
            | Self::Approve { actor }
            | Self::Reject { actor, .. }
            | Self::StageRevision { actor, .. }
            | Self::Deactivate { actor, .. }
            | Self::Reactivate { actor }
            | Self::Submitted { actor, .. }
            | Self::Approved { actor, .. }
            | Self::RevisionApproved { actor, .. }
            | Self::Rejected { actor, .. }
            | Self::RevisionRejected { actor, .. }
            | Self::RevisionStaged { actor, .. }
            | Self::Deactivated { actor, .. }
            | Self::AlreadyInactive { actor }
            | Self::ReactivationRequested { actor, .. } => Some(actor),
            Self::ValidationFailed { .. } => None,
        }
    }

    fn reason(&self) -> Option<&String> {
        match self {
            Self::Rejected { reason, .. } | Self::RevisionRejected { reason, .. } => reason.as_ref(),
            _ => None,
        }
    }
}

// ============================================================================
// Audit events
// ============================================================================

/// Audit record of a committed status change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEvent {
    /// Listing that changed
    pub listing_id: ListingId,
    /// Its host
    pub host_id: HostId,
    /// Who issued the command
    pub actor: ActorId,
    /// Requested transition
    pub transition: TransitionKind,
    /// Status before
    pub from: ListingStatus,
    /// Status after
    pub to: ListingStatus,
    /// Moderator note, for rejections
    pub reason: Option<String>,
    /// When it happened
    pub occurred_at: DateTime<Utc>,
}

/// Destination for listing audit events.
pub trait ListingEventSink: Send + Sync {
    /// Publish one event
    fn publish(
        &self,
        event: ListingEvent,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), StoreError>> + Send + '_>>;
}

// ============================================================================
// Reducer
// ============================================================================

/// A listing plus the outcome of the last action reduced against it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingState {
    /// The listing being transitioned
    pub listing: Listing,
    /// Error from the last command, if it was refused
    pub last_error: Option<MarketplaceError>,
    /// What the last action did
    pub outcome: TransitionOutcome,
}

impl ListingState {
    /// Wrap a loaded listing
    #[must_use]
    pub const fn new(listing: Listing) -> Self {
        Self {
            listing,
            last_error: None,
            outcome: TransitionOutcome::Unchanged,
        }
    }
}

/// Dependencies of the lifecycle reducer.
#[derive(Clone)]
pub struct LifecycleEnvironment {
    /// Time source for event timestamps
    pub clock: Arc<dyn Clock>,
    /// Where committed transitions are published
    pub events: Arc<dyn ListingEventSink>,
}

impl LifecycleEnvironment {
    /// Build an environment
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, events: Arc<dyn ListingEventSink>) -> Self {
        Self { clock, events }
    }
}

/// Pure lifecycle rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListingLifecycleReducer;

impl ListingLifecycleReducer {
    /// Turn a command into the event it produces, or refuse it
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::StateViolation`] when the transition is not allowed
    /// from the current status, or a content validation error for submissions
    /// and revisions.
    pub fn decide(
        listing: &Listing,
        command: LifecycleAction,
        at: DateTime<Utc>,
    ) -> Result<LifecycleAction> {
        use ListingStatus as S;

        let Some(requested) = command.requested_transition() else {
            return Ok(command);
        };

        match (listing.status, command) {
            (S::Draft | S::Rejected, LifecycleAction::Submit { actor }) => {
                listing.content.validate_for_review(&listing.id)?;
                Ok(LifecycleAction::Submitted { actor, at })
            },
            (S::Pending | S::AwaitingReapproval, LifecycleAction::Approve { actor }) => {
                Ok(LifecycleAction::Approved { actor, at })
            },
            (S::Revision, LifecycleAction::Approve { actor }) => {
                Ok(LifecycleAction::RevisionApproved { actor, at })
            },
            (S::Pending | S::AwaitingReapproval, LifecycleAction::Reject { actor, reason }) => {
                Ok(LifecycleAction::Rejected { actor, reason, at })
            },
            (S::Revision, LifecycleAction::Reject { actor, reason }) => {
                Ok(LifecycleAction::RevisionRejected { actor, reason, at })
            },
            (S::Active, LifecycleAction::StageRevision { actor, revision }) => {
                let revision = Box::new(revision.normalized());
                revision.validate_for_review(&listing.id)?;
                Ok(LifecycleAction::RevisionStaged {
                    actor,
                    revision,
                    at,
                })
            },
            (S::Active, LifecycleAction::Deactivate { actor, initiator }) => {
                Ok(LifecycleAction::Deactivated {
                    actor,
                    initiator,
                    at,
                })
            },
            (
                S::Inactive,
                LifecycleAction::Deactivate {
                    actor,
                    initiator: Initiator::Moderator,
                },
            ) => Ok(LifecycleAction::AlreadyInactive { actor }),
            (S::Inactive, LifecycleAction::Reactivate { actor }) => {
                Ok(LifecycleAction::ReactivationRequested { actor, at })
            },
            (current, _) => Err(MarketplaceError::StateViolation {
                listing_id: listing.id.clone(),
                current,
                requested,
            }),
        }
    }

    /// Apply an event to the state
    ///
    /// Commands passed here are ignored.
    pub fn apply_event(state: &mut ListingState, event: &LifecycleAction) {
        let from = state.listing.status;
        let listing = &mut state.listing;
        let (to, at) = match event {
            LifecycleAction::Submitted { at, .. } => {
                listing.rejection_reason = None;
                (ListingStatus::Pending, *at)
            },
            LifecycleAction::Approved { at, .. } => {
                listing.rejection_reason = None;
                (ListingStatus::Active, *at)
            },
            LifecycleAction::RevisionApproved { at, .. } => {
                if let Some(revision) = listing.staged_revision.take() {
                    listing.content = revision;
                }
                listing.rejection_reason = None;
                (ListingStatus::Active, *at)
            },
            LifecycleAction::Rejected { reason, at, .. } => {
                listing.rejection_reason.clone_from(reason);
                (ListingStatus::Rejected, *at)
            },
            LifecycleAction::RevisionRejected { reason, at, .. } => {
                listing.staged_revision = None;
                listing.rejection_reason.clone_from(reason);
                (ListingStatus::Active, *at)
            },
            LifecycleAction::RevisionStaged { revision, at, .. } => {
                listing.staged_revision = Some((**revision).clone());
                (ListingStatus::Revision, *at)
            },
            LifecycleAction::Deactivated { at, .. } => (ListingStatus::Inactive, *at),
            LifecycleAction::ReactivationRequested { at, .. } => {
                (ListingStatus::AwaitingReapproval, *at)
            },
            LifecycleAction::AlreadyInactive { .. } => {
                state.last_error = None;
                state.outcome = TransitionOutcome::AlreadyInactive;
                return;
            },
            LifecycleAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
                state.outcome = TransitionOutcome::Unchanged;
                return;
            },
            LifecycleAction::Submit { .. }
            | LifecycleAction::Approve { .. }
            | LifecycleAction::Reject { .. }
            | LifecycleAction::StageRevision { .. }
            | LifecycleAction::Deactivate { .. }
            | LifecycleAction::Reactivate { .. } => return,
        };

        listing.status = to;
        listing.updated_at = at;
        state.last_error = None;
        state.outcome = TransitionOutcome::Applied { from, to };
    }

    fn publish(env: &LifecycleEnvironment, event: ListingEvent) -> Effect<LifecycleAction> {
        let sink = Arc::clone(&env.events);
        Effect::fire_and_forget(async move {
            let listing_id = event.listing_id.clone();
            if let Err(error) = sink.publish(event).await {
                tracing::warn!(%listing_id, %error, "Failed to publish listing event");
            }
        })
    }
}

impl Reducer for ListingLifecycleReducer {
    type State = ListingState;
    type Action = LifecycleAction;
    type Environment = LifecycleEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let Some(requested) = action.requested_transition() else {
            Self::apply_event(state, &action);
            return SmallVec::new();
        };

        let event = match Self::decide(&state.listing, action, env.clock.now()) {
            Ok(event) => event,
            Err(error) => {
                Self::apply_event(state, &LifecycleAction::ValidationFailed { error });
                return SmallVec::new();
            },
        };

        Self::apply_event(state, &event);

        let TransitionOutcome::Applied { from, to } = state.outcome else {
            return SmallVec::new();
        };
        let Some(actor) = event.actor().cloned() else {
            return SmallVec::new();
        };

        let audit = ListingEvent {
            listing_id: state.listing.id.clone(),
            host_id: state.listing.host_id.clone(),
            actor,
            transition: requested,
            from,
            to,
            reason: event.reason().cloned(),
            occurred_at: state.listing.updated_at,
        };
        smallvec![Self::publish(env, audit)]
    }
}

// ============================================================================
// Service
// ============================================================================

/// Runs lifecycle commands against stored listings.
pub struct ListingLifecycle<L, H> {
    listings: Arc<L>,
    hosts: Arc<H>,
    environment: LifecycleEnvironment,
    reducer: ListingLifecycleReducer,
}

impl<L, H> ListingLifecycle<L, H>
where
    L: ListingRepository,
    H: HostDirectory,
{
    /// Build the service
    #[must_use]
    pub const fn new(listings: Arc<L>, hosts: Arc<H>, environment: LifecycleEnvironment) -> Self {
        Self {
            listings,
            hosts,
            environment,
            reducer: ListingLifecycleReducer,
        }
    }

    /// Create a draft listing for `host_id`
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn create_draft(&self, host_id: HostId, content: ListingContent) -> Result<Listing> {
        let listing = Listing::draft(
            ListingId::generate(),
            host_id,
            content,
            self.environment.clock.now(),
        );
        self.listings.insert(listing.clone()).await?;
        tracing::info!(listing_id = %listing.id, host_id = %listing.host_id, "Draft listing created");
        Ok(listing)
    }

    /// Load a listing
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::ListingNotFound`] or store failures.
    pub async fn listing(&self, listing_id: &ListingId) -> Result<Listing> {
        self.listings
            .get(listing_id)
            .await?
            .ok_or_else(|| MarketplaceError::ListingNotFound(listing_id.clone()))
    }

    /// `draft | rejected → pending`
    ///
    /// # Errors
    ///
    /// State violations, incomplete content, store failures.
    pub async fn submit(&self, listing_id: &ListingId, actor: ActorId) -> Result<TransitionOutcome> {
        self.dispatch(listing_id, LifecycleAction::Submit { actor }).await
    }

    /// `pending | awaiting_reapproval → active`, or `revision → active` with the staged content
    ///
    /// # Errors
    ///
    /// State violations and store failures.
    pub async fn approve(&self, listing_id: &ListingId, actor: ActorId) -> Result<TransitionOutcome> {
        self.dispatch(listing_id, LifecycleAction::Approve { actor }).await
    }

    /// `pending | awaiting_reapproval → rejected`, or `revision → active` discarding the edit
    ///
    /// # Errors
    ///
    /// State violations and store failures.
    pub async fn reject(
        &self,
        listing_id: &ListingId,
        actor: ActorId,
        reason: Option<String>,
    ) -> Result<TransitionOutcome> {
        self.dispatch(listing_id, LifecycleAction::Reject { actor, reason })
            .await
    }

    /// `active → revision`, keeping the approved content live
    ///
    /// # Errors
    ///
    /// State violations, incomplete revision, store failures.
    pub async fn stage_revision(
        &self,
        listing_id: &ListingId,
        actor: ActorId,
        revision: ListingContent,
    ) -> Result<TransitionOutcome> {
        self.dispatch(
            listing_id,
            LifecycleAction::StageRevision {
                actor,
                revision: Box::new(revision),
            },
        )
        .await
    }

    /// `active → inactive`; a moderator hitting an inactive listing gets
    /// [`TransitionOutcome::AlreadyInactive`]
    ///
    /// # Errors
    ///
    /// State violations and store failures.
    pub async fn deactivate(
        &self,
        listing_id: &ListingId,
        actor: ActorId,
        initiator: Initiator,
    ) -> Result<TransitionOutcome> {
        self.dispatch(listing_id, LifecycleAction::Deactivate { actor, initiator })
            .await
    }

    /// `inactive → awaiting_reapproval`
    ///
    /// # Errors
    ///
    /// State violations and store failures.
    pub async fn reactivate(&self, listing_id: &ListingId, actor: ActorId) -> Result<TransitionOutcome> {
        self.dispatch(listing_id, LifecycleAction::Reactivate { actor }).await
    }

    /// Suspend a host; their listings keep their status but stop being bookable
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn suspend_host(&self, host_id: &HostId, actor: &ActorId) -> Result<()> {
        self.hosts
            .set_suspended(host_id, true, self.environment.clock.now())
            .await?;
        tracing::info!(%host_id, %actor, "Host suspended");
        Ok(())
    }

    /// Lift a host suspension
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn reinstate_host(&self, host_id: &HostId, actor: &ActorId) -> Result<()> {
        self.hosts
            .set_suspended(host_id, false, self.environment.clock.now())
            .await?;
        tracing::info!(%host_id, %actor, "Host reinstated");
        Ok(())
    }

    /// Load a listing that guests can book right now
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::ListingNotBookable`] unless live,
    /// [`MarketplaceError::HostSuspended`] if the host is suspended.
    pub async fn ensure_bookable(&self, listing_id: &ListingId) -> Result<Listing> {
        let listing = self.listing(listing_id).await?;
        if !listing.is_live() {
            return Err(MarketplaceError::ListingNotBookable {
                listing_id: listing.id,
                status: listing.status,
            });
        }
        if self.hosts.is_suspended(&listing.host_id).await? {
            return Err(MarketplaceError::HostSuspended {
                host_id: listing.host_id,
            });
        }
        Ok(listing)
    }

    async fn dispatch(&self, listing_id: &ListingId, action: LifecycleAction) -> Result<TransitionOutcome> {
        let Some(requested) = action.requested_transition() else {
            return Ok(TransitionOutcome::Unchanged);
        };

        let listing = self.listing(listing_id).await?;
        let expected = listing.status;
        let mut state = ListingState::new(listing);

        let effects = self.reducer.reduce(&mut state, action, &self.environment);

        if let Some(error) = state.last_error.take() {
            if matches!(error, MarketplaceError::StateViolation { .. }) {
                metrics::record_state_violation(requested);
            }
            tracing::warn!(%listing_id, %requested, %error, "Lifecycle command refused");
            return Err(error);
        }

        let TransitionOutcome::Applied { from, to } = state.outcome else {
            tracing::info!(%listing_id, %requested, outcome = ?state.outcome, "Lifecycle command changed nothing");
            return Ok(state.outcome);
        };

        match self.listings.compare_and_swap(expected, &state.listing).await? {
            CasOutcome::Applied => {},
            CasOutcome::Conflict { actual } => {
                metrics::record_state_violation(requested);
                tracing::warn!(%listing_id, %requested, %expected, %actual, "Lost lifecycle race");
                return Err(MarketplaceError::StateViolation {
                    listing_id: listing_id.clone(),
                    current: actual,
                    requested,
                });
            },
            CasOutcome::Missing => return Err(MarketplaceError::ListingNotFound(listing_id.clone())),
        }

        experiences_runtime::execute(effects).await;

        metrics::record_transition(to);
        tracing::info!(%listing_id, %requested, %from, %to, "Listing transitioned");
        Ok(state.outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::listing::fixtures::complete_content;
    use crate::stores::InMemoryListingEventLog;
    use experiences_testing::{ReducerTest, assertions, test_clock};

    fn environment() -> LifecycleEnvironment {
        LifecycleEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(InMemoryListingEventLog::default()),
        )
    }

    fn listing_in(status: ListingStatus) -> Listing {
        let mut listing = Listing::draft(
            ListingId::new("l-1"),
            HostId::new("h-1"),
            complete_content(),
            test_clock().now(),
        );
        listing.status = status;
        listing
    }

    fn host() -> ActorId {
        ActorId::new("host")
    }

    fn moderator() -> ActorId {
        ActorId::new("moderator")
    }

    fn command(kind: TransitionKind, initiator: Initiator) -> LifecycleAction {
        match kind {
            TransitionKind::Submit => LifecycleAction::Submit { actor: host() },
            TransitionKind::Approve => LifecycleAction::Approve { actor: moderator() },
            TransitionKind::Reject => LifecycleAction::Reject {
                actor: moderator(),
                reason: None,
            },
            TransitionKind::StageRevision => LifecycleAction::StageRevision {
                actor: host(),
                revision: Box::new(complete_content()),
            },
            TransitionKind::Deactivate => LifecycleAction::Deactivate {
                actor: host(),
                initiator,
            },
            TransitionKind::Reactivate => LifecycleAction::Reactivate { actor: host() },
        }
    }

    #[test]
    fn submit_moves_draft_to_pending() {
        ReducerTest::new(ListingLifecycleReducer)
            .with_env(environment())
            .given_state(ListingState::new(listing_in(ListingStatus::Draft)))
            .when_action(LifecycleAction::Submit { actor: host() })
            .then_state(|state| {
                assert_eq!(state.listing.status, ListingStatus::Pending);
                assert_eq!(
                    state.outcome,
                    TransitionOutcome::Applied {
                        from: ListingStatus::Draft,
                        to: ListingStatus::Pending
                    }
                );
                assert!(state.last_error.is_none());
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn incomplete_listing_cannot_be_submitted() {
        let mut listing = listing_in(ListingStatus::Draft);
        listing.content.images.clear();

        ReducerTest::new(ListingLifecycleReducer)
            .with_env(environment())
            .given_state(ListingState::new(listing))
            .when_action(LifecycleAction::Submit { actor: host() })
            .then_state(|state| {
                assert_eq!(state.listing.status, ListingStatus::Draft);
                assert!(matches!(
                    state.last_error,
                    Some(MarketplaceError::IncompleteListing { ref missing, .. }) if missing == &vec!["images"]
                ));
            })
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[test]
    fn approving_a_draft_is_a_state_violation() {
        ReducerTest::new(ListingLifecycleReducer)
            .with_env(environment())
            .given_state(ListingState::new(listing_in(ListingStatus::Draft)))
            .when_action(LifecycleAction::Approve { actor: moderator() })
            .then_state(|state| {
                assert_eq!(state.listing.status, ListingStatus::Draft);
                assert_eq!(
                    state.last_error,
                    Some(MarketplaceError::StateViolation {
                        listing_id: ListingId::new("l-1"),
                        current: ListingStatus::Draft,
                        requested: TransitionKind::Approve,
                    })
                );
            })
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[test]
    fn revision_keeps_live_content_until_approved() {
        let mut revised = complete_content();
        revised.title = "Sunrise kayak tour".into();

        ReducerTest::new(ListingLifecycleReducer)
            .with_env(environment())
            .given_state(ListingState::new(listing_in(ListingStatus::Active)))
            .when_action(LifecycleAction::StageRevision {
                actor: host(),
                revision: Box::new(revised),
            })
            .then_state(|state| {
                assert_eq!(state.listing.status, ListingStatus::Revision);
                assert!(state.listing.is_live());
                assert_eq!(state.listing.content.title, "Sunset kayak tour");
                assert_eq!(
                    state.listing.staged_revision.as_ref().map(|c| c.title.as_str()),
                    Some("Sunrise kayak tour")
                );
            })
            .run();
    }

    #[test]
    fn approving_a_revision_swaps_content() {
        let mut revised = complete_content();
        revised.title = "Sunrise kayak tour".into();

        ReducerTest::new(ListingLifecycleReducer)
            .with_env(environment())
            .given_state(ListingState::new(listing_in(ListingStatus::Active)))
            .when_action(LifecycleAction::StageRevision {
                actor: host(),
                revision: Box::new(revised),
            })
            .when_action(LifecycleAction::Approve { actor: moderator() })
            .then_state(|state| {
                assert_eq!(state.listing.status, ListingStatus::Active);
                assert_eq!(state.listing.content.title, "Sunrise kayak tour");
                assert!(state.listing.staged_revision.is_none());
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 2))
            .run();
    }

    #[test]
    fn rejecting_a_revision_keeps_listing_active() {
        let mut revised = complete_content();
        revised.title = "Sunrise kayak tour".into();

        ReducerTest::new(ListingLifecycleReducer)
            .with_env(environment())
            .given_state(ListingState::new(listing_in(ListingStatus::Active)))
            .when_action(LifecycleAction::StageRevision {
                actor: host(),
                revision: Box::new(revised),
            })
            .when_action(LifecycleAction::Reject {
                actor: moderator(),
                reason: Some("Blurry photos".into()),
            })
            .then_state(|state| {
                assert_eq!(state.listing.status, ListingStatus::Active);
                assert_eq!(state.listing.content.title, "Sunset kayak tour");
                assert!(state.listing.staged_revision.is_none());
                assert_eq!(state.listing.rejection_reason.as_deref(), Some("Blurry photos"));
            })
            .run();
    }

    #[test]
    fn moderator_deactivating_inactive_listing_is_a_noop() {
        ReducerTest::new(ListingLifecycleReducer)
            .with_env(environment())
            .given_state(ListingState::new(listing_in(ListingStatus::Inactive)))
            .when_action(LifecycleAction::Deactivate {
                actor: moderator(),
                initiator: Initiator::Moderator,
            })
            .then_state(|state| {
                assert_eq!(state.listing.status, ListingStatus::Inactive);
                assert_eq!(state.outcome, TransitionOutcome::AlreadyInactive);
                assert!(state.last_error.is_none());
            })
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[test]
    fn reactivation_waits_for_reapproval() {
        ReducerTest::new(ListingLifecycleReducer)
            .with_env(environment())
            .given_state(ListingState::new(listing_in(ListingStatus::Inactive)))
            .when_action(LifecycleAction::Reactivate { actor: host() })
            .then_state(|state| {
                assert_eq!(state.listing.status, ListingStatus::AwaitingReapproval);
                assert!(!state.listing.is_live());
            })
            .run();
    }

    #[test]
    fn replayed_events_rebuild_state() {
        let at = test_clock().now();
        let mut state = ListingState::new(listing_in(ListingStatus::Draft));
        for event in [
            LifecycleAction::Submitted { actor: host(), at },
            LifecycleAction::Approved {
                actor: moderator(),
                at,
            },
            LifecycleAction::Deactivated {
                actor: host(),
                initiator: Initiator::Host,
                at,
            },
        ] {
            let effects = ListingLifecycleReducer.reduce(&mut state, event, &environment());
            assert!(effects.is_empty());
        }
        assert_eq!(state.listing.status, ListingStatus::Inactive);
    }

    #[test]
    fn only_listed_transitions_are_allowed() {
        use ListingStatus as S;
        use TransitionKind as T;

        let allowed = |status: S, kind: T, initiator: Initiator| -> bool {
            matches!(
                (status, kind, initiator),
                (S::Draft | S::Rejected, T::Submit, _)
                    | (S::Pending | S::AwaitingReapproval | S::Revision, T::Approve | T::Reject, _)
                    | (S::Active, T::StageRevision | T::Deactivate, _)
                    | (S::Inactive, T::Reactivate, _)
                    | (S::Inactive, T::Deactivate, Initiator::Moderator)
            )
        };

        let kinds = [
            T::Submit,
            T::Approve,
            T::Reject,
            T::StageRevision,
            T::Deactivate,
            T::Reactivate,
        ];
        for status in ListingStatus::ALL {
            for kind in kinds {
                for initiator in [Initiator::Host, Initiator::Moderator] {
                    let mut state = ListingState::new(listing_in(status));
                    let _ = ListingLifecycleReducer.reduce(
                        &mut state,
                        command(kind, initiator),
                        &environment(),
                    );

                    if allowed(status, kind, initiator) {
                        assert!(state.last_error.is_none(), "{status} {kind} should be allowed");
                    } else {
                        assert_eq!(
                            state.last_error,
                            Some(MarketplaceError::StateViolation {
                                listing_id: ListingId::new("l-1"),
                                current: status,
                                requested: kind,
                            }),
                            "{status} {kind} ({initiator:?}) should be refused"
                        );
                        assert_eq!(state.listing.status, status);
                    }
                }
            }
        }
    }
}
