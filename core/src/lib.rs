//! # Experiences Core
//!
//! Reducer, effect and clock abstractions shared by the marketplace crates.
//!
//! Business rules (listing lifecycle transitions, validation) live in pure
//! reducers. Reducers never touch storage or the network: they mutate the
//! state they are handed and return *descriptions* of follow-up work. The
//! runtime crate executes those descriptions after the caller has committed
//! the new state.
//!
//! ## Vocabulary
//!
//! - **State**: The aggregate a reducer works on (a listing and its last error)
//! - **Action**: Commands and the events they produce
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Work to run once the new state is stored
//! - **Environment**: Injected dependencies such as the [`environment::Clock`]
//!
//! ## Shape of a reducer
//!
//! ```ignore
//! impl Reducer for ListingLifecycleReducer {
//!     type State = ListingState;
//!     type Action = LifecycleAction;
//!     type Environment = LifecycleEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut ListingState,
//!         action: LifecycleAction,
//!         env: &LifecycleEnvironment,
//!     ) -> SmallVec<[Effect<LifecycleAction>; 4]> {
//!         // Validate, apply the resulting event, describe the audit publish
//!         SmallVec::new()
//!     }
//! }
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Pure business rules
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Applies commands and events to an aggregate
    ///
    /// `State` is the aggregate, `Action` covers both the commands a caller
    /// sends and the events they produce, `Environment` carries the clock and
    /// sinks the reducer may describe work against.
    pub trait Reducer {
        /// Aggregate being mutated
        type State;

        /// Commands and events
        type Action;

        /// Injected collaborators
        type Environment;

        /// Mutate `state` for `action` and describe the follow-up work
        ///
        /// Implementations must not perform I/O. Anything that has to reach
        /// the outside world is returned as an [`Effect`] and executed later.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Deferred work returned by reducers
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Description of work a reducer wants done
    ///
    /// A reducer only builds these. The runtime runs them after the state
    /// they were derived from has been committed, so an audit event is never
    /// published for a transition that lost its compare-and-swap.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Run effects concurrently
        Parallel(Vec<Effect<Action>>),

        /// Run effects one after another
        Sequential(Vec<Effect<Action>>),

        /// Async work, optionally yielding an action for the caller
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => f.write_str("Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Future(_) => f.write_str("Effect::Future(..)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Run `effects` concurrently
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Run `effects` in order
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Wrap an async computation that produces no feedback action
        pub fn fire_and_forget<F>(future: F) -> Effect<Action>
        where
            F: Future<Output = ()> + Send + 'static,
        {
            Effect::Future(Box::pin(async move {
                future.await;
                None
            }))
        }

        /// Whether this effect does nothing when executed
        #[must_use]
        pub fn is_noop(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().all(Effect::is_noop)
                },
                Effect::Future(_) => false,
            }
        }
    }
}

/// Collaborators injected into reducers and services
pub mod environment {
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    /// Source of the current instant
    ///
    /// Lead-time filtering, ledger bucketing and audit timestamps all read the
    /// current instant through this trait, never from the system directly.
    pub trait Clock: Send + Sync {
        /// Current instant in UTC
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    impl<C: Clock + ?Sized> Clock for Arc<C> {
        fn now(&self) -> DateTime<Utc> {
            (**self).now()
        }
    }
}
