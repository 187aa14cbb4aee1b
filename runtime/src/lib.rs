//! # Experiences Runtime
//!
//! Executes the effect descriptions returned by reducers.
//!
//! Callers run the reducer, persist the resulting state, and only then hand
//! the effects to [`execute`]. Effects never run for a state change that did
//! not commit.
//!
//! ## Example
//!
//! ```ignore
//! let effects = reducer.reduce(&mut state, action, &env);
//! repository.compare_and_swap(expected, &state.listing).await?;
//! let feedback = experiences_runtime::execute(effects).await;
//! ```

use experiences_core::effect::Effect;
use futures::future::{BoxFuture, FutureExt, join_all};

/// Execute effects in order and collect the actions they produce
///
/// Top-level effects run one after another in the order the reducer returned
/// them. `Effect::Parallel` children run concurrently, `Effect::Sequential`
/// children run in order. Feedback actions are returned in completion order
/// of their enclosing composite.
pub async fn execute<A, I>(effects: I) -> Vec<A>
where
    A: Send + 'static,
    I: IntoIterator<Item = Effect<A>>,
{
    let mut feedback = Vec::new();
    for effect in effects {
        feedback.extend(execute_effect(effect).await);
    }
    feedback
}

/// Execute a single effect, recursing into composites
pub fn execute_effect<A>(effect: Effect<A>) -> BoxFuture<'static, Vec<A>>
where
    A: Send + 'static,
{
    async move {
        match effect {
            Effect::None => {
                tracing::trace!("Executing Effect::None (no-op)");
                metrics::counter!("runtime.effects.executed", "type" => "none").increment(1);
                Vec::new()
            },
            Effect::Future(fut) => {
                tracing::trace!("Executing Effect::Future");
                metrics::counter!("runtime.effects.executed", "type" => "future").increment(1);
                fut.await.into_iter().collect()
            },
            Effect::Parallel(effects) => {
                tracing::trace!("Executing Effect::Parallel with {} effects", effects.len());
                metrics::counter!("runtime.effects.executed", "type" => "parallel").increment(1);
                join_all(effects.into_iter().map(execute_effect))
                    .await
                    .into_iter()
                    .flatten()
                    .collect()
            },
            Effect::Sequential(effects) => {
                let effect_count = effects.len();
                tracing::trace!("Executing Effect::Sequential with {} effects", effect_count);
                metrics::counter!("runtime.effects.executed", "type" => "sequential").increment(1);
                let mut feedback = Vec::new();
                for (idx, effect) in effects.into_iter().enumerate() {
                    tracing::trace!("Executing sequential effect {} of {}", idx + 1, effect_count);
                    feedback.extend(execute_effect(effect).await);
                }
                feedback
            },
        }
    }
    .boxed()
}
