//! Aggregating combinators over ordered sequences of resolutions.
//!
//! Inputs are [`Resolution`] items, so plain values, ready reasons and
//! promise-like values can be mixed freely; a plain input behaves as an
//! already-settled promise.

use std::mem;
use std::sync::{Arc, Mutex};

use crate::error::ChainError;
use crate::promise::Promise;
use crate::resolve::{resolve_into, Resolution};
use crate::scheduler::{default_scheduler, Scheduler};

struct Gather<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
    done: bool,
}

fn record<T, E>(gather: &Arc<Mutex<Gather<T>>>, aggregate: &Promise<Vec<T>, E>, index: usize, value: T)
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let mut state = gather.lock().unwrap();
    // A duplicate delivery after completion must not re-take the slots.
    if state.done {
        return;
    }
    if let Some(slot) = state.slots.get_mut(index) {
        if slot.is_none() {
            *slot = Some(value);
            state.remaining -= 1;
        }
    }
    if state.remaining > 0 {
        return;
    }
    state.done = true;
    let slots = mem::take(&mut state.slots);
    drop(state);
    if let Some(values) = slots.into_iter().collect::<Option<Vec<T>>>() {
        aggregate.settle_fulfilled(values);
    }
}

/// Aggregates every input into one promise of an ordered `Vec`.
///
/// The output fulfills once every input has fulfilled, with the results
/// positionally aligned to the inputs no matter in which order they
/// settled; it rejects with the reason of the first input to reject, and
/// later settlements of the other inputs are ignored. An empty input
/// fulfills immediately with an empty vec.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use promise_chain::{all_with, Promise, Resolution, SequentialScheduler};
///
/// let scheduler = Arc::new(SequentialScheduler::new());
/// let middle = Promise::<i32, String>::deferred_with(scheduler.clone());
/// let joined = all_with(
///     scheduler.clone(),
///     vec![
///         Resolution::Fulfilled(1),
///         middle.promise.clone().into(),
///         Resolution::Fulfilled(3),
///     ],
/// );
/// middle.resolver.fulfill(2);
/// scheduler.run_until_idle();
/// assert_eq!(joined.outcome(), Some(Ok(vec![1, 2, 3])));
/// ```
pub fn all_with<T, E, I>(scheduler: Arc<dyn Scheduler>, inputs: I) -> Promise<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + From<ChainError> + 'static,
    I: IntoIterator<Item = Resolution<T, E>>,
{
    let items: Vec<_> = inputs.into_iter().collect();
    let aggregate = Promise::pending_with(scheduler.clone());
    if items.is_empty() {
        aggregate.settle_fulfilled(Vec::new());
        return aggregate;
    }
    let gather = Arc::new(Mutex::new(Gather {
        slots: vec![None; items.len()],
        remaining: items.len(),
        done: false,
    }));
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Resolution::Fulfilled(value) => record(&gather, &aggregate, index, value),
            Resolution::Rejected(reason) => aggregate.settle_rejected(reason),
            chained @ Resolution::Chained(_) => {
                // Flatten through a leaf promise so nested thenables and
                // rejections all land through the resolution procedure.
                let leaf: Promise<T, E> = Promise::pending_with(scheduler.clone());
                resolve_into(leaf.clone(), chained);
                let gather = gather.clone();
                let fulfill_aggregate = aggregate.clone();
                let reject_aggregate = aggregate.clone();
                leaf.subscribe(
                    Box::new(move |value| record(&gather, &fulfill_aggregate, index, value)),
                    Box::new(move |reason| reject_aggregate.settle_rejected(reason)),
                );
            }
        }
    }
    aggregate
}

/// [`all_with`] on the process-wide scheduler.
pub fn all<T, E, I>(inputs: I) -> Promise<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + From<ChainError> + 'static,
    I: IntoIterator<Item = Resolution<T, E>>,
{
    all_with(default_scheduler(), inputs)
}

/// Settles identically to whichever input settles first.
///
/// Plain inputs settle the race at scan time; every later settlement is
/// ignored. An empty input leaves the output pending forever.
pub fn race_with<T, E, I>(scheduler: Arc<dyn Scheduler>, inputs: I) -> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + From<ChainError> + 'static,
    I: IntoIterator<Item = Resolution<T, E>>,
{
    let aggregate = Promise::pending_with(scheduler);
    for item in inputs {
        // First writer wins on the shared target.
        resolve_into(aggregate.clone(), item);
    }
    aggregate
}

/// [`race_with`] on the process-wide scheduler.
pub fn race<T, E, I>(inputs: I) -> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + From<ChainError> + 'static,
    I: IntoIterator<Item = Resolution<T, E>>,
{
    race_with(default_scheduler(), inputs)
}
