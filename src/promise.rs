//! The settlement core: per-promise state, ordered callback delivery and
//! `then` chaining.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex};

use log::trace;

use crate::error::ChainError;
use crate::resolve::{resolve_into, Resolution, Thenable};
use crate::scheduler::{default_scheduler, Scheduler};

type FulfillHook<T> = Box<dyn FnOnce(T) + Send>;
type RejectHook<E> = Box<dyn FnOnce(E) + Send>;

enum State<T, E> {
    Pending {
        on_fulfilled: Vec<FulfillHook<T>>,
        on_rejected: Vec<RejectHook<E>>,
    },
    Fulfilled(T),
    Rejected(E),
}

/// A one-shot deferred value.
///
/// A promise starts pending and settles at most once, either fulfilled with
/// a `T` or rejected with an `E`. Subscribers registered before or after
/// settlement each observe it exactly once, in registration order, and
/// never synchronously inside the call that registered or settled them:
/// every reaction goes through the promise's [`Scheduler`].
///
/// Handles are cheap clones of the same underlying state.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use promise_chain::{Promise, Resolution, SequentialScheduler};
///
/// let scheduler = Arc::new(SequentialScheduler::new());
/// let deferred = Promise::<i32, String>::deferred_with(scheduler.clone());
/// let doubled = deferred.promise.then(
///     |n| Resolution::Fulfilled(n * 2),
///     Resolution::Rejected,
/// );
/// deferred.resolver.fulfill(21);
/// scheduler.run_until_idle();
/// assert_eq!(doubled.outcome(), Some(Ok(42)));
/// ```
pub struct Promise<T, E = ChainError> {
    inner: Arc<Mutex<State<T, E>>>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.lock().unwrap() {
            State::Pending { .. } => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Rejected(_) => "rejected",
        };
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn pending_with(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State::Pending {
                on_fulfilled: Vec::new(),
                on_rejected: Vec::new(),
            })),
            scheduler,
        }
    }

    /// Constructs a promise and runs `executor` synchronously, handing it
    /// the settlement handles. An `Err` return rejects the promise unless
    /// the executor already settled it.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use promise_chain::{Promise, SequentialScheduler};
    ///
    /// let scheduler = Arc::new(SequentialScheduler::new());
    /// let promise = Promise::<&str, String>::new_with(scheduler.clone(), |resolver, _| {
    ///     resolver.fulfill("ready");
    ///     Ok(())
    /// });
    /// assert_eq!(promise.outcome(), Some(Ok("ready")));
    /// ```
    pub fn new_with<X>(scheduler: Arc<dyn Scheduler>, executor: X) -> Self
    where
        X: FnOnce(Resolver<T, E>, Rejecter<T, E>) -> Result<(), E>,
    {
        let promise = Self::pending_with(scheduler);
        let resolver = Resolver {
            promise: promise.clone(),
        };
        let rejecter = Rejecter {
            promise: promise.clone(),
        };
        if let Err(reason) = executor(resolver, rejecter) {
            promise.settle_rejected(reason);
        }
        promise
    }

    /// [`new_with`](Promise::new_with) on the process-wide scheduler.
    pub fn new<X>(executor: X) -> Self
    where
        X: FnOnce(Resolver<T, E>, Rejecter<T, E>) -> Result<(), E>,
    {
        Self::new_with(default_scheduler(), executor)
    }

    /// An already-fulfilled promise.
    pub fn resolve(value: T) -> Self {
        Self::resolve_with(default_scheduler(), value)
    }

    pub fn resolve_with(scheduler: Arc<dyn Scheduler>, value: T) -> Self {
        let promise = Self::pending_with(scheduler);
        promise.settle_fulfilled(value);
        promise
    }

    /// An already-rejected promise.
    pub fn reject(reason: E) -> Self {
        Self::reject_with(default_scheduler(), reason)
    }

    pub fn reject_with(scheduler: Arc<dyn Scheduler>, reason: E) -> Self {
        let promise = Self::pending_with(scheduler);
        promise.settle_rejected(reason);
        promise
    }

    /// A pending promise bundled with its settlement handles, for producers
    /// that settle from outside an executor (bridging callback APIs, test
    /// harnesses).
    pub fn deferred() -> Deferred<T, E> {
        Self::deferred_with(default_scheduler())
    }

    pub fn deferred_with(scheduler: Arc<dyn Scheduler>) -> Deferred<T, E> {
        let promise = Self::pending_with(scheduler);
        Deferred {
            resolver: Resolver {
                promise: promise.clone(),
            },
            rejecter: Rejecter {
                promise: promise.clone(),
            },
            promise,
        }
    }

    /// Non-blocking peek at the terminal state; `None` while pending.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        match &*self.inner.lock().unwrap() {
            State::Pending { .. } => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    pub(crate) fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.scheduler.clone()
    }

    /// Registers both hooks. If the promise is already settled the matching
    /// hook is scheduled immediately; it still never runs inside this call.
    ///
    /// Hooks are handed to the scheduler while the state lock is held, here
    /// and in the settle methods: a subscriber racing with a settlement on
    /// another thread must not enqueue ahead of hooks registered earlier.
    /// Schedulers only enqueue, so nothing runs under the lock.
    pub(crate) fn subscribe(&self, on_fulfilled: FulfillHook<T>, on_rejected: RejectHook<E>) {
        let mut state = self.inner.lock().unwrap();
        match &mut *state {
            State::Pending {
                on_fulfilled: fulfill_hooks,
                on_rejected: reject_hooks,
            } => {
                fulfill_hooks.push(on_fulfilled);
                reject_hooks.push(on_rejected);
            }
            State::Fulfilled(value) => {
                let value = value.clone();
                self.scheduler.schedule(Box::new(move || on_fulfilled(value)));
            }
            State::Rejected(reason) => {
                let reason = reason.clone();
                self.scheduler.schedule(Box::new(move || on_rejected(reason)));
            }
        }
    }

    /// Transitions to `Fulfilled` and drains the pending fulfillment hooks
    /// in registration order, each individually scheduled. A no-op if the
    /// promise already settled.
    pub(crate) fn settle_fulfilled(&self, value: T) {
        let mut state = self.inner.lock().unwrap();
        let previous = mem::replace(&mut *state, State::Fulfilled(value.clone()));
        match previous {
            State::Pending { on_fulfilled, .. } => {
                trace!(
                    "promise {:#x} fulfilled, scheduling {} hooks",
                    Arc::as_ptr(&self.inner) as usize,
                    on_fulfilled.len()
                );
                // Drained under the state lock; see `subscribe` on ordering.
                for hook in on_fulfilled {
                    let value = value.clone();
                    self.scheduler.schedule(Box::new(move || hook(value)));
                }
            }
            // First writer wins.
            settled => *state = settled,
        }
    }

    /// Counterpart of [`settle_fulfilled`](Promise::settle_fulfilled) for
    /// the rejection branch.
    pub(crate) fn settle_rejected(&self, reason: E) {
        let mut state = self.inner.lock().unwrap();
        let previous = mem::replace(&mut *state, State::Rejected(reason.clone()));
        match previous {
            State::Pending { on_rejected, .. } => {
                trace!(
                    "promise {:#x} rejected, scheduling {} hooks",
                    Arc::as_ptr(&self.inner) as usize,
                    on_rejected.len()
                );
                // Drained under the state lock; see `subscribe` on ordering.
                for hook in on_rejected {
                    let reason = reason.clone();
                    self.scheduler.schedule(Box::new(move || hook(reason)));
                }
            }
            settled => *state = settled,
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + From<ChainError> + 'static,
{
    /// Chains a computation on this promise's settlement.
    ///
    /// Builds a new promise, registers both reactions against this one and
    /// feeds whatever the reaction produces through the resolution
    /// procedure into the new promise, which is returned immediately while
    /// still pending. Reactions run strictly after the call that triggers
    /// them, never inside it.
    ///
    /// Branch pass-through is spelled with the [`Resolution`] variant
    /// constructors: `Resolution::Fulfilled` forwards a value unchanged and
    /// `Resolution::Rejected` re-raises a reason unchanged.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Resolution<U, E> + Send + 'static,
        R: FnOnce(E) -> Resolution<U, E> + Send + 'static,
    {
        let next = Promise::pending_with(self.scheduler.clone());
        let fulfill_target = next.clone();
        let reject_target = next.clone();
        self.subscribe(
            Box::new(move |value| resolve_into(fulfill_target, on_fulfilled(value))),
            Box::new(move |reason| resolve_into(reject_target, on_rejected(reason))),
        );
        next
    }

    /// `then` with the fulfillment branch passing through unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Resolution<T, E> + Send + 'static,
    {
        self.then(Resolution::Fulfilled, on_rejected)
    }

    /// Runs `on_settled` exactly once on either branch, without handing it
    /// the value or reason, then re-emits the original outcome. The side
    /// effect's own resolution is chained through before the original
    /// outcome is re-emitted, so a rejection it produces wins; its
    /// fulfillment value is discarded.
    pub fn finally<F>(&self, on_settled: F) -> Promise<T, E>
    where
        F: FnOnce() -> Resolution<(), E> + Send + 'static,
    {
        // One FnOnce shared by two branches, of which exactly one runs.
        let hook = Arc::new(Mutex::new(Some(on_settled)));
        let reject_hook = hook.clone();
        let fulfill_scheduler = self.scheduler.clone();
        let reject_scheduler = self.scheduler.clone();
        self.then(
            move |value: T| {
                let side = run_settled_hook(hook, fulfill_scheduler);
                Resolution::Chained(Box::new(side.then(
                    move |()| Resolution::Fulfilled(value),
                    Resolution::Rejected,
                )))
            },
            move |reason: E| {
                let side = run_settled_hook(reject_hook, reject_scheduler);
                Resolution::Chained(Box::new(side.then(
                    move |()| Resolution::Rejected(reason),
                    Resolution::Rejected,
                )))
            },
        )
    }
}

fn run_settled_hook<E, F>(hook: Arc<Mutex<Option<F>>>, scheduler: Arc<dyn Scheduler>) -> Promise<(), E>
where
    E: Clone + Send + From<ChainError> + 'static,
    F: FnOnce() -> Resolution<(), E> + Send + 'static,
{
    let side = Promise::pending_with(scheduler);
    let resolution = match hook.lock().unwrap().take() {
        Some(run) => run(),
        None => Resolution::Fulfilled(()),
    };
    resolve_into(side.clone(), resolution);
    side
}

impl<T, E> Thenable<T, E> for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn subscribe(
        self: Box<Self>,
        on_fulfilled: Box<dyn FnOnce(Resolution<T, E>) + Send>,
        on_rejected: Box<dyn FnOnce(E) + Send>,
    ) {
        // Our own settlement is already flattened, so the plain value is
        // handed over as a terminal resolution.
        Promise::subscribe(
            &self,
            Box::new(move |value| on_fulfilled(Resolution::Fulfilled(value))),
            on_rejected,
        );
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

/// Settlement handle that routes through the resolution procedure.
///
/// Cloneable; every call after the promise first settles is a no-op.
pub struct Resolver<T, E> {
    promise: Promise<T, E>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Resolves with an arbitrary production; a `Chained` resolution makes
    /// the promise adopt the inner thenable's eventual settlement.
    pub fn resolve(&self, resolution: Resolution<T, E>)
    where
        E: From<ChainError>,
    {
        resolve_into(self.promise.clone(), resolution);
    }

    /// Shortcut for resolving with a plain value.
    pub fn fulfill(&self, value: T) {
        self.promise.settle_fulfilled(value);
    }
}

/// Settlement handle for the rejection branch.
pub struct Rejecter<T, E> {
    promise: Promise<T, E>,
}

impl<T, E> Clone for Rejecter<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> Rejecter<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn reject(&self, reason: E) {
        self.promise.settle_rejected(reason);
    }
}

/// A promise grouped with its settlement handles.
pub struct Deferred<T, E = ChainError> {
    pub promise: Promise<T, E>,
    pub resolver: Resolver<T, E>,
    pub rejecter: Rejecter<T, E>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SequentialScheduler;

    fn scheduler() -> Arc<SequentialScheduler> {
        Arc::new(SequentialScheduler::new())
    }

    #[test]
    fn first_settlement_wins() {
        let scheduler = scheduler();
        let deferred = Promise::<i32, String>::deferred_with(scheduler.clone());
        deferred.resolver.fulfill(1);
        deferred.resolver.fulfill(2);
        deferred.rejecter.reject("late".into());
        scheduler.run_until_idle();
        assert_eq!(deferred.promise.outcome(), Some(Ok(1)));
    }

    #[test]
    fn rejection_then_fulfillment_keeps_rejection() {
        let scheduler = scheduler();
        let deferred = Promise::<i32, String>::deferred_with(scheduler.clone());
        deferred.rejecter.reject("boom".into());
        deferred.resolver.fulfill(7);
        scheduler.run_until_idle();
        assert_eq!(deferred.promise.outcome(), Some(Err("boom".into())));
    }

    #[test]
    fn subscribe_after_settlement_still_defers() {
        let scheduler = scheduler();
        let promise = Promise::<i32, String>::resolve_with(scheduler.clone(), 9);
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        promise.subscribe(
            Box::new(move |value| *sink.lock().unwrap() = Some(value)),
            Box::new(|_| {}),
        );
        assert_eq!(*seen.lock().unwrap(), None);
        scheduler.run_until_idle();
        assert_eq!(*seen.lock().unwrap(), Some(9));
    }

    #[test]
    fn debug_shows_state_tag() {
        let scheduler = scheduler();
        let deferred = Promise::<i32, String>::deferred_with(scheduler.clone());
        assert!(format!("{:?}", deferred.promise).contains("pending"));
        deferred.resolver.fulfill(0);
        assert!(format!("{:?}", deferred.promise).contains("fulfilled"));
    }
}
