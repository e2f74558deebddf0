//! The resolution procedure: how a produced value settles a target promise.
//!
//! A reaction (or an external resolver) does not settle its promise
//! directly; whatever it produces goes through [`resolve_into`], which
//! unwraps promise-like values recursively so that chains compose
//! transparently. A promise that fulfills with another promise is never
//! observed: subscribers always receive the plain value at the bottom of
//! the chain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ChainError;
use crate::promise::Promise;

/// What a producer or a `then` reaction may produce for a target promise.
pub enum Resolution<T, E> {
    /// A plain value; the target fulfills with it as-is.
    Fulfilled(T),
    /// A rejection reason; the target rejects with it. This is the analog
    /// of a thrown error in a reaction.
    Rejected(E),
    /// A promise-like value; the target adopts its eventual settlement.
    Chained(Box<dyn Thenable<T, E>>),
}

/// The structural interop capability: anything with a `then`-shaped
/// subscription can participate in a chain, not only [`Promise`].
///
/// `subscribe` consumes the thenable and must eventually invoke at most one
/// of the two callbacks. A misbehaving implementation that invokes both is
/// tolerated: the caller guards them with a single-use latch.
pub trait Thenable<T, E>: Send {
    fn subscribe(
        self: Box<Self>,
        on_fulfilled: Box<dyn FnOnce(Resolution<T, E>) + Send>,
        on_rejected: Box<dyn FnOnce(E) + Send>,
    );

    /// Identity used for cycle detection. Foreign thenables may keep the
    /// default; [`Promise`] reports its shared-state address.
    fn identity(&self) -> usize {
        0
    }
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Chained(Box::new(promise))
    }
}

/// Settles `target` according to `produced`.
///
/// Plain values and reasons settle it directly. A promise-like value is
/// subscribed to instead, and its own output is fed back through this
/// procedure, flattening nested chains one hop at a time. Resolving a
/// promise with itself rejects it with [`ChainError::CyclicChain`].
pub(crate) fn resolve_into<T, E>(target: Promise<T, E>, produced: Resolution<T, E>)
where
    T: Clone + Send + 'static,
    E: Clone + Send + From<ChainError> + 'static,
{
    match produced {
        Resolution::Fulfilled(value) => target.settle_fulfilled(value),
        Resolution::Rejected(reason) => target.settle_rejected(reason),
        Resolution::Chained(inner) => {
            if inner.identity() == target.identity() {
                target.settle_rejected(E::from(ChainError::CyclicChain));
                return;
            }
            // One latch per adoption: whichever inner callback fires first
            // acts, anything after is ignored.
            let latch = Arc::new(AtomicBool::new(false));
            let adopt = {
                let target = target.clone();
                let latch = latch.clone();
                Box::new(move |next: Resolution<T, E>| {
                    if latch.swap(true, Ordering::SeqCst) {
                        return;
                    }
                    resolve_into(target, next);
                })
            };
            let abort = Box::new(move |reason: E| {
                if latch.swap(true, Ordering::SeqCst) {
                    return;
                }
                target.settle_rejected(reason);
            });
            inner.subscribe(adopt, abort);
        }
    }
}
