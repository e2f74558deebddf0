//! One-shot chainable promises.
//!
//! A [`Promise`] is a deferred value that settles exactly once, fulfilled
//! with a value or rejected with a reason. Consumers chain computations on
//! the eventual result with [`then`](Promise::then) /
//! [`catch`](Promise::catch) / [`finally`](Promise::finally); producers
//! settle from an executor closure or through a [`Deferred`] handle. The
//! [`all`] and [`race`] combinators aggregate several inputs into one
//! promise.
//!
//! Reactions never run inside the call that registered or settled them;
//! they are queued on a pluggable FIFO [`Scheduler`]. The default is a
//! process-wide worker thread, and [`SequentialScheduler`] drives
//! everything deterministically for tests and single-threaded embeddings.
//!
//! A chained reaction may produce a plain value, a reason, or anything
//! implementing the [`Thenable`] capability (our own [`Promise`]
//! included); promise-like productions are adopted recursively, so nested
//! chains flatten down to a plain value and resolving a promise with
//! itself rejects it with [`ChainError::CyclicChain`].
//!
//! ```
//! use std::sync::Arc;
//! use promise_chain::{Promise, Resolution, SequentialScheduler};
//!
//! let scheduler = Arc::new(SequentialScheduler::new());
//! let deferred = Promise::<i32, String>::deferred_with(scheduler.clone());
//! let shown = deferred
//!     .promise
//!     .then(|n| Resolution::Fulfilled(n + 1), Resolution::Rejected)
//!     .then(
//!         |n| Resolution::Fulfilled(format!("got {n}")),
//!         Resolution::Rejected,
//!     );
//! deferred.resolver.fulfill(41);
//! scheduler.run_until_idle();
//! assert_eq!(shown.outcome(), Some(Ok("got 42".to_string())));
//! ```

mod combine;
mod error;
mod promise;
mod resolve;
mod scheduler;
mod waiter;

pub use combine::{all, all_with, race, race_with};
pub use error::ChainError;
pub use promise::{Deferred, Promise, Rejecter, Resolver};
pub use resolve::{Resolution, Thenable};
pub use scheduler::{default_scheduler, Scheduler, SequentialScheduler, Task, ThreadScheduler};
pub use waiter::Waiter;
