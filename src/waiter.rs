//! Bridge from a promise to `std::future::Future`, so a settlement can be
//! awaited from any async executor.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::promise::Promise;

struct WaitState<T, E> {
    outcome: Option<Result<T, E>>,
    // Keep every waker we have seen; waking only the latest one loses
    // clones of the same waiter polled from different tasks.
    wakers: Vec<Waker>,
}

/// A pollable view of one promise's settlement.
///
/// # Examples
///
/// ```
/// use promise_chain::Promise;
/// use futures::executor::block_on;
/// use std::thread;
///
/// let deferred = Promise::<String, String>::deferred();
/// let waiter = deferred.promise.waiter();
/// let producer = thread::spawn(move || deferred.resolver.fulfill("done".into()));
/// assert_eq!(block_on(waiter), Ok("done".to_string()));
/// producer.join().expect("The producer thread has panicked");
/// ```
pub struct Waiter<T, E> {
    shared: Arc<Mutex<WaitState<T, E>>>,
}

impl<T, E> Clone for Waiter<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a [`Waiter`] subscribed to this promise.
    pub fn waiter(&self) -> Waiter<T, E> {
        let shared = Arc::new(Mutex::new(WaitState {
            outcome: None,
            wakers: Vec::new(),
        }));
        let on_fulfill = shared.clone();
        let on_reject = shared.clone();
        self.subscribe(
            Box::new(move |value| settle_wait(&on_fulfill, Ok(value))),
            Box::new(move |reason| settle_wait(&on_reject, Err(reason))),
        );
        Waiter { shared }
    }
}

fn settle_wait<T, E>(shared: &Arc<Mutex<WaitState<T, E>>>, outcome: Result<T, E>) {
    let mut state = shared.lock().unwrap();
    state.outcome = Some(outcome);
    let wakers = std::mem::take(&mut state.wakers);
    drop(state);
    for waker in wakers {
        waker.wake();
    }
}

impl<T, E> Future for Waiter<T, E>
where
    T: Clone,
    E: Clone,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.lock().unwrap();
        match &state.outcome {
            Some(outcome) => Poll::Ready(outcome.clone()),
            None => {
                // A hot-polling executor re-polls with the same waker; do
                // not stack another clone of it.
                if !state.wakers.iter().any(|known| known.will_wake(cx.waker())) {
                    state.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SequentialScheduler;
    use futures::task::{waker, ArcWake};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct WakeCounter(AtomicUsize);

    impl ArcWake for WakeCounter {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn repeated_polls_store_one_waker() {
        let scheduler = Arc::new(SequentialScheduler::new());
        let deferred = Promise::<i32, String>::deferred_with(scheduler.clone());
        let mut waiter = deferred.promise.waiter();
        let counter = Arc::new(WakeCounter(AtomicUsize::new(0)));
        let wake = waker(counter.clone());
        let mut cx = Context::from_waker(&wake);
        for _ in 0..5 {
            assert!(Pin::new(&mut waiter).poll(&mut cx).is_pending());
        }
        assert_eq!(waiter.shared.lock().unwrap().wakers.len(), 1);
        deferred.resolver.fulfill(3);
        scheduler.run_until_idle();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(Pin::new(&mut waiter).poll(&mut cx), Poll::Ready(Ok(3)));
    }
}
