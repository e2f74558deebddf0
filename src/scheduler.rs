//! Deferred execution for promise reactions.
//!
//! The settlement core never runs a subscriber inside the call that settles
//! a promise (or inside `then` itself). Instead it hands a task to a
//! [`Scheduler`], which must run queued tasks in FIFO order strictly after
//! the scheduling call has returned.

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use log::trace;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// FIFO deferred-execution collaborator.
///
/// Implementations must run tasks in the order they were scheduled and must
/// never run a task from inside `schedule` itself.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Task);
}

/// A scheduler backed by a dedicated worker thread fed through an mpsc
/// channel. The worker exits once every handle to the scheduler is gone,
/// because the channel disconnects.
pub struct ThreadScheduler {
    sender: Mutex<Sender<Task>>,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        let (tx, rx) = channel::<Task>();
        thread::spawn(move || {
            for task in rx {
                task();
            }
            trace!("scheduler worker exiting, all handles dropped");
        });
        Self {
            sender: Mutex::new(tx),
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, task: Task) {
        // A send error means the worker died mid-run; the task is dropped
        // along with everything else queued behind it.
        let _ = self.sender.lock().unwrap().send(task);
    }
}

/// A scheduler that queues tasks until it is driven by hand.
///
/// Nothing runs until [`run_until_idle`](SequentialScheduler::run_until_idle)
/// is called, which makes settlement fully deterministic. This is the driver
/// the crate's own tests use, and it suits single-threaded embeddings that
/// want to pump promise reactions from their own loop.
#[derive(Default)]
pub struct SequentialScheduler {
    queue: Mutex<VecDeque<Task>>,
}

impl SequentialScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks currently queued.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Runs queued tasks in FIFO order, including tasks they schedule in
    /// turn, until the queue is empty. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.queue.lock().unwrap().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        trace!("sequential scheduler drained, ran={ran}");
        ran
    }
}

impl Scheduler for SequentialScheduler {
    fn schedule(&self, task: Task) {
        self.queue.lock().unwrap().push_back(task);
    }
}

/// The process-wide scheduler used by constructors that do not take an
/// explicit one. Started lazily on first use.
pub fn default_scheduler() -> Arc<dyn Scheduler> {
    static DEFAULT: OnceLock<Arc<ThreadScheduler>> = OnceLock::new();
    DEFAULT.get_or_init(|| Arc::new(ThreadScheduler::new())).clone()
}
