use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

pub type CompletionJob = Box<dyn FnOnce() + Send>;

/// Decides which thread a completion handler runs on.
///
/// The pump finishes on one of its own workers; the executor moves the
/// user's handler to wherever the caller wants to observe it.
pub trait CompletionExecutor: Send + Sync {
    fn execute(&self, job: CompletionJob);
}

/// Runs the job right away on the thread that finished the work.
pub struct InlineExecutor;

impl CompletionExecutor for InlineExecutor {
    fn execute(&self, job: CompletionJob) {
        job();
    }
}

/// Runs every job on a fresh thread.
pub struct ThreadExecutor;

impl CompletionExecutor for ThreadExecutor {
    fn execute(&self, job: CompletionJob) {
        let spawned = std::thread::Builder::new()
            .name("downsample-completion".to_string())
            .spawn(job);
        if let Err(e) = spawned {
            log::error!("Could not spawn completion thread: {e}");
        }
    }
}

/// Queues jobs for a thread that owns the matching [`CompletionQueue`].
#[derive(Clone)]
pub struct ChannelExecutor {
    tx: Sender<CompletionJob>,
}

impl ChannelExecutor {
    pub fn new() -> (Self, CompletionQueue) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, CompletionQueue { rx })
    }
}

impl CompletionExecutor for ChannelExecutor {
    fn execute(&self, job: CompletionJob) {
        if self.tx.send(job).is_err() {
            log::warn!("Completion queue is gone, dropping completion");
        }
    }
}

/// Receiving end of a [`ChannelExecutor`], drained by its owner.
pub struct CompletionQueue {
    rx: Receiver<CompletionJob>,
}

impl CompletionQueue {
    /// Blocks for the next job and runs it. Returns `false` once every
    /// executor has been dropped and the queue is empty.
    pub fn run_next(&self) -> bool {
        match self.rx.recv() {
            Ok(job) => {
                job();
                true
            }
            Err(_) => false,
        }
    }

    /// Like [`run_next`](Self::run_next) but gives up after `timeout`.
    pub fn run_next_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Runs whatever is queued without blocking and returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}

/// A handler that can be fired at most once, through an executor.
pub struct CompletionOnce<T> {
    handler: Mutex<Option<Box<dyn FnOnce(T) + Send>>>,
    executor: Arc<dyn CompletionExecutor>,
}

impl<T: Send + 'static> CompletionOnce<T> {
    pub fn new(executor: Arc<dyn CompletionExecutor>, handler: Box<dyn FnOnce(T) + Send>) -> Self {
        Self {
            handler: Mutex::new(Some(handler)),
            executor,
        }
    }

    /// Dispatches `value` to the handler. Returns `false` if it already fired.
    pub fn fire(&self, value: T) -> bool {
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match handler {
            Some(handler) => {
                self.executor.execute(Box::new(move || handler(value)));
                true
            }
            None => {
                log::warn!("Completion fired twice; ignoring the second result");
                false
            }
        }
    }

    #[cfg(test)]
    fn has_fired(&self) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> CompletionJob) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let make = move || -> CompletionJob {
            let c = c.clone();
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, make)
    }

    #[test]
    fn test_inline_runs_immediately() {
        let (count, job) = counter();
        InlineExecutor.execute(job());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thread_executor_runs_off_thread() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let caller = std::thread::current().id();
        ThreadExecutor.execute(Box::new(move || {
            tx.send(std::thread::current().id()).unwrap();
        }));
        let ran_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(ran_on, caller);
    }

    #[test]
    fn test_channel_executor_defers_until_drained() {
        let (count, job) = counter();
        let (executor, queue) = ChannelExecutor::new();
        executor.execute(job());
        executor.execute(job());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert_eq!(queue.run_pending(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(queue.run_pending(), 0);
    }

    #[test]
    fn test_run_next_stops_when_executors_dropped() {
        let (executor, queue) = ChannelExecutor::new();
        drop(executor);
        assert!(!queue.run_next());
    }

    #[test]
    fn test_run_next_timeout_on_empty_queue() {
        let (_executor, queue) = ChannelExecutor::new();
        assert!(!queue.run_next_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_completion_once_fires_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let c = calls.clone();
        let once = CompletionOnce::new(
            Arc::new(InlineExecutor),
            Box::new(move |v: u32| c.lock().unwrap().push(v)),
        );
        assert!(!once.has_fired());
        assert!(once.fire(1));
        assert!(!once.fire(2));
        assert!(once.has_fired());
        assert_eq!(*calls.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_completion_once_goes_through_executor() {
        let (executor, queue) = ChannelExecutor::new();
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        let once = CompletionOnce::new(
            Arc::new(executor),
            Box::new(move |v: &'static str| *s.lock().unwrap() = Some(v)),
        );
        once.fire("done");
        assert!(seen.lock().unwrap().is_none());
        assert!(queue.run_next());
        assert_eq!(*seen.lock().unwrap(), Some("done"));
    }
}
