//! Execution contexts for user-visible callbacks.
//!
//! The engine never calls a consumer callback directly from a worker task.
//! It hands the callback to a [`CallbackContext`], which decides where the
//! callback runs.

use tokio::sync::mpsc;
use tracing::trace;

/// A callback queued on a context.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Where consumer callbacks run.
pub trait CallbackContext: Send + Sync {
    /// Schedules `job`. Returns false if the context no longer accepts work.
    fn dispatch(&self, job: Callback) -> bool;
}

/// Runs callbacks inline on the dispatching task.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl CallbackContext for Immediate {
    fn dispatch(&self, job: Callback) -> bool {
        job();
        true
    }
}

/// Sending half of a consumer-drained callback queue.
///
/// Created with [`main_queue`]. Callbacks queued here run only when the owner
/// of the matching [`MainQueueReceiver`] drains it, typically on its own
/// thread.
#[derive(Debug, Clone)]
pub struct MainQueue {
    tx: mpsc::UnboundedSender<Callback>,
}

impl CallbackContext for MainQueue {
    fn dispatch(&self, job: Callback) -> bool {
        self.tx.send(job).is_ok()
    }
}

/// Receiving half of a consumer-drained callback queue.
#[derive(Debug)]
pub struct MainQueueReceiver {
    rx: mpsc::UnboundedReceiver<Callback>,
}

impl MainQueueReceiver {
    /// Runs every callback queued so far without waiting.
    ///
    /// Returns the number of callbacks run.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        if ran > 0 {
            trace!(ran, "drained main queue");
        }
        ran
    }

    /// Waits for the next callback and runs it.
    ///
    /// Returns false once every sender is gone and the queue is empty.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Runs callbacks until every sender is gone.
    pub async fn run_until_closed(&mut self) -> usize {
        let mut ran = 0;
        while self.run_next().await {
            ran += 1;
        }
        ran
    }
}

/// Creates a consumer-drained callback queue.
pub fn main_queue() -> (MainQueue, MainQueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MainQueue { tx }, MainQueueReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn immediate_runs_inline() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        assert!(Immediate.dispatch(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        })));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn main_queue_defers_until_drained() {
        let (queue, mut receiver) = main_queue();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let h = hits.clone();
            assert!(queue.dispatch(Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            })));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert_eq!(receiver.run_pending(), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(receiver.run_pending(), 0);
    }

    #[test]
    fn closed_queue_rejects_work() {
        let (queue, receiver) = main_queue();
        drop(receiver);
        assert!(!queue.dispatch(Box::new(|| {})));
    }

    #[tokio::test]
    async fn run_until_closed_stops_when_senders_drop() {
        let (queue, mut receiver) = main_queue();
        queue.dispatch(Box::new(|| {}));
        queue.dispatch(Box::new(|| {}));
        drop(queue);
        assert_eq!(receiver.run_until_closed().await, 2);
    }
}
