//! Completion barrier for producer fan-in
//!
//! The shared channel must be closed exactly once, and only after every
//! producer has signaled completion. Closure is an explicit action gated on
//! this countdown reaching zero, never a side effect of the last writer
//! happening to exit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Countdown barrier over a known set of writers.
pub struct CompletionBarrier {
    remaining: AtomicUsize,
    notify: Notify,
}

impl CompletionBarrier {
    pub fn new(writers: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(writers),
            notify: Notify::new(),
        })
    }

    /// Signal one writer done. Must be called exactly once per writer.
    pub fn done(&self) {
        let prev = self.remaining.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "done signaled more times than writers");
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Wait until every writer has signaled completion.
    pub async fn wait(&self) {
        loop {
            if self.remaining() == 0 {
                return;
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // register before re-checking so a done() between the check and
            // the await cannot be missed
            notified.as_mut().enable();
            if self.remaining() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Signals completion on drop, so a producer counts down even when it
/// panics or gets aborted.
pub struct CompletionGuard(Arc<CompletionBarrier>);

impl CompletionGuard {
    pub fn new(barrier: Arc<CompletionBarrier>) -> Self {
        Self(barrier)
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn wait_returns_once_all_writers_signal() {
        let barrier = CompletionBarrier::new(3);
        barrier.done();
        barrier.done();
        barrier.done();

        timeout(Duration::from_secs(1), barrier.wait())
            .await
            .expect("barrier should be open");
    }

    #[tokio::test]
    async fn wait_blocks_while_writers_are_outstanding() {
        let barrier = CompletionBarrier::new(2);
        barrier.done();

        let blocked = timeout(Duration::from_millis(50), barrier.wait()).await;
        assert!(blocked.is_err(), "barrier opened with a writer outstanding");
        assert_eq!(barrier.remaining(), 1);
    }

    #[tokio::test]
    async fn wait_is_immediate_with_zero_writers() {
        let barrier = CompletionBarrier::new(0);
        timeout(Duration::from_millis(50), barrier.wait())
            .await
            .expect("empty barrier should be open");
    }

    #[tokio::test]
    async fn late_signal_wakes_a_parked_waiter() {
        let barrier = CompletionBarrier::new(1);
        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move { barrier.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        barrier.done();

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn guard_signals_on_drop() {
        let barrier = CompletionBarrier::new(1);
        let guard = CompletionGuard::new(barrier.clone());
        assert_eq!(barrier.remaining(), 1);
        drop(guard);
        assert_eq!(barrier.remaining(), 0);
    }
}
