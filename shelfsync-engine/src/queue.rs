use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::warn;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("work queue is closed")]
    Closed,
    #[error("work queue is already executing")]
    AlreadyExecuting,
    #[error("concurrency limiter is closed")]
    ConcurrencyClosed,
    #[error("work unit was dropped before completion")]
    Canceled,
}

type WorkUnit = BoxFuture<'static, ()>;

/// Resolves with a work unit's value once the queue has run it.
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Completion<T> {
    pub async fn wait(self) -> Result<T, QueueError> {
        self.rx.await.map_err(|_| QueueError::Canceled)
    }
}

/// Bounded-concurrency runner for zero-argument asynchronous units of work.
///
/// Deliberately dumb: no ordering, no retry, no error channel. Units report
/// back through their [`Completion`], and one failing or panicking unit
/// never halts the rest. Work may keep arriving while `execute` is driving
/// the queue; `execute` returns once the queue has been closed and every
/// accepted unit has finished.
pub struct WorkQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<WorkUnit>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<WorkUnit>>>,
    concurrency: usize,
}

impl WorkQueue {
    pub fn new(concurrency: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            concurrency: concurrency.max(1),
        }
    }

    pub async fn enqueue<F, T>(&self, work: F) -> Result<Completion<T>, QueueError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let unit = async move {
            let value = work.await;
            let _ = done_tx.send(value);
        }
        .boxed();

        let guard = self.tx.lock().await;
        let tx = guard.as_ref().ok_or(QueueError::Closed)?;
        tx.send(unit).map_err(|_| QueueError::Closed)?;
        Ok(Completion { rx: done_rx })
    }

    /// Stop accepting work. Once the queue is closed and drained, `execute`
    /// returns.
    pub async fn close(&self) {
        self.tx.lock().await.take();
    }

    /// Run every accepted unit, at most `concurrency` at a time. Returns the
    /// number of units executed.
    pub async fn execute(&self) -> Result<usize, QueueError> {
        let mut rx = self
            .rx
            .lock()
            .await
            .take()
            .ok_or(QueueError::AlreadyExecuting)?;

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut executed = 0usize;

        while let Some(unit) = rx.recv().await {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| QueueError::ConcurrencyClosed)?;
            executed += 1;
            tasks.spawn(async move {
                unit.await;
                drop(permit);
            });
        }

        while let Some(result) = tasks.join_next().await {
            if result.is_err() {
                warn!("work unit panicked; remaining units continue");
            }
        }

        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn executes_all_units_and_reports_count() {
        let queue = WorkQueue::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            queue
                .enqueue(async move {
                    counter.fetch_add(1, Ordering::AcqRel);
                })
                .await
                .unwrap();
        }
        queue.close().await;

        assert_eq!(queue.execute().await.unwrap(), 10);
        assert_eq!(counter.load(Ordering::Acquire), 10);
    }

    #[tokio::test]
    async fn completion_returns_the_unit_value() {
        let queue = WorkQueue::new(1);
        let completion = queue.enqueue(async { 41 + 1 }).await.unwrap();
        queue.close().await;
        queue.execute().await.unwrap();
        assert_eq!(completion.wait().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn respects_the_concurrency_bound() {
        let queue = WorkQueue::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let active = active.clone();
            let peak = peak.clone();
            queue
                .enqueue(async move {
                    let now = active.fetch_add(1, Ordering::AcqRel) + 1;
                    peak.fetch_max(now, Ordering::AcqRel);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::AcqRel);
                })
                .await
                .unwrap();
        }
        queue.close().await;
        queue.execute().await.unwrap();

        assert!(peak.load(Ordering::Acquire) <= 2);
    }

    #[tokio::test]
    async fn accepts_work_while_executing() {
        let queue = Arc::new(WorkQueue::new(2));
        let first = queue.enqueue(async { 1 }).await.unwrap();

        let exec = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.execute().await })
        };

        let second = queue.enqueue(async { 2 }).await.unwrap();
        assert_eq!(first.wait().await.unwrap(), 1);
        assert_eq!(second.wait().await.unwrap(), 2);

        queue.close().await;
        assert_eq!(exec.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn enqueue_after_close_is_rejected() {
        let queue = WorkQueue::new(1);
        queue.close().await;
        let err = queue.enqueue(async {}).await.unwrap_err();
        assert!(matches!(err, QueueError::Closed));
    }

    #[tokio::test]
    async fn second_execute_is_rejected() {
        let queue = WorkQueue::new(1);
        queue.close().await;
        queue.execute().await.unwrap();
        let err = queue.execute().await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyExecuting));
    }

    #[tokio::test]
    async fn panicking_unit_does_not_halt_the_rest() {
        let queue = WorkQueue::new(1);
        let doomed = queue
            .enqueue(async {
                panic!("boom");
            })
            .await
            .unwrap();
        let survivor = queue.enqueue(async { "ok" }).await.unwrap();
        queue.close().await;

        assert_eq!(queue.execute().await.unwrap(), 2);
        assert!(matches!(doomed.wait().await, Err(QueueError::Canceled)));
        assert_eq!(survivor.wait().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn unexecuted_unit_reports_canceled() {
        let completion = {
            let queue = WorkQueue::new(1);
            queue.enqueue(async { 7 }).await.unwrap()
        };
        assert!(matches!(completion.wait().await, Err(QueueError::Canceled)));
    }
}
