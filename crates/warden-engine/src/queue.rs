//! Serialized execution queue for engine calls.
//!
//! The engine holds a single active model and serializes state transitions
//! internally; racing load/unload calls corrupt that state. Instead of a lock
//! object, every call is funneled through a concurrency-1 task runner: one
//! worker drains an unbounded channel, so at most one submitted task is in
//! flight and tasks start in submission order.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The queue worker is gone; no further tasks will run.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("request queue closed")]
pub struct QueueClosed;

/// FIFO runner with a fixed concurrency of exactly one.
#[derive(Clone)]
pub struct RequestQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQueue {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
            debug!(target: "warden::queue", "request queue drained and closed");
        });
        Self { tx }
    }

    /// Enqueue `task` to run once every earlier submission has finished.
    ///
    /// The task is enqueued before this returns, so call order is queue
    /// order. The returned future resolves with the task's own output; tasks
    /// submitted while one is in flight start in submission order once the
    /// runner frees.
    pub fn submit<T, F>(&self, task: F) -> impl Future<Output = Result<T, QueueClosed>>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = reply_tx.send(task.await);
        });
        let enqueued = self.tx.send(job).is_ok();
        async move {
            if !enqueued {
                return Err(QueueClosed);
            }
            reply_rx.await.map_err(|_| QueueClosed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tokio::time::timeout;

    #[tokio::test]
    async fn only_one_task_in_flight_and_fifo_completion() {
        let queue = RequestQueue::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let completed: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

        let mut pending = Vec::new();
        for index in 0..16 {
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            let completed = completed.clone();
            pending.push(queue.submit(async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                completed.lock().await.push(index);
                index
            }));
        }
        let results = timeout(Duration::from_secs(5), join_all(pending))
            .await
            .expect("all tasks complete");
        for (index, result) in results.into_iter().enumerate() {
            assert_eq!(result, Ok(index));
        }

        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
        let order = completed.lock().await.clone();
        assert_eq!(order, (0..16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn results_and_errors_pass_through() {
        let queue = RequestQueue::new();
        let ok: Result<u32, String> = queue
            .submit(async { Ok::<u32, String>(7) })
            .await
            .expect("queue open");
        assert_eq!(ok, Ok(7));
        let err: Result<u32, String> = queue
            .submit(async { Err::<u32, String>("boom".into()) })
            .await
            .expect("queue open");
        assert_eq!(err, Err("boom".to_string()));
    }
}
