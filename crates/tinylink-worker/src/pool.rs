use crate::error::{PoolError, Result};
use crate::task::{Task, TaskContext, TaskHandle};
use crate::PoolSettings;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type Queue = Arc<AsyncMutex<mpsc::Receiver<Task>>>;

/// A fixed set of tokio tasks pulling actions from one shared queue.
///
/// Must be started inside a tokio runtime.
#[derive(Debug)]
pub struct TaskPool {
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
    size: usize,
}

impl TaskPool {
    /// Spawns `workers` worker tasks (at least one).
    pub fn start(workers: usize) -> Self {
        let size = workers.max(1);
        let (sender, receiver) = mpsc::channel(size);
        let queue: Queue = Arc::new(AsyncMutex::new(receiver));

        let workers = (0..size)
            .map(|index| tokio::spawn(run_worker(index, Arc::clone(&queue))))
            .collect();

        info!(workers = size, "task pool started");

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            next_id: AtomicU64::new(0),
            size,
        }
    }

    pub fn with_settings(settings: &PoolSettings) -> Self {
        Self::start(settings.workers)
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Hands `action` to the next free worker.
    ///
    /// Returns once a worker has accepted the task, not when it finishes.
    /// Fails with [`PoolError::Closed`] after [`shutdown`](Self::shutdown).
    pub async fn submit<F, Fut>(&self, action: F) -> Result<TaskHandle>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            return Err(PoolError::Closed);
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (task, accepted, handle) = Task::new(id, action);

        sender.send(task).await.map_err(|_| PoolError::Closed)?;
        drop(sender);
        accepted.await.map_err(|_| PoolError::Closed)?;

        debug!(task = id, "task handed off");
        Ok(handle)
    }

    /// Closes the queue and waits for every worker to exit.
    ///
    /// Tasks already queued or running are drained first. Calling it again
    /// is a no-op.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(err) = worker.await {
                error!(error = %err, "task pool worker exited abnormally");
            }
        }

        info!("task pool shut down");
    }
}

async fn run_worker(index: usize, queue: Queue) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        let Task {
            context,
            action,
            accepted,
            done,
        } = task;
        let id = context.id();
        let _ = accepted.send(());

        // Run on its own task so a panicking action does not take the worker down.
        match tokio::spawn(action(context)).await {
            Ok(Ok(())) => debug!(worker = index, task = id, "task finished"),
            Ok(Err(err)) => error!(worker = index, task = id, error = %err, "task failed"),
            Err(err) => error!(worker = index, task = id, error = %err, "task panicked"),
        }

        let _ = done.send(());
    }

    debug!(worker = index, "worker stopped");
}
