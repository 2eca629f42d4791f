use crate::error::{PoolError, Result};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub(crate) type BoxAction = Box<dyn FnOnce(TaskContext) -> BoxFuture + Send>;

/// A queued action plus the channels that report its progress.
pub(crate) struct Task {
    pub(crate) context: TaskContext,
    pub(crate) action: BoxAction,
    pub(crate) accepted: oneshot::Sender<()>,
    pub(crate) done: oneshot::Sender<()>,
}

impl Task {
    pub(crate) fn new<F, Fut>(id: u64, action: F) -> (Self, oneshot::Receiver<()>, TaskHandle)
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (accepted_tx, accepted_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        let task = Self {
            context: TaskContext {
                id,
                cancel: cancel_rx,
            },
            action: Box::new(move |ctx| Box::pin(action(ctx))),
            accepted: accepted_tx,
            done: done_tx,
        };
        let handle = TaskHandle {
            id,
            done: Some(done_rx),
            cancel: cancel_tx,
        };

        (task, accepted_rx, handle)
    }
}

/// Passed to every action. Carries the cancellation flag set through
/// [`TaskHandle::cancel`].
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: u64,
    cancel: watch::Receiver<bool>,
}

impl TaskContext {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once the task has been cancelled. Never resolves if the
    /// handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut cancel = self.cancel.clone();
        if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Handle to a submitted task.
///
/// Dropping it detaches the task; the action still runs to completion.
#[derive(Debug)]
pub struct TaskHandle {
    id: u64,
    done: Option<oneshot::Receiver<()>>,
    cancel: watch::Sender<bool>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Requests cancellation. The action decides whether and when to stop.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Waits until the action has returned, whether it failed or not.
    pub async fn wait(mut self) {
        self.wait_done().await;
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`. The action
    /// keeps running and the handle can be waited on again.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.wait_done())
            .await
            .map_err(|_| PoolError::Timeout(timeout))
    }

    async fn wait_done(&mut self) {
        if let Some(done) = self.done.as_mut() {
            // A dropped sender also means the worker is finished with the task.
            let _ = done.await;
            self.done = None;
        }
    }
}
