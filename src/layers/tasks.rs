//! Background execution for long-running network calls.
//!
//! `run_with_timeout` bounds a single operation. `TaskDispatcher` runs the
//! user-triggered actions (summarize, ask) in the background and hands their
//! results back on a channel, each tagged with the paper it was issued for so
//! the caller can drop results that arrive after the selection changed.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{AppError, AppResult};

/// Aborts the wrapped task when dropped, so a worker never outlives the
/// caller that is waiting on it.
struct Worker<T>(JoinHandle<T>);

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs `future` on its own task and waits at most `limit` for it. On timeout
/// the worker is cancelled and `AppError::Timeout` is returned.
pub async fn run_with_timeout<T, F>(operation: &str, future: F, limit: Duration) -> AppResult<T>
where
    F: Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut worker = Worker(tokio::spawn(future));
    match tokio::time::timeout(limit, &mut worker.0).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(AppError::Task(format!("{}: {}", operation, e))),
        Err(_) => {
            tracing::error!("Operation timed out for {} after {:?}", operation, limit);
            Err(AppError::Timeout { operation: operation.to_string() })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Summarize,
    Ask,
}

/// Correlates a background result with the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTag {
    pub paper_id: String,
    pub action: Action,
}

impl RequestTag {
    pub fn new(paper_id: impl Into<String>, action: Action) -> Self {
        Self { paper_id: paper_id.into(), action }
    }
}

#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub tag: RequestTag,
    pub result: AppResult<T>,
}

/// At most one task per `Action` is in flight; submitting another one of the
/// same kind cancels the outstanding task.
pub struct TaskDispatcher<T> {
    limit: Duration,
    tx: mpsc::UnboundedSender<TaskOutcome<T>>,
    rx: mpsc::UnboundedReceiver<TaskOutcome<T>>,
    in_flight: HashMap<Action, JoinHandle<()>>,
}

impl<T: Send + 'static> TaskDispatcher<T> {
    pub fn new(limit: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { limit, tx, rx, in_flight: HashMap::new() }
    }

    pub fn submit<F>(&mut self, tag: RequestTag, future: F)
    where
        F: Future<Output = AppResult<T>> + Send + 'static,
    {
        let action = tag.action;
        if let Some(previous) = self.in_flight.remove(&action) {
            if !previous.is_finished() {
                tracing::warn!("Cancelling outstanding {:?} task", action);
                previous.abort();
            }
        }

        let tx = self.tx.clone();
        let limit = self.limit;
        let handle = tokio::spawn(async move {
            let name = format!("{:?} for {}", tag.action, tag.paper_id);
            let result = run_with_timeout(&name, future, limit).await;
            if tx.send(TaskOutcome { tag, result }).is_err() {
                tracing::debug!("Dispatcher dropped before {} finished", name);
            }
        });
        self.in_flight.insert(action, handle);
    }

    pub fn is_busy(&self, action: Action) -> bool {
        self.in_flight.get(&action).is_some_and(|h| !h.is_finished())
    }

    /// Waits for the next finished task. Results arrive in completion order,
    /// not submission order.
    pub async fn next(&mut self) -> Option<TaskOutcome<T>> {
        self.rx.recv().await
    }
}

impl<T> Drop for TaskDispatcher<T> {
    fn drop(&mut self) {
        for handle in self.in_flight.values() {
            handle.abort();
        }
    }
}
