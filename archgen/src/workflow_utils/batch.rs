//! Batch execution utilities for concurrent model calls

use futures::{stream::FuturesUnordered, Future, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Context provided to each task in a batch
#[derive(Debug, Clone, Copy)]
pub struct TaskContext {
    /// Phase number (for logging)
    pub phase: usize,
    /// Task number (1-indexed for display)
    pub task_number: usize,
    /// Total number of tasks in this batch
    pub total_tasks: usize,
}

/// Execute items with at most `batch_size` tasks in flight
///
/// Every item runs to completion; one failure does not cancel the others.
/// Results come back in input order, one `Result` per item.
///
/// # Example
/// ```rust,ignore
/// let outcomes = execute_batch(1, roles, 3, |role, ctx| async move {
///     request_vision(role, ctx).await
/// })
/// .await;
/// ```
pub async fn execute_batch<T, F, Fut, R, E>(
    phase: usize,
    items: Vec<T>,
    batch_size: usize,
    task_executor: F,
) -> Vec<Result<R, E>>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let total = items.len();
    let sem = Arc::new(Semaphore::new(batch_size.max(1)));
    let executor = Arc::new(task_executor);
    let mut tasks = FuturesUnordered::new();

    for (idx, item) in items.into_iter().enumerate() {
        let sem = sem.clone();
        let executor = executor.clone();

        let ctx = TaskContext {
            phase,
            task_number: idx + 1,
            total_tasks: total,
        };

        tasks.push(async move {
            // The semaphore is never closed, so acquire only fails if it is dropped
            let _permit = sem.acquire().await.ok();
            (idx, executor(item, ctx).await)
        });
    }

    let mut slots: Vec<Option<Result<R, E>>> = (0..total).map(|_| None).collect();
    while let Some((idx, result)) = tasks.next().await {
        slots[idx] = Some(result);
    }

    slots.into_iter().flatten().collect()
}
