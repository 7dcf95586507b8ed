//! Bounded concurrent task group.

use std::future::Future;

use tokio::task::JoinSet;

use crate::error::{AdapterError, AdapterResult};

/// Runs `task` over every item with at most `limit` tasks in flight.
///
/// Results come back in input order. The first error (or panicked task)
/// aborts everything still running and is returned; no further results are
/// reported after it. A `limit` of zero is treated as one.
pub async fn try_join_bounded<I, T, F, Fut>(
    items: I,
    limit: usize,
    task: F,
) -> AdapterResult<Vec<T>>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = AdapterResult<T>> + Send + 'static,
    T: Send + 'static,
{
    let limit = limit.max(1);
    let mut pending = items.into_iter().enumerate();
    let mut set = JoinSet::new();
    let mut results: Vec<(usize, T)> = Vec::new();

    for (index, item) in pending.by_ref().take(limit) {
        let fut = task(item);
        set.spawn(async move { (index, fut.await) });
    }

    while let Some(joined) = set.join_next().await {
        let (index, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                set.abort_all();
                return Err(AdapterError::internal(format!("fan-out task failed: {e}")));
            },
        };
        match outcome {
            Ok(value) => results.push((index, value)),
            Err(e) => {
                set.abort_all();
                return Err(e);
            },
        }
        if let Some((index, item)) = pending.next() {
            let fut = task(item);
            set.spawn(async move { (index, fut.await) });
        }
    }

    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, value)| value).collect())
}
