//! Bounded fan-out executor (sliding-window pool).
//!
//! Runs N async tasks with at most K in flight at any moment. A new task
//! starts as soon as any previous task finishes, until the inputs are
//! exhausted; result position always matches input position; a failing or
//! panicking task is materialized as an error at its own index and never
//! disturbs its peers.

use std::panic::AssertUnwindSafe;

use futures::{FutureExt, StreamExt};

use crate::error::{ErrorKind, ProviderError, ProviderResult};

/// Sliding-window pool over an ordered input sequence.
///
/// The window is the only queue: task futures are constructed lazily as
/// slots free up, so at most `max_in_flight` of them exist at any moment.
#[derive(Debug, Clone, Copy)]
pub struct FanoutExecutor {
    max_in_flight: usize,
}

impl FanoutExecutor {
    /// Create an executor with the given concurrency cap (clamped to ≥ 1).
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// The concurrency cap.
    #[must_use]
    pub const fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Run `task` over every input, returning results in input order.
    ///
    /// The returned vector has exactly `inputs.len()` elements; element `i`
    /// is the outcome of `task(i, inputs[i])`. A panic inside a task is
    /// caught and classified as an internal error for that index. Empty
    /// input is a legal call returning an empty vector.
    pub async fn run<T, R, F, Fut>(&self, inputs: Vec<T>, task: F) -> Vec<ProviderResult<R>>
    where
        F: Fn(usize, T) -> Fut,
        Fut: std::future::Future<Output = ProviderResult<R>>,
    {
        let n = inputs.len();
        if n == 0 {
            return Vec::new();
        }

        let mut slots: Vec<Option<ProviderResult<R>>> = Vec::with_capacity(n);
        slots.resize_with(n, || None);

        // The iterator is lazy: `task` is invoked (and its future created)
        // only when buffer_unordered pulls the next item into the window.
        let mut results = futures::stream::iter(inputs.into_iter().enumerate().map(
            |(index, input)| {
                let fut = AssertUnwindSafe(task(index, input)).catch_unwind();
                async move {
                    let outcome = match fut.await {
                        Ok(result) => result,
                        Err(payload) => Err(ProviderError::from_panic(payload.as_ref())),
                    };
                    (index, outcome)
                }
            },
        ))
        .buffer_unordered(self.max_in_flight);

        while let Some((index, outcome)) = results.next().await {
            slots[index] = Some(outcome);
        }
        drop(results);

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(ProviderError::new(
                        ErrorKind::Internal,
                        "fan-out slot produced no result",
                    ))
                })
            })
            .collect()
    }
}
