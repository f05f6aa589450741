// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keyed single-flight map.
//!
//! Concurrent calls with the same key share one execution: the first caller
//! runs the future, the rest await its output. The entry is removed once the
//! call completes so a later call (for example a retry after a failure)
//! starts fresh.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;

pub struct InFlight<T> {
    calls: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T: Clone> InFlight<T> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn calls(&self) -> MutexGuard<'_, HashMap<String, Arc<OnceCell<T>>>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` unless a call for `key` is already in flight, in which case
    /// wait for and return that call's output.
    pub async fn run<F, Fut>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = self
            .calls()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        // If the leader is dropped mid-flight, the next waiter runs its own `f`.
        let value = cell.get_or_init(f).await.clone();

        let mut calls = self.calls();
        if calls.get(key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
            calls.remove(key);
        }
        value
    }

    pub fn len(&self) -> usize {
        self.calls().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for InFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_calls_share_one_execution() {
        let inflight = InFlight::<usize>::new();
        let runs = AtomicUsize::new(0);

        let call = || async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            runs.fetch_add(1, Ordering::SeqCst) + 100
        };

        let (a, b) = tokio::join!(inflight.run("k", call), inflight.run("k", call));
        assert_eq!(a, 100);
        assert_eq!(b, 100);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let inflight = InFlight::<&'static str>::new();
        let (a, b) = tokio::join!(
            inflight.run("a", || async { "first" }),
            inflight.run("b", || async { "second" })
        );
        assert_eq!((a, b), ("first", "second"));
    }

    #[tokio::test]
    async fn sequential_calls_run_again() {
        let inflight = InFlight::<usize>::new();
        let runs = AtomicUsize::new(0);
        for _ in 0..2 {
            inflight
                .run("k", || async { runs.fetch_add(1, Ordering::SeqCst) })
                .await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
