//! Per-key delayed actions with supersession.
//!
//! Scheduling a key that already has a pending timer aborts that timer and
//! starts a fresh one with the full delay, so at most one timer per key is
//! ever pending.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct Debouncer<K> {
    timers: HashMap<K, JoinHandle<()>>,
}

impl<K> Default for Debouncer<K> {
    fn default() -> Self {
        Self {
            timers: HashMap::new(),
        }
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay` unless `key` is scheduled or cancelled again
    /// first. Must be called from within a tokio runtime.
    pub fn schedule<F>(&mut self, key: K, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.timers.retain(|_, handle| !handle.is_finished());

        let deadline = tokio::time::Instant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            action.await;
        });
        if let Some(previous) = self.timers.insert(key, handle) {
            previous.abort();
        }
    }

    /// Abort the pending timer for `key`. Returns whether one was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.timers.remove(key) {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }

    #[must_use]
    pub fn is_armed(&self, key: &K) -> bool {
        self.timers
            .get(key)
            .is_some_and(|handle| !handle.is_finished())
    }

    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.timers
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for handle in self.timers.values() {
            handle.abort();
        }
    }
}
