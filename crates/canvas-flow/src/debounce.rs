//! Keyed cancel-and-reschedule debouncer
//!
//! Each key owns a single pending timer. Calling again before it fires
//! aborts the pending one and starts a fresh quiet interval, so a burst of
//! calls collapses into the last one.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

struct Pending {
    generation: u64,
    task: JoinHandle<()>,
}

pub struct Debouncer<K> {
    delay: Duration,
    pending: Arc<Mutex<HashMap<K, Pending>>>,
    generation: Mutex<u64>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: Mutex::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `f` for `key`, replacing any pending call for that key
    ///
    /// Outside a tokio runtime there is no timer to wait on and `f` runs
    /// immediately.
    pub fn call<F>(&self, key: K, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!("No tokio runtime available, running debounced call immediately");
                f();
                return;
            }
        };

        let generation = {
            let mut g = self.generation.lock();
            *g += 1;
            *g
        };

        let mut pending = self.pending.lock();
        if let Some(previous) = pending.remove(&key) {
            previous.task.abort();
        }

        let slots = Arc::clone(&self.pending);
        let delay = self.delay;
        let task_key = key.clone();
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slots = slots.lock();
                // A newer call may have replaced this one while it was waking up
                match slots.get(&task_key) {
                    Some(current) if current.generation == generation => {
                        slots.remove(&task_key);
                    }
                    _ => return,
                }
            }
            f();
        });

        pending.insert(key, Pending { generation, task });
    }

    /// Drop the pending call for `key`, if any
    pub fn cancel(&self, key: &K) -> bool {
        match self.pending.lock().remove(key) {
            Some(previous) => {
                previous.task.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, previous) in self.pending.lock().drain() {
            previous.task.abort();
        }
    }

    /// Number of keys with a pending call
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.lock().contains_key(key)
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, previous) in self.pending.lock().drain() {
            previous.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_last_call() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let calls = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let calls = Arc::clone(&calls);
            debouncer.call("a", move || calls.lock().push(i));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(calls.lock().is_empty());
        assert!(debouncer.is_pending(&"a"));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*calls.lock(), vec![4]);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let hits = Arc::new(AtomicUsize::new(0));

        for key in ["a", "b", "a"] {
            let hits = Arc::clone(&hits);
            debouncer.call(key, move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(debouncer.pending_count(), 2);

        tokio::time::sleep(Duration::from_millis(501)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = Arc::clone(&hits);
            debouncer.call(1u32, move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(debouncer.cancel(&1));
        assert!(!debouncer.cancel(&1));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_without_runtime_runs_immediately() {
        let debouncer = Debouncer::new(Duration::from_millis(500));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        debouncer.call("a", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
