//! Registry of per-key mutexes
//!
//! Each key gets its own `Mutex<T>`; work for different keys never contends
//! beyond the brief map lookup.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct KeyedLocks<T> {
    name: &'static str,
    locks: DashMap<String, Arc<Mutex<T>>>,
}

impl<T: Default> KeyedLocks<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            locks: DashMap::new(),
        }
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// A poisoned lock is recovered with its state reset to `T::default()`,
    /// so cached state is rebuilt rather than trusted.
    pub fn with_lock<R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> R {
        let handle = self.handle(key);
        let mut guard = lock_or_reset(self.name, key, &handle);
        f(&mut guard)
    }

    fn handle(&self, key: &str) -> Arc<Mutex<T>> {
        if let Some(existing) = self.locks.get(key) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.locks.entry(key.to_string()).or_default().value())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

fn lock_or_reset<'a, T: Default>(name: &str, key: &str, handle: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match handle.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{} lock for {} was poisoned, resetting its state", name, key);
            handle.clear_poison();
            let mut guard = poisoned.into_inner();
            *guard = T::default();
            guard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn test_same_key_is_serialized() {
        let locks: KeyedLocks<u32> = KeyedLocks::new("test");
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        locks.with_lock("k", |n| {
                            let seen = *n;
                            std::thread::yield_now();
                            *n = seen + 1;
                        });
                    }
                });
            }
        });
        assert_eq!(locks.with_lock("k", |n| *n), 800);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_different_keys_do_not_block() {
        let locks: KeyedLocks<()> = KeyedLocks::new("test");
        let barrier = Barrier::new(2);
        std::thread::scope(|s| {
            s.spawn(|| {
                locks.with_lock("a", |_| {
                    // Both threads must be inside their critical sections at once
                    barrier.wait();
                });
            });
            s.spawn(|| {
                locks.with_lock("b", |_| {
                    barrier.wait();
                });
            });
        });
    }

    #[test]
    fn test_poisoned_lock_resets_state() {
        let locks: KeyedLocks<Vec<u8>> = KeyedLocks::new("test");
        locks.with_lock("k", |v| v.push(1));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            locks.with_lock("k", |_| panic!("boom"));
        }));
        assert!(result.is_err());

        assert!(locks.with_lock("k", |v| v.is_empty()));
    }
}
