//! Per-VIN serialization lock (spec §4.I, §9).
//!
//! The vehicle can only process one in-flight command at a time; concurrent
//! requests for the same VIN must queue rather than race. One
//! `tokio::sync::Mutex` per VIN, held in a `dashmap` keyed by VIN, following
//! the teacher's map-of-channels shape (`dispatcher.rs`'s
//! `HashMap<Pubkey, ...>`) generalized to a map of locks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct VinLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl VinLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the serialization lock for `vin`, creating it on first use.
    /// The returned guard is dropped (releasing the lock) when the caller's
    /// request finishes, so the next queued request for the same VIN can
    /// proceed.
    pub async fn acquire(&self, vin: &str) -> OwnedVinGuard {
        let entry = self.locks.entry(vin.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        OwnedVinGuard { _mutex: entry }
    }
}

/// Holds the `Arc<Mutex<()>>` alive alongside its guard so the lock is not
/// dropped out from under a still-held guard.
pub struct OwnedVinGuard {
    _mutex: Arc<Mutex<()>>,
}

impl OwnedVinGuard {
    /// Await the actual lock. Split from [`VinLocks::acquire`] so holding
    /// the map's shard lock is as brief as possible.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self._mutex.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_vin_serializes_access() {
        let locks = VinLocks::new();
        let guard_a = locks.acquire("5YJ30123456789ABC").await;
        let first = guard_a.lock().await;

        let locks = Arc::new(locks);
        let locks2 = locks.clone();
        let handle = tokio::spawn(async move {
            let guard_b = locks2.acquire("5YJ30123456789ABC").await;
            let _second = guard_b.lock().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        drop(first);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn different_vins_do_not_block_each_other() {
        let locks = VinLocks::new();
        let guard_a = locks.acquire("5YJ30123456789ABC").await;
        let _a = guard_a.lock().await;

        let guard_b = locks.acquire("1HGCM82633A123456").await;
        let result = tokio::time::timeout(Duration::from_millis(50), guard_b.lock()).await;
        assert!(result.is_ok());
    }
}
