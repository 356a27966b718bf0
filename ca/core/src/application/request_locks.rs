// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-request exclusion
//!
//! Every status-changing operation on a request runs while holding that
//! request's lock. Locks live in a sharded map keyed by `RequestId`; an entry
//! exists only while some task holds or waits for it.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::request::RequestId;

#[derive(Clone, Default)]
pub struct RequestLockTable {
    locks: Arc<DashMap<RequestId, Arc<Mutex<()>>>>,
}

impl RequestLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the lock for `id` is free and take it. The lock is released
    /// when the returned guard is dropped.
    pub async fn acquire(&self, id: RequestId) -> RequestLockGuard {
        let mutex = self
            .locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = match mutex.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(request_id = %id, "Request lock contended, waiting");
                mutex.lock_owned().await
            }
        };

        RequestLockGuard {
            id,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Number of ids currently locked or awaited
    pub fn active_count(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive hold on one request id
pub struct RequestLockGuard {
    id: RequestId,
    locks: Arc<DashMap<RequestId, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RequestLockGuard {
    pub fn request_id(&self) -> RequestId {
        self.id
    }
}

impl Drop for RequestLockGuard {
    fn drop(&mut self) {
        // Release first so the strong count below only counts waiters.
        self.guard.take();
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let table = RequestLockTable::new();
        {
            let guard = table.acquire(RequestId(1)).await;
            assert_eq!(guard.request_id(), RequestId(1));
            assert_eq!(table.active_count(), 1);
        }
        assert_eq!(table.active_count(), 0);
    }

    #[tokio::test]
    async fn test_same_id_is_serialized() {
        let table = RequestLockTable::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let _guard = table.acquire(RequestId(42)).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(table.active_count(), 0);
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let table = RequestLockTable::new();
        let _first = table.acquire(RequestId(1)).await;

        let second = tokio::time::timeout(Duration::from_millis(100), table.acquire(RequestId(2))).await;
        assert!(second.is_ok());
        assert_eq!(table.active_count(), 2);
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let table = RequestLockTable::new();
        let first = table.acquire(RequestId(9)).await;

        let waiter_table = table.clone();
        let waiter = tokio::spawn(async move {
            let _guard = waiter_table.acquire(RequestId(9)).await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert_eq!(table.active_count(), 0);
    }
}
