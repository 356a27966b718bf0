// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Semaphore-backed admission control for `process_request`
//!
//! Each request entering the drive loop takes one permit, held until its
//! `request_out`. Callers beyond the limit wait in `request_in`.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::domain::queue_config::SchedulerConfig;
use crate::domain::request::{Request, RequestId};
use crate::domain::scheduler::RequestScheduler;

pub struct SemaphoreRequestScheduler {
    semaphore: Arc<Semaphore>,
    permits: DashMap<RequestId, OwnedSemaphorePermit>,
    max_concurrent: usize,
}

impl SemaphoreRequestScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            permits: DashMap::new(),
            max_concurrent,
        }
    }

    /// Scheduler for the configured limit, `None` when unbounded
    pub fn from_config(config: &SchedulerConfig) -> Option<Arc<Self>> {
        config
            .max_concurrent_requests
            .map(|max| Arc::new(Self::new(max)))
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Requests currently between `request_in` and `request_out`
    pub fn in_flight(&self) -> usize {
        self.permits.len()
    }
}

#[async_trait]
impl RequestScheduler for SemaphoreRequestScheduler {
    async fn request_in(&self, request: &Request) {
        let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!(request_id = %request.id(), error = %e, "Scheduler closed, admitting without permit");
                return;
            }
        };

        if self.permits.insert(request.id(), permit).is_some() {
            warn!(request_id = %request.id(), "Request entered scheduler twice, previous permit released");
        }
        debug!(
            request_id = %request.id(),
            available = self.semaphore.available_permits(),
            "Request admitted"
        );
    }

    async fn request_out(&self, request: &Request) {
        if self.permits.remove(&request.id()).is_none() {
            warn!(request_id = %request.id(), "Request left scheduler without holding a permit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(id: u64) -> Request {
        Request::new(RequestId(id), "enrollment").unwrap()
    }

    #[tokio::test]
    async fn test_permits_follow_in_and_out() {
        let scheduler = SemaphoreRequestScheduler::new(2);
        let first = request(1);

        scheduler.request_in(&first).await;
        assert_eq!(scheduler.available_permits(), 1);
        assert_eq!(scheduler.in_flight(), 1);

        scheduler.request_out(&first).await;
        assert_eq!(scheduler.available_permits(), 2);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_request_in_waits_at_limit() {
        let scheduler = Arc::new(SemaphoreRequestScheduler::new(1));
        let first = request(1);
        scheduler.request_in(&first).await;

        let waiting = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.request_in(&request(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiting.is_finished());

        scheduler.request_out(&first).await;
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scheduler.in_flight(), 1);
    }

    #[test]
    fn test_from_config() {
        assert!(SemaphoreRequestScheduler::from_config(&SchedulerConfig::default()).is_none());
        let scheduler = SemaphoreRequestScheduler::from_config(&SchedulerConfig {
            max_concurrent_requests: Some(4),
        })
        .unwrap();
        assert_eq!(scheduler.max_concurrent(), 4);
    }
}
