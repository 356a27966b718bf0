// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mock collaborators shared by the request queue integration tests.

#![allow(dead_code)]

use aegis_ca_core::domain::attributes::AttributeStore;
use aegis_ca_core::domain::notifier::RequestNotifier;
use aegis_ca_core::domain::policy::{PolicyDecision, RequestPolicy};
use aegis_ca_core::domain::repository::{RepositoryError, RequestIdStream, RequestRepository};
use aegis_ca_core::domain::request::{
    keys, Request, RequestId, RequestRecord, RequestStatus, DB_STATUS_UPDATED,
};
use aegis_ca_core::domain::scheduler::RequestScheduler;
use aegis_ca_core::domain::service::RequestService;
use aegis_ca_core::infrastructure::repositories::InMemoryRequestRepository;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Repository
// ============================================================================

/// In-memory repository that counts writes and can fail on demand
pub struct RecordingRepository {
    inner: InMemoryRequestRepository,
    pub inserts: AtomicUsize,
    pub updates: AtomicUsize,
    fail_writes: AtomicBool,
}

impl RecordingRepository {
    pub fn new() -> Arc<Self> {
        Self::with_first_id(1)
    }

    pub fn with_first_id(first_id: u64) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryRequestRepository::with_first_id(first_id),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Total persisted writes, inserts and updates together
    pub fn writes(&self) -> usize {
        self.inserts() + self.updates()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store a request directly, bypassing the counters
    pub async fn seed(&self, request: &Request) {
        self.inner.insert(request).await.unwrap();
    }

    pub async fn stored(&self, id: RequestId) -> Option<Request> {
        self.inner.read(id).await.unwrap()
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(RepositoryError::Database("directory unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RequestRepository for RecordingRepository {
    async fn new_request_id(&self) -> Result<RequestId, RepositoryError> {
        self.inner.new_request_id().await
    }

    async fn read(&self, id: RequestId) -> Result<Option<Request>, RepositoryError> {
        self.inner.read(id).await
    }

    async fn insert(&self, request: &Request) -> Result<(), RepositoryError> {
        self.check_writable()?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(request).await
    }

    async fn update(&self, request: &Request) -> Result<(), RepositoryError> {
        self.check_writable()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(request).await
    }

    async fn raw_id_enumeration(&self) -> Result<RequestIdStream, RepositoryError> {
        self.inner.raw_id_enumeration().await
    }
}

/// A request as a previous process would have left it after writing
/// `status` (used to simulate crashes).
pub fn persisted_request(id: u64, status: RequestStatus) -> Request {
    let mut attributes = AttributeStore::new();
    attributes.set_string(keys::DB_STATUS, DB_STATUS_UPDATED).unwrap();
    attributes.set_string(keys::REQUEST_ID, id.to_string()).unwrap();
    let now = Utc::now();
    Request::restore(RequestRecord {
        id: RequestId(id),
        status,
        request_type: "enrollment".to_string(),
        source_id: None,
        owner: None,
        created_at: now,
        modified_at: now,
        context: None,
        attributes,
    })
}

// ============================================================================
// Policy
// ============================================================================

/// Returns queued decisions in order, then the fallback decision
pub struct ScriptedPolicy {
    decisions: Mutex<VecDeque<PolicyDecision>>,
    fallback: PolicyDecision,
    pub calls: AtomicUsize,
    delay: Option<Duration>,
    inside: AtomicUsize,
    pub max_concurrent: AtomicUsize,
}

impl ScriptedPolicy {
    pub fn always(decision: PolicyDecision) -> Arc<Self> {
        Self::sequence(vec![], decision)
    }

    pub fn sequence(decisions: Vec<PolicyDecision>, fallback: PolicyDecision) -> Arc<Self> {
        Arc::new(Self::build(decisions, fallback, None))
    }

    /// Sleeps inside `apply` so overlapping evaluations can be observed
    pub fn slow(decision: PolicyDecision, delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(vec![], decision, Some(delay)))
    }

    fn build(decisions: Vec<PolicyDecision>, fallback: PolicyDecision, delay: Option<Duration>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            fallback,
            calls: AtomicUsize::new(0),
            delay,
            inside: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestPolicy for ScriptedPolicy {
    async fn apply(&self, request: &mut Request) -> anyhow::Result<PolicyDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        request
            .attributes_mut()
            .set_string("policyEvaluated", "true")?;

        self.inside.fetch_sub(1, Ordering::SeqCst);
        let next = self.decisions.lock().pop_front();
        Ok(next.unwrap_or(self.fallback))
    }
}

pub struct FailingPolicy;

#[async_trait]
impl RequestPolicy for FailingPolicy {
    async fn apply(&self, _request: &mut Request) -> anyhow::Result<PolicyDecision> {
        anyhow::bail!("policy engine unreachable")
    }
}

// ============================================================================
// Service
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceBehavior {
    Complete,
    Defer,
    Fail,
    Panic,
}

pub struct ScriptedService {
    behavior: ServiceBehavior,
    pub calls: AtomicUsize,
}

impl ScriptedService {
    pub fn new(behavior: ServiceBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestService for ScriptedService {
    async fn service(&self, _request: &mut Request) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            ServiceBehavior::Complete => Ok(true),
            ServiceBehavior::Defer => Ok(false),
            ServiceBehavior::Fail => anyhow::bail!("signing unit offline"),
            ServiceBehavior::Panic => panic!("service crashed"),
        }
    }
}

// ============================================================================
// Notifier and Scheduler
// ============================================================================

/// Records `(id, status)` for every notification
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<(RequestId, RequestStatus)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seen(&self) -> Vec<(RequestId, RequestStatus)> {
        self.seen.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl RequestNotifier for RecordingNotifier {
    async fn notify(&self, request: &Request) {
        self.seen.lock().push((request.id(), request.status()));
    }
}

#[derive(Default)]
pub struct CountingScheduler {
    pub entered: AtomicUsize,
    pub exited: AtomicUsize,
}

impl CountingScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn exited(&self) -> usize {
        self.exited.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestScheduler for CountingScheduler {
    async fn request_in(&self, _request: &Request) {
        self.entered.fetch_add(1, Ordering::SeqCst);
    }

    async fn request_out(&self, _request: &Request) {
        self.exited.fetch_add(1, Ordering::SeqCst);
    }
}
