// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Request Queue Application Service
//!
//! Sequences requests through their lifecycle, coordinating:
//! - Domain layer: Request aggregate, AttributeStore
//! - Ports: RequestRepository, RequestPolicy, RequestService, RequestNotifier,
//!   RequestScheduler, IdentitySource
//!
//! All status-changing operations hold the per-request lock for their whole
//! duration and refuse a caller's copy whose status no longer matches the
//! stored request. The drive loop runs to a fixed point inside one call and returns
//! only at a suspended (`Pending`, `ServicePending`) or terminal status.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::request_locks::RequestLockTable;
use crate::domain::attributes::AttributeError;
use crate::domain::identity::{IdentitySource, NoIdentity};
use crate::domain::notifier::{NoopNotifier, RequestNotifier};
use crate::domain::policy::{PolicyDecision, RequestPolicy};
use crate::domain::queue_config::QueueSettings;
use crate::domain::repository::{RepositoryError, RequestRepository};
use crate::domain::request::{keys, Request, RequestError, RequestId, RequestStatus};
use crate::domain::scheduler::RequestScheduler;
use crate::domain::service::RequestService;

/// Attributes that describe the outcome of a particular request and are not
/// carried over by `clone_request`.
const CLONE_EXCLUDED_KEYS: [&str; 3] = [keys::ISSUED_CERTS, keys::ERRORS, keys::REMOTE_REQUEST_ID];

/// Bookkeeping attributes the clone gets fresh from `new_request`.
const CLONE_BOOKKEEPING_KEYS: [&str; 3] = [keys::SCHEMA_VERSION, keys::DB_STATUS, keys::REQUEST_ID];

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum RequestQueueError {
    #[error("Request {id} is {actual}, expected {expected}")]
    InvalidState {
        id: RequestId,
        expected: &'static str,
        actual: RequestStatus,
    },

    #[error("Request {id}: no agent identity available for this operation")]
    MissingIdentity { id: RequestId },

    #[error("Request not found: {0}")]
    NotFound(RequestId),

    #[error("Storage failure: {0}")]
    Storage(#[from] RepositoryError),

    #[error("Policy evaluation failed: {0}")]
    Policy(anyhow::Error),

    #[error("Service execution failed: {0}")]
    Service(anyhow::Error),

    #[error("Attribute error: {0}")]
    Attribute(#[from] AttributeError),

    #[error(transparent)]
    Transition(#[from] RequestError),
}

/// Result of re-driving a request found in `Approved`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The drive loop ran and left the request in this status
    Resumed(RequestStatus),
    /// The stored request had already moved on
    Skipped(RequestStatus),
    /// The id no longer resolves to a stored request
    Missing,
}

// ============================================================================
// Service
// ============================================================================

pub struct RequestQueue {
    repository: Arc<dyn RequestRepository>,
    policy: Arc<dyn RequestPolicy>,
    service: Arc<dyn RequestService>,
    pending_notifier: Arc<dyn RequestNotifier>,
    terminal_notifier: Arc<dyn RequestNotifier>,
    scheduler: Option<Arc<dyn RequestScheduler>>,
    identity: Arc<dyn IdentitySource>,
    locks: RequestLockTable,
    settings: QueueSettings,
}

impl RequestQueue {
    /// Create a queue with silent notifiers, no scheduler and no identity.
    pub fn new(
        repository: Arc<dyn RequestRepository>,
        policy: Arc<dyn RequestPolicy>,
        service: Arc<dyn RequestService>,
    ) -> Self {
        Self {
            repository,
            policy,
            service,
            pending_notifier: Arc::new(NoopNotifier),
            terminal_notifier: Arc::new(NoopNotifier),
            scheduler: None,
            identity: Arc::new(NoIdentity),
            locks: RequestLockTable::new(),
            settings: QueueSettings::default(),
        }
    }

    pub fn with_pending_notifier(mut self, notifier: Arc<dyn RequestNotifier>) -> Self {
        self.pending_notifier = notifier;
        self
    }

    pub fn with_terminal_notifier(mut self, notifier: Arc<dyn RequestNotifier>) -> Self {
        self.terminal_notifier = notifier;
        self
    }

    /// Use one notifier for both pending and terminal notifications
    pub fn with_notifier(self, notifier: Arc<dyn RequestNotifier>) -> Self {
        self.with_pending_notifier(Arc::clone(&notifier))
            .with_terminal_notifier(notifier)
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn RequestScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentitySource>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_settings(mut self, settings: QueueSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn repository(&self) -> Arc<dyn RequestRepository> {
        Arc::clone(&self.repository)
    }

    pub fn locks(&self) -> &RequestLockTable {
        &self.locks
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Allocate an id and build an unpersisted request in `Begin`.
    pub async fn new_request(&self, request_type: &str) -> Result<Request, RequestQueueError> {
        let id = self.repository.new_request_id().await?;
        let mut request = Request::new(id, request_type)?;
        request
            .attributes_mut()
            .set_string(keys::SCHEMA_VERSION, self.settings.schema_version.as_str())?;

        debug!(request_id = %id, request_type, queue = %self.settings.name, "Created request");
        Ok(request)
    }

    /// Build a new unpersisted request of the same type carrying the source's
    /// attributes, minus its issued certificates, errors and remote id.
    pub async fn clone_request(&self, source: &Request) -> Result<Request, RequestQueueError> {
        if source.status() == RequestStatus::Begin {
            return Err(RequestQueueError::InvalidState {
                id: source.id(),
                expected: "any status but begin",
                actual: source.status(),
            });
        }

        let mut clone = self.new_request(source.request_type()).await?;
        for (key, value) in source.attributes().iter() {
            if CLONE_EXCLUDED_KEYS.contains(&key) || CLONE_BOOKKEEPING_KEYS.contains(&key) {
                continue;
            }
            clone.attributes_mut().put(key, value.clone())?;
        }
        if let Some(context) = source.context() {
            clone.set_context(context);
        }

        debug!(request_id = %clone.id(), source_request_id = %source.id(), "Cloned request");
        Ok(clone)
    }

    // ========================================================================
    // Lifecycle Commands
    // ========================================================================

    /// Submit a request in `Begin` and drive it to a suspended or terminal
    /// status. The scheduler, if any, sees `request_out` on every exit path.
    pub async fn process_request(&self, request: &mut Request) -> Result<(), RequestQueueError> {
        let _lock = self.locks.acquire(request.id()).await;
        expect_status(request, &[RequestStatus::Begin], "begin")?;
        self.ensure_current(request).await?;

        let Some(scheduler) = self.scheduler.as_ref() else {
            return self.drive(request).await;
        };

        scheduler.request_in(request).await;
        let outcome = AssertUnwindSafe(self.drive(request)).catch_unwind().await;
        scheduler.request_out(request).await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Park a new request in `Pending` without consulting the policy.
    ///
    /// With `notify_on_mark_pending` (the default) the drive loop runs
    /// afterwards and the pending notifier fires.
    pub async fn mark_request_pending(&self, request: &mut Request) -> Result<(), RequestQueueError> {
        let _lock = self.locks.acquire(request.id()).await;
        expect_status(request, &[RequestStatus::Begin], "begin")?;
        self.ensure_current(request).await?;

        request.transition_to(RequestStatus::Pending)?;
        self.persist(request).await?;
        info!(request_id = %request.id(), "Request marked pending");

        if self.settings.notify_on_mark_pending {
            self.drive(request).await
        } else {
            debug!(request_id = %request.id(), "Pending notification suppressed by configuration");
            Ok(())
        }
    }

    /// Record the acting agent's approval and re-evaluate the policy.
    ///
    /// Only an `Accepted` re-evaluation moves the request to `Approved`;
    /// any other decision leaves it `Pending`.
    pub async fn approve_request(&self, request: &mut Request) -> Result<(), RequestQueueError> {
        let _lock = self.locks.acquire(request.id()).await;
        expect_status(request, &[RequestStatus::Pending], "pending")?;
        self.ensure_current(request).await?;

        let agent = self
            .identity
            .current_agent()
            .ok_or(RequestQueueError::MissingIdentity { id: request.id() })?;
        request.add_agent_approval(&agent)?;

        let decision = self
            .policy
            .apply(request)
            .await
            .map_err(RequestQueueError::Policy)?;

        match decision {
            PolicyDecision::Accepted => {
                request.transition_to(RequestStatus::Approved)?;
                info!(request_id = %request.id(), agent = %agent, "Request approved");
            }
            other => {
                warn!(
                    request_id = %request.id(),
                    agent = %agent,
                    decision = ?other,
                    "Policy did not accept request on approval, request stays pending"
                );
            }
        }

        self.persist(request).await?;
        self.drive(request).await
    }

    pub async fn reject_request(&self, request: &mut Request) -> Result<(), RequestQueueError> {
        let _lock = self.locks.acquire(request.id()).await;
        expect_status(request, &[RequestStatus::Pending], "pending")?;
        self.ensure_current(request).await?;

        request.transition_to(RequestStatus::Rejected)?;
        self.persist(request).await?;
        info!(request_id = %request.id(), "Request rejected");

        self.drive(request).await
    }

    /// Cancel a request from any status, including terminal ones.
    pub async fn cancel_request(&self, request: &mut Request) -> Result<(), RequestQueueError> {
        let _lock = self.locks.acquire(request.id()).await;

        let previous = request.status();
        request.transition_to(RequestStatus::Canceled)?;
        self.persist(request).await?;
        info!(request_id = %request.id(), previous = %previous, "Request canceled");

        self.drive(request).await
    }

    /// Complete a request whose service finished out of band. Fires the
    /// terminal notifier directly, without the drive loop.
    pub async fn mark_as_serviced(&self, request: &mut Request) -> Result<(), RequestQueueError> {
        let _lock = self.locks.acquire(request.id()).await;
        expect_status(
            request,
            &[RequestStatus::Approved, RequestStatus::ServicePending],
            "approved or svc_pending",
        )?;
        self.ensure_current(request).await?;

        request.transition_to(RequestStatus::Complete)?;
        self.persist(request).await?;
        info!(request_id = %request.id(), "Request serviced");

        self.terminal_notifier.notify(request).await;
        Ok(())
    }

    // ========================================================================
    // Lookup and Non-Status Updates
    // ========================================================================

    pub async fn find_request(&self, id: RequestId) -> Result<Option<Request>, RequestQueueError> {
        Ok(self.repository.read(id).await?)
    }

    /// Like `find_request`, but a missing id is an error
    pub async fn get_request(&self, id: RequestId) -> Result<Request, RequestQueueError> {
        self.find_request(id)
            .await?
            .ok_or(RequestQueueError::NotFound(id))
    }

    /// Persist attribute or metadata changes without touching the status.
    pub async fn update_request(&self, request: &mut Request) -> Result<(), RequestQueueError> {
        let _lock = self.locks.acquire(request.id()).await;
        self.ensure_current(request).await?;
        self.persist(request).await
    }

    /// Re-read `id` under its lock and, if it is still `Approved`, run the
    /// drive loop on it.
    pub async fn resume_approved(&self, id: RequestId) -> Result<ResumeOutcome, RequestQueueError> {
        let _lock = self.locks.acquire(id).await;

        let Some(mut request) = self.repository.read(id).await? else {
            return Ok(ResumeOutcome::Missing);
        };
        if request.status() != RequestStatus::Approved {
            debug!(request_id = %id, status = %request.status(), "Request no longer approved, skipping");
            return Ok(ResumeOutcome::Skipped(request.status()));
        }

        info!(request_id = %id, "Resuming approved request");
        self.drive(&mut request).await?;
        Ok(ResumeOutcome::Resumed(request.status()))
    }

    // ========================================================================
    // Drive Loop
    // ========================================================================

    async fn drive(&self, request: &mut Request) -> Result<(), RequestQueueError> {
        loop {
            match request.status() {
                RequestStatus::Begin => {
                    let decision = self
                        .policy
                        .apply(request)
                        .await
                        .map_err(RequestQueueError::Policy)?;
                    debug!(request_id = %request.id(), decision = ?decision, "Policy evaluated");

                    match decision {
                        // Service step persists the outcome
                        PolicyDecision::Accepted => request.transition_to(RequestStatus::Approved)?,
                        PolicyDecision::Deferred => {
                            request.transition_to(RequestStatus::Pending)?;
                            self.persist(request).await?;
                        }
                        PolicyDecision::Rejected => {
                            request.transition_to(RequestStatus::Rejected)?;
                            self.persist(request).await?;
                        }
                    }
                }
                RequestStatus::Pending => {
                    debug!(request_id = %request.id(), "Request suspended pending approval");
                    self.pending_notifier.notify(request).await;
                    return Ok(());
                }
                RequestStatus::Approved => {
                    let completed = self
                        .service
                        .service(request)
                        .await
                        .map_err(RequestQueueError::Service)?;
                    let next = if completed {
                        RequestStatus::Complete
                    } else {
                        RequestStatus::ServicePending
                    };
                    request.transition_to(next)?;
                    self.persist(request).await?;
                    info!(request_id = %request.id(), status = %next, "Request serviced by drive loop");
                }
                RequestStatus::ServicePending => {
                    debug!(request_id = %request.id(), "Request suspended pending service");
                    return Ok(());
                }
                RequestStatus::Canceled | RequestStatus::Rejected | RequestStatus::Complete => {
                    debug!(request_id = %request.id(), status = %request.status(), "Request reached terminal status");
                    self.terminal_notifier.notify(request).await;
                    return Ok(());
                }
            }
        }
    }

    /// Fail with `InvalidState` when another caller moved the stored request
    /// on since `request` was read. Must run under the request's lock.
    async fn ensure_current(&self, request: &Request) -> Result<(), RequestQueueError> {
        if !request.is_persisted() {
            return Ok(());
        }

        let stored = self
            .repository
            .read(request.id())
            .await?
            .ok_or(RequestQueueError::NotFound(request.id()))?;
        if stored.status() != request.status() {
            warn!(
                request_id = %request.id(),
                held = %request.status(),
                stored = %stored.status(),
                "Refusing operation on a stale copy of the request"
            );
            return Err(RequestQueueError::InvalidState {
                id: request.id(),
                expected: request.status().as_str(),
                actual: stored.status(),
            });
        }
        Ok(())
    }

    /// Write the request, inserting it on first persistence and updating it
    /// afterwards. Stamps the modification time and, when known, the owner.
    async fn persist(&self, request: &mut Request) -> Result<(), RequestQueueError> {
        request.touch();
        if let Some(agent) = self.identity.current_agent() {
            request.set_owner(agent);
        }

        if request.is_persisted() {
            self.repository.update(request).await?;
            debug!(request_id = %request.id(), status = %request.status(), "Request updated");
            return Ok(());
        }

        request.mark_persisted(true)?;
        if let Err(e) = self.repository.insert(request).await {
            request.mark_persisted(false)?;
            return Err(e.into());
        }
        debug!(request_id = %request.id(), status = %request.status(), "Request inserted");
        Ok(())
    }
}

fn expect_status(
    request: &Request,
    allowed: &[RequestStatus],
    expected: &'static str,
) -> Result<(), RequestQueueError> {
    if allowed.contains(&request.status()) {
        Ok(())
    } else {
        Err(RequestQueueError::InvalidState {
            id: request.id(),
            expected,
            actual: request.status(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
