// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::attributes::{AttributeError, AttributeStore};
use crate::domain::certificate::X509Certificate;

/// Schema version stamped on every new request
pub const REQUEST_SCHEMA_VERSION: &str = "1.0.0";

/// Well-known attribute keys written by the request core
pub mod keys {
    /// Schema version of the request record
    pub const SCHEMA_VERSION: &str = "requestVersion";
    /// Persistence sentinel, `NOT_UPDATED` until the first write
    pub const DB_STATUS: &str = "dbStatus";
    /// Self-referential id so policies can match on it
    pub const REQUEST_ID: &str = "requestId";
    /// Agents who attempted approval, in order
    pub const AGENT_APPROVALS: &str = "agentApprovals";
    pub const ISSUED_CERTS: &str = "issuedCerts";
    pub const ERRORS: &str = "errors";
    pub const REMOTE_REQUEST_ID: &str = "remoteReqID";
    pub const RESULT: &str = "result";
}

pub const DB_STATUS_NOT_UPDATED: &str = "NOT_UPDATED";
pub const DB_STATUS_UPDATED: &str = "UPDATED";

// ============================================================================
// Value Objects
// ============================================================================

/// Queue-unique request identifier, allocated by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Lifecycle status of a request
///
/// ```text
/// Begin ──► Approved ──► Complete
///   │          └──────► ServicePending ──► Complete
///   ├──► Pending ──► Approved | Rejected
///   └──► Rejected
/// (any) ──► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Begin,
    Pending,
    Approved,
    #[serde(rename = "svc_pending")]
    ServicePending,
    Canceled,
    Rejected,
    Complete,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 7] = [
        Self::Begin,
        Self::Pending,
        Self::Approved,
        Self::ServicePending,
        Self::Canceled,
        Self::Rejected,
        Self::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::ServicePending => "svc_pending",
            Self::Canceled => "canceled",
            Self::Rejected => "rejected",
            Self::Complete => "complete",
        }
    }

    /// Waiting for an external trigger
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Pending | Self::ServicePending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Rejected | Self::Complete)
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        match (*self, next) {
            (_, Canceled) => true,
            (Begin, Approved | Pending | Rejected) => true,
            (Pending, Approved | Rejected) => true,
            (Approved, Complete | ServicePending) => true,
            (ServicePending, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| RequestError::UnknownStatus(s.to_string()))
    }
}

/// Outcome code recorded once a request has been serviced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestResult {
    Success,
    Error,
}

impl RequestResult {
    fn code(&self) -> i32 {
        match self {
            Self::Success => 1,
            Self::Error => 2,
        }
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// A persistable unit of credential work (enrollment, revocation, renewal...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    id: RequestId,
    status: RequestStatus,
    request_type: String,
    source_id: Option<String>,
    owner: Option<String>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    context: Option<String>,
    attributes: AttributeStore,
}

/// Flat persistence form of a request, used by repositories to rebuild the
/// aggregate from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub id: RequestId,
    pub status: RequestStatus,
    pub request_type: String,
    pub source_id: Option<String>,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub context: Option<String>,
    pub attributes: AttributeStore,
}

impl Request {
    /// Build an unpersisted request in `Begin`.
    pub(crate) fn new(id: RequestId, request_type: impl Into<String>) -> Result<Self, AttributeError> {
        let now = Utc::now();
        let mut attributes = AttributeStore::new();
        attributes.set_string(keys::SCHEMA_VERSION, REQUEST_SCHEMA_VERSION)?;
        attributes.set_string(keys::DB_STATUS, DB_STATUS_NOT_UPDATED)?;
        attributes.set_string(keys::REQUEST_ID, id.to_string())?;

        Ok(Self {
            id,
            status: RequestStatus::Begin,
            request_type: request_type.into(),
            source_id: None,
            owner: None,
            created_at: now,
            modified_at: now,
            context: None,
            attributes,
        })
    }

    pub fn restore(record: RequestRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            request_type: record.request_type,
            source_id: record.source_id,
            owner: record.owner,
            created_at: record.created_at,
            modified_at: record.modified_at,
            context: record.context,
            attributes: record.attributes,
        }
    }

    pub fn to_record(&self) -> RequestRecord {
        RequestRecord {
            id: self.id,
            status: self.status,
            request_type: self.request_type.clone(),
            source_id: self.source_id.clone(),
            owner: self.owner.clone(),
            created_at: self.created_at,
            modified_at: self.modified_at,
            context: self.context.clone(),
            attributes: self.attributes.clone(),
        }
    }

    // ========================================================================
    // Aggregate Commands (State Mutations)
    // ========================================================================

    /// Move to `next` if the lifecycle permits it.
    pub(crate) fn transition_to(&mut self, next: RequestStatus) -> Result<(), RequestError> {
        if !self.status.can_transition_to(next) {
            return Err(RequestError::InvalidStateTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn set_owner(&mut self, owner: impl Into<String>) {
        self.owner = Some(owner.into());
    }

    pub(crate) fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    pub(crate) fn mark_persisted(&mut self, persisted: bool) -> Result<(), AttributeError> {
        let value = if persisted { DB_STATUS_UPDATED } else { DB_STATUS_NOT_UPDATED };
        self.attributes.set_string(keys::DB_STATUS, value)
    }

    pub(crate) fn add_agent_approval(&mut self, agent: &str) -> Result<(), AttributeError> {
        let mut approvals = self.agent_approvals();
        approvals.push(agent.to_string());
        self.attributes.set(keys::AGENT_APPROVALS, &approvals)
    }

    pub fn set_source_id(&mut self, source_id: impl Into<String>) {
        self.source_id = Some(source_id.into());
    }

    pub fn set_context(&mut self, context: impl Into<String>) {
        self.context = Some(context.into());
    }

    pub fn add_error(&mut self, message: impl Into<String>) -> Result<(), AttributeError> {
        let mut errors = self.errors();
        errors.push(message.into());
        self.attributes.set(keys::ERRORS, &errors)
    }

    pub fn set_result(&mut self, result: RequestResult) -> Result<(), AttributeError> {
        self.attributes.set(keys::RESULT, &result.code())
    }

    pub fn set_issued_certificates(&mut self, certs: &[X509Certificate]) -> Result<(), AttributeError> {
        self.attributes.set(keys::ISSUED_CERTS, &certs.to_vec())
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeStore {
        &mut self.attributes
    }

    // ========================================================================
    // Aggregate Queries (State Inspection)
    // ========================================================================

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn request_type(&self) -> &str {
        &self.request_type
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn attributes(&self) -> &AttributeStore {
        &self.attributes
    }

    /// True only once the persistence hook has written the request. A
    /// missing or unrecognised sentinel counts as not yet written.
    pub fn is_persisted(&self) -> bool {
        self.attributes.get_string(keys::DB_STATUS) == Some(DB_STATUS_UPDATED)
    }

    pub fn agent_approvals(&self) -> Vec<String> {
        self.attributes
            .get_as::<Vec<String>>(keys::AGENT_APPROVALS)
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.attributes
            .get_as::<Vec<String>>(keys::ERRORS)
            .unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.attributes.get_as::<i32>(keys::RESULT) == Some(RequestResult::Success.code())
    }

    pub fn issued_certificates(&self) -> Vec<X509Certificate> {
        self.attributes
            .get_as::<Vec<X509Certificate>>(keys::ISSUED_CERTS)
            .unwrap_or_default()
    }

    pub fn remote_request_id(&self) -> Option<&str> {
        self.attributes.get_string(keys::REMOTE_REQUEST_ID)
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Request {id}: invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("Unknown request status: {0}")]
    UnknownStatus(String),
}

// ============================================================================
// Tests
// ============================================================================
