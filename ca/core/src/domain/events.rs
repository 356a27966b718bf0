// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::{Request, RequestId, RequestStatus};

/// Lifecycle events emitted when a request suspends for an agent or reaches
/// a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestEvent {
    RequestPending {
        request_id: RequestId,
        request_type: String,
        pending_at: DateTime<Utc>,
    },
    RequestCompleted {
        request_id: RequestId,
        request_type: String,
        success: bool,
        completed_at: DateTime<Utc>,
    },
    RequestRejected {
        request_id: RequestId,
        request_type: String,
        errors: Vec<String>,
        rejected_at: DateTime<Utc>,
    },
    RequestCanceled {
        request_id: RequestId,
        request_type: String,
        canceled_at: DateTime<Utc>,
    },
}

impl RequestEvent {
    /// Build the event matching the request's current status. Statuses that
    /// are neither pending nor terminal produce nothing.
    pub fn for_request(request: &Request) -> Option<Self> {
        let request_id = request.id();
        let request_type = request.request_type().to_string();
        let now = Utc::now();

        match request.status() {
            RequestStatus::Pending => Some(Self::RequestPending {
                request_id,
                request_type,
                pending_at: now,
            }),
            RequestStatus::Complete => Some(Self::RequestCompleted {
                request_id,
                request_type,
                success: request.is_success(),
                completed_at: now,
            }),
            RequestStatus::Rejected => Some(Self::RequestRejected {
                request_id,
                request_type,
                errors: request.errors(),
                rejected_at: now,
            }),
            RequestStatus::Canceled => Some(Self::RequestCanceled {
                request_id,
                request_type,
                canceled_at: now,
            }),
            RequestStatus::Begin | RequestStatus::Approved | RequestStatus::ServicePending => None,
        }
    }

    pub fn request_id(&self) -> RequestId {
        match self {
            Self::RequestPending { request_id, .. }
            | Self::RequestCompleted { request_id, .. }
            | Self::RequestRejected { request_id, .. }
            | Self::RequestCanceled { request_id, .. } => *request_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::RequestPending { .. })
    }
}
