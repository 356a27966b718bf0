// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::request::Request;

/// Verdict returned by the policy engine for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyDecision {
    /// Proceed to servicing without operator involvement
    Accepted,
    /// Park the request for an agent to approve or reject
    Deferred,
    Rejected,
}

/// Decides whether a request may proceed.
///
/// Implementations may attach attributes to the request while evaluating it
/// (defaults filled in by enrollment profiles, rejection reasons...). Errors
/// are surfaced to the caller of the lifecycle operation untouched.
#[async_trait]
pub trait RequestPolicy: Send + Sync {
    async fn apply(&self, request: &mut Request) -> anyhow::Result<PolicyDecision>;
}

/// Policy that returns the same decision for every request
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub PolicyDecision);

#[async_trait]
impl RequestPolicy for FixedPolicy {
    async fn apply(&self, _request: &mut Request) -> anyhow::Result<PolicyDecision> {
        Ok(self.0)
    }
}
