// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;

use crate::domain::request::Request;

/// Performs the actual credential work for an approved request (issuing,
/// revoking, forwarding to a remote authority...).
#[async_trait]
pub trait RequestService: Send + Sync {
    /// Returns `true` when the work finished synchronously. `false` parks the
    /// request in `ServicePending` until `mark_as_serviced` is called.
    async fn service(&self, request: &mut Request) -> anyhow::Result<bool>;
}
