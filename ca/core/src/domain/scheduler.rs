// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;

use crate::domain::request::Request;

/// Admission-control hook around `process_request`.
///
/// `request_in` may wait (for example on a concurrency limit) before the
/// drive loop starts. `request_out` is always called after `request_in`,
/// also when the drive loop fails.
#[async_trait]
pub trait RequestScheduler: Send + Sync {
    async fn request_in(&self, request: &Request);
    async fn request_out(&self, request: &Request);
}
