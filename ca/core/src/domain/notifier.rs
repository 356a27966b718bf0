// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;

use crate::domain::request::Request;

/// Receives requests entering `Pending` or a terminal status.
///
/// Delivery failures are the notifier's own concern; the lifecycle engine
/// does not retry or roll back on them.
#[async_trait]
pub trait RequestNotifier: Send + Sync {
    async fn notify(&self, request: &Request);
}

/// Notifier that drops every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl RequestNotifier for NoopNotifier {
    async fn notify(&self, _request: &Request) {}
}
