// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Task-local agent identity
//!
//! Binds the acting agent to a future so the request queue can resolve it
//! anywhere below the call site, without threading it through every API.

use std::future::Future;

use crate::domain::identity::IdentitySource;

tokio::task_local! {
    static CURRENT_AGENT: String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLocalIdentity;

impl TaskLocalIdentity {
    /// Run `fut` with `agent` as the current agent
    pub async fn scope<F>(agent: impl Into<String>, fut: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_AGENT.scope(agent.into(), fut).await
    }
}

impl IdentitySource for TaskLocalIdentity {
    fn current_agent(&self) -> Option<String> {
        CURRENT_AGENT.try_with(|agent| agent.clone()).ok()
    }
}
