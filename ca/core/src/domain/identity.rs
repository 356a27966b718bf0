// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

/// Resolves the agent on whose behalf the current operation runs.
///
/// `None` is a valid answer: most lifecycle operations record the owner only
/// when one is known, approval refuses to proceed without it.
pub trait IdentitySource: Send + Sync {
    fn current_agent(&self) -> Option<String>;
}

/// Identity source for system-driven contexts where no agent is acting
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdentity;

impl IdentitySource for NoIdentity {
    fn current_agent(&self) -> Option<String> {
        None
    }
}

/// Always reports the same agent, e.g. the recovery worker's service identity
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub String);

impl IdentitySource for StaticIdentity {
    fn current_agent(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
