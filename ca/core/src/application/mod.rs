// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod recovery;
pub mod request_listing;
pub mod request_locks;
pub mod request_queue;

// Re-export services for convenience
pub use recovery::{RecoveryReport, RequestRecoveryService};
pub use request_listing::{RequestListing, RequestPage};
pub use request_queue::{RequestQueue, RequestQueueError, ResumeOutcome};
