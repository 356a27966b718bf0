// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Request Recovery Application Service
//!
//! After a restart, requests can be found persisted in `Approved`: the
//! drive loop writes `Approved` only together with the service outcome, so a
//! crash inside the service step leaves the request stuck there. Recovery
//! scans for such requests and re-drives each one under its request lock.
//!
//! Runs as a background task so queue startup does not wait for it. Failures
//! on individual requests are logged and counted; the scan continues.

use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::request_listing::RequestListing;
use crate::application::request_queue::{RequestQueue, ResumeOutcome};
use crate::domain::queue_config::RecoveryConfig;
use crate::domain::repository::RepositoryError;
use crate::domain::request::RequestStatus;

/// Outcome counts of one recovery scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Requests found in `Approved`
    pub scanned: usize,
    /// Re-driven to a suspended or terminal status
    pub resumed: usize,
    /// Moved on, or vanished, before they could be re-driven
    pub skipped: usize,
    pub failed: usize,
}

pub struct RequestRecoveryService {
    queue: Arc<RequestQueue>,
    listing: RequestListing,
    config: RecoveryConfig,
}

impl RequestRecoveryService {
    pub fn new(queue: Arc<RequestQueue>, config: RecoveryConfig) -> Self {
        let listing = RequestListing::new(queue.repository());
        Self {
            queue,
            listing,
            config,
        }
    }

    /// Scan once and re-drive every request still in `Approved`.
    pub async fn recover(&self) -> Result<RecoveryReport, RepositoryError> {
        let mut report = RecoveryReport::default();
        if !self.config.enabled {
            info!("Request recovery disabled, skipping scan");
            return Ok(report);
        }

        let mut approved = self
            .listing
            .requests_with_status(RequestStatus::Approved)
            .await?;

        while let Some(found) = approved.next().await {
            let request = match found {
                Ok(request) => request,
                Err(e) => {
                    report.failed += 1;
                    error!(error = %e, "Failed to read request during recovery scan");
                    continue;
                }
            };
            report.scanned += 1;

            let id = request.id();
            match self.queue.resume_approved(id).await {
                Ok(ResumeOutcome::Resumed(status)) => {
                    report.resumed += 1;
                    info!(request_id = %id, status = %status, "Recovered approved request");
                }
                Ok(ResumeOutcome::Skipped(status)) => {
                    report.skipped += 1;
                    debug!(request_id = %id, status = %status, "Request changed before recovery");
                }
                Ok(ResumeOutcome::Missing) => {
                    report.skipped += 1;
                    debug!(request_id = %id, "Request vanished before recovery");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(request_id = %id, error = %e, "Failed to recover approved request");
                }
            }
        }

        info!(
            scanned = report.scanned,
            resumed = report.resumed,
            skipped = report.skipped,
            failed = report.failed,
            "Request recovery scan finished"
        );
        Ok(report)
    }

    /// Run `recover` on a background task.
    ///
    /// A failed scan is logged and reported as an empty report.
    pub fn start(self: Arc<Self>) -> JoinHandle<RecoveryReport> {
        info!("Starting request recovery background task");

        tokio::spawn(async move {
            match self.recover().await {
                Ok(report) => report,
                Err(e) => {
                    error!(error = %e, "Request recovery scan could not enumerate requests");
                    RecoveryReport::default()
                }
            }
        })
    }

    /// `start` if recovery is enabled and configured to run at startup
    pub fn start_on_startup(self: Arc<Self>) -> Option<JoinHandle<RecoveryReport>> {
        if self.config.enabled && self.config.run_on_startup {
            Some(self.start())
        } else {
            debug!("Startup recovery not configured");
            None
        }
    }
}
