// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Startup recovery of requests left in `Approved` by a crash.

mod common;

use aegis_ca_core::application::{RecoveryReport, RequestQueue, RequestRecoveryService};
use aegis_ca_core::domain::policy::PolicyDecision;
use aegis_ca_core::domain::queue_config::RecoveryConfig;
use aegis_ca_core::domain::request::{RequestId, RequestStatus};
use common::*;
use std::sync::Arc;

fn recovery_for(
    repository: Arc<RecordingRepository>,
    behavior: ServiceBehavior,
    terminal: Arc<RecordingNotifier>,
) -> (Arc<ScriptedService>, Arc<RequestRecoveryService>) {
    let service = ScriptedService::new(behavior);
    let queue = RequestQueue::new(
        repository,
        ScriptedPolicy::always(PolicyDecision::Accepted),
        service.clone(),
    )
    .with_terminal_notifier(terminal);
    let recovery = RequestRecoveryService::new(Arc::new(queue), RecoveryConfig::default());
    (service, Arc::new(recovery))
}

#[tokio::test]
async fn test_restart_recovers_request_stuck_in_approved() {
    let repository = RecordingRepository::new();
    repository
        .seed(&persisted_request(42, RequestStatus::Approved))
        .await;
    let terminal = RecordingNotifier::new();
    let (service, recovery) = recovery_for(repository.clone(), ServiceBehavior::Complete, terminal.clone());

    let report = recovery.start_on_startup().unwrap().await.unwrap();

    assert_eq!(
        report,
        RecoveryReport {
            scanned: 1,
            resumed: 1,
            skipped: 0,
            failed: 0
        }
    );
    assert_eq!(service.calls(), 1);
    let stored = repository.stored(RequestId(42)).await.unwrap();
    assert_eq!(stored.status(), RequestStatus::Complete);
    assert_eq!(repository.updates(), 1);
    assert_eq!(repository.inserts(), 0);
    assert_eq!(terminal.seen(), vec![(RequestId(42), RequestStatus::Complete)]);
}

#[tokio::test]
async fn test_recovered_request_may_suspend_in_service_pending() {
    let repository = RecordingRepository::new();
    repository
        .seed(&persisted_request(42, RequestStatus::Approved))
        .await;
    let terminal = RecordingNotifier::new();
    let (_, recovery) = recovery_for(repository.clone(), ServiceBehavior::Defer, terminal.clone());

    let report = recovery.recover().await.unwrap();

    assert_eq!(report.resumed, 1);
    let stored = repository.stored(RequestId(42)).await.unwrap();
    assert_eq!(stored.status(), RequestStatus::ServicePending);
    assert_eq!(terminal.count(), 0);
}

#[tokio::test]
async fn test_recovery_ignores_requests_in_other_statuses() {
    let repository = RecordingRepository::new();
    for (id, status) in [
        (1, RequestStatus::Pending),
        (2, RequestStatus::Approved),
        (3, RequestStatus::ServicePending),
        (4, RequestStatus::Complete),
        (5, RequestStatus::Approved),
    ] {
        repository.seed(&persisted_request(id, status)).await;
    }
    let (service, recovery) = recovery_for(repository.clone(), ServiceBehavior::Complete, RecordingNotifier::new());

    let report = recovery.recover().await.unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.resumed, 2);
    assert_eq!(service.calls(), 2);
    assert_eq!(
        repository.stored(RequestId(1)).await.unwrap().status(),
        RequestStatus::Pending
    );
    assert_eq!(
        repository.stored(RequestId(3)).await.unwrap().status(),
        RequestStatus::ServicePending
    );
    for id in [2, 5] {
        assert_eq!(
            repository.stored(RequestId(id)).await.unwrap().status(),
            RequestStatus::Complete
        );
    }
}

#[tokio::test]
async fn test_service_failure_is_counted_and_scan_continues() {
    let repository = RecordingRepository::new();
    repository
        .seed(&persisted_request(1, RequestStatus::Approved))
        .await;
    repository
        .seed(&persisted_request(2, RequestStatus::Approved))
        .await;
    let (service, recovery) = recovery_for(repository.clone(), ServiceBehavior::Fail, RecordingNotifier::new());

    let report = recovery.recover().await.unwrap();

    assert_eq!(
        report,
        RecoveryReport {
            scanned: 2,
            resumed: 0,
            skipped: 0,
            failed: 2
        }
    );
    assert_eq!(service.calls(), 2);
    for id in [1, 2] {
        assert_eq!(
            repository.stored(RequestId(id)).await.unwrap().status(),
            RequestStatus::Approved
        );
    }
}

#[tokio::test]
async fn test_resume_skips_request_that_moved_on() {
    let repository = RecordingRepository::new();
    repository
        .seed(&persisted_request(9, RequestStatus::Approved))
        .await;
    let service = ScriptedService::new(ServiceBehavior::Complete);
    let queue = RequestQueue::new(
        repository.clone(),
        ScriptedPolicy::always(PolicyDecision::Accepted),
        service.clone(),
    );

    // Another worker finished the request after the scan listed it
    let mut request = queue.get_request(RequestId(9)).await.unwrap();
    queue.mark_as_serviced(&mut request).await.unwrap();

    let outcome = queue.resume_approved(RequestId(9)).await.unwrap();
    assert_eq!(
        outcome,
        aegis_ca_core::application::ResumeOutcome::Skipped(RequestStatus::Complete)
    );
    assert_eq!(
        queue.resume_approved(RequestId(99)).await.unwrap(),
        aegis_ca_core::application::ResumeOutcome::Missing
    );
    assert_eq!(service.calls(), 0);
}

#[tokio::test]
async fn test_recovery_with_nothing_to_do() {
    let repository = RecordingRepository::new();
    let (_, recovery) = recovery_for(repository.clone(), ServiceBehavior::Complete, RecordingNotifier::new());

    let report = recovery.start().await.unwrap();

    assert_eq!(report, RecoveryReport::default());
    assert_eq!(repository.writes(), 0);
}
