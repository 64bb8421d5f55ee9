// crates/rollout-core/tests/status_transitions.rs
// ============================================================================
// Module: Device Status Transition Tests
// Description: Transition rules, idempotency, and creation rollback.
// Purpose: Pin the device status state machine and store write sequencing.
// Dependencies: rollout-core, tokio
// ============================================================================
//! ## Overview
//! Validates the ordered transition checks, the no-write path for repeated
//! reports, and the rollback of partially stored deployments.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::atomic::Ordering;

use common::FaultyStore;
use common::Harness;
use common::tenant_ctx;
use rollout_core::DataStore;
use rollout_core::DeploymentConstructor;
use rollout_core::DeploymentId;
use rollout_core::DeploymentsError;
use rollout_core::DeviceDeploymentStatus;
use rollout_core::DeviceId;
use rollout_core::ErrorKind;
use rollout_core::Query;
use rollout_core::StatusReport;
use rollout_core::StoreError;

async fn two_device_deployment<S: DataStore>(harness: &Harness<S>) -> DeploymentId {
    harness.device("dev-a", "rpi4");
    harness.device("dev-b", "rpi4");
    harness.artifact("art-1", "release-1", &["rpi4"]);
    harness
        .model
        .create_deployment(
            &tenant_ctx(),
            DeploymentConstructor::for_devices(
                "rollout",
                "release-1",
                vec![DeviceId::new("dev-a"), DeviceId::new("dev-b")],
            ),
        )
        .await
        .unwrap()
}

async fn report<S: DataStore>(
    harness: &Harness<S>,
    id: &DeploymentId,
    report: StatusReport,
) -> Result<(), DeploymentsError> {
    harness
        .model
        .update_device_deployment_status(&tenant_ctx(), id, &DeviceId::new("dev-a"), report)
        .await
}

#[tokio::test]
async fn repeated_report_performs_no_writes() {
    let harness = Harness::with_store(FaultyStore::default());
    let id = two_device_deployment(&harness).await;

    report(&harness, &id, StatusReport::new(DeviceDeploymentStatus::Downloading)).await.unwrap();
    let writes = harness.model.store().write_count();
    let events = harness.audit.events().len();

    report(&harness, &id, StatusReport::new(DeviceDeploymentStatus::Downloading)).await.unwrap();
    assert_eq!(harness.model.store().write_count(), writes);
    assert_eq!(harness.audit.events().len(), events);

    let stats = harness.model.get_deployment_stats(&tenant_ctx(), &id).await.unwrap().unwrap();
    assert_eq!(stats.get(DeviceDeploymentStatus::Downloading), 1);
    assert_eq!(stats.total(), 2);
}

#[tokio::test]
async fn terminal_record_rejects_further_changes() {
    let harness = Harness::new();
    let id = two_device_deployment(&harness).await;
    report(&harness, &id, StatusReport::new(DeviceDeploymentStatus::Failure)).await.unwrap();

    let err =
        report(&harness, &id, StatusReport::new(DeviceDeploymentStatus::Success)).await.unwrap_err();
    assert!(matches!(
        err,
        DeploymentsError::InvalidTransition {
            from: DeviceDeploymentStatus::Failure,
            to: DeviceDeploymentStatus::Success,
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    report(&harness, &id, StatusReport::new(DeviceDeploymentStatus::Failure)).await.unwrap();
}

#[tokio::test]
async fn operator_only_statuses_are_rejected_from_devices() {
    let harness = Harness::new();
    let id = two_device_deployment(&harness).await;
    for status in [DeviceDeploymentStatus::Aborted, DeviceDeploymentStatus::Decommissioned] {
        let err = report(&harness, &id, StatusReport::new(status)).await.unwrap_err();
        assert!(matches!(err, DeploymentsError::BadStatus(reported) if reported == status));
    }
}

#[tokio::test]
async fn intermediate_statuses_may_move_backwards() {
    let harness = Harness::new();
    let id = two_device_deployment(&harness).await;
    report(&harness, &id, StatusReport::new(DeviceDeploymentStatus::Installing)).await.unwrap();
    report(&harness, &id, StatusReport::new(DeviceDeploymentStatus::Downloading)).await.unwrap();
    let stats = harness.model.get_deployment_stats(&tenant_ctx(), &id).await.unwrap().unwrap();
    assert_eq!(stats.get(DeviceDeploymentStatus::Downloading), 1);
    assert_eq!(stats.get(DeviceDeploymentStatus::Installing), 0);
}

#[tokio::test]
async fn substate_is_stored_and_validated() {
    let harness = Harness::new();
    let id = two_device_deployment(&harness).await;
    report(
        &harness,
        &id,
        StatusReport::new(DeviceDeploymentStatus::Installing).with_substate("writing rootfs"),
    )
    .await
    .unwrap();
    let record = harness
        .model
        .store()
        .get_device_deployment(&tenant_ctx(), &id, &DeviceId::new("dev-a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.substate.as_deref(), Some("writing rootfs"));

    let err = report(
        &harness,
        &id,
        StatusReport::new(DeviceDeploymentStatus::Rebooting).with_substate("x".repeat(201)),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn unknown_device_deployment_is_not_found() {
    let harness = Harness::new();
    let err = report(
        &harness,
        &DeploymentId::new("dep-missing"),
        StatusReport::new(DeviceDeploymentStatus::Installing),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DeploymentsError::DeploymentNotFound));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn failed_device_insert_rolls_back_deployment() {
    let store = FaultyStore::default();
    store.fail_device_insert.store(true, Ordering::SeqCst);
    let harness = Harness::with_store(store);
    harness.device("dev-a", "rpi4");
    harness.artifact("art-1", "release-1", &["rpi4"]);

    let err = harness
        .model
        .create_deployment(
            &tenant_ctx(),
            DeploymentConstructor::for_devices("rollout", "release-1", vec![DeviceId::new("dev-a")]),
        )
        .await
        .unwrap_err();
    match &err {
        DeploymentsError::CreateRolledBack {
            source,
            rollback,
        } => {
            assert!(matches!(source, StoreError::Io(_)));
            assert!(rollback.is_none());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("deployment rolled back"));
    assert_eq!(err.kind(), ErrorKind::Internal);
    let found = harness.model.lookup_deployment(&tenant_ctx(), &Query::default()).await.unwrap();
    assert!(found.is_empty());
    assert!(harness.audit.events().is_empty());
}

#[tokio::test]
async fn failed_rollback_reports_both_errors() {
    let store = FaultyStore::default();
    store.fail_device_insert.store(true, Ordering::SeqCst);
    store.fail_delete.store(true, Ordering::SeqCst);
    let harness = Harness::with_store(store);
    harness.device("dev-a", "rpi4");
    harness.artifact("art-1", "release-1", &["rpi4"]);

    let err = harness
        .model
        .create_deployment(
            &tenant_ctx(),
            DeploymentConstructor::for_devices("rollout", "release-1", vec![DeviceId::new("dev-a")]),
        )
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("insert refused"));
    assert!(message.contains("rolling back deployment failed"));
    assert!(message.contains("delete refused"));
}
