//! Integration tests for VM teardown
//!
//! These run the delete flow against the in-memory control plane.

use anyhow::Result;
use azsandbox_common::naming::vm_nsg_name;
use azsandbox_common::{ResourceKind, SecurityRule};
use azsandbox_provider::azure::AzureError;
use azsandbox_provider::flows::{DeleteInstanceFlow, TeardownError, TeardownReport};
use azsandbox_provider::reservation::{DeployedApp, ReservationInfo};
use azsandbox_test_utils::fixtures::{
    NicBuilder, VmBuilder, managed_data_disk, unsupported_os_disk, vhd_data_disk, vhd_uri,
};
use azsandbox_test_utils::{FakeAzure, RecordingIpPool, RecordingLockManager, init_test_tracing};

const VM: &str = "vm-1";
const VM_RG: &str = "vm-rg";
const RESERVATION: &str = "res-1";
const SANDBOX_NSG: &str = "NSG_sandbox_all_subnets_res-1";

/// VM with two NICs (one static with a public IP), a managed OS disk, a VHD
/// data disk and a managed data disk, plus both security groups
fn deployed() -> FakeAzure {
    init_test_tracing();
    let fake = FakeAzure::new();
    let (vm, nics) = VmBuilder::new(VM)
        .data_disk(vhd_data_disk("data-0", 0))
        .data_disk(managed_data_disk("data-1", 1))
        .nic(NicBuilder::new("nic-1").static_ip("10.0.0.4").public_ip("pip-1"))
        .nic(NicBuilder::new("nic-2").dynamic_ip("10.0.0.5"))
        .build(VM_RG);
    fake.deploy_vm(VM_RG, vm, nics);
    fake.insert_security_group(VM_RG, &vm_nsg_name(VM), vec![]);
    fake.insert_security_group(
        RESERVATION,
        SANDBOX_NSG,
        vec![
            SecurityRule::inbound_allow("sandbox-a", 1000),
            SecurityRule::inbound_allow("sandbox-b", 1001),
        ],
    );
    fake
}

fn app() -> DeployedApp {
    DeployedApp::new(VM).with_resource_group(VM_RG)
}

async fn teardown(
    fake: &FakeAzure,
    pool: &RecordingIpPool,
    locks: &RecordingLockManager,
) -> Result<TeardownReport> {
    let reservation = ReservationInfo::new(RESERVATION);
    DeleteInstanceFlow::new(fake, &reservation, pool, locks)
        .delete_instance(&app())
        .await
}

#[tokio::test]
async fn test_full_teardown() -> Result<()> {
    let fake = deployed();
    let pool = RecordingIpPool::new();
    let locks = RecordingLockManager::new();

    let report = teardown(&fake, &pool, &locks).await?;

    assert!(report.vm_found);
    assert!(report.already_absent.is_empty());
    let deleted: Vec<(ResourceKind, &str)> = report
        .deleted
        .iter()
        .map(|(kind, name)| (*kind, name.as_str()))
        .collect();
    let data_vhd = vhd_uri("data-0");
    assert_eq!(
        deleted,
        [
            (ResourceKind::VirtualMachine, VM),
            (ResourceKind::NetworkInterface, "nic-1"),
            (ResourceKind::NetworkInterface, "nic-2"),
            (ResourceKind::PublicIp, "pip-1"),
            (ResourceKind::OsManagedDisk, "vm-1-os"),
            (ResourceKind::DataVhd, data_vhd.as_str()),
            (ResourceKind::DataManagedDisk, "data-1"),
            (ResourceKind::NetworkSecurityGroup, "NSG_vm-1"),
            (ResourceKind::SecurityRule, "sandbox-a"),
            (ResourceKind::SecurityRule, "sandbox-b"),
        ]
    );

    assert!(!fake.has_vm(VM_RG, VM));
    assert!(!fake.has_network_interface(VM_RG, "nic-1"));
    assert!(!fake.has_public_ip(VM_RG, "pip-1"));
    assert!(!fake.has_disk(VM_RG, "vm-1-os"));
    assert!(!fake.has_vhd(&data_vhd));
    assert!(!fake.has_security_group(VM_RG, "NSG_vm-1"));
    // The sandbox group itself survives; only its rules go
    assert!(fake.has_security_group(RESERVATION, SANDBOX_NSG));
    assert!(fake.rules(RESERVATION, SANDBOX_NSG).is_empty());

    // Only the static IP goes back to the pool
    assert_eq!(report.released_ips, ["10.0.0.4"]);
    assert_eq!(
        pool.released(),
        [(RESERVATION.to_string(), vec!["10.0.0.4".to_string()])]
    );
    assert_eq!(locks.released(), ["NSG_vm-1"]);

    Ok(())
}

#[tokio::test]
async fn test_dependency_order() -> Result<()> {
    let fake = deployed();
    teardown(&fake, &RecordingIpPool::new(), &RecordingLockManager::new()).await?;

    let index = |call: &str| {
        fake.call_index(call)
            .unwrap_or_else(|| panic!("missing call {call}"))
    };
    assert!(index("delete_vm vm-1") < index("delete_network_interface nic-1"));
    assert!(index("delete_vm vm-1") < index("delete_disk vm-1-os"));
    assert!(index("delete_network_interface nic-2") < index("delete_public_ip pip-1"));
    assert!(index("delete_network_interface nic-1") < index("delete_security_group NSG_vm-1"));
    assert!(index("delete_disk vm-1-os") < index("delete_disk data-1"));
    assert!(
        index("delete_security_group NSG_vm-1")
            < index("delete_rule NSG_sandbox_all_subnets_res-1/sandbox-a")
    );
    Ok(())
}

#[tokio::test]
async fn test_second_teardown_is_noop() -> Result<()> {
    let fake = deployed();
    let locks = RecordingLockManager::new();
    teardown(&fake, &RecordingIpPool::new(), &locks).await?;
    fake.clear_calls();

    let report = teardown(&fake, &RecordingIpPool::new(), &locks).await?;

    assert!(!report.vm_found);
    assert!(report.deleted.is_empty());
    assert_eq!(fake.calls(), ["get_vm vm-1"]);
    assert_eq!(locks.released(), ["NSG_vm-1", "NSG_vm-1"]);
    Ok(())
}

#[tokio::test]
async fn test_missing_resources_count_as_deleted() -> Result<()> {
    let fake = deployed();
    fake.remove_disk(VM_RG, "vm-1-os");
    fake.remove_network_interface(VM_RG, "nic-2");

    let report = teardown(&fake, &RecordingIpPool::new(), &RecordingLockManager::new()).await?;

    assert_eq!(
        report.already_absent,
        [
            (ResourceKind::NetworkInterface, "nic-2".to_string()),
            (ResourceKind::OsManagedDisk, "vm-1-os".to_string()),
        ]
    );
    // Later steps still ran
    assert!(!fake.has_disk(VM_RG, "data-1"));
    assert!(!fake.has_security_group(VM_RG, "NSG_vm-1"));
    Ok(())
}

#[tokio::test]
async fn test_failure_stops_plan() {
    let fake = deployed();
    fake.fail(
        "delete_disk vm-1-os",
        AzureError::cloud("OperationNotAllowed: disk is locked"),
    );
    let pool = RecordingIpPool::new();
    let locks = RecordingLockManager::new();

    let err = teardown(&fake, &pool, &locks).await.unwrap_err();

    assert!(format!("{err:#}").contains("Teardown of VM vm-1 stopped at"));
    assert!(!fake.has_vm(VM_RG, VM));
    assert!(!fake.has_public_ip(VM_RG, "pip-1"));
    // Nothing after the failed step
    assert!(fake.has_vhd(&vhd_uri("data-0")));
    assert!(fake.has_disk(VM_RG, "data-1"));
    assert!(fake.has_security_group(VM_RG, "NSG_vm-1"));
    assert_eq!(fake.rules(RESERVATION, SANDBOX_NSG).len(), 2);
    assert!(pool.released().is_empty());
    // The lock is released regardless
    assert_eq!(locks.released(), ["NSG_vm-1"]);
}

#[tokio::test]
async fn test_rerun_after_vm_deleted_plans_nothing() -> Result<()> {
    let fake = deployed();
    fake.fail_times(
        "delete_disk vm-1-os",
        AzureError::cloud("OperationNotAllowed: disk is locked"),
        1,
    );
    let locks = RecordingLockManager::new();

    assert!(teardown(&fake, &RecordingIpPool::new(), &locks).await.is_err());
    let report = teardown(&fake, &RecordingIpPool::new(), &locks).await?;

    // The VM went on the first run, so the second finds nothing to plan
    assert!(!report.vm_found);
    assert!(fake.has_disk(VM_RG, "vm-1-os"));
    Ok(())
}

#[tokio::test]
async fn test_unsupported_os_disk_deletes_nothing() {
    init_test_tracing();
    let fake = FakeAzure::new();
    let (vm, nics) = VmBuilder::new(VM)
        .os_disk(unsupported_os_disk())
        .nic(NicBuilder::new("nic-1"))
        .build(VM_RG);
    fake.deploy_vm(VM_RG, vm, nics);
    let locks = RecordingLockManager::new();

    let err = teardown(&fake, &RecordingIpPool::new(), &locks)
        .await
        .unwrap_err();

    assert_eq!(
        err.downcast_ref::<TeardownError>(),
        Some(&TeardownError::UnsupportedOsDisk {
            vm_name: VM.to_string()
        })
    );
    assert!(fake.calls().iter().all(|call| !call.starts_with("delete_")));
    assert!(fake.has_vm(VM_RG, VM));
    assert_eq!(locks.released(), ["NSG_vm-1"]);
}

#[tokio::test]
async fn test_ip_release_failure_is_swallowed() -> Result<()> {
    let fake = deployed();
    let pool = RecordingIpPool::failing("pool service unavailable");

    let report = teardown(&fake, &pool, &RecordingLockManager::new()).await?;

    assert!(report.released_ips.is_empty());
    assert_eq!(pool.released().len(), 1);
    assert!(!fake.has_vm(VM_RG, VM));
    Ok(())
}

#[tokio::test]
async fn test_lock_failure_surfaces_after_teardown() {
    let fake = deployed();
    let locks = RecordingLockManager::failing("lock service unavailable");

    let err = teardown(&fake, &RecordingIpPool::new(), &locks)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Failed to release lock NSG_vm-1"));
    assert!(!fake.has_vm(VM_RG, VM));
}

#[tokio::test]
async fn test_teardown_error_wins_over_lock_error() {
    let fake = deployed();
    fake.fail("delete_vm vm-1", AzureError::cloud("Conflict: operation in progress"));
    let locks = RecordingLockManager::failing("lock service unavailable");

    let err = teardown(&fake, &RecordingIpPool::new(), &locks)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("Conflict: operation in progress"));
    assert!(!err.to_string().contains("lock"));
}

#[tokio::test]
async fn test_without_sandbox_group() -> Result<()> {
    init_test_tracing();
    let fake = FakeAzure::new();
    let (vm, nics) = VmBuilder::new(VM).build(VM_RG);
    fake.deploy_vm(VM_RG, vm, nics);

    let report = teardown(&fake, &RecordingIpPool::new(), &RecordingLockManager::new()).await?;

    assert!(fake.calls_to("list_rules").is_empty());
    assert!(fake.calls_to("delete_rule").is_empty());
    // The VM's own group never existed
    assert_eq!(
        report.already_absent,
        [(ResourceKind::NetworkSecurityGroup, "NSG_vm-1".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn test_vm_lookup_failure_is_fatal() {
    let fake = deployed();
    fake.fail("get_vm vm-1", AzureError::connection("connection reset"));

    let err = teardown(&fake, &RecordingIpPool::new(), &RecordingLockManager::new())
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("connection reset"));
    assert!(fake.has_vm(VM_RG, VM));
}
