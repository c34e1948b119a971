//! Integration tests for inbound port provisioning and its rollback

use anyhow::Result;
use azsandbox_common::SecurityRule;
use azsandbox_provider::azure::AzureError;
use azsandbox_provider::flows::{
    OpenPortsRequest, open_inbound_ports, provision_vm_security_group,
};
use azsandbox_provider::rollback::{CancellationManager, RollbackError};
use azsandbox_test_utils::{FakeAzure, init_test_tracing};

const VM: &str = "vm-1";
const RG: &str = "vm-rg";
const NSG: &str = "NSG_vm-1";

fn ports(specs: &[&str]) -> Vec<String> {
    specs.iter().map(|s| s.to_string()).collect()
}

fn with_group(rules: Vec<SecurityRule>) -> FakeAzure {
    init_test_tracing();
    let fake = FakeAzure::new();
    fake.insert_security_group(RG, NSG, rules);
    fake
}

async fn open(
    fake: &FakeAzure,
    cancellation: &CancellationManager,
    specs: &[&str],
) -> Result<Vec<String>> {
    let ports = ports(specs);
    let request = OpenPortsRequest {
        vm_name: VM,
        nsg_name: NSG,
        resource_group: RG,
        ports: &ports,
    };
    open_inbound_ports(fake, cancellation, &request).await
}

#[tokio::test]
async fn test_open_ports_skips_used_priorities() -> Result<()> {
    let fake = with_group(vec![
        SecurityRule::inbound_allow("existing-a", 1000),
        SecurityRule::inbound_allow("existing-b", 1002),
    ]);

    let created = open(&fake, &CancellationManager::new(), &["80", "20-80", "53:UDP"]).await?;

    assert_eq!(
        created,
        [
            "vm-1_inbound_port:80:tcp",
            "vm-1_inbound_port:20-80:tcp",
            "vm-1_inbound_port:53:udp",
        ]
    );

    let rules = fake.rules(RG, NSG);
    let by_name = |name: &str| {
        rules
            .iter()
            .find(|rule| rule.name == name)
            .unwrap_or_else(|| panic!("missing rule {name}"))
            .clone()
    };
    assert_eq!(by_name("vm-1_inbound_port:80:tcp").priority, 1001);
    assert_eq!(by_name("vm-1_inbound_port:20-80:tcp").priority, 1003);
    let udp = by_name("vm-1_inbound_port:53:udp");
    assert_eq!(udp.priority, 1004);
    assert_eq!(udp.destination_port_range, "53");
    assert_eq!(udp.protocol.as_arm_str(), "Udp");
    assert_eq!(udp.source_address_prefix, "Internet");
    Ok(())
}

#[tokio::test]
async fn test_failed_rule_rolls_back_earlier_rules() {
    let fake = with_group(vec![SecurityRule::inbound_allow("existing", 1000)]);
    fake.fail(
        "create_rule NSG_vm-1/vm-1_inbound_port:53:udp",
        AzureError::cloud("InvalidSecurityRule: bad range"),
    );

    let err = open(&fake, &CancellationManager::new(), &["80", "443", "53:udp"])
        .await
        .unwrap_err();

    // The original failure is returned, not a rollback outcome
    assert!(format!("{err:#}").contains("InvalidSecurityRule: bad range"));
    assert_eq!(fake.rule_names(RG, NSG), ["existing"]);
    assert_eq!(
        fake.calls_to("delete_rule"),
        [
            "delete_rule NSG_vm-1/vm-1_inbound_port:443:tcp",
            "delete_rule NSG_vm-1/vm-1_inbound_port:80:tcp",
        ]
    );
}

#[tokio::test]
async fn test_invalid_port_makes_no_cloud_calls() {
    let fake = with_group(vec![]);

    let err = open(&fake, &CancellationManager::new(), &["80", "http"])
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Value 'http' is not a valid port rule");
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_first_rule() {
    let fake = with_group(vec![]);
    let cancellation = CancellationManager::new();
    cancellation.cancel();

    let err = open(&fake, &cancellation, &["80"]).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<RollbackError>(),
        Some(RollbackError::Cancelled { .. })
    ));
    assert!(fake.calls_to("create_rule").is_empty());
    assert!(fake.rules(RG, NSG).is_empty());
}

#[tokio::test]
async fn test_missing_group_fails_before_rules() {
    init_test_tracing();
    let fake = FakeAzure::new();

    let err = open(&fake, &CancellationManager::new(), &["80"])
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("Failed to list security rules on NSG_vm-1"));
    assert!(fake.calls_to("create_rule").is_empty());
}

#[tokio::test]
async fn test_provision_vm_security_group() -> Result<()> {
    init_test_tracing();
    let fake = FakeAzure::new();

    let nsg = provision_vm_security_group(
        &fake,
        &CancellationManager::new(),
        VM,
        RG,
        "northeurope",
        &ports(&["22", "8080-8090:tcp"]),
    )
    .await?;

    assert_eq!(nsg, NSG);
    assert!(fake.has_security_group(RG, NSG));
    let priorities: Vec<u32> = fake.rules(RG, NSG).iter().map(|r| r.priority).collect();
    assert_eq!(priorities, [1000, 1001]);
    assert_eq!(
        fake.rule_names(RG, NSG),
        ["vm-1_inbound_port:22:tcp", "vm-1_inbound_port:8080-8090:tcp"]
    );
    Ok(())
}

#[tokio::test]
async fn test_provision_rollback_removes_group() {
    init_test_tracing();
    let fake = FakeAzure::new();
    fake.fail(
        "create_rule NSG_vm-1/vm-1_inbound_port:443:tcp",
        AzureError::connection("connection reset"),
    );

    let err = provision_vm_security_group(
        &fake,
        &CancellationManager::new(),
        VM,
        RG,
        "westeurope",
        &ports(&["80", "443"]),
    )
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("connection reset"));
    assert!(!fake.has_security_group(RG, NSG));
    let rule_delete = fake
        .call_index("delete_rule NSG_vm-1/vm-1_inbound_port:80:tcp")
        .unwrap();
    let group_delete = fake.call_index("delete_security_group NSG_vm-1").unwrap();
    assert!(rule_delete < group_delete);
}

#[tokio::test]
async fn test_rollback_failure_does_not_stop_unwind() {
    init_test_tracing();
    let fake = FakeAzure::new();
    fake.fail(
        "create_rule NSG_vm-1/vm-1_inbound_port:443:tcp",
        AzureError::cloud("QuotaExceeded"),
    );
    fake.fail(
        "delete_rule NSG_vm-1/vm-1_inbound_port:80:tcp",
        AzureError::cloud("InternalServerError"),
    );

    let err = provision_vm_security_group(
        &fake,
        &CancellationManager::new(),
        VM,
        RG,
        "westeurope",
        &ports(&["80", "443"]),
    )
    .await
    .unwrap_err();

    let rendered = format!("{err:#}");
    assert!(rendered.contains("QuotaExceeded"));
    assert!(!rendered.contains("InternalServerError"));
    // The group delete still ran after the rule delete failed
    assert!(!fake.has_security_group(RG, NSG));
}
