//! Integration tests for security group actions

use anyhow::Result;
use azsandbox_common::naming::vm_nsg_name;
use azsandbox_common::{RuleAccess, RuleProtocol, SecurityRule};
use azsandbox_provider::actions::{CustomRule, NsgActions};
use azsandbox_provider::azure::AzureError;
use azsandbox_test_utils::{FakeAzure, init_test_tracing, unique_vm_name};

const RG: &str = "res-1";
const NSG: &str = "NSG_sandbox_all_subnets_res-1";

fn sandbox_group() -> FakeAzure {
    init_test_tracing();
    let fake = FakeAzure::new();
    fake.insert_security_group(RG, NSG, vec![]);
    fake
}

#[tokio::test]
async fn test_custom_rule_defaults() -> Result<()> {
    let fake = sandbox_group();
    let custom = CustomRule {
        vm_name: "vm-1".to_string(),
        priority: 2000,
        dst_port_from: Some(443),
        ..Default::default()
    };

    let rule = NsgActions::new(&fake)
        .create_custom_nsg_rule(NSG, RG, &custom)
        .await?;

    assert_eq!(rule.name, "custom_rule_vm-1_Internet_port:443:*");
    assert_eq!(rule.access, RuleAccess::Allow);
    assert_eq!(rule.source_address_prefix, "Internet");
    assert_eq!(rule.destination_address_prefix, "Internet");
    assert_eq!(rule.protocol, RuleProtocol::Any);
    assert_eq!(fake.rules(RG, NSG), [rule]);
    Ok(())
}

#[tokio::test]
async fn test_delete_custom_rules_keeps_others() -> Result<()> {
    let fake = sandbox_group();
    let actions = NsgActions::new(&fake);
    let ssh = SecurityRule::inbound_allow("vm-1_inbound_port:22:tcp", 1000);
    actions.create_nsg_allow_rule(NSG, RG, ssh).await?;
    for (priority, port) in [(2000, 80), (2001, 8080)] {
        actions
            .create_custom_nsg_rule(
                NSG,
                RG,
                &CustomRule {
                    vm_name: "vm-1".to_string(),
                    priority,
                    dst_address: Some("10.0.0.4".to_string()),
                    dst_port_from: Some(port),
                    dst_port_to: Some(port),
                    protocol: Some(RuleProtocol::Tcp),
                    ..Default::default()
                },
            )
            .await?;
    }

    let deleted = actions.delete_custom_nsg_rules(NSG, RG).await?;

    assert_eq!(
        deleted,
        [
            "custom_rule_vm-1_10.0.0.4_port:80:tcp",
            "custom_rule_vm-1_10.0.0.4_port:8080:tcp",
        ]
    );
    assert_eq!(fake.rule_names(RG, NSG), ["vm-1_inbound_port:22:tcp"]);
    Ok(())
}

#[tokio::test]
async fn test_delete_custom_rules_on_empty_group() -> Result<()> {
    let fake = sandbox_group();
    let deleted = NsgActions::new(&fake)
        .delete_custom_nsg_rules(NSG, RG)
        .await?;
    assert!(deleted.is_empty());
    assert!(fake.calls_to("delete_rule").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_deny_rule_forces_any_protocol() -> Result<()> {
    let fake = sandbox_group();
    let rule = SecurityRule {
        protocol: RuleProtocol::Tcp,
        ..SecurityRule::inbound_allow("deny-internet", 4000)
    };

    let created = NsgActions::new(&fake)
        .create_nsg_deny_rule(NSG, RG, rule)
        .await?;

    assert_eq!(created.access, RuleAccess::Deny);
    assert_eq!(created.protocol, RuleProtocol::Any);
    assert_eq!(fake.rules(RG, NSG), [created]);
    Ok(())
}

#[tokio::test]
async fn test_vm_security_group_lifecycle() -> Result<()> {
    init_test_tracing();
    let fake = FakeAzure::new();
    let actions = NsgActions::new(&fake);
    let vm_name = unique_vm_name();
    let nsg_name = vm_nsg_name(&vm_name);

    let nsg = actions
        .create_vm_network_security_group(&vm_name, "vm-rg", "westeurope")
        .await?;
    assert_eq!(nsg.name, nsg_name);
    assert_eq!(nsg.location, "westeurope");
    assert!(actions.network_security_group_exists(&nsg_name, "vm-rg").await?);
    assert_eq!(
        actions.get_vm_network_security_group(&vm_name, "vm-rg").await?,
        nsg
    );

    actions.delete_vm_network_security_group(&vm_name, "vm-rg").await?;
    assert!(!actions.network_security_group_exists(&nsg_name, "vm-rg").await?);
    assert!(!fake.has_security_group("vm-rg", &nsg_name));
    Ok(())
}

#[tokio::test]
async fn test_delete_missing_rule_is_not_found() {
    let fake = sandbox_group();
    let err = NsgActions::new(&fake)
        .delete_nsg_rule("ghost", NSG, RG)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Failed to delete security rule ghost"));
    assert!(
        err.chain()
            .filter_map(|cause| cause.downcast_ref::<AzureError>())
            .any(AzureError::is_not_found)
    );
}
