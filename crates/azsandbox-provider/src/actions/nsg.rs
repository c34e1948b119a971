//! Network security group actions
//!
//! CRUD over security groups plus the custom-rule lifecycle. Rules created
//! through [`NsgActions::create_custom_nsg_rule`] carry the
//! [`CUSTOM_RULE_PREFIX`] and are the only ones removed by
//! [`NsgActions::delete_custom_nsg_rules`].

use crate::azure::AzureOperations;
use crate::azure::types::NetworkSecurityGroup;
use anyhow::{Context, Result};
use azsandbox_common::naming::{CUSTOM_RULE_PREFIX, custom_rule_name, is_custom_rule, vm_nsg_name};
use azsandbox_common::rule::{ADDRESS_INTERNET, ANY};
use azsandbox_common::{RuleAccess, RuleProtocol, SecurityRule};
use tracing::{debug, info};

/// Parameters of a custom rule; unset fields take the documented defaults
#[derive(Debug, Clone, Default)]
pub struct CustomRule {
    pub vm_name: String,
    pub priority: u32,
    /// Defaults to `Internet`
    pub dst_address: Option<String>,
    /// Defaults to `Internet`
    pub src_address: Option<String>,
    pub dst_port_from: Option<u16>,
    pub dst_port_to: Option<u16>,
    /// Defaults to any protocol
    pub protocol: Option<RuleProtocol>,
}

impl CustomRule {
    /// `*` with no ports, a single port when both ends match, else `from-to`.
    /// A lone bound is treated as a single port.
    pub fn dst_port_range(&self) -> String {
        match (self.dst_port_from, self.dst_port_to) {
            (None, None) => ANY.to_string(),
            (Some(port), None) | (None, Some(port)) => port.to_string(),
            (Some(from), Some(to)) if from == to => from.to_string(),
            (Some(from), Some(to)) => format!("{from}-{to}"),
        }
    }

    /// Build the security rule, including its deterministic name
    pub fn to_rule(&self) -> SecurityRule {
        let dst_address = self.dst_address.as_deref().unwrap_or(ADDRESS_INTERNET);
        let src_address = self.src_address.as_deref().unwrap_or(ADDRESS_INTERNET);
        let protocol = self.protocol.unwrap_or_default();
        let dst_port_range = self.dst_port_range();

        SecurityRule {
            source_address_prefix: src_address.to_string(),
            destination_address_prefix: dst_address.to_string(),
            destination_port_range: dst_port_range.clone(),
            protocol,
            ..SecurityRule::inbound_allow(
                custom_rule_name(&self.vm_name, dst_address, &dst_port_range, protocol.as_str()),
                self.priority,
            )
        }
    }
}

pub struct NsgActions<'a, C> {
    client: &'a C,
}

impl<'a, C: AzureOperations> NsgActions<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn create_network_security_group(
        &self,
        nsg_name: &str,
        resource_group: &str,
        region: &str,
    ) -> Result<NetworkSecurityGroup> {
        info!(nsg_name = %nsg_name, region = %region, "Creating network security group");
        self.client
            .create_security_group(resource_group, nsg_name, region)
            .await
            .with_context(|| format!("Failed to create network security group {nsg_name}"))
    }

    pub async fn get_network_security_group(
        &self,
        nsg_name: &str,
        resource_group: &str,
    ) -> Result<NetworkSecurityGroup> {
        debug!(nsg_name = %nsg_name, "Getting network security group");
        self.client
            .get_security_group(resource_group, nsg_name)
            .await
            .with_context(|| format!("Failed to get network security group {nsg_name}"))
    }

    pub async fn network_security_group_exists(
        &self,
        nsg_name: &str,
        resource_group: &str,
    ) -> Result<bool> {
        debug!(nsg_name = %nsg_name, "Checking network security group exists");
        self.client
            .security_group_exists(resource_group, nsg_name)
            .await
            .with_context(|| format!("Failed to check network security group {nsg_name}"))
    }

    pub async fn delete_network_security_group(
        &self,
        nsg_name: &str,
        resource_group: &str,
    ) -> Result<()> {
        info!(nsg_name = %nsg_name, "Deleting network security group");
        self.client
            .delete_security_group(resource_group, nsg_name)
            .await
            .with_context(|| format!("Failed to delete network security group {nsg_name}"))
    }

    pub async fn create_vm_network_security_group(
        &self,
        vm_name: &str,
        resource_group: &str,
        region: &str,
    ) -> Result<NetworkSecurityGroup> {
        self.create_network_security_group(&vm_nsg_name(vm_name), resource_group, region)
            .await
    }

    pub async fn get_vm_network_security_group(
        &self,
        vm_name: &str,
        resource_group: &str,
    ) -> Result<NetworkSecurityGroup> {
        self.get_network_security_group(&vm_nsg_name(vm_name), resource_group)
            .await
    }

    pub async fn delete_vm_network_security_group(
        &self,
        vm_name: &str,
        resource_group: &str,
    ) -> Result<()> {
        self.delete_network_security_group(&vm_nsg_name(vm_name), resource_group)
            .await
    }

    /// Create a `custom_rule_`-prefixed allow rule
    pub async fn create_custom_nsg_rule(
        &self,
        nsg_name: &str,
        resource_group: &str,
        custom: &CustomRule,
    ) -> Result<SecurityRule> {
        let rule = custom.to_rule();
        self.create_nsg_allow_rule(nsg_name, resource_group, rule)
            .await
    }

    /// Create an inbound allow rule
    pub async fn create_nsg_allow_rule(
        &self,
        nsg_name: &str,
        resource_group: &str,
        rule: SecurityRule,
    ) -> Result<SecurityRule> {
        let rule = SecurityRule {
            access: RuleAccess::Allow,
            ..rule
        };
        self.create_rule(nsg_name, resource_group, rule).await
    }

    /// Create an inbound deny rule; the protocol is always `*`
    pub async fn create_nsg_deny_rule(
        &self,
        nsg_name: &str,
        resource_group: &str,
        rule: SecurityRule,
    ) -> Result<SecurityRule> {
        let rule = SecurityRule {
            access: RuleAccess::Deny,
            protocol: RuleProtocol::Any,
            ..rule
        };
        self.create_rule(nsg_name, resource_group, rule).await
    }

    async fn create_rule(
        &self,
        nsg_name: &str,
        resource_group: &str,
        rule: SecurityRule,
    ) -> Result<SecurityRule> {
        info!(
            rule_name = %rule.name,
            nsg_name = %nsg_name,
            priority = rule.priority,
            access = ?rule.access,
            "Creating security rule"
        );
        self.client
            .create_rule(resource_group, nsg_name, &rule)
            .await
            .with_context(|| {
                format!("Failed to create security rule {} on {nsg_name}", rule.name)
            })?;
        Ok(rule)
    }

    pub async fn delete_nsg_rule(
        &self,
        rule_name: &str,
        nsg_name: &str,
        resource_group: &str,
    ) -> Result<()> {
        info!(rule_name = %rule_name, nsg_name = %nsg_name, "Deleting security rule");
        self.client
            .delete_rule(resource_group, nsg_name, rule_name)
            .await
            .with_context(|| format!("Failed to delete security rule {rule_name} on {nsg_name}"))
    }

    pub async fn get_nsg_rules(
        &self,
        nsg_name: &str,
        resource_group: &str,
    ) -> Result<Vec<SecurityRule>> {
        self.client
            .list_rules(resource_group, nsg_name)
            .await
            .with_context(|| format!("Failed to list security rules on {nsg_name}"))
    }

    /// Delete every rule whose name starts with [`CUSTOM_RULE_PREFIX`].
    ///
    /// Returns the names of the deleted rules.
    pub async fn delete_custom_nsg_rules(
        &self,
        nsg_name: &str,
        resource_group: &str,
    ) -> Result<Vec<String>> {
        let rules = self.get_nsg_rules(nsg_name, resource_group).await?;
        let mut deleted = Vec::new();

        for rule in rules.into_iter().filter(|r| is_custom_rule(&r.name)) {
            self.delete_nsg_rule(&rule.name, nsg_name, resource_group)
                .await?;
            deleted.push(rule.name);
        }

        debug!(
            nsg_name = %nsg_name,
            prefix = CUSTOM_RULE_PREFIX,
            count = deleted.len(),
            "Deleted custom security rules"
        );
        Ok(deleted)
    }
}
