//! Open an inbound port on a VM's security group

use crate::actions::NsgActions;
use crate::azure::AzureOperations;
use crate::rollback::RollbackCommand;
use anyhow::Result;
use azsandbox_common::defaults::INBOUND_RULE_START_PRIORITY;
use azsandbox_common::naming::inbound_port_rule_name;
use azsandbox_common::{PortRule, PortRuleError, PriorityGenerator, RuleProtocol, SecurityRule};
use futures::FutureExt;
use futures::future::BoxFuture;

/// Allow rule for one inbound port spec (`80`, `20-80`, `22:tcp`, `80-50000:udp`).
///
/// The port spec is parsed and the rule name computed once, at
/// construction; rollback deletes the rule by that name.
pub struct CreateAllowVmInboundPortRuleCommand<'a, C> {
    nsg: NsgActions<'a, C>,
    priorities: &'a PriorityGenerator,
    nsg_name: String,
    resource_group: String,
    port_rule: PortRule,
    rule_name: String,
}

impl<'a, C: AzureOperations> CreateAllowVmInboundPortRuleCommand<'a, C> {
    pub fn new(
        client: &'a C,
        priorities: &'a PriorityGenerator,
        nsg_name: &str,
        vm_name: &str,
        resource_group: &str,
        inbound_port: &str,
    ) -> Result<Self, PortRuleError> {
        let port_rule = PortRule::parse(inbound_port)?;
        Ok(Self::with_port_rule(
            client,
            priorities,
            nsg_name,
            vm_name,
            resource_group,
            port_rule,
        ))
    }

    /// Build from an already parsed port rule
    pub fn with_port_rule(
        client: &'a C,
        priorities: &'a PriorityGenerator,
        nsg_name: &str,
        vm_name: &str,
        resource_group: &str,
        port_rule: PortRule,
    ) -> Self {
        let (port_range, protocol) = port_rule.as_pair();
        let rule_name = inbound_port_rule_name(vm_name, port_range, protocol);
        Self {
            nsg: NsgActions::new(client),
            priorities,
            nsg_name: nsg_name.to_string(),
            resource_group: resource_group.to_string(),
            port_rule,
            rule_name,
        }
    }

    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    pub fn port_rule(&self) -> &PortRule {
        &self.port_rule
    }

    async fn create(&self) -> Result<()> {
        let priority = self.priorities.next_priority(INBOUND_RULE_START_PRIORITY)?;
        let rule = SecurityRule {
            destination_port_range: self.port_rule.port_range().to_string(),
            protocol: RuleProtocol::from(self.port_rule.protocol()),
            ..SecurityRule::inbound_allow(self.rule_name.clone(), priority)
        };
        self.nsg
            .create_nsg_allow_rule(&self.nsg_name, &self.resource_group, rule)
            .await?;
        Ok(())
    }
}

impl<C: AzureOperations> RollbackCommand for CreateAllowVmInboundPortRuleCommand<'_, C> {
    fn describe(&self) -> String {
        format!("create inbound rule {} on {}", self.rule_name, self.nsg_name)
    }

    fn execute(&self) -> BoxFuture<'_, Result<()>> {
        self.create().boxed()
    }

    fn rollback(&self) -> BoxFuture<'_, Result<()>> {
        self.nsg
            .delete_nsg_rule(&self.rule_name, &self.nsg_name, &self.resource_group)
            .boxed()
    }
}
