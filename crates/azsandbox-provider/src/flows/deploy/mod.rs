//! Provisioning-time security group commands
//!
//! Each flow parses every port spec before the first cloud call, then runs
//! its commands through one [`RollbackManager`] so a failure part-way leaves
//! nothing behind.

mod inbound_port_rule;
mod vm_nsg;

pub use inbound_port_rule::CreateAllowVmInboundPortRuleCommand;
pub use vm_nsg::CreateVmNetworkSecurityGroupCommand;

use crate::actions::NsgActions;
use crate::azure::AzureOperations;
use crate::rollback::{CancellationManager, RollbackCommand, RollbackManager};
use anyhow::Result;
use azsandbox_common::naming::vm_nsg_name;
use azsandbox_common::{PortRule, PriorityGenerator};
use tracing::info;

/// Inbound ports to open on an existing security group
#[derive(Debug, Clone)]
pub struct OpenPortsRequest<'a> {
    pub vm_name: &'a str,
    pub nsg_name: &'a str,
    pub resource_group: &'a str,
    pub ports: &'a [String],
}

fn parse_ports(ports: &[String]) -> Result<Vec<PortRule>> {
    Ok(ports
        .iter()
        .map(|port| PortRule::parse(port))
        .collect::<Result<Vec<_>, _>>()?)
}

/// Open inbound ports on an existing security group.
///
/// Priorities start at 1000 and skip every priority already used in the
/// group. Returns the created rule names.
pub async fn open_inbound_ports<C: AzureOperations>(
    client: &C,
    cancellation: &CancellationManager,
    request: &OpenPortsRequest<'_>,
) -> Result<Vec<String>> {
    let port_rules = parse_ports(request.ports)?;

    let existing = NsgActions::new(client)
        .get_nsg_rules(request.nsg_name, request.resource_group)
        .await?;
    let priorities = PriorityGenerator::with_reserved(existing.iter().map(|rule| rule.priority));

    let commands: Vec<_> = port_rules
        .into_iter()
        .map(|port_rule| {
            CreateAllowVmInboundPortRuleCommand::with_port_rule(
                client,
                &priorities,
                request.nsg_name,
                request.vm_name,
                request.resource_group,
                port_rule,
            )
        })
        .collect();
    let rule_names: Vec<String> = commands.iter().map(|c| c.rule_name().to_string()).collect();

    let boxed = commands
        .into_iter()
        .map(|command| Box::new(command) as Box<dyn RollbackCommand + '_>)
        .collect();

    let mut manager = RollbackManager::new(cancellation.clone());
    manager.execute_all(boxed).await?;
    manager.commit();

    info!(
        vm_name = %request.vm_name,
        nsg_name = %request.nsg_name,
        rules = rule_names.len(),
        "Opened inbound ports"
    );
    Ok(rule_names)
}

/// Create the VM security group `NSG_<vm_name>` with its inbound port rules.
///
/// If any rule fails, the rules already created and the group itself are
/// deleted again.
pub async fn provision_vm_security_group<C: AzureOperations>(
    client: &C,
    cancellation: &CancellationManager,
    vm_name: &str,
    resource_group: &str,
    region: &str,
    ports: &[String],
) -> Result<String> {
    let port_rules = parse_ports(ports)?;
    let nsg_name = vm_nsg_name(vm_name);
    let priorities = PriorityGenerator::new();

    let mut commands: Vec<Box<dyn RollbackCommand + '_>> = vec![Box::new(
        CreateVmNetworkSecurityGroupCommand::new(client, vm_name, resource_group, region),
    )];
    for port_rule in port_rules {
        commands.push(Box::new(CreateAllowVmInboundPortRuleCommand::with_port_rule(
            client,
            &priorities,
            &nsg_name,
            vm_name,
            resource_group,
            port_rule,
        )));
    }

    let mut manager = RollbackManager::new(cancellation.clone());
    manager.execute_all(commands).await?;
    manager.commit();

    info!(vm_name = %vm_name, nsg_name = %nsg_name, "Provisioned VM security group");
    Ok(nsg_name)
}
