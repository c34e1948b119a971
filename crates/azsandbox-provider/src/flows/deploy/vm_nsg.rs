//! Create the VM's own security group

use crate::actions::NsgActions;
use crate::azure::AzureOperations;
use crate::rollback::RollbackCommand;
use anyhow::Result;
use azsandbox_common::naming::vm_nsg_name;
use futures::FutureExt;
use futures::future::BoxFuture;

pub struct CreateVmNetworkSecurityGroupCommand<'a, C> {
    nsg: NsgActions<'a, C>,
    vm_name: String,
    resource_group: String,
    region: String,
}

impl<'a, C: AzureOperations> CreateVmNetworkSecurityGroupCommand<'a, C> {
    pub fn new(client: &'a C, vm_name: &str, resource_group: &str, region: &str) -> Self {
        Self {
            nsg: NsgActions::new(client),
            vm_name: vm_name.to_string(),
            resource_group: resource_group.to_string(),
            region: region.to_string(),
        }
    }

    pub fn nsg_name(&self) -> String {
        vm_nsg_name(&self.vm_name)
    }
}

impl<C: AzureOperations> RollbackCommand for CreateVmNetworkSecurityGroupCommand<'_, C> {
    fn describe(&self) -> String {
        format!("create security group {}", self.nsg_name())
    }

    fn execute(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.nsg
                .create_vm_network_security_group(&self.vm_name, &self.resource_group, &self.region)
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn rollback(&self) -> BoxFuture<'_, Result<()>> {
        self.nsg
            .delete_vm_network_security_group(&self.vm_name, &self.resource_group)
            .boxed()
    }
}
