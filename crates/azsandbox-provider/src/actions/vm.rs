//! Virtual machine actions

use crate::azure::AzureOperations;
use crate::azure::types::VirtualMachine;
use anyhow::{Context, Result};
use tracing::info;

pub struct VmActions<'a, C> {
    client: &'a C,
}

impl<'a, C: AzureOperations> VmActions<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn get_vm(&self, vm_name: &str, resource_group: &str) -> Result<VirtualMachine> {
        info!(vm_name = %vm_name, resource_group = %resource_group, "Getting VM");
        self.client
            .get_vm(resource_group, vm_name)
            .await
            .with_context(|| format!("Failed to get VM {vm_name}"))
    }

    pub async fn delete_vm(&self, vm_name: &str, resource_group: &str) -> Result<()> {
        info!(vm_name = %vm_name, resource_group = %resource_group, "Deleting VM");
        self.client
            .delete_vm(resource_group, vm_name)
            .await
            .with_context(|| format!("Failed to delete VM {vm_name}"))
    }
}
