//! Network interface and public IP actions

use crate::azure::AzureOperations;
use crate::azure::types::{IpAllocationMethod, NetworkInterface};
use anyhow::{Context, Result};
use tracing::info;

pub struct NetworkActions<'a, C> {
    client: &'a C,
}

impl<'a, C: AzureOperations> NetworkActions<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    pub async fn get_vm_network(
        &self,
        interface_name: &str,
        resource_group: &str,
    ) -> Result<NetworkInterface> {
        info!(interface_name = %interface_name, "Getting network interface");
        self.client
            .get_network_interface(resource_group, interface_name)
            .await
            .with_context(|| format!("Failed to get network interface {interface_name}"))
    }

    pub async fn delete_vm_network(
        &self,
        interface_name: &str,
        resource_group: &str,
    ) -> Result<()> {
        info!(interface_name = %interface_name, "Deleting network interface");
        self.client
            .delete_network_interface(resource_group, interface_name)
            .await
            .with_context(|| format!("Failed to delete network interface {interface_name}"))
    }

    pub async fn delete_public_ip(&self, public_ip_name: &str, resource_group: &str) -> Result<()> {
        info!(public_ip_name = %public_ip_name, "Deleting public IP");
        self.client
            .delete_public_ip(resource_group, public_ip_name)
            .await
            .with_context(|| format!("Failed to delete public IP {public_ip_name}"))
    }
}

pub fn is_static_ip_allocation_type(method: IpAllocationMethod) -> bool {
    method == IpAllocationMethod::Static
}
