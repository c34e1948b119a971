//! Disk actions

use crate::azure::AzureOperations;
use anyhow::{Context, Result};
use tracing::info;

pub struct StorageActions<'a, C> {
    client: &'a C,
}

impl<'a, C: AzureOperations> StorageActions<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Delete a managed disk
    pub async fn delete_disk(&self, disk_name: &str, resource_group: &str) -> Result<()> {
        info!(disk_name = %disk_name, "Deleting managed disk");
        self.client
            .delete_disk(resource_group, disk_name)
            .await
            .with_context(|| format!("Failed to delete disk {disk_name}"))
    }

    /// Delete a page blob disk
    pub async fn delete_vhd_disk(&self, vhd_uri: &str) -> Result<()> {
        info!(vhd_uri = %vhd_uri, "Deleting VHD");
        self.client
            .delete_vhd(vhd_uri)
            .await
            .with_context(|| format!("Failed to delete VHD {vhd_uri}"))
    }
}
