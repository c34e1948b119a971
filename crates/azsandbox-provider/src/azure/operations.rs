//! Cloud client contract

use super::types::{NetworkInterface, NetworkSecurityGroup, VirtualMachine};
use anyhow::Result;
use azsandbox_common::SecurityRule;
use std::future::Future;

/// Azure control-plane operations used by the action sets.
///
/// Every get/delete surfaces a missing resource as
/// [`AzureError::NotFound`](super::error::AzureError::NotFound) somewhere in
/// the error chain so callers can tell "already gone" from a real failure.
/// Implemented by [`AzureClient`](super::client::AzureClient) and by the
/// in-memory fake used in tests.
pub trait AzureOperations: Send + Sync {
    fn get_vm(
        &self,
        resource_group: &str,
        vm_name: &str,
    ) -> impl Future<Output = Result<VirtualMachine>> + Send;

    fn delete_vm(
        &self,
        resource_group: &str,
        vm_name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn get_network_interface(
        &self,
        resource_group: &str,
        interface_name: &str,
    ) -> impl Future<Output = Result<NetworkInterface>> + Send;

    fn delete_network_interface(
        &self,
        resource_group: &str,
        interface_name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_public_ip(
        &self,
        resource_group: &str,
        public_ip_name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a managed disk
    fn delete_disk(
        &self,
        resource_group: &str,
        disk_name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a page blob disk by its URI
    fn delete_vhd(&self, vhd_uri: &str) -> impl Future<Output = Result<()>> + Send;

    fn get_security_group(
        &self,
        resource_group: &str,
        nsg_name: &str,
    ) -> impl Future<Output = Result<NetworkSecurityGroup>> + Send;

    fn create_security_group(
        &self,
        resource_group: &str,
        nsg_name: &str,
        location: &str,
    ) -> impl Future<Output = Result<NetworkSecurityGroup>> + Send;

    fn delete_security_group(
        &self,
        resource_group: &str,
        nsg_name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn security_group_exists(
        &self,
        resource_group: &str,
        nsg_name: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Create or replace a rule on a security group
    fn create_rule(
        &self,
        resource_group: &str,
        nsg_name: &str,
        rule: &SecurityRule,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_rule(
        &self,
        resource_group: &str,
        nsg_name: &str,
        rule_name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn list_rules(
        &self,
        resource_group: &str,
        nsg_name: &str,
    ) -> impl Future<Output = Result<Vec<SecurityRule>>> + Send;
}
