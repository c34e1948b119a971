//! In-memory control plane
//!
//! [`FakeAzure`] implements [`AzureOperations`] over a mutex-guarded map of
//! resources. Every call is appended to a log as `"<operation> <name>"`
//! (rules as `"<operation> <nsg>/<rule>"`), and the same string keys fault
//! injection, so a test can say "fail `delete_disk vm-1-os` once".

use anyhow::Result;
use azsandbox_common::SecurityRule;
use azsandbox_provider::azure::types::{
    DataDisk, DiskStorage, NetworkInterface, NetworkSecurityGroup, VirtualMachine,
};
use azsandbox_provider::azure::{AzureError, AzureOperations};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::fixtures::resource_id;

type Key = (String, String);

fn key(resource_group: &str, name: &str) -> Key {
    (resource_group.to_string(), name.to_string())
}

#[derive(Debug, Default)]
struct State {
    vms: HashMap<Key, VirtualMachine>,
    nics: HashMap<Key, NetworkInterface>,
    public_ips: HashSet<Key>,
    disks: HashSet<Key>,
    vhds: HashSet<String>,
    nsgs: HashMap<Key, NetworkSecurityGroup>,
}

#[derive(Debug)]
struct Fault {
    error: AzureError,
    /// `None` fails forever
    remaining: Option<usize>,
}

/// In-memory Azure with call log and fault injection
#[derive(Debug, Default)]
pub struct FakeAzure {
    state: Mutex<State>,
    faults: Mutex<HashMap<String, Fault>>,
    calls: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl FakeAzure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a VM, its interfaces, their public IPs and its disks
    pub fn deploy_vm(&self, resource_group: &str, vm: VirtualMachine, nics: Vec<NetworkInterface>) {
        let mut state = lock(&self.state);

        let disks = std::iter::once(vm.storage_profile.os_disk.storage())
            .flatten()
            .chain(vm.storage_profile.data_disks.iter().map(DataDisk::storage));
        for storage in disks {
            match storage {
                DiskStorage::Vhd { uri } => {
                    state.vhds.insert(uri.to_string());
                }
                DiskStorage::Managed { name } => {
                    state.disks.insert(key(resource_group, name));
                }
            }
        }

        for nic in nics {
            if let Some(ip) = nic.public_ip_name() {
                state.public_ips.insert(key(resource_group, ip));
            }
            state.nics.insert(key(resource_group, &nic.name), nic);
        }

        state.vms.insert(key(resource_group, &vm.name), vm);
    }

    pub fn insert_security_group(
        &self,
        resource_group: &str,
        nsg_name: &str,
        rules: Vec<SecurityRule>,
    ) {
        let nsg = NetworkSecurityGroup {
            name: nsg_name.to_string(),
            id: resource_id(
                resource_group,
                "Microsoft.Network/networkSecurityGroups",
                nsg_name,
            ),
            location: "westeurope".to_string(),
            security_rules: rules,
        };
        lock(&self.state).nsgs.insert(key(resource_group, nsg_name), nsg);
    }

    /// Remove a network interface behind the VM's back
    pub fn remove_network_interface(&self, resource_group: &str, nic_name: &str) {
        lock(&self.state).nics.remove(&key(resource_group, nic_name));
    }

    /// Remove a managed disk behind the VM's back
    pub fn remove_disk(&self, resource_group: &str, disk_name: &str) {
        lock(&self.state).disks.remove(&key(resource_group, disk_name));
    }

    /// Fail every call matching `call` with `error`
    pub fn fail(&self, call: &str, error: AzureError) {
        lock(&self.faults).insert(
            call.to_string(),
            Fault {
                error,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` calls matching `call`, then succeed
    pub fn fail_times(&self, call: &str, error: AzureError, times: usize) {
        lock(&self.faults).insert(
            call.to_string(),
            Fault {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Calls whose operation is `operation`
    pub fn calls_to(&self, operation: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Position of `call` in the log
    pub fn call_index(&self, call: &str) -> Option<usize> {
        lock(&self.calls).iter().position(|c| c == call)
    }

    pub fn has_vm(&self, resource_group: &str, vm_name: &str) -> bool {
        lock(&self.state).vms.contains_key(&key(resource_group, vm_name))
    }

    pub fn has_network_interface(&self, resource_group: &str, nic_name: &str) -> bool {
        lock(&self.state).nics.contains_key(&key(resource_group, nic_name))
    }

    pub fn has_public_ip(&self, resource_group: &str, ip_name: &str) -> bool {
        lock(&self.state).public_ips.contains(&key(resource_group, ip_name))
    }

    pub fn has_disk(&self, resource_group: &str, disk_name: &str) -> bool {
        lock(&self.state).disks.contains(&key(resource_group, disk_name))
    }

    pub fn has_vhd(&self, uri: &str) -> bool {
        lock(&self.state).vhds.contains(uri)
    }

    pub fn has_security_group(&self, resource_group: &str, nsg_name: &str) -> bool {
        lock(&self.state).nsgs.contains_key(&key(resource_group, nsg_name))
    }

    /// Rules of a security group; empty if the group does not exist
    pub fn rules(&self, resource_group: &str, nsg_name: &str) -> Vec<SecurityRule> {
        lock(&self.state)
            .nsgs
            .get(&key(resource_group, nsg_name))
            .map(|nsg| nsg.security_rules.clone())
            .unwrap_or_default()
    }

    pub fn rule_names(&self, resource_group: &str, nsg_name: &str) -> Vec<String> {
        self.rules(resource_group, nsg_name)
            .into_iter()
            .map(|rule| rule.name)
            .collect()
    }

    /// Log the call and return its injected fault, if any
    fn record(&self, call: String) -> Result<()> {
        let fault = {
            let mut faults = lock(&self.faults);
            match faults.get_mut(&call) {
                Some(Fault {
                    remaining: Some(0), ..
                }) => None,
                Some(fault) => {
                    if let Some(remaining) = fault.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    Some(fault.error.clone())
                }
                None => None,
            }
        };
        lock(&self.calls).push(call);
        match fault {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

fn not_found(resource_type: &'static str, name: &str) -> anyhow::Error {
    AzureError::not_found(resource_type, name).into()
}

impl AzureOperations for FakeAzure {
    async fn get_vm(&self, resource_group: &str, vm_name: &str) -> Result<VirtualMachine> {
        self.record(format!("get_vm {vm_name}"))?;
        lock(&self.state)
            .vms
            .get(&key(resource_group, vm_name))
            .cloned()
            .ok_or_else(|| not_found("virtual machine", vm_name))
    }

    async fn delete_vm(&self, resource_group: &str, vm_name: &str) -> Result<()> {
        self.record(format!("delete_vm {vm_name}"))?;
        lock(&self.state)
            .vms
            .remove(&key(resource_group, vm_name))
            .map(drop)
            .ok_or_else(|| not_found("virtual machine", vm_name))
    }

    async fn get_network_interface(
        &self,
        resource_group: &str,
        interface_name: &str,
    ) -> Result<NetworkInterface> {
        self.record(format!("get_network_interface {interface_name}"))?;
        lock(&self.state)
            .nics
            .get(&key(resource_group, interface_name))
            .cloned()
            .ok_or_else(|| not_found("network interface", interface_name))
    }

    async fn delete_network_interface(
        &self,
        resource_group: &str,
        interface_name: &str,
    ) -> Result<()> {
        self.record(format!("delete_network_interface {interface_name}"))?;
        lock(&self.state)
            .nics
            .remove(&key(resource_group, interface_name))
            .map(drop)
            .ok_or_else(|| not_found("network interface", interface_name))
    }

    async fn delete_public_ip(&self, resource_group: &str, public_ip_name: &str) -> Result<()> {
        self.record(format!("delete_public_ip {public_ip_name}"))?;
        if lock(&self.state)
            .public_ips
            .remove(&key(resource_group, public_ip_name))
        {
            Ok(())
        } else {
            Err(not_found("public IP address", public_ip_name))
        }
    }

    async fn delete_disk(&self, resource_group: &str, disk_name: &str) -> Result<()> {
        self.record(format!("delete_disk {disk_name}"))?;
        if lock(&self.state).disks.remove(&key(resource_group, disk_name)) {
            Ok(())
        } else {
            Err(not_found("disk", disk_name))
        }
    }

    async fn delete_vhd(&self, vhd_uri: &str) -> Result<()> {
        self.record(format!("delete_vhd {vhd_uri}"))?;
        if lock(&self.state).vhds.remove(vhd_uri) {
            Ok(())
        } else {
            Err(not_found("blob", vhd_uri))
        }
    }

    async fn get_security_group(
        &self,
        resource_group: &str,
        nsg_name: &str,
    ) -> Result<NetworkSecurityGroup> {
        self.record(format!("get_security_group {nsg_name}"))?;
        lock(&self.state)
            .nsgs
            .get(&key(resource_group, nsg_name))
            .cloned()
            .ok_or_else(|| not_found("network security group", nsg_name))
    }

    async fn create_security_group(
        &self,
        resource_group: &str,
        nsg_name: &str,
        location: &str,
    ) -> Result<NetworkSecurityGroup> {
        self.record(format!("create_security_group {nsg_name}"))?;
        let mut state = lock(&self.state);
        let nsg = state
            .nsgs
            .entry(key(resource_group, nsg_name))
            .or_insert_with(|| NetworkSecurityGroup {
                name: nsg_name.to_string(),
                id: resource_id(
                    resource_group,
                    "Microsoft.Network/networkSecurityGroups",
                    nsg_name,
                ),
                location: location.to_string(),
                security_rules: Vec::new(),
            });
        nsg.location = location.to_string();
        Ok(nsg.clone())
    }

    async fn delete_security_group(&self, resource_group: &str, nsg_name: &str) -> Result<()> {
        self.record(format!("delete_security_group {nsg_name}"))?;
        lock(&self.state)
            .nsgs
            .remove(&key(resource_group, nsg_name))
            .map(drop)
            .ok_or_else(|| not_found("network security group", nsg_name))
    }

    async fn security_group_exists(&self, resource_group: &str, nsg_name: &str) -> Result<bool> {
        self.record(format!("security_group_exists {nsg_name}"))?;
        Ok(self.has_security_group(resource_group, nsg_name))
    }

    /// Create or replace; a different rule holding the same priority and
    /// direction is a conflict, as in the real control plane
    async fn create_rule(
        &self,
        resource_group: &str,
        nsg_name: &str,
        rule: &SecurityRule,
    ) -> Result<()> {
        self.record(format!("create_rule {nsg_name}/{}", rule.name))?;
        let mut state = lock(&self.state);
        let nsg = state
            .nsgs
            .get_mut(&key(resource_group, nsg_name))
            .ok_or_else(|| not_found("network security group", nsg_name))?;

        if let Some(conflict) = nsg.security_rules.iter().find(|existing| {
            existing.name != rule.name
                && existing.priority == rule.priority
                && existing.direction == rule.direction
        }) {
            return Err(AzureError::Cloud {
                status: Some(400),
                code: Some("SecurityRuleConflict".to_string()),
                message: format!(
                    "Rule {} conflicts with rule {} at priority {}",
                    rule.name, conflict.name, rule.priority
                ),
            }
            .into());
        }

        nsg.security_rules.retain(|existing| existing.name != rule.name);
        nsg.security_rules.push(rule.clone());
        Ok(())
    }

    async fn delete_rule(
        &self,
        resource_group: &str,
        nsg_name: &str,
        rule_name: &str,
    ) -> Result<()> {
        self.record(format!("delete_rule {nsg_name}/{rule_name}"))?;
        let mut state = lock(&self.state);
        let nsg = state
            .nsgs
            .get_mut(&key(resource_group, nsg_name))
            .ok_or_else(|| not_found("network security group", nsg_name))?;
        let before = nsg.security_rules.len();
        nsg.security_rules.retain(|rule| rule.name != rule_name);
        if nsg.security_rules.len() == before {
            return Err(not_found("security rule", rule_name));
        }
        Ok(())
    }

    async fn list_rules(&self, resource_group: &str, nsg_name: &str) -> Result<Vec<SecurityRule>> {
        self.record(format!("list_rules {nsg_name}"))?;
        lock(&self.state)
            .nsgs
            .get(&key(resource_group, nsg_name))
            .map(|nsg| nsg.security_rules.clone())
            .ok_or_else(|| not_found("network security group", nsg_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{NicBuilder, VmBuilder, vhd_data_disk, vhd_uri};

    #[tokio::test]
    async fn test_deploy_seeds_owned_resources() {
        let fake = FakeAzure::new();
        let (vm, nics) = VmBuilder::new("vm-1")
            .data_disk(vhd_data_disk("data-0", 0))
            .nic(NicBuilder::new("nic-1").public_ip("pip-1"))
            .build("rg");
        fake.deploy_vm("rg", vm, nics);

        assert!(fake.has_vm("rg", "vm-1"));
        assert!(fake.has_network_interface("rg", "nic-1"));
        assert!(fake.has_public_ip("rg", "pip-1"));
        assert!(fake.has_disk("rg", "vm-1-os"));
        assert!(fake.has_vhd(&vhd_uri("data-0")));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let fake = FakeAzure::new();
        let err = fake.delete_vm("rg", "ghost").await.unwrap_err();
        let azure = err.downcast_ref::<AzureError>().unwrap();
        assert!(azure.is_not_found());
        assert_eq!(fake.calls(), ["delete_vm ghost"]);
    }

    #[tokio::test]
    async fn test_fail_times_then_succeed() {
        let fake = FakeAzure::new();
        fake.insert_security_group("rg", "nsg", vec![]);
        fake.fail_times("list_rules nsg", AzureError::connection("reset"), 1);

        assert!(fake.list_rules("rg", "nsg").await.is_err());
        assert!(fake.list_rules("rg", "nsg").await.is_ok());
        assert_eq!(fake.calls_to("list_rules").len(), 2);
    }

    #[tokio::test]
    async fn test_priority_conflict() {
        let fake = FakeAzure::new();
        fake.insert_security_group("rg", "nsg", vec![SecurityRule::inbound_allow("a", 1000)]);

        let err = fake
            .create_rule("rg", "nsg", &SecurityRule::inbound_allow("b", 1000))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("priority 1000"));

        fake.create_rule("rg", "nsg", &SecurityRule::inbound_allow("a", 1000))
            .await
            .unwrap();
        assert_eq!(fake.rule_names("rg", "nsg"), ["a"]);
    }
}
