//! VM teardown
//!
//! Re-derives everything a VM owns from the control plane, builds one
//! dependency-ordered delete plan, and runs it step by step. A resource that
//! is already gone counts as deleted; any other failure stops the plan.
//! The VM's advisory lock is released on every path.

use crate::actions::{
    NetworkActions, NsgActions, StorageActions, VmActions, is_static_ip_allocation_type,
};
use crate::azure::types::{DiskStorage, NetworkInterface, VirtualMachine};
use crate::azure::{AzureOperations, classify_anyhow_error, ignore_not_found};
use crate::collaborators::{IpPoolManager, LockManager};
use crate::reservation::{DeployedApp, ReservationInfo};
use anyhow::{Context, Result};
use azsandbox_common::naming::vm_nsg_name;
use azsandbox_common::{ResourceKind, SecurityRule};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TeardownError {
    /// The OS disk has neither a VHD nor a managed disk
    #[error("Unable to delete OS disk of VM {vm_name}: unsupported OS disk type")]
    UnsupportedOsDisk { vm_name: String },
}

/// One idempotent delete in a teardown plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteStep {
    pub kind: ResourceKind,
    /// Resource name, or the blob URI for VHDs
    pub name: String,
    pub resource_group: String,
    /// Owning security group for rule deletes
    pub security_group: Option<String>,
}

impl DeleteStep {
    fn new(kind: ResourceKind, name: impl Into<String>, resource_group: &str) -> Self {
        Self {
            kind,
            name: name.into(),
            resource_group: resource_group.to_string(),
            security_group: None,
        }
    }

    fn rule(rule_name: &str, nsg_name: &str, resource_group: &str) -> Self {
        Self {
            security_group: Some(nsg_name.to_string()),
            ..Self::new(ResourceKind::SecurityRule, rule_name, resource_group)
        }
    }

    fn disk(is_os: bool, storage: &DiskStorage<'_>, resource_group: &str) -> Self {
        match (is_os, storage) {
            (true, DiskStorage::Vhd { uri }) => {
                Self::new(ResourceKind::OsVhd, *uri, resource_group)
            }
            (true, DiskStorage::Managed { name }) => {
                Self::new(ResourceKind::OsManagedDisk, *name, resource_group)
            }
            (false, DiskStorage::Vhd { uri }) => {
                Self::new(ResourceKind::DataVhd, *uri, resource_group)
            }
            (false, DiskStorage::Managed { name }) => {
                Self::new(ResourceKind::DataManagedDisk, *name, resource_group)
            }
        }
    }
}

/// The sandbox security group and its rules at plan time
#[derive(Debug, Clone)]
pub struct SandboxRules<'a> {
    pub nsg_name: &'a str,
    pub resource_group: &'a str,
    pub rules: &'a [SecurityRule],
}

/// Build the ordered delete plan for a VM.
///
/// Order: VM, NICs, public IPs, OS disk, data disks, the VM security group,
/// then every rule of the sandbox security group.
pub fn build_delete_plan(
    vm: &VirtualMachine,
    network_interfaces: &[NetworkInterface],
    resource_group: &str,
    sandbox: Option<&SandboxRules<'_>>,
) -> Result<Vec<DeleteStep>, TeardownError> {
    let os_disk = vm
        .storage_profile
        .os_disk
        .storage()
        .ok_or_else(|| TeardownError::UnsupportedOsDisk {
            vm_name: vm.name.clone(),
        })?;

    let mut steps = vec![DeleteStep::new(
        ResourceKind::VirtualMachine,
        &vm.name,
        resource_group,
    )];

    steps.extend(
        vm.network_interface_names()
            .map(|nic| DeleteStep::new(ResourceKind::NetworkInterface, nic, resource_group)),
    );

    steps.extend(
        network_interfaces
            .iter()
            .filter_map(NetworkInterface::public_ip_name)
            .map(|ip| DeleteStep::new(ResourceKind::PublicIp, ip, resource_group)),
    );

    steps.push(DeleteStep::disk(true, &os_disk, resource_group));
    steps.extend(
        vm.storage_profile
            .data_disks
            .iter()
            .map(|disk| DeleteStep::disk(false, &disk.storage(), resource_group)),
    );

    steps.push(DeleteStep::new(
        ResourceKind::NetworkSecurityGroup,
        vm_nsg_name(&vm.name),
        resource_group,
    ));

    if let Some(sandbox) = sandbox {
        steps.extend(sandbox.rules.iter().map(|rule| {
            DeleteStep::rule(&rule.name, sandbox.nsg_name, sandbox.resource_group)
        }));
    }

    // Stable: keeps discovery order within a kind
    steps.sort_by_key(|step| step.kind.teardown_priority());
    Ok(steps)
}

/// Static private IPs of the primary IP configuration of each interface
pub fn static_private_ips(network_interfaces: &[NetworkInterface]) -> Vec<String> {
    network_interfaces
        .iter()
        .filter_map(NetworkInterface::primary_ip_configuration)
        .filter(|config| is_static_ip_allocation_type(config.private_ip_allocation_method))
        .filter_map(|config| config.private_ip_address.clone())
        .collect()
}

/// Report of a teardown
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub vm_name: String,
    /// `false` when the VM was already gone and nothing was planned
    pub vm_found: bool,
    pub deleted: Vec<(ResourceKind, String)>,
    pub already_absent: Vec<(ResourceKind, String)>,
    pub released_ips: Vec<String>,
}

impl TeardownReport {
    fn already_deleted(vm_name: &str) -> Self {
        Self {
            vm_name: vm_name.to_string(),
            ..Default::default()
        }
    }
}

/// Tears down a deployed VM and everything it owns
pub struct DeleteInstanceFlow<'a, C, P, L> {
    client: &'a C,
    reservation: &'a ReservationInfo,
    ip_pool: &'a P,
    locks: &'a L,
}

impl<'a, C, P, L> DeleteInstanceFlow<'a, C, P, L>
where
    C: AzureOperations,
    P: IpPoolManager,
    L: LockManager,
{
    pub fn new(
        client: &'a C,
        reservation: &'a ReservationInfo,
        ip_pool: &'a P,
        locks: &'a L,
    ) -> Self {
        Self {
            client,
            reservation,
            ip_pool,
            locks,
        }
    }

    /// Delete the VM and its resources, then release its lock.
    pub async fn delete_instance(&self, app: &DeployedApp) -> Result<TeardownReport> {
        let result = self.teardown(app).await;
        release_vm_lock(self.locks, &app.name, result)
    }

    async fn teardown(&self, app: &DeployedApp) -> Result<TeardownReport> {
        let resource_group = app.resource_group_name(self.reservation);
        let vm_actions = VmActions::new(self.client);
        let network_actions = NetworkActions::new(self.client);
        let nsg_actions = NsgActions::new(self.client);

        let vm = match vm_actions.get_vm(&app.name, resource_group).await {
            Ok(vm) => vm,
            Err(e) if classify_anyhow_error(&e).is_not_found() => {
                info!(vm_name = %app.name, "VM not found, teardown already complete");
                return Ok(TeardownReport::already_deleted(&app.name));
            }
            Err(e) => return Err(e),
        };

        let mut network_interfaces = Vec::new();
        for interface_name in vm.network_interface_names() {
            let nic = network_actions
                .get_vm_network(interface_name, resource_group)
                .await;
            match ignore_not_found(nic)? {
                Some(nic) => network_interfaces.push(nic),
                None => debug!(interface_name = %interface_name, "Network interface already gone"),
            }
        }
        let private_ips = static_private_ips(&network_interfaces);

        let sandbox_rg = self.reservation.resource_group_name();
        let sandbox_nsg = self.reservation.network_security_group_name();
        let sandbox_rules = if nsg_actions
            .network_security_group_exists(&sandbox_nsg, sandbox_rg)
            .await?
        {
            Some(nsg_actions.get_nsg_rules(&sandbox_nsg, sandbox_rg).await?)
        } else {
            None
        };
        let sandbox = sandbox_rules.as_deref().map(|rules| SandboxRules {
            nsg_name: &sandbox_nsg,
            resource_group: sandbox_rg,
            rules,
        });

        let plan = build_delete_plan(&vm, &network_interfaces, resource_group, sandbox.as_ref())?;
        info!(
            vm_name = %app.name,
            deployment = %app.kind,
            steps = plan.len(),
            "Executing teardown plan"
        );

        let mut report = TeardownReport {
            vm_name: app.name.clone(),
            vm_found: true,
            ..Default::default()
        };

        for step in plan {
            match self.run_step(&step).await {
                Ok(()) => report.deleted.push((step.kind, step.name)),
                Err(e) if classify_anyhow_error(&e).is_not_found() => {
                    warn!(kind = %step.kind, name = %step.name, "Resource not found, skipping");
                    report.already_absent.push((step.kind, step.name));
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "Teardown of VM {} stopped at {} {}",
                        app.name, step.kind, step.name
                    )));
                }
            }
        }

        if !private_ips.is_empty() {
            match self
                .ip_pool
                .release_ips(&self.reservation.reservation_id, &private_ips)
                .await
            {
                Ok(()) => report.released_ips = private_ips,
                Err(e) => warn!(
                    ips = ?private_ips,
                    error = ?e,
                    "Unable to release private IPs"
                ),
            }
        }

        info!(
            vm_name = %app.name,
            deleted = report.deleted.len(),
            already_absent = report.already_absent.len(),
            released_ips = report.released_ips.len(),
            "Teardown complete"
        );
        Ok(report)
    }

    async fn run_step(&self, step: &DeleteStep) -> Result<()> {
        let rg = step.resource_group.as_str();
        match step.kind {
            ResourceKind::VirtualMachine => {
                VmActions::new(self.client)
                    .delete_vm(&step.name, rg)
                    .await
            }
            ResourceKind::NetworkInterface => {
                NetworkActions::new(self.client)
                    .delete_vm_network(&step.name, rg)
                    .await
            }
            ResourceKind::PublicIp => {
                NetworkActions::new(self.client)
                    .delete_public_ip(&step.name, rg)
                    .await
            }
            ResourceKind::OsVhd | ResourceKind::DataVhd => {
                StorageActions::new(self.client)
                    .delete_vhd_disk(&step.name)
                    .await
            }
            ResourceKind::OsManagedDisk | ResourceKind::DataManagedDisk => {
                StorageActions::new(self.client)
                    .delete_disk(&step.name, rg)
                    .await
            }
            ResourceKind::NetworkSecurityGroup => {
                NsgActions::new(self.client)
                    .delete_network_security_group(&step.name, rg)
                    .await
            }
            ResourceKind::SecurityRule => {
                let nsg_name = step
                    .security_group
                    .as_deref()
                    .context("Security rule step without a security group")?;
                NsgActions::new(self.client)
                    .delete_nsg_rule(&step.name, nsg_name, rg)
                    .await
            }
        }
    }
}

/// Release the VM's lock on every path.
///
/// A teardown failure wins over a lock failure; a lock failure after a
/// clean teardown is returned.
fn release_vm_lock<L: LockManager>(
    locks: &L,
    vm_name: &str,
    result: Result<TeardownReport>,
) -> Result<TeardownReport> {
    let lock_name = vm_nsg_name(vm_name);
    let released = locks
        .release_lock(&lock_name)
        .with_context(|| format!("Failed to release lock {lock_name}"));

    match (result, released) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(lock_err)) => {
            warn!(
                lock = %lock_name,
                error = ?lock_err,
                "Lock release failed after teardown failure"
            );
            Err(e)
        }
    }
}
