//! Builders for control-plane resources

use azsandbox_provider::azure::types::{
    DataDisk, IpAllocationMethod, IpConfiguration, ManagedDiskRef, NetworkInterface, OsDisk,
    StorageProfile, SubResource, VirtualHardDisk, VirtualMachine,
};

const ID_PREFIX: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups";

/// ARM resource ID in the test subscription
pub fn resource_id(resource_group: &str, provider: &str, name: &str) -> String {
    format!("{ID_PREFIX}/{resource_group}/providers/{provider}/{name}")
}

/// Blob URI of a VHD in the test storage account
pub fn vhd_uri(name: &str) -> String {
    format!("https://sandboxdisks.blob.core.windows.net/vhds/{name}.vhd")
}

pub fn managed_os_disk(name: &str) -> OsDisk {
    OsDisk {
        name: Some(name.to_string()),
        vhd: None,
        managed_disk: Some(ManagedDiskRef {
            id: resource_id("disks-rg", "Microsoft.Compute/disks", name),
        }),
    }
}

pub fn vhd_os_disk(name: &str) -> OsDisk {
    OsDisk {
        name: Some(name.to_string()),
        vhd: Some(VirtualHardDisk { uri: vhd_uri(name) }),
        managed_disk: None,
    }
}

/// OS disk with neither a VHD nor a managed disk
pub fn unsupported_os_disk() -> OsDisk {
    OsDisk::default()
}

pub fn managed_data_disk(name: &str, lun: i32) -> DataDisk {
    DataDisk {
        name: name.to_string(),
        lun,
        vhd: None,
        managed_disk: Some(ManagedDiskRef {
            id: resource_id("disks-rg", "Microsoft.Compute/disks", name),
        }),
    }
}

pub fn vhd_data_disk(name: &str, lun: i32) -> DataDisk {
    DataDisk {
        name: name.to_string(),
        lun,
        vhd: Some(VirtualHardDisk { uri: vhd_uri(name) }),
        managed_disk: None,
    }
}

/// Network interface with a single IP configuration
#[derive(Debug, Clone)]
pub struct NicBuilder {
    name: String,
    private_ip: Option<String>,
    allocation: IpAllocationMethod,
    public_ip: Option<String>,
}

impl NicBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            private_ip: None,
            allocation: IpAllocationMethod::Dynamic,
            public_ip: None,
        }
    }

    pub fn static_ip(mut self, ip: &str) -> Self {
        self.private_ip = Some(ip.to_string());
        self.allocation = IpAllocationMethod::Static;
        self
    }

    pub fn dynamic_ip(mut self, ip: &str) -> Self {
        self.private_ip = Some(ip.to_string());
        self.allocation = IpAllocationMethod::Dynamic;
        self
    }

    pub fn public_ip(mut self, name: &str) -> Self {
        self.public_ip = Some(name.to_string());
        self
    }

    pub fn build(self, resource_group: &str) -> NetworkInterface {
        NetworkInterface {
            id: resource_id(
                resource_group,
                "Microsoft.Network/networkInterfaces",
                &self.name,
            ),
            ip_configurations: vec![IpConfiguration {
                name: "ipconfig1".to_string(),
                private_ip_address: self.private_ip,
                private_ip_allocation_method: self.allocation,
                public_ip_address: self.public_ip.map(|ip| {
                    SubResource::new(resource_id(
                        resource_group,
                        "Microsoft.Network/publicIPAddresses",
                        &ip,
                    ))
                }),
            }],
            name: self.name,
        }
    }
}

/// A VM, the interfaces it references and its disks
#[derive(Debug, Clone)]
pub struct VmBuilder {
    name: String,
    os_disk: OsDisk,
    data_disks: Vec<DataDisk>,
    nics: Vec<NicBuilder>,
}

impl VmBuilder {
    /// VM with a managed OS disk named `<name>-os` and no interfaces
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            os_disk: managed_os_disk(&format!("{name}-os")),
            data_disks: Vec::new(),
            nics: Vec::new(),
        }
    }

    pub fn os_disk(mut self, os_disk: OsDisk) -> Self {
        self.os_disk = os_disk;
        self
    }

    pub fn data_disk(mut self, disk: DataDisk) -> Self {
        self.data_disks.push(disk);
        self
    }

    pub fn nic(mut self, nic: NicBuilder) -> Self {
        self.nics.push(nic);
        self
    }

    pub fn build(self, resource_group: &str) -> (VirtualMachine, Vec<NetworkInterface>) {
        let nics: Vec<NetworkInterface> = self
            .nics
            .into_iter()
            .map(|nic| nic.build(resource_group))
            .collect();
        let vm = VirtualMachine {
            id: resource_id(
                resource_group,
                "Microsoft.Compute/virtualMachines",
                &self.name,
            ),
            name: self.name,
            storage_profile: StorageProfile {
                os_disk: self.os_disk,
                data_disks: self.data_disks,
            },
            network_interfaces: nics.iter().map(|nic| SubResource::new(&nic.id)).collect(),
        };
        (vm, nics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_references_its_nics() {
        let (vm, nics) = VmBuilder::new("vm-1")
            .nic(NicBuilder::new("nic-1").public_ip("pip-1"))
            .build("rg");
        assert_eq!(vm.network_interface_names().collect::<Vec<_>>(), ["nic-1"]);
        assert_eq!(nics[0].public_ip_name(), Some("pip-1"));
    }

    #[test]
    fn test_default_os_disk_is_managed() {
        let (vm, _) = VmBuilder::new("vm-1").build("rg");
        assert_eq!(vm.storage_profile.os_disk.name.as_deref(), Some("vm-1-os"));
        assert!(vm.storage_profile.os_disk.managed_disk.is_some());
    }
}
