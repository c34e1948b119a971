//! Resource models returned by the cloud client
//!
//! Only the fields teardown and provisioning read are modelled. Serde names
//! follow the ARM JSON shape so the REST client can deserialize them
//! directly.

use azsandbox_common::SecurityRule;
use azsandbox_common::naming::name_from_resource_id;
use serde::{Deserialize, Serialize};

/// Reference to another ARM resource by ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResource {
    pub id: String,
}

impl SubResource {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Last path segment of the ID
    pub fn name(&self) -> &str {
        name_from_resource_id(&self.id)
    }
}

/// A virtual machine and the references teardown needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualMachine {
    pub name: String,
    pub id: String,
    pub storage_profile: StorageProfile,
    pub network_interfaces: Vec<SubResource>,
}

impl VirtualMachine {
    /// Names of the attached network interfaces
    pub fn network_interface_names(&self) -> impl Iterator<Item = &str> {
        self.network_interfaces.iter().map(SubResource::name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    #[serde(default)]
    pub os_disk: OsDisk,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
}

/// Where a disk is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskStorage<'a> {
    /// Page blob, addressed by URI
    Vhd { uri: &'a str },
    /// Managed disk, addressed by name
    Managed { name: &'a str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHardDisk {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedDiskRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vhd: Option<VirtualHardDisk>,
    #[serde(default)]
    pub managed_disk: Option<ManagedDiskRef>,
}

impl OsDisk {
    /// VHD wins if both are populated; `None` if neither is
    pub fn storage(&self) -> Option<DiskStorage<'_>> {
        disk_storage(self.name.as_deref(), &self.vhd, &self.managed_disk)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub name: String,
    #[serde(default)]
    pub lun: i32,
    #[serde(default)]
    pub vhd: Option<VirtualHardDisk>,
    #[serde(default)]
    pub managed_disk: Option<ManagedDiskRef>,
}

impl DataDisk {
    /// Data disks without a VHD are treated as managed disks named `name`
    pub fn storage(&self) -> DiskStorage<'_> {
        disk_storage(Some(self.name.as_str()), &self.vhd, &self.managed_disk).unwrap_or(
            DiskStorage::Managed {
                name: self.name.as_str(),
            },
        )
    }
}

fn disk_storage<'a>(
    name: Option<&'a str>,
    vhd: &'a Option<VirtualHardDisk>,
    managed: &'a Option<ManagedDiskRef>,
) -> Option<DiskStorage<'a>> {
    if let Some(vhd) = vhd {
        return Some(DiskStorage::Vhd { uri: &vhd.uri });
    }
    let managed = managed.as_ref()?;
    Some(DiskStorage::Managed {
        name: name.unwrap_or_else(|| name_from_resource_id(&managed.id)),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpAllocationMethod {
    Static,
    #[default]
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpConfiguration {
    pub name: String,
    pub private_ip_address: Option<String>,
    pub private_ip_allocation_method: IpAllocationMethod,
    pub public_ip_address: Option<SubResource>,
}

impl IpConfiguration {
    pub fn is_static(&self) -> bool {
        self.private_ip_allocation_method == IpAllocationMethod::Static
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub id: String,
    pub ip_configurations: Vec<IpConfiguration>,
}

impl NetworkInterface {
    /// The first IP configuration, which carries the NIC's public IP
    pub fn primary_ip_configuration(&self) -> Option<&IpConfiguration> {
        self.ip_configurations.first()
    }

    /// Name of the public IP referenced by the primary IP configuration
    pub fn public_ip_name(&self) -> Option<&str> {
        self.primary_ip_configuration()?
            .public_ip_address
            .as_ref()
            .map(SubResource::name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSecurityGroup {
    pub name: String,
    pub id: String,
    pub location: String,
    pub security_rules: Vec<SecurityRule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn managed(id: &str) -> Option<ManagedDiskRef> {
        Some(ManagedDiskRef { id: id.to_string() })
    }

    #[test]
    fn test_os_disk_storage() {
        let vhd = OsDisk {
            name: Some("os".into()),
            vhd: Some(VirtualHardDisk {
                uri: "https://acct.blob.core.windows.net/vhds/os.vhd".into(),
            }),
            managed_disk: None,
        };
        assert!(matches!(vhd.storage(), Some(DiskStorage::Vhd { .. })));

        let managed_disk = OsDisk {
            name: None,
            vhd: None,
            managed_disk: managed(
                "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/os-1",
            ),
        };
        assert_eq!(
            managed_disk.storage(),
            Some(DiskStorage::Managed { name: "os-1" })
        );

        assert_eq!(OsDisk::default().storage(), None);
    }

    #[test]
    fn test_data_disk_defaults_to_managed_name() {
        let disk = DataDisk {
            name: "data-0".into(),
            lun: 0,
            vhd: None,
            managed_disk: None,
        };
        assert_eq!(disk.storage(), DiskStorage::Managed { name: "data-0" });
    }

    #[test]
    fn test_public_ip_only_from_primary_configuration() {
        let nic = NetworkInterface {
            name: "nic-1".into(),
            id: "nic-1".into(),
            ip_configurations: vec![
                IpConfiguration {
                    name: "primary".into(),
                    private_ip_address: Some("10.0.0.4".into()),
                    private_ip_allocation_method: IpAllocationMethod::Static,
                    public_ip_address: None,
                },
                IpConfiguration {
                    name: "secondary".into(),
                    private_ip_address: Some("10.0.0.5".into()),
                    private_ip_allocation_method: IpAllocationMethod::Dynamic,
                    public_ip_address: Some(SubResource::new(".../publicIPAddresses/pip-2")),
                },
            ],
        };
        assert_eq!(nic.public_ip_name(), None);
        assert!(nic.primary_ip_configuration().unwrap().is_static());
    }

    #[test]
    fn test_storage_profile_deserialize() {
        let json = r#"{
            "osDisk": {"name": "os", "managedDisk": {"id": "/x/disks/os"}},
            "dataDisks": [{"name": "d0", "lun": 0, "vhd": {"uri": "https://a/b.vhd"}}]
        }"#;
        let profile: StorageProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.os_disk.storage(), Some(DiskStorage::Managed { name: "os" }));
        assert_eq!(
            profile.data_disks[0].storage(),
            DiskStorage::Vhd { uri: "https://a/b.vhd" }
        );
    }
}
