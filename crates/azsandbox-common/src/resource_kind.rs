//! Azure resource types and teardown ordering
//!
//! Provides one teardown priority used by every delete plan. Resources must
//! be deleted in dependency order to avoid "still attached" failures.

use std::fmt;

/// Types of Azure resources owned by a deployed VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Virtual machine (must go first so NICs and disks are released)
    VirtualMachine,
    /// Network interface attached to the VM
    NetworkInterface,
    /// Public IP referenced by a NIC IP configuration
    PublicIp,
    /// OS disk stored as a page blob in a storage account
    OsVhd,
    /// OS disk stored as a managed disk
    OsManagedDisk,
    /// Data disk stored as a page blob
    DataVhd,
    /// Data disk stored as a managed disk
    DataManagedDisk,
    /// The VM's own security group
    NetworkSecurityGroup,
    /// Rule on the sandbox-level security group
    SecurityRule,
}

impl ResourceKind {
    /// Get teardown priority (lower number = delete first)
    ///
    /// - 0: VM (disks and NICs report "attached" until it is gone)
    /// - 1: Network interfaces
    /// - 2: Public IPs (a NIC must release them first)
    /// - 3: OS disk
    /// - 4: Data disks
    /// - 5: VM security group
    /// - 6: Sandbox security group rules (only after the VM is gone)
    pub fn teardown_priority(self) -> u8 {
        match self {
            ResourceKind::VirtualMachine => 0,
            ResourceKind::NetworkInterface => 1,
            ResourceKind::PublicIp => 2,
            ResourceKind::OsVhd | ResourceKind::OsManagedDisk => 3,
            ResourceKind::DataVhd | ResourceKind::DataManagedDisk => 4,
            ResourceKind::NetworkSecurityGroup => 5,
            ResourceKind::SecurityRule => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::VirtualMachine => "virtual_machine",
            ResourceKind::NetworkInterface => "network_interface",
            ResourceKind::PublicIp => "public_ip",
            ResourceKind::OsVhd => "os_vhd",
            ResourceKind::OsManagedDisk => "os_managed_disk",
            ResourceKind::DataVhd => "data_vhd",
            ResourceKind::DataManagedDisk => "data_managed_disk",
            ResourceKind::NetworkSecurityGroup => "network_security_group",
            ResourceKind::SecurityRule => "security_rule",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_before_disks() {
        for disk in [
            ResourceKind::OsVhd,
            ResourceKind::OsManagedDisk,
            ResourceKind::DataVhd,
            ResourceKind::DataManagedDisk,
        ] {
            assert!(
                ResourceKind::VirtualMachine.teardown_priority() < disk.teardown_priority(),
                "VM must be deleted before {disk}"
            );
        }
    }

    #[test]
    fn test_nics_before_security_group() {
        assert!(
            ResourceKind::NetworkInterface.teardown_priority()
                < ResourceKind::NetworkSecurityGroup.teardown_priority(),
            "NICs must be deleted before the security group"
        );
    }

    #[test]
    fn test_sandbox_rules_last() {
        assert!(
            ResourceKind::NetworkSecurityGroup.teardown_priority()
                < ResourceKind::SecurityRule.teardown_priority()
        );
    }

    #[test]
    fn test_priority_values() {
        assert_eq!(ResourceKind::VirtualMachine.teardown_priority(), 0);
        assert_eq!(ResourceKind::NetworkInterface.teardown_priority(), 1);
        assert_eq!(ResourceKind::PublicIp.teardown_priority(), 2);
        assert_eq!(ResourceKind::OsManagedDisk.teardown_priority(), 3);
        assert_eq!(ResourceKind::DataManagedDisk.teardown_priority(), 4);
        assert_eq!(ResourceKind::NetworkSecurityGroup.teardown_priority(), 5);
        assert_eq!(ResourceKind::SecurityRule.teardown_priority(), 6);
    }
}
