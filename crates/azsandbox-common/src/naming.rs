//! Deterministic resource names
//!
//! Resources are identified by name only; there is no local database. Every
//! name here must be reproducible from the same inputs so that teardown and
//! rollback can find what provisioning created.

/// Prefix of every user-created custom security rule.
///
/// Only rules carrying this prefix are removed by bulk custom-rule deletion.
pub const CUSTOM_RULE_PREFIX: &str = "custom_rule_";

/// Prefix of the per-VM security group name
pub const VM_NSG_PREFIX: &str = "NSG_";

/// Prefix of the sandbox-wide security group name
pub const SANDBOX_NSG_PREFIX: &str = "NSG_sandbox_all_subnets_";

/// Security group owned by a single VM: `NSG_<vm_name>`.
///
/// Also the key of the advisory lock held while the VM is deployed.
pub fn vm_nsg_name(vm_name: &str) -> String {
    format!("{VM_NSG_PREFIX}{vm_name}")
}

/// Security group shared by every subnet of a sandbox reservation
pub fn sandbox_nsg_name(reservation_id: &str) -> String {
    format!("{SANDBOX_NSG_PREFIX}{reservation_id}")
}

/// Custom rule name:
/// `custom_rule_<vm_name>_<dst_address>_port:<dst_port_range>:<protocol>`
pub fn custom_rule_name(
    vm_name: &str,
    dst_address: &str,
    dst_port_range: &str,
    protocol: &str,
) -> String {
    format!("{CUSTOM_RULE_PREFIX}{vm_name}_{dst_address}_port:{dst_port_range}:{protocol}")
}

/// Inbound port rule name: `<vm_name>_inbound_port:<port_range>:<protocol>`
pub fn inbound_port_rule_name(vm_name: &str, port_range: &str, protocol: &str) -> String {
    format!("{vm_name}_inbound_port:{port_range}:{protocol}")
}

/// Whether a rule was created through the custom-rule path
pub fn is_custom_rule(rule_name: &str) -> bool {
    rule_name.starts_with(CUSTOM_RULE_PREFIX)
}

/// Extract the resource name (last path segment) from an ARM resource ID.
///
/// `/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic-1`
/// yields `nic-1`. Trailing slashes are ignored.
pub fn name_from_resource_id(resource_id: &str) -> &str {
    resource_id
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(resource_id)
}
