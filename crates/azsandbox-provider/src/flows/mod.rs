//! VM lifecycle flows: provisioning-time rule commands and teardown

pub mod delete_instance;
pub mod deploy;

pub use delete_instance::{
    DeleteInstanceFlow, DeleteStep, TeardownError, TeardownReport, build_delete_plan,
};
pub use deploy::{
    CreateAllowVmInboundPortRuleCommand, CreateVmNetworkSecurityGroupCommand, OpenPortsRequest,
    open_inbound_ports, provision_vm_security_group,
};
