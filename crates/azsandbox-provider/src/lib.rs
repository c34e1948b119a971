//! azsandbox-provider - Azure VM lifecycle for sandbox reservations
//!
//! Provisions and tears down the resources of a sandbox VM: the VM itself,
//! its network interfaces, public IPs, disks and security groups.
//!
//! - [`flows::DeleteInstanceFlow`]: ordered, idempotent teardown
//! - [`flows::open_inbound_ports`]: rule creation with rollback
//! - [`azure::AzureClient`]: ARM REST client behind [`azure::AzureOperations`]

pub mod actions;
pub mod azure;
pub mod collaborators;
pub mod config;
pub mod flows;
pub mod reservation;
pub mod rollback;
pub mod wait;
