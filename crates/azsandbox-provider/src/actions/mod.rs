//! Action sets over the cloud client
//!
//! Each set borrows a client and adds logging and error context to one
//! resource family. Flows compose them.

pub mod network;
pub mod nsg;
pub mod storage;
pub mod vm;

pub use network::{NetworkActions, is_static_ip_allocation_type};
pub use nsg::{CustomRule, NsgActions};
pub use storage::StorageActions;
pub use vm::VmActions;
