//! azsandbox-common - Shared types and utilities
//!
//! This crate provides the types shared by the provider and its test
//! utilities, without any HTTP or cloud-client dependencies to keep it
//! lightweight.
//!
//! ## Modules
//!
//! - [`defaults`]: Retry budgets and rule priority defaults
//! - [`naming`]: Deterministic resource and security rule names
//! - [`port_rule`]: Compact port rule parsing (`80`, `20-80`, `22:tcp`, ...)
//! - [`priority`]: Strictly increasing security rule priorities
//! - [`resource_kind`]: Resource kinds and teardown ordering
//! - [`rule`]: Security rule model

pub mod defaults;
pub mod naming;
pub mod port_rule;
pub mod priority;
pub mod resource_kind;
pub mod rule;

// Re-export commonly used types
pub use port_rule::{PortRule, PortRuleError, TransportProtocol};
pub use priority::{PriorityExhausted, PriorityGenerator};
pub use resource_kind::ResourceKind;
pub use rule::{RuleAccess, RuleDirection, RuleProtocol, SecurityRule};
