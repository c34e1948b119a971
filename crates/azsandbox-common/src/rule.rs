//! Security rule model

use crate::port_rule::TransportProtocol;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address prefix matching any internet source or destination
pub const ADDRESS_INTERNET: &str = "Internet";

/// Wildcard for address prefixes and port ranges
pub const ANY: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAccess {
    Allow,
    Deny,
}

/// Rules created here are always inbound
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    #[default]
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleProtocol {
    #[serde(rename = "tcp")]
    Tcp,
    #[serde(rename = "udp")]
    Udp,
    #[serde(rename = "icmp")]
    Icmp,
    #[default]
    #[serde(rename = "*")]
    Any,
}

impl RuleProtocol {
    /// Lower-case form used inside rule names
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::Any => ANY,
        }
    }

    /// Form expected by the control plane (`Tcp`, `Udp`, `Icmp`, `*`)
    pub fn as_arm_str(self) -> &'static str {
        match self {
            Self::Tcp => "Tcp",
            Self::Udp => "Udp",
            Self::Icmp => "Icmp",
            Self::Any => ANY,
        }
    }

    /// Parse either form; unknown values are `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            "icmp" => Some(Self::Icmp),
            "*" => Some(Self::Any),
            _ => None,
        }
    }
}

impl From<TransportProtocol> for RuleProtocol {
    fn from(protocol: TransportProtocol) -> Self {
        match protocol {
            TransportProtocol::Tcp => Self::Tcp,
            TransportProtocol::Udp => Self::Udp,
        }
    }
}

impl fmt::Display for RuleProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A security rule on a network security group.
///
/// Priorities are unique within a group; lower values are evaluated first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub name: String,
    pub access: RuleAccess,
    pub direction: RuleDirection,
    pub source_address_prefix: String,
    pub source_port_range: String,
    pub destination_address_prefix: String,
    pub destination_port_range: String,
    pub priority: u32,
    pub protocol: RuleProtocol,
}

impl SecurityRule {
    /// Inbound allow rule from the internet to any destination on any port
    pub fn inbound_allow(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            access: RuleAccess::Allow,
            direction: RuleDirection::Inbound,
            source_address_prefix: ADDRESS_INTERNET.to_string(),
            source_port_range: ANY.to_string(),
            destination_address_prefix: ANY.to_string(),
            destination_port_range: ANY.to_string(),
            priority,
            protocol: RuleProtocol::Any,
        }
    }

    /// Inbound deny rule between internet addresses on any port and protocol
    pub fn inbound_deny(name: impl Into<String>, priority: u32) -> Self {
        Self {
            access: RuleAccess::Deny,
            destination_address_prefix: ADDRESS_INTERNET.to_string(),
            ..Self::inbound_allow(name, priority)
        }
    }
}
