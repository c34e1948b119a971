//! Sandbox reservation and deployed app models

use crate::config::SandboxConfig;
use azsandbox_common::naming::sandbox_nsg_name;
use std::fmt;
use std::str::FromStr;

/// The sandbox reservation a VM belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub reservation_id: String,
    resource_group: Option<String>,
}

impl ReservationInfo {
    pub fn new(reservation_id: impl Into<String>) -> Self {
        Self {
            reservation_id: reservation_id.into(),
            resource_group: None,
        }
    }

    pub fn with_resource_group(mut self, resource_group: impl Into<String>) -> Self {
        self.resource_group = Some(resource_group.into());
        self
    }

    /// Sandbox resource group; the reservation id unless overridden
    pub fn resource_group_name(&self) -> &str {
        self.resource_group.as_deref().unwrap_or(&self.reservation_id)
    }

    /// Security group shared by all sandbox subnets
    pub fn network_security_group_name(&self) -> String {
        sandbox_nsg_name(&self.reservation_id)
    }
}

impl From<SandboxConfig> for ReservationInfo {
    fn from(config: SandboxConfig) -> Self {
        Self {
            reservation_id: config.reservation_id,
            resource_group: config.resource_group,
        }
    }
}

/// How the deployed VM was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeploymentKind {
    #[default]
    Marketplace,
    CustomImage,
}

impl DeploymentKind {
    pub fn deployment_path(self) -> &'static str {
        match self {
            Self::Marketplace => "Azure VM From Marketplace 2G",
            Self::CustomImage => "Azure VM From Custom Image 2G",
        }
    }
}

impl fmt::Display for DeploymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.deployment_path())
    }
}

impl FromStr for DeploymentKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "marketplace" => Ok(Self::Marketplace),
            "custom-image" | "custom_image" => Ok(Self::CustomImage),
            _ if s.eq_ignore_ascii_case(Self::Marketplace.deployment_path()) => {
                Ok(Self::Marketplace)
            }
            _ if s.eq_ignore_ascii_case(Self::CustomImage.deployment_path()) => {
                Ok(Self::CustomImage)
            }
            _ => anyhow::bail!("Unknown deployment kind '{}'", s),
        }
    }
}

/// A deployed VM app as seen by teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedApp {
    /// VM name
    pub name: String,
    /// VM resource group; the sandbox resource group when unset
    pub resource_group: Option<String>,
    pub kind: DeploymentKind,
}

impl DeployedApp {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_group: None,
            kind: DeploymentKind::default(),
        }
    }

    pub fn with_resource_group(mut self, resource_group: impl Into<String>) -> Self {
        self.resource_group = Some(resource_group.into());
        self
    }

    pub fn with_kind(mut self, kind: DeploymentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Resource group holding the VM and its owned resources
    pub fn resource_group_name<'a>(&'a self, reservation: &'a ReservationInfo) -> &'a str {
        self.resource_group
            .as_deref()
            .unwrap_or_else(|| reservation.resource_group_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_group_defaults() {
        let reservation = ReservationInfo::new("res-1");
        assert_eq!(reservation.resource_group_name(), "res-1");
        assert_eq!(
            reservation.network_security_group_name(),
            "NSG_sandbox_all_subnets_res-1"
        );

        let app = DeployedApp::new("vm-1");
        assert_eq!(app.resource_group_name(&reservation), "res-1");

        let app = app.with_resource_group("vm-rg");
        assert_eq!(app.resource_group_name(&reservation), "vm-rg");

        let reservation = reservation.with_resource_group("sandbox-rg");
        assert_eq!(reservation.resource_group_name(), "sandbox-rg");
    }

    #[test]
    fn test_from_sandbox_config() {
        let reservation = ReservationInfo::from(SandboxConfig {
            reservation_id: "res-2".into(),
            resource_group: None,
        });
        assert_eq!(reservation, ReservationInfo::new("res-2"));
    }

    #[test]
    fn test_deployment_kind_parse() {
        assert_eq!("marketplace".parse::<DeploymentKind>().unwrap(), DeploymentKind::Marketplace);
        assert_eq!(
            "Azure VM From Custom Image 2G".parse::<DeploymentKind>().unwrap(),
            DeploymentKind::CustomImage
        );
        assert!("gallery".parse::<DeploymentKind>().is_err());
    }
}
