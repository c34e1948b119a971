//! Compact port rule parsing
//!
//! A port rule is one of, tried in this order (first match wins):
//!
//! 1. `<from>-<to>:<proto>` e.g. `80-50000:udp`
//! 2. `<port>:<proto>` e.g. `22:tcp`
//! 3. `<from>-<to>` e.g. `20-80` (tcp)
//! 4. `<port>` e.g. `80` (tcp)
//!
//! The protocol suffix is case-insensitive and always normalised to lower case.

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static RANGE_WITH_PROTOCOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<from>\d+)-(?P<to>\d+):(?P<protocol>udp|tcp)$").expect("valid regex")
});

static PORT_WITH_PROTOCOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<from>\d+):(?P<protocol>udp|tcp)$").expect("valid regex")
});

static RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<from>\d+)-(?P<to>\d+)$").expect("valid regex"));

static PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<from>\d+)$").expect("valid regex"));

/// Error returned for a port rule that matches none of the accepted shapes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Value '{value}' is not a valid port rule")]
pub struct PortRuleError {
    pub value: String,
}

/// Transport protocol of a parsed port rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    #[default]
    Tcp,
    Udp,
}

impl TransportProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportProtocol {
    type Err = PortRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            _ => Err(PortRuleError {
                value: s.to_string(),
            }),
        }
    }
}

/// A normalised port rule: a single port or `from-to` range plus protocol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRule {
    port_range: String,
    protocol: TransportProtocol,
}

impl PortRule {
    /// Parse a port rule string.
    ///
    /// The range-with-protocol shape is tried first; otherwise the protocol
    /// suffix of `80-50000:udp` would never be seen by a plain range match.
    pub fn parse(value: &str) -> Result<Self, PortRuleError> {
        if let Some(caps) = RANGE_WITH_PROTOCOL.captures(value) {
            return Ok(Self {
                port_range: format!("{}-{}", &caps["from"], &caps["to"]),
                protocol: caps["protocol"].parse()?,
            });
        }

        if let Some(caps) = PORT_WITH_PROTOCOL.captures(value) {
            return Ok(Self {
                port_range: caps["from"].to_string(),
                protocol: caps["protocol"].parse()?,
            });
        }

        if let Some(caps) = RANGE.captures(value) {
            return Ok(Self {
                port_range: format!("{}-{}", &caps["from"], &caps["to"]),
                protocol: TransportProtocol::Tcp,
            });
        }

        if let Some(caps) = PORT.captures(value) {
            return Ok(Self {
                port_range: caps["from"].to_string(),
                protocol: TransportProtocol::Tcp,
            });
        }

        Err(PortRuleError {
            value: value.to_string(),
        })
    }

    /// Port or `from-to` range as it appears in the security rule
    pub fn port_range(&self) -> &str {
        &self.port_range
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    /// `(port_range, protocol)` pair with the protocol in lower case
    pub fn as_pair(&self) -> (&str, &'static str) {
        (&self.port_range, self.protocol.as_str())
    }
}

impl FromStr for PortRule {
    type Err = PortRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PortRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.port_range, self.protocol)
    }
}
