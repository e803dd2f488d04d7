//! Rule data structures
//!
//! A [`Rule`] is one allow/block directive keyed by an optional IPv4 source,
//! an optional port and a protocol. Rules can only be built from validated
//! input: [`Rule::new`] and deserialization both run the validators in
//! [`crate::validators`], so a persisted rule never carries a partial or
//! placeholder value.
//!
//! # Example
//!
//! ```
//! use rulekeeper::core::rule::{Action, Protocol, Rule};
//!
//! let rule = Rule::new("Block", "10.0.0.5", "22", "TCP").unwrap();
//! assert_eq!(rule.action, Action::Block);
//! assert_eq!(rule.ip(), Some("10.0.0.5"));
//! assert_eq!(rule.protocol, Protocol::Tcp);
//! ```

use crate::core::error::{Error, Result};
use crate::validators;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of rules accepted from the rule document
///
/// Limit prevents memory exhaustion from malformed documents.
pub const MAX_RULES: usize = 1000;

/// Rule action
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Action {
    #[default]
    Allow,
    Block,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Block => "block",
        }
    }

    /// Capitalized name for table rendering
    pub const fn display_name(self) -> &'static str {
        match self {
            Action::Allow => "Allow",
            Action::Block => "Block",
        }
    }
}

/// Network protocol a rule or traffic query applies to
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Protocol {
    Tcp,
    Udp,
    /// Match every protocol
    #[default]
    All,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::All => "all",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::All => "ALL",
        }
    }
}

/// Shape of one record in the rule document
///
/// `ip` and `port` are written as `""` for "any"; `null` is accepted on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleRecord {
    action: String,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    port: Option<String>,
    protocol: String,
}

/// One firewall directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RuleRecord", into = "RuleRecord")]
pub struct Rule {
    pub action: Action,
    ip: Option<String>,
    port: Option<String>,
    pub protocol: Protocol,
}

impl Rule {
    /// Builds a rule from raw caller input.
    ///
    /// Fields are checked in the order action, ip, port, protocol; the first
    /// failure is returned.
    pub fn new(action: &str, ip: &str, port: &str, protocol: &str) -> Result<Self> {
        Ok(Self {
            action: validators::validate_action(action)?,
            ip: validators::validate_ip(ip)?,
            port: validators::validate_port(port)?,
            protocol: validators::validate_protocol(protocol)?,
        })
    }

    /// Source address, `None` meaning any
    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    /// Port literal, `None` meaning any
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Backend argument list: action, ip, port, protocol with `""` for any
    pub fn backend_args(&self) -> Vec<String> {
        vec![
            self.action.as_str().to_string(),
            self.ip.clone().unwrap_or_default(),
            self.port.clone().unwrap_or_default(),
            self.protocol.as_str().to_string(),
        ]
    }

    pub fn ip_display(&self) -> &str {
        self.ip.as_deref().unwrap_or("Any")
    }

    pub fn port_display(&self) -> &str {
        self.port.as_deref().unwrap_or("Any")
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} port {} {}",
            self.action,
            self.ip.as_deref().unwrap_or("any"),
            self.port.as_deref().unwrap_or("any"),
            self.protocol
        )
    }
}

impl TryFrom<RuleRecord> for Rule {
    type Error = Error;

    fn try_from(record: RuleRecord) -> Result<Self> {
        Rule::new(
            &record.action,
            record.ip.as_deref().unwrap_or_default(),
            record.port.as_deref().unwrap_or_default(),
            &record.protocol,
        )
    }
}

impl From<Rule> for RuleRecord {
    fn from(rule: Rule) -> Self {
        Self {
            action: rule.action.as_str().to_string(),
            ip: Some(rule.ip.unwrap_or_default()),
            port: Some(rule.port.unwrap_or_default()),
            protocol: rule.protocol.as_str().to_string(),
        }
    }
}

/// Validated traffic-check query passed to the enforcement gateway
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnforcementRequest {
    pub ip: Option<String>,
    pub port: Option<String>,
    pub protocol: Protocol,
}

impl EnforcementRequest {
    /// Builds a query from raw input; an empty protocol means [`Protocol::All`].
    pub fn new(ip: &str, port: &str, protocol: &str) -> Result<Self> {
        let protocol = if protocol.trim().is_empty() {
            Protocol::All
        } else {
            validators::validate_protocol(protocol)?
        };

        Ok(Self {
            ip: validators::validate_ip(ip)?,
            port: validators::validate_port(port)?,
            protocol,
        })
    }

    /// Backend argument list: ip, port, protocol with `""` for any
    pub fn backend_args(&self) -> Vec<String> {
        vec![
            self.ip.clone().unwrap_or_default(),
            self.port.clone().unwrap_or_default(),
            self.protocol.as_str().to_string(),
        ]
    }
}

impl fmt::Display for EnforcementRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IP: {}, Port: {}, Protocol: {}",
            self.ip.as_deref().unwrap_or("Any"),
            self.port.as_deref().unwrap_or("Any"),
            self.protocol.display_name()
        )
    }
}

/// Result of a traffic check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrafficReport {
    /// Backend succeeded but printed nothing
    NoData,
    /// Backend verdict, passed through as text
    Verdict(String),
}

impl TrafficReport {
    pub fn from_output(output: String) -> Self {
        if output.is_empty() {
            TrafficReport::NoData
        } else {
            TrafficReport::Verdict(output)
        }
    }
}
