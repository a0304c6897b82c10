//! Data types for proxy hosts, rules and the config snapshot handed to
//! the resolver and PAC renderer

use crate::error::{PacError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Kind of proxy a host speaks, as written into PAC directives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum ProxyType {
    Socks,
    Http,
    Https,
    #[default]
    Proxy,
}

impl ProxyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Socks => "SOCKS",
            ProxyType::Http => "HTTP",
            ProxyType::Https => "HTTPS",
            ProxyType::Proxy => "PROXY",
        }
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ProxyType {
    type Err = PacError;

    /// Case-insensitive; blank input means `PROXY`
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "PROXY" => Ok(ProxyType::Proxy),
            "SOCKS" => Ok(ProxyType::Socks),
            "HTTP" => Ok(ProxyType::Http),
            "HTTPS" => Ok(ProxyType::Https),
            other => Err(PacError::validation(format!("unknown proxy type '{}'", other))),
        }
    }
}

impl TryFrom<String> for ProxyType {
    type Error = PacError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A configured proxy server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub proxy_type: Option<ProxyType>,
}

/// Write-side shape of a host. A missing id means "insert".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostInput {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    pub port: u32,
    #[serde(rename = "type", default)]
    pub proxy_type: Option<ProxyType>,
}

impl HostInput {
    pub fn validate(&self) -> Result<()> {
        if self.id == Some(0) {
            return Err(PacError::validation("host id must be positive"));
        }
        if self.host.trim().is_empty() {
            return Err(PacError::validation("host must not be empty"));
        }
        // Hosts are written verbatim into `;`-separated directive lists
        if let Some(c) = self.host.trim().chars().find(|c| {
            !(c.is_ascii_alphanumeric() || matches!(*c, '.' | '-' | '_' | ':' | '[' | ']'))
        }) {
            return Err(PacError::validation(format!(
                "host '{}' contains invalid character '{}'",
                self.host.trim(),
                c
            )));
        }
        if !(1..=65535).contains(&self.port) {
            return Err(PacError::validation(format!(
                "port {} is out of range 1-65535",
                self.port
            )));
        }
        Ok(())
    }
}

/// Domain pattern mapped to an ordered list of host ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub pattern: String,
    #[serde(rename = "hostIds", default)]
    pub host_ids: Vec<u32>,
}

/// Write-side shape of a rule. Host ids are decoded leniently.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleInput {
    pub pattern: String,
    #[serde(rename = "hostIds", default)]
    pub host_ids: Value,
}

impl RuleInput {
    pub fn into_rule(self) -> Result<Rule> {
        let pattern = self.pattern.trim().to_string();
        if pattern.is_empty() {
            return Err(PacError::validation("pattern must not be empty"));
        }
        // Patterns end up inside JavaScript regex literals
        if let Some(c) = pattern
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '.' | '-' | '_' | '*' | ':')))
        {
            return Err(PacError::validation(format!(
                "pattern '{}' contains invalid character '{}'",
                pattern, c
            )));
        }
        Ok(Rule {
            pattern,
            host_ids: decode_host_ids(&self.host_ids),
        })
    }
}

/// Immutable snapshot of everything the resolver needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub hosts: Vec<Host>,
    pub rules: Vec<Rule>,
}

impl HostConfig {
    pub fn host(&self, id: u32) -> Option<&Host> {
        self.hosts.iter().find(|h| h.id == id)
    }
}

/// Best-effort decode of a host id list.
///
/// Anything that is not a JSON array yields an empty list. Entries that are
/// not positive integers fitting in a `u32` are dropped, as are repeats
/// (first occurrence wins).
pub fn decode_host_ids(value: &Value) -> Vec<u32> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    clean_host_ids(
        items
            .iter()
            .filter_map(|v| v.as_u64())
            .filter_map(|v| u32::try_from(v).ok()),
    )
}

/// Drop zero ids and duplicates, preserving order
pub fn clean_host_ids<I: IntoIterator<Item = u32>>(ids: I) -> Vec<u32> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| *id > 0 && seen.insert(*id))
        .collect()
}
