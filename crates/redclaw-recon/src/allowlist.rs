//! Scan target and tool allowlisting.
//!
//! Every scan request passes through here before anything is spawned.
//! A target is acceptable when it is syntactically valid AND either a
//! private (RFC1918/loopback) address with `allow_private` on, or matches
//! one of the configured target patterns.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;

use redclaw_core::config::ScanConfig;
use redclaw_core::error::{RedClawError, Result};

static HOSTNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,62}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,62}[A-Za-z0-9])?)*$").unwrap()
});

pub struct TargetAllowlist {
    allowed_tools: Vec<String>,
    allowed_targets: Vec<String>,
    allow_private: bool,
}

impl TargetAllowlist {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            allowed_tools: config.allowed_tools.clone(),
            allowed_targets: config.allowed_targets.clone(),
            allow_private: config.allow_private,
        }
    }

    pub fn is_tool_allowed(&self, tool: &str) -> bool {
        self.allowed_tools.iter().any(|t| t == tool)
    }

    /// Validate a target or return why it was rejected.
    pub fn check_target(&self, target: &str) -> Result<()> {
        let target = target.trim();
        if target.is_empty() || target.len() > 253 {
            return Err(RedClawError::Tool("Invalid target".into()));
        }
        // Nothing that could smuggle shell syntax into an argv.
        if target
            .chars()
            .any(|c| !(c.is_alphanumeric() || matches!(c, '.' | '-' | ':' | '/')))
        {
            return Err(RedClawError::Tool(format!(
                "Target contains forbidden characters: {target}"
            )));
        }

        let host = target.split('/').next().unwrap_or(target);

        if let Ok(ip) = host.parse::<IpAddr>() {
            if self.allow_private && is_private(&ip) {
                return Ok(());
            }
        } else if !HOSTNAME_RE.is_match(host) {
            return Err(RedClawError::Tool(format!("Invalid target syntax: {target}")));
        }

        if self.matches_pattern(host) {
            return Ok(());
        }

        Err(RedClawError::Tool(format!(
            "Target not in allowlist: {target}"
        )))
    }

    fn matches_pattern(&self, host: &str) -> bool {
        self.allowed_targets.iter().any(|pattern| {
            host == pattern
                || host.ends_with(&format!(".{pattern}"))
                || (pattern.ends_with('.') && host.starts_with(pattern))
        })
    }
}

fn is_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist(targets: &[&str], allow_private: bool) -> TargetAllowlist {
        TargetAllowlist::new(&ScanConfig {
            allowed_targets: targets.iter().map(|s| s.to_string()).collect(),
            allow_private,
            ..ScanConfig::default()
        })
    }

    #[test]
    fn test_private_addresses_allowed() {
        let al = allowlist(&[], true);
        assert!(al.check_target("192.168.1.10").is_ok());
        assert!(al.check_target("10.0.0.1").is_ok());
        assert!(al.check_target("127.0.0.1").is_ok());
        assert!(al.check_target("10.10.0.0/24").is_ok());
    }

    #[test]
    fn test_public_address_rejected_without_pattern() {
        let al = allowlist(&[], true);
        assert!(al.check_target("8.8.8.8").is_err());
        assert!(al.check_target("example.com").is_err());
    }

    #[test]
    fn test_pattern_matches_domain_and_subdomains() {
        let al = allowlist(&["lab.example.com"], false);
        assert!(al.check_target("lab.example.com").is_ok());
        assert!(al.check_target("web01.lab.example.com").is_ok());
        assert!(al.check_target("evil-lab.example.com").is_err());
    }

    #[test]
    fn test_private_rejected_when_disabled() {
        let al = allowlist(&[], false);
        assert!(al.check_target("192.168.1.10").is_err());
    }

    #[test]
    fn test_shell_metacharacters_rejected() {
        let al = allowlist(&[], true);
        assert!(al.check_target("127.0.0.1; rm -rf /").is_err());
        assert!(al.check_target("$(whoami)").is_err());
        assert!(al.check_target("host`id`").is_err());
        assert!(al.check_target("").is_err());
    }

    #[test]
    fn test_tool_allowlist() {
        let al = allowlist(&[], true);
        assert!(al.is_tool_allowed("nmap"));
        assert!(!al.is_tool_allowed("metasploit"));
    }
}
