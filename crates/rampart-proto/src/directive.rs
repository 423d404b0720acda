//! Outbound directives: firewall command lines and advisories.
//!
//! Block/unblock directives are rendered as iptables-style command lines the
//! agent relays to its host firewall; the low-weight advisory is a JSON
//! document. Only block and unblock expect a `CONFIRM <ip>` acknowledgement.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Advisory `type` tag for a low-weight warning.
pub const LOW_WEIGHT_ADVISORY_TYPE: &str = "low_weight_warning";

/// JSON advisory sent when an address's weight has decayed to the low
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowWeightAdvisory {
    /// Advisory discriminator, always [`LOW_WEIGHT_ADVISORY_TYPE`].
    #[serde(rename = "type")]
    pub kind: String,
    /// The address whose weight decayed.
    pub ip: IpAddr,
    /// The weight after decay.
    pub weight: u32,
    /// When the advisory was produced.
    pub timestamp: DateTime<Utc>,
}

/// An instruction for the tenant's enforcement agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Install a drop rule for the address.
    Block {
        /// Address to block.
        ip: IpAddr,
    },
    /// Remove the drop rule for the address.
    Unblock {
        /// Address to release.
        ip: IpAddr,
    },
    /// Advisory: the address's weight decayed to the low boundary.
    LowWeight {
        /// Address concerned.
        ip: IpAddr,
        /// Weight after decay.
        weight: u32,
        /// When the advisory was produced.
        timestamp: DateTime<Utc>,
    },
}

impl Directive {
    /// Create a block directive.
    #[must_use]
    pub const fn block(ip: IpAddr) -> Self {
        Self::Block { ip }
    }

    /// Create an unblock directive.
    #[must_use]
    pub const fn unblock(ip: IpAddr) -> Self {
        Self::Unblock { ip }
    }

    /// Create a low-weight advisory.
    #[must_use]
    pub fn low_weight(ip: IpAddr, weight: u32) -> Self {
        Self::LowWeight {
            ip,
            weight,
            timestamp: Utc::now(),
        }
    }

    /// The address this directive concerns.
    #[must_use]
    pub const fn ip(&self) -> IpAddr {
        match self {
            Self::Block { ip } | Self::Unblock { ip } | Self::LowWeight { ip, .. } => *ip,
        }
    }

    /// The address whose `CONFIRM` frame acknowledges this directive, if it
    /// is delivered reliably. Advisories are fire-and-forget.
    #[must_use]
    pub const fn ack_ip(&self) -> Option<IpAddr> {
        match self {
            Self::Block { ip } | Self::Unblock { ip } => Some(*ip),
            Self::LowWeight { .. } => None,
        }
    }

    /// Render the wire frame for this directive.
    ///
    /// `interface` is the network interface the rule applies to on the
    /// agent's host.
    ///
    /// # Errors
    ///
    /// Returns an error if advisory JSON encoding fails.
    pub fn render(&self, interface: &str) -> Result<String, ProtoError> {
        match self {
            Self::Block { ip } => Ok(format!(
                "IPTABLES -A INPUT -i {interface} -s {ip} -j DROP"
            )),
            Self::Unblock { ip } => Ok(format!(
                "IPTABLES -D INPUT -i {interface} -s {ip} -j DROP"
            )),
            Self::LowWeight {
                ip,
                weight,
                timestamp,
            } => {
                let advisory = LowWeightAdvisory {
                    kind: LOW_WEIGHT_ADVISORY_TYPE.to_string(),
                    ip: *ip,
                    weight: *weight,
                    timestamp: *timestamp,
                };
                Ok(serde_json::to_string(&advisory)?)
            }
        }
    }

    /// Parse a received wire frame back into a directive.
    ///
    /// # Errors
    ///
    /// Returns `ProtoError::InvalidFrame` if the line matches none of the
    /// known shapes.
    pub fn parse(raw: &str) -> Result<Self, ProtoError> {
        let trimmed = raw.trim();

        if trimmed.starts_with('{') {
            let advisory: LowWeightAdvisory = serde_json::from_str(trimmed)
                .map_err(|e| ProtoError::InvalidFrame(format!("bad advisory: {e}")))?;
            if advisory.kind != LOW_WEIGHT_ADVISORY_TYPE {
                return Err(ProtoError::InvalidFrame(format!(
                    "unknown advisory type: {}",
                    advisory.kind
                )));
            }
            return Ok(Self::LowWeight {
                ip: advisory.ip,
                weight: advisory.weight,
                timestamp: advisory.timestamp,
            });
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if tokens.first() != Some(&"IPTABLES") {
            return Err(ProtoError::InvalidFrame(format!(
                "unrecognized directive: {}",
                &trimmed[..trimmed.len().min(80)]
            )));
        }

        let action = tokens.get(1).copied();
        let ip = tokens
            .iter()
            .position(|t| *t == "-s")
            .and_then(|i| tokens.get(i + 1))
            .and_then(|s| s.parse::<IpAddr>().ok())
            .ok_or_else(|| {
                ProtoError::InvalidFrame("missing or invalid -s address".to_string())
            })?;

        match action {
            Some("-A") => Ok(Self::Block { ip }),
            Some("-D") => Ok(Self::Unblock { ip }),
            other => Err(ProtoError::InvalidFrame(format!(
                "unknown iptables action: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        "203.0.113.9".parse().unwrap()
    }

    // ==================== Render Tests ====================

    #[test]
    fn test_render_block() {
        let line = Directive::block(ip()).render("eth0").unwrap();
        assert_eq!(line, "IPTABLES -A INPUT -i eth0 -s 203.0.113.9 -j DROP");
    }

    #[test]
    fn test_render_unblock() {
        let line = Directive::unblock(ip()).render("eth1").unwrap();
        assert_eq!(line, "IPTABLES -D INPUT -i eth1 -s 203.0.113.9 -j DROP");
    }

    #[test]
    fn test_render_low_weight_is_json() {
        let line = Directive::low_weight(ip(), 18).render("eth0").unwrap();
        let advisory: LowWeightAdvisory = serde_json::from_str(&line).unwrap();

        assert_eq!(advisory.kind, LOW_WEIGHT_ADVISORY_TYPE);
        assert_eq!(advisory.ip, ip());
        assert_eq!(advisory.weight, 18);
    }

    // ==================== Parse Tests ====================

    #[test]
    fn test_parse_block_line() {
        let parsed = Directive::parse("IPTABLES -A INPUT -i eth0 -s 203.0.113.9 -j DROP").unwrap();
        assert_eq!(parsed, Directive::block(ip()));
    }

    #[test]
    fn test_parse_unblock_line() {
        let parsed = Directive::parse("IPTABLES -D INPUT -i eth0 -s 203.0.113.9 -j DROP").unwrap();
        assert_eq!(parsed, Directive::unblock(ip()));
    }

    #[test]
    fn test_parse_advisory_roundtrip() {
        let directive = Directive::low_weight(ip(), 20);
        let line = directive.render("eth0").unwrap();
        assert_eq!(Directive::parse(&line).unwrap(), directive);
    }

    #[test]
    fn test_parse_rejects_unknown_action() {
        let result = Directive::parse("IPTABLES -X INPUT -i eth0 -s 203.0.113.9 -j DROP");
        assert!(matches!(result, Err(ProtoError::InvalidFrame(_))));
    }

    #[test]
    fn test_parse_rejects_missing_address() {
        let result = Directive::parse("IPTABLES -A INPUT -i eth0 -j DROP");
        assert!(matches!(result, Err(ProtoError::InvalidFrame(_))));
    }

    #[test]
    fn test_parse_rejects_free_text() {
        assert!(Directive::parse("hello there").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_advisory_type() {
        let raw = format!(
            "{{\"type\":\"weather_report\",\"ip\":\"{}\",\"weight\":5,\"timestamp\":\"2026-01-01T00:00:00Z\"}}",
            ip()
        );
        assert!(Directive::parse(&raw).is_err());
    }

    // ==================== Ack Semantics Tests ====================

    #[test]
    fn test_ack_ip_for_rule_directives() {
        assert_eq!(Directive::block(ip()).ack_ip(), Some(ip()));
        assert_eq!(Directive::unblock(ip()).ack_ip(), Some(ip()));
    }

    #[test]
    fn test_advisory_needs_no_ack() {
        assert_eq!(Directive::low_weight(ip(), 20).ack_ip(), None);
    }
}
