//! Inbound agent frames.
//!
//! After the handshake (first frame = agent name), everything an agent sends
//! is either a `CONFIRM <ip>` acknowledgement or free text the coordinator
//! logs and ignores.

use std::net::IpAddr;

use crate::error::ProtoError;

/// Prefix of an acknowledgement frame.
pub const CONFIRM_PREFIX: &str = "CONFIRM ";

/// Maximum accepted length for a declared agent name.
pub const MAX_AGENT_NAME_LENGTH: usize = 128;

/// A frame received from an agent after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentFrame {
    /// `CONFIRM <ip>` — the agent applied the rule for this address.
    Confirm(IpAddr),
    /// Anything else. Logged, never interpreted.
    Text(String),
}

impl AgentFrame {
    /// Classify a raw inbound text frame.
    ///
    /// A frame is a confirmation only if it is exactly `CONFIRM` followed by
    /// a single parseable IP address; anything else (including a malformed
    /// address after the prefix) falls through to [`AgentFrame::Text`] so a
    /// buggy agent cannot wedge the pump.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix(CONFIRM_PREFIX) {
            if let Ok(ip) = rest.trim().parse::<IpAddr>() {
                return Self::Confirm(ip);
            }
        }
        Self::Text(raw.to_string())
    }

    /// Render an acknowledgement frame for the given address.
    #[must_use]
    pub fn confirm_line(ip: IpAddr) -> String {
        format!("{CONFIRM_PREFIX}{ip}")
    }
}

/// Validate an agent's self-declared name from the handshake frame.
///
/// Names must be non-empty, at most [`MAX_AGENT_NAME_LENGTH`] bytes, and
/// free of control characters.
///
/// # Errors
///
/// Returns `ProtoError::InvalidAgentName` describing the violation.
pub fn validate_agent_name(name: &str) -> Result<(), ProtoError> {
    if name.is_empty() {
        return Err(ProtoError::InvalidAgentName(
            "name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_AGENT_NAME_LENGTH {
        return Err(ProtoError::InvalidAgentName(format!(
            "name too long: {} > {}",
            name.len(),
            MAX_AGENT_NAME_LENGTH
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(ProtoError::InvalidAgentName(
            "name contains control characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // ==================== AgentFrame Tests ====================

    #[test]
    fn test_parse_confirm_v4() {
        let frame = AgentFrame::parse("CONFIRM 10.0.0.1");
        assert_eq!(frame, AgentFrame::Confirm("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_parse_confirm_v6() {
        let frame = AgentFrame::parse("CONFIRM ::1");
        assert_eq!(frame, AgentFrame::Confirm("::1".parse().unwrap()));
    }

    #[test]
    fn test_parse_confirm_trailing_whitespace() {
        let frame = AgentFrame::parse("CONFIRM 10.0.0.1  ");
        assert_eq!(frame, AgentFrame::Confirm("10.0.0.1".parse().unwrap()));
    }

    #[test_case("CONFIRM not-an-ip" ; "bad address")]
    #[test_case("CONFIRM" ; "missing space and address")]
    #[test_case("confirm 10.0.0.1" ; "lowercase prefix")]
    #[test_case("status ok" ; "unrelated text")]
    #[test_case("" ; "empty")]
    fn test_parse_falls_through_to_text(raw: &str) {
        assert_eq!(AgentFrame::parse(raw), AgentFrame::Text(raw.to_string()));
    }

    #[test]
    fn test_confirm_line_roundtrip() {
        let ip: IpAddr = "192.0.2.7".parse().unwrap();
        let line = AgentFrame::confirm_line(ip);
        assert_eq!(AgentFrame::parse(&line), AgentFrame::Confirm(ip));
    }

    // ==================== validate_agent_name Tests ====================

    #[test]
    fn test_validate_agent_name_accepts_typical_names() {
        assert!(validate_agent_name("edge-fw-01").is_ok());
        assert!(validate_agent_name("gateway agent (dc2)").is_ok());
    }

    #[test]
    fn test_validate_agent_name_rejects_empty() {
        assert!(matches!(
            validate_agent_name(""),
            Err(ProtoError::InvalidAgentName(_))
        ));
    }

    #[test]
    fn test_validate_agent_name_rejects_too_long() {
        let name = "a".repeat(MAX_AGENT_NAME_LENGTH + 1);
        assert!(validate_agent_name(&name).is_err());
    }

    #[test]
    fn test_validate_agent_name_accepts_max_length() {
        let name = "a".repeat(MAX_AGENT_NAME_LENGTH);
        assert!(validate_agent_name(&name).is_ok());
    }

    #[test]
    fn test_validate_agent_name_rejects_control_chars() {
        assert!(validate_agent_name("edge\nfw").is_err());
        assert!(validate_agent_name("edge\0fw").is_err());
    }
}
