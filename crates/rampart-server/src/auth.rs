//! Tenant resolution for incoming channels.
//!
//! Credential issuing and validation belong to the auth collaborator; by the
//! time a channel reaches the core, the bearer token maps to an
//! already-validated tenant identity. The trait is that boundary; the static
//! implementation backs tests and single-box deployments.

use std::collections::HashMap;
use std::path::Path;

use rampart_proto::TenantId;

use crate::error::{ServerError, ServerResult};

/// Resolves an opaque bearer token to the tenant it identifies.
pub trait TenantAuthenticator: Send + Sync {
    /// The tenant the token belongs to, or `None` if it is unknown.
    fn resolve(&self, token: &str) -> Option<TenantId>;
}

/// A fixed token → tenant map.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, TenantId>,
}

impl StaticTokenAuthenticator {
    /// Create an empty authenticator (rejects everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an authenticator from an existing map.
    #[must_use]
    pub fn from_map(tokens: HashMap<String, TenantId>) -> Self {
        Self { tokens }
    }

    /// Add a token for a tenant.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, tenant: TenantId) -> Self {
        self.tokens.insert(token.into(), tenant);
        self
    }

    /// Load a token map from a JSON file of `{"<token>": "<tenant uuid>"}`.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::TokenFile` if the file cannot be read or
    /// parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ServerError::TokenFile(e.to_string()))?;
        let tokens: HashMap<String, TenantId> =
            serde_json::from_str(&raw).map_err(|e| ServerError::TokenFile(e.to_string()))?;
        Ok(Self { tokens })
    }

    /// Number of known tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no tokens are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TenantAuthenticator for StaticTokenAuthenticator {
    fn resolve(&self, token: &str) -> Option<TenantId> {
        self.tokens.get(token).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_rejects_everything() {
        let auth = StaticTokenAuthenticator::new();
        assert!(auth.is_empty());
        assert!(auth.resolve("anything").is_none());
    }

    #[test]
    fn test_resolve_known_token() {
        let tenant = TenantId::new();
        let auth = StaticTokenAuthenticator::new().with_token("secret-token", tenant);

        assert_eq!(auth.resolve("secret-token"), Some(tenant));
        assert!(auth.resolve("other-token").is_none());
    }

    #[test]
    fn test_from_json_file() {
        let tenant = TenantId::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"tok-1\": \"{tenant}\"}}").unwrap();

        let auth = StaticTokenAuthenticator::from_json_file(file.path()).unwrap();

        assert_eq!(auth.len(), 1);
        assert_eq!(auth.resolve("tok-1"), Some(tenant));
    }

    #[test]
    fn test_from_json_file_missing() {
        let result = StaticTokenAuthenticator::from_json_file("/nonexistent/tokens.json");
        assert!(matches!(result, Err(ServerError::TokenFile(_))));
    }

    #[test]
    fn test_from_json_file_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let result = StaticTokenAuthenticator::from_json_file(file.path());
        assert!(matches!(result, Err(ServerError::TokenFile(_))));
    }
}
