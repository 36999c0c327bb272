//! Directory client configuration
//!
//! Connection settings for a single LDAPS directory.

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};

/// Timeouts applied to every directory session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Connection (TCP + TLS handshake) timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: default_connection_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Configuration for one directory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Server URL. Only `ldaps://` is accepted.
    pub url: String,

    /// Suffix every managed entry lives under (e.g., "dc=example,dc=com").
    pub base_dn: String,

    /// Bind DN for authentication (e.g., "cn=admin,dc=example,dc=com").
    pub bind_dn: String,

    pub bind_password: String,

    /// PEM encoded CA certificate used to verify the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate_pem: Option<String>,

    #[serde(default = "default_verify_certificates")]
    pub verify_certificates: bool,

    #[serde(default)]
    pub connection: ConnectionSettings,
}

fn default_verify_certificates() -> bool {
    true
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("url", &self.url)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"***REDACTED***")
            .field(
                "ca_certificate_pem",
                &self.ca_certificate_pem.as_ref().map(|pem| pem.len()),
            )
            .field("verify_certificates", &self.verify_certificates)
            .field("connection", &self.connection)
            .finish()
    }
}

impl DirectoryConfig {
    /// Create a new config with required fields.
    pub fn new(
        url: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
        bind_password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            bind_password: bind_password.into(),
            ca_certificate_pem: None,
            verify_certificates: default_verify_certificates(),
            connection: ConnectionSettings::default(),
        }
    }

    /// Set the CA certificate.
    pub fn with_ca_certificate(mut self, pem: impl Into<String>) -> Self {
        self.ca_certificate_pem = Some(pem.into());
        self
    }

    #[must_use]
    pub fn with_verify_certificates(mut self, verify: bool) -> Self {
        self.verify_certificates = verify;
        self
    }

    #[must_use]
    pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = connection;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        if !self.url.to_ascii_lowercase().starts_with("ldaps://") {
            return Err(DirectoryError::invalid_configuration(format!(
                "directory url must use ldaps://, got '{}'",
                self.url
            )));
        }
        if self.url.len() == "ldaps://".len() {
            return Err(DirectoryError::invalid_configuration(
                "directory url has no host",
            ));
        }
        if self.base_dn.trim().is_empty() {
            return Err(DirectoryError::invalid_configuration("base_dn is required"));
        }
        if self.bind_dn.trim().is_empty() {
            return Err(DirectoryError::invalid_configuration("bind_dn is required"));
        }
        if self.bind_password.is_empty() {
            return Err(DirectoryError::invalid_configuration(
                "bind_password is required",
            ));
        }
        if self.connection.connection_timeout_secs == 0 || self.connection.request_timeout_secs == 0
        {
            return Err(DirectoryError::invalid_configuration(
                "timeouts must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DirectoryConfig {
        DirectoryConfig::new(
            "ldaps://dirsync-example.default.svc:636",
            "dc=example,dc=com",
            "cn=admin,dc=example,dc=com",
            "secret",
        )
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_rejects_plain_ldap() {
        let mut cfg = config();
        cfg.url = "ldap://dirsync-example.default.svc:389".to_string();

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("ldaps://"));
    }

    #[test]
    fn test_rejects_missing_fields() {
        let mut cfg = config();
        cfg.bind_password = String::new();
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.url = "ldaps://".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.base_dn = " ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", config());
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_defaults() {
        let cfg: DirectoryConfig = serde_json::from_value(serde_json::json!({
            "url": "ldaps://localhost:636",
            "base_dn": "dc=example,dc=com",
            "bind_dn": "cn=admin,dc=example,dc=com",
            "bind_password": "secret"
        }))
        .unwrap();

        assert!(cfg.verify_certificates);
        assert_eq!(cfg.connection, ConnectionSettings::default());
        assert_eq!(cfg.connection.request_timeout_secs, 30);
    }
}
