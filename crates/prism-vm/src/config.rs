//! Control plane endpoint and credential configuration.
//!
//! Values come from command line flags or the `NUTANIX_*` environment
//! variables, so the same environment that drives other Prism tooling can be
//! reused as is.

use clap::Args;
use thiserror::Error;
use url::Url;

/// Default Prism Central API port.
pub const DEFAULT_PORT: u16 = 9440;

/// Configuration errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required value was not supplied.
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// The endpoint could not be turned into a URL.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Prism Central connection settings.
#[derive(Args, Clone)]
pub struct ControlPlaneConfig {
    /// Prism Central address, either a host name or a full URL.
    #[arg(long = "endpoint", env = "NUTANIX_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Prism Central port, used when the endpoint has no scheme.
    #[arg(long = "port", env = "NUTANIX_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Prism Central user name.
    #[arg(long = "username", env = "NUTANIX_USERNAME")]
    pub username: Option<String>,

    /// Prism Central password.
    #[arg(long = "password", env = "NUTANIX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Skip TLS certificate verification.
    #[arg(long = "insecure", env = "NUTANIX_INSECURE")]
    pub insecure: bool,

    /// PEM encoded certificates to trust in addition to the system roots.
    #[arg(
        long = "additional-trust-bundle",
        env = "NUTANIX_ADDITIONAL_TRUST_BUNDLE",
        hide_env_values = true
    )]
    pub trust_bundle: Option<String>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            port: DEFAULT_PORT,
            username: None,
            password: None,
            insecure: false,
            trust_bundle: None,
        }
    }
}

impl std::fmt::Debug for ControlPlaneConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneConfig")
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("insecure", &self.insecure)
            .field("trust_bundle", &self.trust_bundle.as_ref().map(|_| "<pem>"))
            .finish()
    }
}

impl ControlPlaneConfig {
    /// Create a configuration for the given endpoint and credentials.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            username: Some(username.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    /// Set the additional trust bundle.
    #[must_use]
    pub fn with_trust_bundle(mut self, pem: impl Into<String>) -> Self {
        self.trust_bundle = Some(pem.into());
        self
    }

    /// Disable certificate verification.
    #[must_use]
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Base URL of the API server.
    ///
    /// A bare host name becomes `https://<host>:<port>`; a value that already
    /// carries a scheme is used verbatim.
    ///
    /// # Errors
    /// Returns an error if the endpoint is missing or not a valid URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let endpoint =
            non_empty(self.endpoint.as_deref()).ok_or(ConfigError::Missing("NUTANIX_ENDPOINT"))?;

        let raw = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}:{}", self.port)
        };

        Url::parse(&raw).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }

    /// User name and password.
    ///
    /// # Errors
    /// Returns an error if either value is missing.
    pub fn credentials(&self) -> Result<(&str, &str), ConfigError> {
        let username =
            non_empty(self.username.as_deref()).ok_or(ConfigError::Missing("NUTANIX_USERNAME"))?;
        let password =
            non_empty(self.password.as_deref()).ok_or(ConfigError::Missing("NUTANIX_PASSWORD"))?;
        Ok((username, password))
    }

    /// Trust bundle, if one was supplied.
    #[must_use]
    pub fn trust_bundle(&self) -> Option<&str> {
        non_empty(self.trust_bundle.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_host() {
        let config = ControlPlaneConfig::new("pc.example.com", "admin", "secret");
        assert_eq!(
            config.base_url().unwrap().as_str(),
            "https://pc.example.com:9440/"
        );
    }

    #[test]
    fn test_base_url_with_scheme_is_verbatim() {
        let config = ControlPlaneConfig::new("http://127.0.0.1:8080", "admin", "secret");
        assert_eq!(config.base_url().unwrap().as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_missing_endpoint() {
        let config = ControlPlaneConfig::default();
        assert_eq!(
            config.base_url().unwrap_err(),
            ConfigError::Missing("NUTANIX_ENDPOINT")
        );
    }

    #[test]
    fn test_missing_password() {
        let mut config = ControlPlaneConfig::new("pc.example.com", "admin", "");
        config.password = Some("  ".into());
        assert_eq!(
            config.credentials().unwrap_err(),
            ConfigError::Missing("NUTANIX_PASSWORD")
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ControlPlaneConfig::new("pc.example.com", "admin", "hunter2")
            .with_trust_bundle("-----BEGIN CERTIFICATE-----");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("BEGIN CERTIFICATE"));
        assert!(rendered.contains("<redacted>"));
    }
}
