//! Connection configuration types.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use crate::auth::{Authenticator, Credentials};
use crate::error::{Error, Result};

/// Port on which servers expect TLS from the first byte.
pub const SSL_PORT: u16 = 465;

/// Default time allowed for the TCP connect.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// TLS parameters for implicit TLS and STARTTLS.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    server_name: String,
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Creates a TLS configuration that verifies `server_name` against the
    /// webpki root store.
    #[must_use]
    pub fn new(server_name: impl Into<String>) -> Self {
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };

        let config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Self::with_client_config(server_name, Arc::new(config))
    }

    /// Creates a TLS configuration from a caller-built rustls config.
    #[must_use]
    pub fn with_client_config(
        server_name: impl Into<String>,
        client_config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            client_config,
        }
    }

    /// Returns the name used for SNI and certificate verification.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Returns the rustls client configuration.
    #[must_use]
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.client_config)
    }

    pub(crate) fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.client_config())
    }
}

/// SMTP connection configuration.
///
/// Immutable once built. Port 465, or [`ConfigBuilder::ssl`], selects
/// implicit TLS; any other port starts in cleartext and upgrades with
/// STARTTLS when the server offers it.
#[derive(Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login credentials; an empty username disables automatic
    /// authentication.
    pub credentials: Credentials,
    /// Name sent with EHLO/HELO. When unset the client greets lazily as
    /// `localhost`.
    pub local_name: Option<String>,
    /// TLS parameters.
    pub tls: TlsConfig,
    /// Connect timeout.
    pub dial_timeout: Duration,
    /// Use implicit TLS regardless of port.
    pub ssl: bool,
    /// Authenticator to use instead of selecting one from the server's
    /// advertised mechanisms.
    pub authenticator: Option<Arc<dyn Authenticator>>,
}

impl Config {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> ConfigBuilder {
        ConfigBuilder::new(host, port, username, password)
    }

    /// Returns true if TLS wraps the connection before any SMTP traffic.
    #[must_use]
    pub const fn implicit_tls(&self) -> bool {
        self.ssl || self.port == SSL_PORT
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("credentials", &self.credentials)
            .field("local_name", &self.local_name)
            .field("tls_server_name", &self.tls.server_name())
            .field("dial_timeout", &self.dial_timeout)
            .field("ssl", &self.ssl)
            .field("authenticator", &self.authenticator.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Builder for connection configuration.
///
/// Setters given an empty or zero value leave the default in place.
#[derive(Clone)]
pub struct ConfigBuilder {
    host: String,
    port: u16,
    credentials: Credentials,
    local_name: Option<String>,
    tls: Option<TlsConfig>,
    dial_timeout: Duration,
    ssl: bool,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl ConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: Credentials::new(username, password),
            local_name: None,
            tls: None,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            ssl: false,
            authenticator: None,
        }
    }

    /// Sets the name sent with EHLO/HELO.
    #[must_use]
    pub fn local_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.local_name = Some(name);
        }
        self
    }

    /// Sets the TLS parameters. Defaults to webpki roots and the server
    /// hostname.
    #[must_use]
    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.dial_timeout = timeout;
        }
        self
    }

    /// Sets an explicit authenticator.
    #[must_use]
    pub fn authenticator(mut self, auth: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(auth));
        self
    }

    /// Sets the CRAM-MD5 shared secret. Defaults to the password.
    #[must_use]
    pub fn cram_md5_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.credentials.cram_md5_secret = Some(secret);
        }
        self
    }

    /// Forces implicit TLS on a port other than 465.
    #[must_use]
    pub const fn ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host is empty or the port is zero.
    pub fn build(self) -> Result<Config> {
        if self.host.is_empty() {
            return Err(Error::Config("host cannot be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port cannot be zero".into()));
        }

        let tls = self.tls.unwrap_or_else(|| TlsConfig::new(self.host.clone()));

        Ok(Config {
            host: self.host,
            port: self.port,
            credentials: self.credentials,
            local_name: self.local_name,
            tls,
            dial_timeout: self.dial_timeout,
            ssl: self.ssl,
            authenticator: self.authenticator,
        })
    }
}

impl fmt::Debug for ConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::auth::LoginAuth;

    fn builder() -> ConfigBuilder {
        Config::builder("smtp.example.com", 587, "user", "pass")
    }

    #[test]
    fn test_defaults() {
        let config = builder().build().unwrap();
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.credentials.username, "user");
        assert_eq!(config.dial_timeout, DEFAULT_DIAL_TIMEOUT);
        assert_eq!(config.tls.server_name(), "smtp.example.com");
        assert!(config.local_name.is_none());
        assert!(config.authenticator.is_none());
        assert!(config.credentials.cram_md5_secret.is_none());
        assert!(!config.implicit_tls());
        assert_eq!(config.addr(), "smtp.example.com:587");
    }

    #[test]
    fn test_implicit_tls() {
        let config = Config::builder("smtp.example.com", SSL_PORT, "u", "p")
            .build()
            .unwrap();
        assert!(config.implicit_tls());

        let config = builder().ssl(true).build().unwrap();
        assert!(config.implicit_tls());
    }

    #[test]
    fn test_setters() {
        let config = builder()
            .local_name("client.example.com")
            .dial_timeout(Duration::from_secs(10))
            .cram_md5_secret("shared")
            .tls_config(TlsConfig::new("mx.example.com"))
            .authenticator(LoginAuth::new("user", "pass"))
            .build()
            .unwrap();

        assert_eq!(config.local_name.as_deref(), Some("client.example.com"));
        assert_eq!(config.dial_timeout, Duration::from_secs(10));
        assert_eq!(config.credentials.cram_md5_secret.as_deref(), Some("shared"));
        assert_eq!(config.tls.server_name(), "mx.example.com");
        assert!(config.authenticator.is_some());
    }

    #[test]
    fn test_empty_values_are_no_ops() {
        let config = builder()
            .local_name("")
            .dial_timeout(Duration::ZERO)
            .cram_md5_secret("")
            .build()
            .unwrap();

        assert!(config.local_name.is_none());
        assert_eq!(config.dial_timeout, DEFAULT_DIAL_TIMEOUT);
        assert!(config.credentials.cram_md5_secret.is_none());
    }

    #[test]
    fn test_build_validates() {
        let err = Config::builder("", 25, "", "").build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::builder("smtp.example.com", 0, "", "").build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::builder("smtp.example.com", 587, "user", "hunter2")
            .cram_md5_secret("shared-secret")
            .build()
            .unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("smtp.example.com"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("shared-secret"));
    }
}
