//! SMTP connection management.
//!
//! This module provides:
//! - Configuration (host, port, credentials, TLS, timeouts)
//! - TLS/plaintext stream abstraction
//! - The [`SmtpCommands`] command layer and its [`SmtpClient`] implementation
//! - The [`Transport`] seam used to open connections
//! - [`Session`], an authenticated connection ready to send mail

mod client;
mod config;
mod session;
mod stream;
mod transport;

pub use client::{DataStream, SmtpClient};
pub use config::{Config, ConfigBuilder, DEFAULT_DIAL_TIMEOUT, SSL_PORT, TlsConfig};
pub use session::Session;
pub use stream::SmtpStream;
pub use transport::{TcpTransport, Transport};

use std::collections::BTreeMap;
use std::future::Future;

use crate::auth::Authenticator;
use crate::error::Result;

/// What the client knows about the server it is talking to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server name the client dialed.
    pub name: String,
    /// Whether the connection is TLS-protected.
    pub tls: bool,
    /// EHLO extensions: upper-cased keyword to parameter string.
    pub extensions: BTreeMap<String, String>,
}

impl ServerInfo {
    /// Creates server info for a freshly dialed server.
    #[must_use]
    pub fn new(name: impl Into<String>, tls: bool) -> Self {
        Self {
            name: name.into(),
            tls,
            extensions: BTreeMap::new(),
        }
    }

    /// Returns the parameters of an extension, if advertised.
    #[must_use]
    pub fn extension(&self, keyword: &str) -> Option<&str> {
        self.extensions
            .get(&keyword.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Checks if the server advertises an extension.
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.extension(keyword).is_some()
    }
}

/// Writer for the message body after `DATA`.
///
/// Bytes are written as-is apart from line-ending normalization and
/// dot-stuffing. [`close`](DataWriter::close) terminates the message and
/// reads the server's verdict.
pub trait DataWriter: Send {
    /// Writes message bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Ends the message with `.` and reads the reply.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// The SMTP command layer a [`Session`] and the negotiator drive.
pub trait SmtpCommands: Send {
    /// Data writer returned by [`data`](SmtpCommands::data).
    type Writer<'a>: DataWriter
    where
        Self: 'a;

    /// Greets the server with `name` (EHLO, falling back to HELO).
    /// Must be called before any other command, if at all.
    fn hello(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Returns the parameters of an extension, or `None` when the server
    /// does not advertise it. Greets the server first if needed.
    fn extension(&mut self, name: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Issues STARTTLS and upgrades the connection.
    fn start_tls(&mut self, tls: &TlsConfig) -> impl Future<Output = Result<()>> + Send;

    /// Runs a SASL exchange.
    fn auth(&mut self, auth: &dyn Authenticator) -> impl Future<Output = Result<()>> + Send;

    /// Issues `MAIL FROM`.
    fn mail(&mut self, from: &str) -> impl Future<Output = Result<()>> + Send;

    /// Issues `RCPT TO`.
    fn rcpt(&mut self, to: &str) -> impl Future<Output = Result<()>> + Send;

    /// Issues `DATA` and returns a writer for the message body.
    fn data(&mut self) -> impl Future<Output = Result<Self::Writer<'_>>> + Send;

    /// Sends QUIT and closes the connection.
    fn quit(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Closes the connection without QUIT.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;
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

    fn info() -> ServerInfo {
        let mut info = ServerInfo::new("smtp.example.com", false);
        info.extensions.insert("STARTTLS".into(), String::new());
        info.extensions
            .insert("AUTH".into(), "PLAIN LOGIN XOAUTH2".into());
        info
    }

    #[test]
    fn test_extension_lookup_is_case_insensitive() {
        let info = info();
        assert_eq!(info.extension("auth"), Some("PLAIN LOGIN XOAUTH2"));
        assert!(info.supports("starttls"));
        assert!(!info.supports("8BITMIME"));
    }
}
