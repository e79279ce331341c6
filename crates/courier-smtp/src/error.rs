//! Error types for SMTP operations.

use std::fmt;
use std::io;

use crate::types::ReplyCode;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which envelope command was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// `MAIL FROM`.
    Sender,
    /// `RCPT TO`.
    Recipient,
}

impl fmt::Display for EnvelopeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sender => f.write_str("sender"),
            Self::Recipient => f.write_str("recipient"),
        }
    }
}

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server returned error response.
    #[error("SMTP error {code}: {message}")]
    Smtp {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The TCP connection (or implicit TLS handshake) could not be established.
    #[error("failed to dial SMTP server: {0}")]
    Dial(#[source] io::Error),

    /// The protocol handle could not be created (usually a bad greeting).
    #[error("failed to create SMTP client: {0}")]
    ClientInit(#[source] Box<Error>),

    /// EHLO/HELO with the configured local name was rejected.
    #[error("failed to greet SMTP server: {0}")]
    Greeting(#[source] Box<Error>),

    /// STARTTLS was advertised but the upgrade failed.
    #[error("failed to start TLS: {0}")]
    TlsUpgrade(#[source] Box<Error>),

    /// The SASL exchange failed.
    #[error("failed to authenticate with SMTP server: {0}")]
    Authentication(#[source] Box<Error>),

    /// `MAIL FROM` or `RCPT TO` was rejected.
    #[error("{stage} address {address} rejected: {source}")]
    Envelope {
        /// Which command failed.
        stage: EnvelopeStage,
        /// The address that was submitted.
        address: String,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },

    /// `DATA` was rejected.
    #[error("failed to open data stream: {0}")]
    DataOpen(#[source] Box<Error>),

    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encoding(#[from] courier_mime::Error),

    /// Writing the message body failed.
    #[error("failed writing data: {0}")]
    DataWrite(#[source] Box<Error>),

    /// The server rejected the message after the terminating `.`.
    #[error("failed to close data stream: {0}")]
    DataClose(#[source] Box<Error>),

    /// QUIT failed.
    #[error("failed to close SMTP session: {0}")]
    SessionClose(#[source] Box<Error>),

    /// A SASL mechanism received a challenge it does not understand.
    #[error("unexpected server challenge: {0}")]
    UnexpectedChallenge(String),

    /// A SASL mechanism refused to continue.
    #[error("SASL error: {0}")]
    Sasl(String),
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::Smtp {
            code,
            message: message.into(),
        }
    }

    /// Returns the SMTP reply code behind this error, looking through
    /// wrapping variants.
    #[must_use]
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Smtp { code, .. } => Some(*code),
            Self::ClientInit(inner)
            | Self::Greeting(inner)
            | Self::TlsUpgrade(inner)
            | Self::Authentication(inner)
            | Self::DataOpen(inner)
            | Self::DataWrite(inner)
            | Self::DataClose(inner)
            | Self::SessionClose(inner)
            | Self::Envelope { source: inner, .. } => inner.reply_code(),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.reply_code()
            .is_some_and(|code| ReplyCode::new(code).is_permanent_failure())
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.reply_code()
            .is_some_and(|code| ReplyCode::new(code).is_transient_failure())
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
    use std::error::Error as _;

    #[test]
    fn test_classification() {
        assert!(Error::smtp_error(550, "no such user").is_permanent());
        assert!(Error::smtp_error(451, "try later").is_transient());
        assert!(!Error::Protocol("x".into()).is_permanent());
        assert!(!Error::Protocol("x".into()).is_transient());
    }

    #[test]
    fn test_classification_walks_chain() {
        let err = Error::Envelope {
            stage: EnvelopeStage::Recipient,
            address: "a@example.com".into(),
            source: Box::new(Error::smtp_error(550, "unknown")),
        };
        assert!(err.is_permanent());
        assert_eq!(err.reply_code(), Some(550));

        let err = Error::Authentication(Box::new(Error::smtp_error(454, "temp")));
        assert!(err.is_transient());
    }

    #[test]
    fn test_envelope_display() {
        let err = Error::Envelope {
            stage: EnvelopeStage::Sender,
            address: "s@example.com".into(),
            source: Box::new(Error::smtp_error(553, "denied")),
        };
        assert_eq!(
            err.to_string(),
            "sender address s@example.com rejected: SMTP error 553: denied"
        );
    }

    #[test]
    fn test_source_chain() {
        let err = Error::TlsUpgrade(Box::new(Error::smtp_error(454, "TLS not available")));
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "SMTP error 454: TLS not available");
    }

    #[test]
    fn test_dial_source_is_io() {
        let err = Error::Dial(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        let source = err.source().unwrap();
        assert!(source.downcast_ref::<io::Error>().is_some());
    }
}
