//! # courier-smtp
//!
//! An async SMTP client: connection negotiation, authentication and
//! message submission.
//!
//! ## Features
//!
//! - **Negotiation**: dial with timeout, implicit TLS (port 465), EHLO with
//!   HELO fallback, opportunistic STARTTLS
//! - **Authentication**: CRAM-MD5, PLAIN and LOGIN, chosen from the server's
//!   AUTH list, or any custom [`Authenticator`]
//! - **Submission**: `MAIL`/`RCPT`/`DATA` with dot-stuffing, streaming the
//!   output of [`courier_mime`]
//! - **TLS**: rustls with the webpki root store
//!
//! ## Quick Start
//!
//! ```no_run
//! use courier_smtp::{Config, Message, send_once};
//!
//! #[tokio::main]
//! async fn main() -> courier_smtp::Result<()> {
//!     let config = Config::builder("smtp.example.com", 587, "user@example.com", "password")
//!         .local_name("client.example.com")
//!         .build()?;
//!
//!     let message = Message::new()
//!         .from("Sender <user@example.com>")
//!         .to("recipient@example.com")
//!         .subject("Test")
//!         .body("Hello, World!");
//!
//!     send_once(config, &message).await
//! }
//! ```
//!
//! ## Negotiation
//!
//! ```text
//! dial ──→ [TLS if 465] ──→ greeting ──→ [EHLO name]
//!                                            │
//!             ┌──── STARTTLS offered? ───────┘
//!             ▼
//!      [STARTTLS] ──→ [select CRAM-MD5 > PLAIN > LOGIN] ──→ [AUTH] ──→ Session
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: SASL mechanisms and mechanism selection
//! - [`command`]: SMTP command serialization
//! - [`connection`]: Configuration, streams, the command client and sessions
//! - [`parser`]: Reply parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod error;
mod mailer;
pub mod parser;
pub mod types;

pub use auth::{
    Authenticator, CramMd5Auth, Credentials, LoginAuth, PlainAuth, select_authenticator,
};
pub use connection::{
    Config, ConfigBuilder, DataWriter, ServerInfo, Session, SmtpClient, SmtpCommands,
    TcpTransport, TlsConfig, Transport,
};
pub use courier_mime::{Attachment, Message};
pub use error::{EnvelopeStage, Error, Result};
pub use mailer::{Mailer, send_once};
pub use types::{Address, AuthMechanism, Reply, ReplyCode};
