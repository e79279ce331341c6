//! # courier-mime
//!
//! Deterministic MIME encoding for outgoing email.
//!
//! ## Features
//!
//! - **Message model**: sender, To/Cc/Bcc, subject, plain and HTML bodies,
//!   extra headers and attachments
//! - **Validation**: RFC 5322 address checks before anything is encoded
//! - **Encoder**: byte-identical output for identical input, covering
//!   plain-only, HTML-only, `multipart/alternative` and `multipart/mixed`
//!   shapes
//! - **Helpers**: unpadded Base64, 76-character line folding, RFC 2047
//!   subject encoding
//!
//! ## Quick Start
//!
//! ```
//! use courier_mime::{Attachment, Message};
//!
//! let message = Message::new()
//!     .from("sender@example.com")
//!     .to("recipient@example.com")
//!     .subject("Quarterly report")
//!     .body("Report attached.")
//!     .html_body("<p>Report attached.</p>")
//!     .attach(Attachment::new("report.pdf", b"%PDF-1.7".to_vec(), "application/pdf"));
//!
//! let bytes = message.encode()?;
//! assert!(bytes.starts_with(b"MIME-Version: 1.0\r\n"));
//! # Ok::<(), courier_mime::Error>(())
//! ```
//!
//! ## Content shapes
//!
//! ```text
//! attachments? ── yes ──→ multipart/mixed (body part(s) + one part per attachment)
//!      │
//!      no
//!      │
//! plain + html ──────────→ multipart/alternative (plain, then html)
//! html only ─────────────→ text/html; charset=UTF-8
//! otherwise ─────────────→ text/plain; charset=us-ascii
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod encoder;
mod error;
mod header;
mod message;

pub mod encoding;

pub use address::Mailbox;
pub use encoder::{ALT_BOUNDARY, BOUNDARY, encode};
pub use error::{AddressError, Error, Result, ValidationError};
pub use header::Headers;
pub use message::{Attachment, Message};
