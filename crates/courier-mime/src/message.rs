//! Outgoing message model.

use crate::address::Mailbox;
use crate::encoder;
use crate::error::{Result, ValidationError};
use crate::header::Headers;

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// Raw payload; may be empty.
    pub data: Vec<u8>,
    /// MIME type, e.g. `application/pdf`.
    pub mime_type: String,
}

impl Attachment {
    /// Creates a new attachment.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        data: impl Into<Vec<u8>>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// An email message to encode and send.
///
/// Encoding borrows the message and never changes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    /// Sender address.
    pub from: String,
    /// Primary recipients. These are also the envelope recipients.
    pub recipients: Vec<String>,
    /// Carbon-copy recipients (header only).
    pub cc: Vec<String>,
    /// Blind carbon-copy recipients.
    ///
    /// Rendered as a visible `Bcc:` header, so every recipient of the encoded
    /// message can read it.
    pub bcc: Vec<String>,
    /// Plain text body.
    pub body: String,
    /// HTML body.
    pub html_body: String,
    /// Subject line.
    pub subject: String,
    /// Extra headers.
    pub headers: Headers,
    /// Attachments, in order.
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender.
    #[must_use]
    pub fn from(mut self, sender: impl Into<String>) -> Self {
        self.from = sender.into();
        self
    }

    /// Adds a primary recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.html_body = html.into();
        self
    }

    /// Appends an extra header value.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Checks the fields that must hold before the message is encoded.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found: empty or unparseable
    /// sender, no recipients, an unparseable recipient, a Cc or Bcc entry
    /// with control characters, or a malformed extra header. Cc and Bcc are
    /// not otherwise parsed.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.from.is_empty() {
            return Err(ValidationError::EmptyFrom);
        }
        Mailbox::parse(&self.from).map_err(|source| ValidationError::InvalidFrom {
            address: self.from.clone(),
            source,
        })?;

        if self.recipients.is_empty() {
            return Err(ValidationError::EmptyRecipients);
        }
        for recipient in &self.recipients {
            Mailbox::parse(recipient).map_err(|source| ValidationError::InvalidRecipient {
                address: recipient.clone(),
                source,
            })?;
        }

        for (name, addresses) in [("Cc", &self.cc), ("Bcc", &self.bcc)] {
            if addresses.iter().any(|a| a.chars().any(char::is_control)) {
                return Err(ValidationError::InvalidHeader {
                    name: name.to_string(),
                    reason: "address cannot contain control characters",
                });
            }
        }

        self.headers.validate()
    }

    /// Validates and encodes the message into RFC 5322 bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encoder::encode(self)
    }

    /// Returns true if a plain text body is set.
    #[must_use]
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Returns true if an HTML body is set.
    #[must_use]
    pub fn has_html_body(&self) -> bool {
        !self.html_body.is_empty()
    }

    /// Returns true if the message carries attachments.
    #[must_use]
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
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
    use crate::error::AddressError;

    fn valid() -> Message {
        Message::new()
            .from("sender@example.com")
            .to("recipient@example.com")
    }

    #[test]
    fn test_builder() {
        let message = valid()
            .cc("cc@example.com")
            .bcc("bcc@example.com")
            .subject("Hi")
            .body("plain")
            .html_body("<p>html</p>")
            .header("X-Mailer", "courier")
            .attach(Attachment::new("a.txt", b"abc".to_vec(), "text/plain"));

        assert_eq!(message.recipients, vec!["recipient@example.com"]);
        assert_eq!(message.cc, vec!["cc@example.com"]);
        assert_eq!(message.bcc, vec!["bcc@example.com"]);
        assert_eq!(message.headers.get("X-Mailer"), Some("courier"));
        assert!(message.has_body());
        assert!(message.has_html_body());
        assert!(message.has_attachments());
    }

    #[test]
    fn test_validate_ok() {
        assert!(valid().validate().is_ok());
        assert!(
            valid()
                .from("Sender Name <sender@example.com>")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_validate_empty_from() {
        let message = Message::new().to("recipient@example.com");
        assert_eq!(message.validate(), Err(ValidationError::EmptyFrom));
        assert_eq!(
            message.validate().unwrap_err().to_string(),
            "from address cannot be empty"
        );
    }

    #[test]
    fn test_validate_invalid_from() {
        let message = Message::new().from("invalid").to("recipient@example.com");
        let err = message.validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidFrom {
                address: "invalid".into(),
                source: AddressError::MissingAt,
            }
        );
        assert_eq!(err.address(), Some("invalid"));
    }

    #[test]
    fn test_validate_empty_recipients() {
        let message = Message::new().from("sender@example.com");
        assert_eq!(message.validate(), Err(ValidationError::EmptyRecipients));
    }

    #[test]
    fn test_validate_invalid_recipient() {
        let message = valid().to("not-an-address");
        let err = message.validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRecipient { .. }));
        assert_eq!(err.address(), Some("not-an-address"));
    }

    #[test]
    fn test_validate_ignores_cc_and_bcc() {
        let message = valid().cc("whatever").bcc("also whatever");
        assert!(message.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_line_breaks_in_copies() {
        let err = valid()
            .cc("c@example.com\r\nX-Injected: yes")
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidHeader {
                name: "Cc".into(),
                reason: "address cannot contain control characters",
            }
        );

        let err = valid().bcc("b@example.com\nX: y").validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidHeader { ref name, .. } if name == "Bcc"));
    }

    #[test]
    fn test_validate_rejects_line_breaks_in_from_name() {
        let message = Message::new()
            .from("Evil\r\nBcc: victim@example.com <a@example.com>")
            .to("b@example.com");
        assert!(matches!(
            message.validate(),
            Err(ValidationError::InvalidFrom {
                source: AddressError::InvalidCharacter('\r'),
                ..
            })
        ));
    }

    #[test]
    fn test_validate_bad_header() {
        let message = valid().header("X-Bad", "line\r\nbreak");
        assert!(matches!(
            message.validate(),
            Err(ValidationError::InvalidHeader { .. })
        ));
    }
}
