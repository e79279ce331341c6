//! SMTP command serialization.

use std::fmt;

use crate::types::Address;

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Mechanism name as returned by the authenticator
        mechanism: String,
        /// Base64 initial response (optional, for SASL-IR)
        initial_response: Option<String>,
    },
    /// A base64 line answering a 334 challenge
    AuthResponse(String),
    /// `*` - Abort an authentication exchange
    AuthCancel,
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
        /// BODY parameter (7BIT, 8BITMIME)
        body: Option<String>,
        /// Request SMTPUTF8 handling
        smtputf8: bool,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to its wire form, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        format!("{self}\r\n").into_bytes()
    }

    /// Returns the command verb for logging. Never includes credentials.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } => "AUTH",
            Self::AuthResponse(_) => "AUTH-RESPONSE",
            Self::AuthCancel => "AUTH-CANCEL",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Quit => "QUIT",
        }
    }
}

/// Wire form without the line ending. AUTH lines carry credentials, so log
/// [`Command::verb`] instead.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo { hostname } | Self::Ehlo { hostname } => {
                write!(f, "{} {hostname}", self.verb())
            }
            Self::Auth {
                mechanism,
                initial_response: Some(resp),
            } => write!(f, "AUTH {mechanism} {resp}"),
            Self::Auth { mechanism, .. } => write!(f, "AUTH {mechanism}"),
            Self::AuthResponse(resp) => f.write_str(resp),
            Self::AuthCancel => f.write_str("*"),
            Self::MailFrom {
                from,
                body,
                smtputf8,
            } => {
                write!(f, "MAIL FROM:<{from}>")?;
                if let Some(body) = body {
                    write!(f, " BODY={body}")?;
                }
                if *smtputf8 {
                    f.write_str(" SMTPUTF8")?;
                }
                Ok(())
            }
            Self::RcptTo { to } => write!(f, "RCPT TO:<{to}>"),
            Self::StartTls | Self::Data | Self::Quit => f.write_str(self.verb()),
        }
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

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn test_serialize() {
        let cases = [
            (
                Command::Helo {
                    hostname: "client.example.com".into(),
                },
                "HELO client.example.com\r\n",
            ),
            (
                Command::Ehlo {
                    hostname: "client.example.com".into(),
                },
                "EHLO client.example.com\r\n",
            ),
            (Command::StartTls, "STARTTLS\r\n"),
            (
                Command::Auth {
                    mechanism: "PLAIN".into(),
                    initial_response: Some("AHVzZXIAcGFzcw==".into()),
                },
                "AUTH PLAIN AHVzZXIAcGFzcw==\r\n",
            ),
            (
                Command::Auth {
                    mechanism: "CRAM-MD5".into(),
                    initial_response: None,
                },
                "AUTH CRAM-MD5\r\n",
            ),
            (Command::AuthResponse("dXNlcg==".into()), "dXNlcg==\r\n"),
            (Command::AuthCancel, "*\r\n"),
            (
                Command::RcptTo {
                    to: addr("recipient@example.com"),
                },
                "RCPT TO:<recipient@example.com>\r\n",
            ),
            (Command::Data, "DATA\r\n"),
            (Command::Quit, "QUIT\r\n"),
        ];

        for (cmd, expected) in cases {
            assert_eq!(
                String::from_utf8(cmd.serialize()).unwrap(),
                expected,
                "{}",
                cmd.verb()
            );
        }
    }

    #[test]
    fn test_mail_from_parameters() {
        let plain = Command::MailFrom {
            from: addr("sender@example.com"),
            body: None,
            smtputf8: false,
        };
        assert_eq!(plain.to_string(), "MAIL FROM:<sender@example.com>");

        let extended = Command::MailFrom {
            from: addr("sender@example.com"),
            body: Some("8BITMIME".into()),
            smtputf8: true,
        };
        assert_eq!(
            extended.to_string(),
            "MAIL FROM:<sender@example.com> BODY=8BITMIME SMTPUTF8"
        );
    }

    #[test]
    fn test_verb_hides_credentials() {
        let cmd = Command::AuthResponse("c2VjcmV0".into());
        assert_eq!(cmd.verb(), "AUTH-RESPONSE");
        assert!(!cmd.verb().contains("c2VjcmV0"));
    }
}
