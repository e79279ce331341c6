//! SMTP reply types.

use crate::error::Error;

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply message lines.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// Returns true if this is a success reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the full message as a single string.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.message.join("\n")
    }

    /// Converts the reply into an [`Error::Smtp`].
    #[must_use]
    pub fn to_error(&self) -> Error {
        Error::smtp_error(self.code.as_u16(), self.message_text())
    }

    /// Succeeds if the reply code is `expected`, otherwise returns the reply
    /// as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Smtp`] carrying the server's code and text.
    pub fn expect_code(self, expected: ReplyCode) -> Result<Self, Error> {
        if self.code == expected {
            Ok(self)
        } else {
            Err(self.to_error())
        }
    }

    /// Succeeds on any 2xx reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Smtp`] carrying the server's code and text.
    pub fn expect_success(self) -> Result<Self, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.to_error())
        }
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns the first digit, which classifies the reply.
    #[must_use]
    pub const fn class(self) -> u16 {
        self.0 / 100
    }

    /// Returns true for 2xx.
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.class() == 2
    }

    /// Returns true for 4xx: the command may succeed if retried later.
    #[must_use]
    pub const fn is_transient_failure(self) -> bool {
        self.class() == 4
    }

    /// Returns true for 5xx.
    #[must_use]
    pub const fn is_permanent_failure(self) -> bool {
        self.class() == 5
    }
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

// Reply codes the client acts on
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 251 User not local; will forward
    pub const FORWARD: Self = Self(251);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
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

    mod reply_code_tests {
        use super::*;

        #[test]
        fn success_codes() {
            assert!(ReplyCode::OK.is_success());
            assert!(ReplyCode::SERVICE_READY.is_success());
            assert!(ReplyCode::CLOSING.is_success());
            assert!(ReplyCode::AUTH_SUCCESS.is_success());
            assert!(ReplyCode::FORWARD.is_success());
        }

        #[test]
        fn failure_classes() {
            assert!(ReplyCode::new(421).is_transient_failure());
            assert!(ReplyCode::new(550).is_permanent_failure());
            assert!(!ReplyCode::new(550).is_transient_failure());
            assert!(!ReplyCode::OK.is_permanent_failure());
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", ReplyCode::OK), "250");
            assert_eq!(ReplyCode::new(501).to_string(), "501");
        }
    }

    mod reply_tests {
        use super::*;

        #[test]
        fn message_text_multiple_lines() {
            let reply = Reply::new(
                ReplyCode::SERVICE_READY,
                vec![
                    "smtp.example.com ESMTP".to_string(),
                    "Ready to serve".to_string(),
                ],
            );
            assert_eq!(
                reply.message_text(),
                "smtp.example.com ESMTP\nReady to serve"
            );
        }

        #[test]
        fn message_text_empty() {
            let reply = Reply::new(ReplyCode::OK, vec![]);
            assert_eq!(reply.message_text(), "");
        }

        #[test]
        fn expect_code_matches() {
            let reply = Reply::new(ReplyCode::START_DATA, vec!["go ahead".to_string()]);
            assert!(reply.expect_code(ReplyCode::START_DATA).is_ok());
        }

        #[test]
        fn expect_code_mismatch_is_smtp_error() {
            let reply = Reply::new(ReplyCode::new(554), vec!["no".to_string()]);
            let err = reply.expect_code(ReplyCode::START_DATA).unwrap_err();
            assert!(matches!(err, Error::Smtp { code: 554, .. }));
            assert!(err.is_permanent());
        }

        #[test]
        fn expect_success() {
            assert!(Reply::new(ReplyCode::FORWARD, vec![]).expect_success().is_ok());
            let err = Reply::new(ReplyCode::new(451), vec!["later".into()])
                .expect_success()
                .unwrap_err();
            assert!(err.is_transient());
        }
    }
}
