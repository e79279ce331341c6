//! Envelope address type.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Bare `local@domain` address for the SMTP envelope (`MAIL FROM` /
/// `RCPT TO`).
///
/// Only the checks that keep the command line well-formed are applied here;
/// full RFC 5322 parsing lives in `courier_mime::Mailbox`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates an envelope address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is empty, contains
    /// whitespace or angle brackets, or lacks a local part or domain.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        if let Some(reason) = rejection(&addr) {
            return Err(Error::InvalidAddress(format!("{addr:?}: {reason}")));
        }
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn rejection(addr: &str) -> Option<&'static str> {
    if addr.is_empty() {
        return Some("address is empty");
    }
    if addr.chars().any(char::is_whitespace) {
        return Some("address contains whitespace");
    }
    if addr.contains(['<', '>']) {
        return Some("address contains angle brackets");
    }
    match addr.rsplit_once('@') {
        None => Some("address has no @"),
        Some(("", _)) => Some("local part is empty"),
        Some((_, "")) => Some("domain is empty"),
        Some(_) => None,
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
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

    #[test]
    fn test_valid() {
        let addr: Address = "user@example.com".parse().unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.to_string(), "user@example.com");

        // Quoted local parts may contain '@'; the domain is after the last one
        assert!(Address::new("\"a@b\"@example.com").is_ok());
    }

    #[test]
    fn test_rejected() {
        for input in [
            "",
            "userexample.com",
            "@example.com",
            "user@",
            "user name@example.com",
            "user@example.com\r\nRCPT TO:<x@example.com>",
            "Name <user@example.com>",
        ] {
            let err = Address::new(input).unwrap_err();
            assert!(matches!(err, Error::InvalidAddress(_)), "{input:?}");
        }
    }

    #[test]
    fn test_error_names_the_problem() {
        let err = Address::new("user@").unwrap_err();
        assert!(err.to_string().contains("domain is empty"));
    }
}
