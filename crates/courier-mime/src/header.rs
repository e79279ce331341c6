//! Extra message headers.

use crate::encoding::CRLF;
use crate::error::ValidationError;
use std::collections::BTreeMap;
use std::fmt;

/// Caller-supplied headers, kept in ascending name order.
///
/// Names are stored exactly as given. Each name maps to an ordered list of
/// values, rendered on one line as `Name: v1, v2`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Headers {
    headers: BTreeMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value to a header.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Sets a header value, replacing any existing values.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), vec![value.into()]);
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(name)
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.headers.remove(name);
    }

    /// Returns true if no headers are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns the number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Iterates over `(name, values)` in ascending name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.headers
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Checks that every header renders as a single well-formed line.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidHeader`] for an empty name, a name
    /// with whitespace, control characters or `:`, or a value containing CR
    /// or LF.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, values) in &self.headers {
            let invalid = |reason| ValidationError::InvalidHeader {
                name: name.clone(),
                reason,
            };

            if name.is_empty() {
                return Err(invalid("header name cannot be empty"));
            }
            if name
                .chars()
                .any(|c| c == ':' || !c.is_ascii_graphic())
            {
                return Err(invalid("header name must be printable ASCII without ':'"));
            }
            if values.iter().any(|v| v.contains(['\r', '\n'])) {
                return Err(invalid("header value cannot contain line breaks"));
            }
        }

        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, values) in &self.headers {
            write!(f, "{name}: {}{CRLF}", values.join(", "))?;
        }
        Ok(())
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
    fn test_headers_new() {
        let headers = Headers::new();
        assert!(headers.is_empty());
        assert_eq!(headers.to_string(), "");
    }

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("X-Mailer", "courier");
        assert_eq!(headers.get("X-Mailer"), Some("courier"));
        assert_eq!(headers.get("x-mailer"), None);
    }

    #[test]
    fn test_headers_set() {
        let mut headers = Headers::new();
        headers.add("Reply-To", "alice@example.com");
        headers.add("Reply-To", "bob@example.com");
        assert_eq!(headers.get_all("Reply-To").len(), 2);

        headers.set("Reply-To", "charlie@example.com");
        assert_eq!(headers.get_all("Reply-To"), vec!["charlie@example.com"]);
    }

    #[test]
    fn test_headers_remove() {
        let mut headers = Headers::new();
        headers.add("X-Priority", "1");
        headers.remove("X-Priority");
        assert!(headers.get("X-Priority").is_none());
    }

    #[test]
    fn test_headers_display_sorted_and_joined() {
        let headers: Headers = [
            ("X-Tag", "b"),
            ("Message-ID", "<124@example.com>"),
            ("X-Tag", "a"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            headers.to_string(),
            "Message-ID: <124@example.com>\r\nX-Tag: b, a\r\n"
        );
    }

    #[test]
    fn test_headers_display_independent_of_insertion_order() {
        let first: Headers = [("B", "2"), ("A", "1")].into_iter().collect();
        let second: Headers = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_validate_ok() {
        let headers: Headers = [("message-id", "124")].into_iter().collect();
        assert!(headers.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        for name in ["", "Bad Name", "Bad:Name"] {
            let headers: Headers = [(name, "v")].into_iter().collect();
            assert!(matches!(
                headers.validate(),
                Err(ValidationError::InvalidHeader { .. })
            ));
        }
    }

    #[test]
    fn test_validate_rejects_line_breaks() {
        let headers: Headers = [("X-Test", "a\r\nBcc: evil@example.com")]
            .into_iter()
            .collect();
        assert!(headers.validate().is_err());
    }
}
