//! EHLO extension and SASL mechanism types.

/// Splits an EHLO response line into an upper-cased keyword and its
/// parameter string.
///
/// ```
/// use courier_smtp::types::parse_extension;
///
/// assert_eq!(
///     parse_extension("auth PLAIN LOGIN"),
///     ("AUTH".to_string(), "PLAIN LOGIN".to_string())
/// );
/// ```
#[must_use]
pub fn parse_extension(line: &str) -> (String, String) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((keyword, params)) => (keyword.to_ascii_uppercase(), params.trim().to_string()),
        None => (line.to_ascii_uppercase(), String::new()),
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
    /// CRAM-MD5 - challenge-response
    CramMd5,
}

impl AuthMechanism {
    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "CRAM-MD5" => Some(Self::CramMd5),
            _ => None,
        }
    }

    /// Parses every known mechanism in an AUTH parameter string, in order.
    #[must_use]
    pub fn parse_list(params: &str) -> Vec<Self> {
        params.split_whitespace().filter_map(Self::parse).collect()
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
        }
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
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

    mod extension_parse_tests {
        use super::*;

        #[test]
        fn parse_keyword_only() {
            assert_eq!(
                parse_extension("STARTTLS"),
                ("STARTTLS".to_string(), String::new())
            );
        }

        #[test]
        fn parse_lowercase() {
            assert_eq!(parse_extension("starttls").0, "STARTTLS");
        }

        #[test]
        fn parse_with_params() {
            assert_eq!(
                parse_extension("SIZE 52428800"),
                ("SIZE".to_string(), "52428800".to_string())
            );
        }

        #[test]
        fn parse_keeps_param_case() {
            assert_eq!(parse_extension("AUTH plain Login").1, "plain Login");
        }

        #[test]
        fn parse_empty() {
            assert_eq!(parse_extension(""), (String::new(), String::new()));
        }
    }

    mod auth_mechanism_tests {
        use super::*;

        #[test]
        fn parse_known() {
            assert_eq!(AuthMechanism::parse("PLAIN"), Some(AuthMechanism::Plain));
            assert_eq!(AuthMechanism::parse("plain"), Some(AuthMechanism::Plain));
            assert_eq!(AuthMechanism::parse("LOGIN"), Some(AuthMechanism::Login));
            assert_eq!(
                AuthMechanism::parse("cram-md5"),
                Some(AuthMechanism::CramMd5)
            );
        }

        #[test]
        fn parse_unknown() {
            assert_eq!(AuthMechanism::parse("XOAUTH2"), None);
            assert_eq!(AuthMechanism::parse("CRAM-MD5X"), None);
        }

        #[test]
        fn parse_list_skips_unknown() {
            assert_eq!(
                AuthMechanism::parse_list("XOAUTH2 LOGIN PLAIN"),
                vec![AuthMechanism::Login, AuthMechanism::Plain]
            );
            assert!(AuthMechanism::parse_list("").is_empty());
        }

        #[test]
        fn as_str() {
            assert_eq!(AuthMechanism::Plain.as_str(), "PLAIN");
            assert_eq!(AuthMechanism::Login.to_string(), "LOGIN");
            assert_eq!(AuthMechanism::CramMd5.as_str(), "CRAM-MD5");
        }
    }
}
