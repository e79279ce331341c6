//! RFC 5322 mailbox parsing.

use crate::error::AddressError;

/// Characters allowed in an unquoted local part besides alphanumerics.
const ATEXT_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

/// A parsed mailbox: optional display name and bare address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name, if one was given.
    pub name: Option<String>,
    /// The `local@domain` address.
    pub address: String,
}

impl Mailbox {
    /// Parses `local@domain` or `Display Name <local@domain>`.
    ///
    /// The display name may be quoted (`"Doe, John" <john@example.com>`).
    /// Comments are skipped, and a comment stands in for a missing display
    /// name (`john@example.com (John Doe)`). Control characters other than
    /// tab are rejected anywhere in the input.
    ///
    /// # Errors
    ///
    /// Returns an [`AddressError`] describing the first problem found.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        if let Some(c) = input.chars().find(|&c| c.is_control() && c != '\t') {
            return Err(AddressError::InvalidCharacter(c));
        }

        let (stripped, comment) = strip_comments(input)?;
        let input = stripped.trim();
        if input.is_empty() {
            return Err(AddressError::Empty);
        }

        if input.contains('<') {
            let Some(without_close) = input.strip_suffix('>') else {
                return Err(AddressError::UnterminatedAngle);
            };
            let Some(open) = without_close.rfind('<') else {
                return Err(AddressError::UnterminatedAngle);
            };

            let address = addr_spec(without_close[open + 1..].trim())?;

            return Ok(Self {
                name: display_name(&without_close[..open]).or(comment),
                address,
            });
        }

        Ok(Self {
            name: comment,
            address: addr_spec(input)?,
        })
    }
}

/// Replaces each comment outside quoted strings and domain literals with a
/// space. Also returns the text of the first non-empty comment.
fn strip_comments(input: &str) -> Result<(String, Option<String>), AddressError> {
    let mut out = String::with_capacity(input.len());
    let mut comment = String::new();
    let mut first_comment = None;
    let mut depth = 0usize;
    let mut quoted = false;
    let mut literal = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if depth > 0 {
            match c {
                '\\' => comment.extend(chars.next()),
                '(' => {
                    depth += 1;
                    comment.push(c);
                }
                ')' => {
                    depth -= 1;
                    if depth > 0 {
                        comment.push(c);
                        continue;
                    }
                    out.push(' ');
                    let text = comment.trim();
                    if first_comment.is_none() && !text.is_empty() {
                        first_comment = Some(text.to_string());
                    }
                    comment.clear();
                }
                _ => comment.push(c),
            }
            continue;
        }

        match c {
            '\\' if quoted => {
                out.push(c);
                out.extend(chars.next());
            }
            '"' if !literal => {
                quoted = !quoted;
                out.push(c);
            }
            '[' if !quoted => {
                literal = true;
                out.push(c);
            }
            ']' if !quoted => {
                literal = false;
                out.push(c);
            }
            '(' if !quoted && !literal => depth = 1,
            ')' if !quoted && !literal => return Err(AddressError::InvalidCharacter(')')),
            _ => out.push(c),
        }
    }

    if depth > 0 {
        return Err(AddressError::UnterminatedComment);
    }
    Ok((out, first_comment))
}

/// Unquotes a display name; empty names become `None`.
fn display_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let name = match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        Some(quoted) => quoted.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => raw.to_string(),
    };

    Some(name)
}

/// Validates an addr-spec and returns it with whitespace around `@` removed.
fn addr_spec(addr: &str) -> Result<String, AddressError> {
    if addr.is_empty() {
        return Err(AddressError::Empty);
    }

    let (local, domain) = addr.rsplit_once('@').ok_or(AddressError::MissingAt)?;
    let (local, domain) = (local.trim_end(), domain.trim_start());

    validate_local_part(local)?;
    validate_domain(domain)?;
    Ok(format!("{local}@{domain}"))
}

fn validate_local_part(local: &str) -> Result<(), AddressError> {
    if local.is_empty() {
        return Err(AddressError::EmptyLocalPart);
    }

    // Quoted local parts may hold anything printable except an unescaped quote.
    if local.len() >= 2 && local.starts_with('"') && local.ends_with('"') {
        if let Some(c) = local.chars().find(|c| c.is_control()) {
            return Err(AddressError::InvalidCharacter(c));
        }
        return Ok(());
    }

    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(AddressError::InvalidCharacter('.'));
    }

    for c in local.chars() {
        if c == '@' {
            return Err(AddressError::MultipleAt);
        }
        if !(c.is_alphanumeric() || c == '.' || ATEXT_SPECIALS.contains(c)) {
            return Err(AddressError::InvalidCharacter(c));
        }
    }

    Ok(())
}

fn validate_domain(domain: &str) -> Result<(), AddressError> {
    if domain.is_empty() {
        return Err(AddressError::EmptyDomain);
    }

    // Domain literal, e.g. [192.0.2.1]
    if let Some(literal) = domain.strip_prefix('[').and_then(|d| d.strip_suffix(']')) {
        if literal.is_empty() || literal.chars().any(|c| c.is_whitespace() || "[]\\".contains(c)) {
            return Err(AddressError::InvalidDomain(domain.to_string()));
        }
        return Ok(());
    }

    let valid = domain.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-')
    });

    if valid {
        Ok(())
    } else {
        Err(AddressError::InvalidDomain(domain.to_string()))
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
    fn test_bare_address() {
        let mailbox = Mailbox::parse("user@example.com").unwrap();
        assert_eq!(mailbox.address, "user@example.com");
        assert!(mailbox.name.is_none());
    }

    #[test]
    fn test_named_address() {
        let mailbox = Mailbox::parse("John Doe <john@example.com>").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("John Doe"));
        assert_eq!(mailbox.address, "john@example.com");
    }

    #[test]
    fn test_quoted_name() {
        let mailbox = Mailbox::parse("\"Doe, John\" <john@example.com>").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Doe, John"));
    }

    #[test]
    fn test_angle_without_name() {
        let mailbox = Mailbox::parse("<john@example.com>").unwrap();
        assert!(mailbox.name.is_none());
        assert_eq!(mailbox.address, "john@example.com");
    }

    #[test]
    fn test_plus_and_dots() {
        assert!(Mailbox::parse("first.last+tag@mail.example.co.uk").is_ok());
        assert!(Mailbox::parse("test.usr@smtp.com").is_ok());
    }

    #[test]
    fn test_single_label_domain() {
        assert!(Mailbox::parse("root@localhost").is_ok());
    }

    #[test]
    fn test_domain_literal() {
        assert!(Mailbox::parse("user@[192.0.2.1]").is_ok());
    }

    #[test]
    fn test_quoted_local_part() {
        assert!(Mailbox::parse("\"john doe\"@example.com").is_ok());
    }

    #[test]
    fn test_invalid_no_at() {
        assert_eq!(Mailbox::parse("invalid"), Err(AddressError::MissingAt));
    }

    #[test]
    fn test_invalid_empty() {
        assert_eq!(Mailbox::parse(""), Err(AddressError::Empty));
        assert_eq!(Mailbox::parse("   "), Err(AddressError::Empty));
    }

    #[test]
    fn test_invalid_empty_parts() {
        assert_eq!(
            Mailbox::parse("@example.com"),
            Err(AddressError::EmptyLocalPart)
        );
        assert_eq!(Mailbox::parse("user@"), Err(AddressError::EmptyDomain));
    }

    #[test]
    fn test_invalid_multiple_at() {
        assert_eq!(
            Mailbox::parse("a@b@example.com"),
            Err(AddressError::MultipleAt)
        );
    }

    #[test]
    fn test_invalid_whitespace() {
        assert_eq!(
            Mailbox::parse("john doe@example.com"),
            Err(AddressError::InvalidCharacter(' '))
        );
    }

    #[test]
    fn test_invalid_dots() {
        assert!(Mailbox::parse(".user@example.com").is_err());
        assert!(Mailbox::parse("us..er@example.com").is_err());
        assert!(Mailbox::parse("user@example..com").is_err());
    }

    #[test]
    fn test_unterminated_angle() {
        assert_eq!(
            Mailbox::parse("John <john@example.com"),
            Err(AddressError::UnterminatedAngle)
        );
    }

    #[test]
    fn test_header_injection_rejected() {
        assert_eq!(
            Mailbox::parse("user@example.com\r\nBcc: x@example.com"),
            Err(AddressError::InvalidCharacter('\r'))
        );
        assert_eq!(
            Mailbox::parse("Evil\r\nBcc: victim@example.com <a@example.com>"),
            Err(AddressError::InvalidCharacter('\r'))
        );
        assert_eq!(
            Mailbox::parse("Evil\nX: y <a@example.com>"),
            Err(AddressError::InvalidCharacter('\n'))
        );
        assert_eq!(
            Mailbox::parse("a@example.com\r\n"),
            Err(AddressError::InvalidCharacter('\r'))
        );
        assert_eq!(
            Mailbox::parse("Nul\0 <a@example.com>"),
            Err(AddressError::InvalidCharacter('\0'))
        );
    }

    #[test]
    fn test_trailing_comment_names_mailbox() {
        let mailbox = Mailbox::parse("john@example.com (John Doe)").unwrap();
        assert_eq!(mailbox.address, "john@example.com");
        assert_eq!(mailbox.name.as_deref(), Some("John Doe"));
    }

    #[test]
    fn test_comments_are_skipped() {
        let mailbox = Mailbox::parse("(work) John <john@example.com> (desk)").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("John"));
        assert_eq!(mailbox.address, "john@example.com");

        let mailbox = Mailbox::parse("<john(nested (deep) note)@example.com>").unwrap();
        assert_eq!(mailbox.address, "john@example.com");
        assert!(mailbox.name.is_some());

        let mailbox = Mailbox::parse("john@(escaped \\) paren)example.com").unwrap();
        assert_eq!(mailbox.address, "john@example.com");
        assert_eq!(mailbox.name.as_deref(), Some("escaped ) paren"));
    }

    #[test]
    fn test_folding_whitespace_around_at() {
        let mailbox = Mailbox::parse("John <john @ example.com>").unwrap();
        assert_eq!(mailbox.address, "john@example.com");

        let mailbox = Mailbox::parse("\tjohn@example.com\t").unwrap();
        assert_eq!(mailbox.address, "john@example.com");
    }

    #[test]
    fn test_parens_inside_quotes_are_not_comments() {
        let mailbox = Mailbox::parse("\"Doe (Jr)\" <john@example.com>").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Doe (Jr)"));

        let mailbox = Mailbox::parse("\"a(b\"@example.com").unwrap();
        assert_eq!(mailbox.address, "\"a(b\"@example.com");
    }

    #[test]
    fn test_unbalanced_comment() {
        assert_eq!(
            Mailbox::parse("john@example.com (John"),
            Err(AddressError::UnterminatedComment)
        );
        assert_eq!(
            Mailbox::parse("john@example.com John)"),
            Err(AddressError::InvalidCharacter(')'))
        );
        assert_eq!(Mailbox::parse("(only a comment)"), Err(AddressError::Empty));
    }
}
