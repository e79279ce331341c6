//! MIME encoding utilities.
//!
//! Base64 (padding stripped), RFC 2047 encoded words and line folding at the
//! RFC 2045 limit of 76 characters.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;

/// Maximum line length for encoded bodies (RFC 2045, section 6.8).
pub const MAX_LINE_LENGTH: usize = 76;

/// Line terminator for every header and body line.
pub const CRLF: &str = "\r\n";

/// Encodes data as standard-alphabet Base64 with the trailing `=` padding
/// removed.
///
/// ```
/// use courier_mime::encoding::encode_base64_unpadded;
///
/// assert_eq!(encode_base64_unpadded(b"input"), "aW5wdXQ");
/// ```
#[must_use]
pub fn encode_base64_unpadded(data: &[u8]) -> String {
    STANDARD_NO_PAD.encode(data)
}

/// Encodes a header value as a UTF-8 Base64 encoded word (RFC 2047).
///
/// The value is always encoded, even when it is plain ASCII, so the header
/// form does not depend on the content.
#[must_use]
pub fn encode_word(text: &str) -> String {
    format!("=?UTF-8?B?{}?=", encode_base64_unpadded(text.as_bytes()))
}

/// Splits `input` into chunks of at most `max_length` characters.
///
/// The last chunk is whatever remains. An input whose length is an exact
/// multiple of `max_length` yields no trailing empty chunk; an empty input
/// yields a single empty chunk. A `max_length` of zero is treated as one.
#[must_use]
pub fn split_lines(input: &str, max_length: usize) -> Vec<&str> {
    let max_length = max_length.max(1);
    let mut lines = Vec::with_capacity(input.len() / max_length + 1);
    let mut rest = input;

    while let Some((idx, _)) = rest.char_indices().nth(max_length) {
        let (head, tail) = rest.split_at(idx);
        lines.push(head);
        rest = tail;
    }
    lines.push(rest);

    lines
}

/// Folds text into CRLF-terminated lines of at most [`MAX_LINE_LENGTH`]
/// characters.
///
/// Existing line breaks (`\n` or `\r\n`) are kept and normalized to CRLF.
#[must_use]
pub fn fold_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / MAX_LINE_LENGTH * 2 + 2);

    if text.is_empty() {
        out.push_str(CRLF);
        return out;
    }

    for line in text.lines() {
        for chunk in split_lines(line, MAX_LINE_LENGTH) {
            out.push_str(chunk);
            out.push_str(CRLF);
        }
    }

    out
}

/// Encodes binary data as unpadded Base64 folded into CRLF-terminated lines.
#[must_use]
pub fn fold_base64(data: &[u8]) -> String {
    let encoded = encode_base64_unpadded(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2 + 2);

    for chunk in split_lines(&encoded, MAX_LINE_LENGTH) {
        out.push_str(chunk);
        out.push_str(CRLF);
    }

    out
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
    use proptest::prelude::*;

    #[test]
    fn test_base64_strips_padding() {
        assert_eq!(encode_base64_unpadded(b"input"), "aW5wdXQ");
        assert_eq!(encode_base64_unpadded(b"byte str"), "Ynl0ZSBzdHI");
        assert_eq!(encode_base64_unpadded(b"abc"), "YWJj");
        assert_eq!(encode_base64_unpadded(b""), "");
    }

    #[test]
    fn test_encode_word() {
        assert_eq!(
            encode_word("testing html body"),
            "=?UTF-8?B?dGVzdGluZyBodG1sIGJvZHk?="
        );
        assert_eq!(encode_word(""), "=?UTF-8?B??=");
    }

    #[test]
    fn test_encode_word_non_ascii() {
        // "Héllo" -> SMOpbGxv
        assert_eq!(encode_word("Héllo"), "=?UTF-8?B?SMOpbGxv?=");
    }

    #[test]
    fn test_split_lines_one_per_char() {
        let lines = split_lines("input", 1);
        assert_eq!(lines, vec!["i", "n", "p", "u", "t"]);
    }

    #[test]
    fn test_split_lines_short_input() {
        assert_eq!(split_lines("input", 20), vec!["input"]);
    }

    #[test]
    fn test_split_lines_exact_multiple() {
        assert_eq!(split_lines("abcd", 2), vec!["ab", "cd"]);
        let exact = "x".repeat(MAX_LINE_LENGTH * 2);
        assert_eq!(split_lines(&exact, MAX_LINE_LENGTH).len(), 2);
    }

    #[test]
    fn test_split_lines_empty() {
        assert_eq!(split_lines("", MAX_LINE_LENGTH), vec![""]);
    }

    #[test]
    fn test_split_lines_zero_width() {
        assert_eq!(split_lines("ab", 0), vec!["a", "b"]);
    }

    #[test]
    fn test_split_lines_multibyte() {
        assert_eq!(split_lines("ééé", 2), vec!["éé", "é"]);
    }

    #[test]
    fn test_fold_text() {
        assert_eq!(fold_text("hello"), "hello\r\n");
        assert_eq!(fold_text(""), "\r\n");
        assert_eq!(fold_text("a\nb\r\nc"), "a\r\nb\r\nc\r\n");

        let long = "y".repeat(80);
        let folded = fold_text(&long);
        assert_eq!(folded, format!("{}\r\n{}\r\n", "y".repeat(76), "y".repeat(4)));
    }

    #[test]
    fn test_fold_base64() {
        assert_eq!(fold_base64(b"byte str"), "Ynl0ZSBzdHI\r\n");
        assert_eq!(fold_base64(b""), "\r\n");

        let folded = fold_base64(&[0u8; 120]);
        let lines: Vec<&str> = folded.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.len() <= MAX_LINE_LENGTH));
    }

    proptest! {
        #[test]
        fn split_lines_preserves_content(input in "\\PC{0,400}", width in 1usize..100) {
            let lines = split_lines(&input, width);
            let chars = input.chars().count();
            let expected = if chars == 0 { 1 } else { chars.div_ceil(width) };

            prop_assert_eq!(lines.len(), expected);
            prop_assert!(lines.iter().all(|l| l.chars().count() <= width));
            prop_assert_eq!(lines.concat(), input);
        }

        #[test]
        fn base64_never_padded(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let encoded = encode_base64_unpadded(&data);
            prop_assert!(!encoded.ends_with('='));
            prop_assert_eq!(encoded.len(), (data.len() * 4).div_ceil(3));
        }
    }
}
