//! Deterministic RFC 5322 / MIME message encoder.
//!
//! The same [`Message`] always encodes to the same bytes: header order is
//! fixed, extra headers come out in name order, and the multipart boundaries
//! are constants.

use crate::encoding::{CRLF, encode_word, fold_base64, fold_text};
use crate::error::Result;
use crate::message::{Attachment, Message};

/// Boundary of the top-level `multipart/mixed` body.
pub const BOUNDARY: &str = "BOUNDARY";

/// Boundary of the `multipart/alternative` body.
pub const ALT_BOUNDARY: &str = "ALT-BOUNDARY";

const TEXT_PLAIN: &str = "text/plain; charset=us-ascii";
const TEXT_HTML: &str = "text/html; charset=UTF-8";

/// Validates and encodes a message.
///
/// # Errors
///
/// Returns [`crate::Error::Validation`] if the message fails
/// [`Message::validate`]. Nothing is encoded in that case.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    message.validate()?;

    let mut out = String::with_capacity(estimate_len(message));
    write_headers(&mut out, message);
    out.push_str(CRLF);
    write_body(&mut out, message);

    Ok(out.into_bytes())
}

fn estimate_len(message: &Message) -> usize {
    let attachments: usize = message
        .attachments
        .iter()
        .map(|a| a.data.len() * 4 / 3 + 256)
        .sum();
    512 + message.body.len() + message.html_body.len() + attachments
}

fn content_type(message: &Message) -> String {
    if message.has_attachments() {
        format!("multipart/mixed; boundary={BOUNDARY}")
    } else if message.has_body() && message.has_html_body() {
        format!("multipart/alternative; boundary={ALT_BOUNDARY}")
    } else if message.has_html_body() {
        TEXT_HTML.to_string()
    } else {
        TEXT_PLAIN.to_string()
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str(CRLF);
}

fn push_address_list(out: &mut String, name: &str, addresses: &[String]) {
    if !addresses.is_empty() {
        push_header(out, name, &addresses.join(", "));
    }
}

fn write_headers(out: &mut String, message: &Message) {
    push_header(out, "MIME-Version", "1.0");
    push_header(out, "Subject", &encode_word(&message.subject));
    push_header(out, "From", &message.from);
    push_header(out, "Content-Type", &content_type(message));
    push_address_list(out, "To", &message.recipients);
    push_address_list(out, "Cc", &message.cc);
    push_address_list(out, "Bcc", &message.bcc);
    out.push_str(&message.headers.to_string());
}

fn write_body(out: &mut String, message: &Message) {
    if message.has_attachments() {
        write_mixed(out, message);
    } else if message.has_body() && message.has_html_body() {
        write_alternative(out, message);
    } else if message.has_html_body() {
        out.push_str(&message.html_body);
        out.push_str(CRLF);
    } else {
        out.push_str(&fold_text(&message.body));
    }
}

fn push_delimiter(out: &mut String, boundary: &str) {
    out.push_str("--");
    out.push_str(boundary);
    out.push_str(CRLF);
}

fn push_close_delimiter(out: &mut String, boundary: &str) {
    out.push_str("--");
    out.push_str(boundary);
    out.push_str("--");
    out.push_str(CRLF);
}

fn push_text_part(out: &mut String, boundary: &str, content_type: &str, text: &str) {
    push_delimiter(out, boundary);
    push_header(out, "Content-Type", content_type);
    push_header(out, "Content-Transfer-Encoding", "8bit");
    out.push_str(CRLF);
    out.push_str(text);
}

fn write_alternative(out: &mut String, message: &Message) {
    push_text_part(out, ALT_BOUNDARY, TEXT_PLAIN, &fold_text(&message.body));
    push_text_part(out, ALT_BOUNDARY, TEXT_HTML, &message.html_body);
    out.push_str(CRLF);
    push_close_delimiter(out, ALT_BOUNDARY);
}

fn write_mixed(out: &mut String, message: &Message) {
    match (message.has_body(), message.has_html_body()) {
        (true, true) => {
            push_delimiter(out, BOUNDARY);
            push_header(
                out,
                "Content-Type",
                &format!("multipart/alternative; boundary={ALT_BOUNDARY}"),
            );
            out.push_str(CRLF);
            write_alternative(out, message);
        }
        (true, false) => {
            push_text_part(out, BOUNDARY, TEXT_PLAIN, &fold_text(&message.body));
        }
        (false, true) => {
            push_text_part(out, BOUNDARY, TEXT_HTML, &message.html_body);
            out.push_str(CRLF);
        }
        (false, false) => {}
    }

    for attachment in &message.attachments {
        write_attachment(out, attachment);
    }

    push_close_delimiter(out, BOUNDARY);
}

fn write_attachment(out: &mut String, attachment: &Attachment) {
    let filename = quote_filename(&attachment.filename);

    push_delimiter(out, BOUNDARY);
    push_header(
        out,
        "Content-Type",
        &format!("{}; name=\"{filename}\"", attachment.mime_type),
    );
    push_header(out, "Content-Transfer-Encoding", "base64");
    push_header(
        out,
        "Content-Disposition",
        &format!("attachment; filename=\"{filename}\""),
    );
    out.push_str(CRLF);
    out.push_str(&fold_base64(&attachment.data));
    out.push_str(CRLF);
}

/// Escapes a filename for use inside a quoted-string parameter.
fn quote_filename(filename: &str) -> String {
    let mut quoted = String::with_capacity(filename.len());
    for c in filename.chars() {
        if matches!(c, '\\' | '"') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted
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
    use crate::Error;
    use crate::error::ValidationError;

    const HEADER_PREFIX: &str = "MIME-Version: 1.0\r\n";

    fn base() -> Message {
        Message::new()
            .from("test.usr@smtp.com")
            .to("test.usr@smtp.com")
    }

    fn encode_str(message: &Message) -> String {
        String::from_utf8(encode(message).unwrap()).unwrap()
    }

    #[test]
    fn test_plain_body() {
        let message = base().subject("testing plain body").body("test body");

        assert_eq!(
            encode_str(&message),
            "MIME-Version: 1.0\r\n\
             Subject: =?UTF-8?B?dGVzdGluZyBwbGFpbiBib2R5?=\r\n\
             From: test.usr@smtp.com\r\n\
             Content-Type: text/plain; charset=us-ascii\r\n\
             To: test.usr@smtp.com\r\n\
             \r\n\
             test body\r\n"
        );
    }

    #[test]
    fn test_html_body() {
        let message = base()
            .subject("testing html body")
            .html_body("<p>test html body</p>");

        assert_eq!(
            encode_str(&message),
            "MIME-Version: 1.0\r\n\
             Subject: =?UTF-8?B?dGVzdGluZyBodG1sIGJvZHk?=\r\n\
             From: test.usr@smtp.com\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\
             To: test.usr@smtp.com\r\n\
             \r\n\
             <p>test html body</p>\r\n"
        );
    }

    #[test]
    fn test_alternative_body() {
        let message = base().subject("alt").body("plain").html_body("<b>html</b>");

        let encoded = encode_str(&message);
        assert!(encoded.contains("Content-Type: multipart/alternative; boundary=ALT-BOUNDARY\r\n"));
        assert!(encoded.ends_with(
            "\r\n\
             --ALT-BOUNDARY\r\n\
             Content-Type: text/plain; charset=us-ascii\r\n\
             Content-Transfer-Encoding: 8bit\r\n\
             \r\n\
             plain\r\n\
             --ALT-BOUNDARY\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\
             Content-Transfer-Encoding: 8bit\r\n\
             \r\n\
             <b>html</b>\r\n\
             --ALT-BOUNDARY--\r\n"
        ));
    }

    #[test]
    fn test_attachment_only() {
        let message = base()
            .subject("testing attachment")
            .attach(Attachment::new("test.txt", b"byte str".to_vec(), "text/plain"));

        assert_eq!(
            encode_str(&message),
            "MIME-Version: 1.0\r\n\
             Subject: =?UTF-8?B?dGVzdGluZyBhdHRhY2htZW50?=\r\n\
             From: test.usr@smtp.com\r\n\
             Content-Type: multipart/mixed; boundary=BOUNDARY\r\n\
             To: test.usr@smtp.com\r\n\
             \r\n\
             --BOUNDARY\r\n\
             Content-Type: text/plain; name=\"test.txt\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             Content-Disposition: attachment; filename=\"test.txt\"\r\n\
             \r\n\
             Ynl0ZSBzdHI\r\n\
             \r\n\
             --BOUNDARY--\r\n"
        );
    }

    #[test]
    fn test_attachment_with_plain_body() {
        let message = base()
            .body("see attached")
            .attach(Attachment::new("a.bin", vec![0, 1, 2], "application/octet-stream"));

        let encoded = encode_str(&message);
        let body = encoded.split_once("\r\n\r\n").unwrap().1;
        assert!(body.starts_with(
            "--BOUNDARY\r\n\
             Content-Type: text/plain; charset=us-ascii\r\n\
             Content-Transfer-Encoding: 8bit\r\n\
             \r\n\
             see attached\r\n\
             --BOUNDARY\r\n\
             Content-Type: application/octet-stream; name=\"a.bin\"\r\n"
        ));
        assert!(body.ends_with("AAEC\r\n\r\n--BOUNDARY--\r\n"));
    }

    #[test]
    fn test_attachment_with_both_bodies_nests_alternative() {
        let message = base()
            .body("plain")
            .html_body("<i>html</i>")
            .attach(Attachment::new("x.txt", b"x".to_vec(), "text/plain"));

        let encoded = encode_str(&message);
        assert!(encoded.contains("Content-Type: multipart/mixed; boundary=BOUNDARY\r\n"));
        assert!(encoded.contains(
            "--BOUNDARY\r\n\
             Content-Type: multipart/alternative; boundary=ALT-BOUNDARY\r\n\
             \r\n\
             --ALT-BOUNDARY\r\n"
        ));
        assert!(encoded.contains("--ALT-BOUNDARY--\r\n--BOUNDARY\r\nContent-Type: text/plain; name=\"x.txt\""));
        assert!(encoded.ends_with("--BOUNDARY--\r\n"));
    }

    #[test]
    fn test_attachment_with_html_body() {
        let message = base()
            .html_body("<p>hi</p>")
            .attach(Attachment::new("x.txt", Vec::new(), "text/plain"));

        let encoded = encode_str(&message);
        assert!(encoded.contains(
            "--BOUNDARY\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\
             Content-Transfer-Encoding: 8bit\r\n\
             \r\n\
             <p>hi</p>\r\n\
             --BOUNDARY\r\n"
        ));
        assert!(!encoded.contains("ALT-BOUNDARY"));
    }

    #[test]
    fn test_empty_attachment_payload() {
        let message = base().attach(Attachment::new("empty.txt", Vec::new(), "text/plain"));
        let encoded = encode_str(&message);
        assert!(encoded.ends_with("filename=\"empty.txt\"\r\n\r\n\r\n\r\n--BOUNDARY--\r\n"));
    }

    #[test]
    fn test_long_attachment_is_folded() {
        let message = base().attach(Attachment::new(
            "big.bin",
            vec![0xAB; 200],
            "application/octet-stream",
        ));
        let encoded = encode_str(&message);
        assert!(encoded.lines().all(|l| l.len() <= 998));
        let base64_lines: Vec<&str> = encoded
            .split("\r\n")
            .filter(|l| l.starts_with("q6ur"))
            .collect();
        assert_eq!(base64_lines.len(), 4);
        assert!(base64_lines.iter().all(|l| l.len() <= 76));
    }

    #[test]
    fn test_filename_is_escaped() {
        let message = base().attach(Attachment::new(
            "we\"ird\\name.txt",
            b"x".to_vec(),
            "text/plain",
        ));
        let encoded = encode_str(&message);
        assert!(encoded.contains("name=\"we\\\"ird\\\\name.txt\""));
    }

    #[test]
    fn test_header_order_with_cc_bcc_and_extras() {
        let message = base()
            .to("second@example.com")
            .cc("cc@example.com")
            .bcc("bcc@example.com")
            .header("X-Tag", "two")
            .header("Message-ID", "124")
            .header("X-Tag", "one");

        let encoded = encode_str(&message);
        let headers = encoded.split_once("\r\n\r\n").unwrap().0;
        let names: Vec<&str> = headers
            .split("\r\n")
            .map(|l| l.split_once(':').unwrap().0)
            .collect();

        assert_eq!(
            names,
            vec![
                "MIME-Version",
                "Subject",
                "From",
                "Content-Type",
                "To",
                "Cc",
                "Bcc",
                "Message-ID",
                "X-Tag"
            ]
        );
        assert!(headers.contains("To: test.usr@smtp.com, second@example.com"));
        assert!(headers.contains("X-Tag: two, one"));
    }

    #[test]
    fn test_long_plain_body_folded() {
        let message = base().body("z".repeat(160));
        let encoded = encode_str(&message);
        let body = encoded.split_once("\r\n\r\n").unwrap().1;
        assert_eq!(
            body,
            format!("{}\r\n{}\r\n{}\r\n", "z".repeat(76), "z".repeat(76), "z".repeat(8))
        );
    }

    #[test]
    fn test_empty_message_body() {
        let encoded = encode_str(&base());
        assert!(encoded.starts_with(HEADER_PREFIX));
        assert!(encoded.contains("Content-Type: text/plain; charset=us-ascii\r\n"));
        assert!(encoded.ends_with("\r\n\r\n\r\n"));
    }

    #[test]
    fn test_deterministic() {
        let build = || {
            base()
                .subject("same")
                .body("b")
                .html_body("<p>h</p>")
                .header("B", "2")
                .header("A", "1")
                .attach(Attachment::new("f", b"data".to_vec(), "text/plain"))
        };
        assert_eq!(encode(&build()).unwrap(), encode(&build()).unwrap());
    }

    #[test]
    fn test_encode_does_not_mutate() {
        let message = base().body("x").header("X-A", "1");
        let before = message.clone();
        let _ = encode(&message).unwrap();
        assert_eq!(message, before);
    }

    #[test]
    fn test_validation_failures() {
        let missing_from = Message::new().to("a@example.com");
        assert!(matches!(
            encode(&missing_from),
            Err(Error::Validation(ValidationError::EmptyFrom))
        ));

        let missing_recipients = Message::new().from("a@example.com");
        assert!(matches!(
            encode(&missing_recipients),
            Err(Error::Validation(ValidationError::EmptyRecipients))
        ));

        let bad_from = base().from("invalid");
        assert!(matches!(
            encode(&bad_from),
            Err(Error::Validation(ValidationError::InvalidFrom { .. }))
        ));
    }

    #[test]
    fn test_quote_filename() {
        assert_eq!(quote_filename("plain.txt"), "plain.txt");
        assert_eq!(quote_filename("a\"b"), "a\\\"b");
        assert_eq!(quote_filename("a\\b"), "a\\\\b");
    }
}
