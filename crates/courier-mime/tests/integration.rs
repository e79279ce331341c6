//! Integration tests for the MIME encoder.
//!
//! These exercise the public API only: build a message, encode it, and check
//! the resulting bytes.

use courier_mime::encoding::{MAX_LINE_LENGTH, split_lines};
use courier_mime::{Attachment, Error, Headers, Mailbox, Message, ValidationError};

fn encoded(message: &Message) -> String {
    String::from_utf8(message.encode().unwrap()).unwrap()
}

#[test]
fn test_every_line_is_crlf_terminated() {
    let message = Message::new()
        .from("Sender <sender@example.com>")
        .to("a@example.com")
        .subject("Status")
        .body("line one\nline two\r\nline three")
        .html_body("<p>status</p>")
        .attach(Attachment::new("log.txt", vec![b'x'; 500], "text/plain"));

    let text = encoded(&message);
    assert!(text.ends_with("\r\n"));
    for (i, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            assert_eq!(text.as_bytes()[i - 1], b'\r', "bare LF at byte {i}");
        }
    }
}

#[test]
fn test_text_lines_do_not_exceed_limit() {
    let message = Message::new()
        .from("sender@example.com")
        .to("a@example.com")
        .body("w".repeat(1000));

    let text = encoded(&message);
    let body = text.split_once("\r\n\r\n").unwrap().1;
    assert!(body.split("\r\n").all(|l| l.len() <= MAX_LINE_LENGTH));
}

#[test]
fn test_content_type_follows_shape() {
    let base = Message::new().from("s@example.com").to("r@example.com");

    let cases = [
        (base.clone(), "text/plain; charset=us-ascii"),
        (base.clone().body("b"), "text/plain; charset=us-ascii"),
        (base.clone().html_body("<p/>"), "text/html; charset=UTF-8"),
        (
            base.clone().body("b").html_body("<p/>"),
            "multipart/alternative; boundary=ALT-BOUNDARY",
        ),
        (
            base.clone()
                .attach(Attachment::new("f", Vec::new(), "text/plain")),
            "multipart/mixed; boundary=BOUNDARY",
        ),
        (
            base.body("b")
                .html_body("<p/>")
                .attach(Attachment::new("f", Vec::new(), "text/plain")),
            "multipart/mixed; boundary=BOUNDARY",
        ),
    ];

    for (message, expected) in cases {
        let text = encoded(&message);
        assert!(
            text.contains(&format!("\r\nContent-Type: {expected}\r\n")),
            "expected {expected} in:\n{text}"
        );
    }
}

#[test]
fn test_attachments_keep_order() {
    let message = Message::new()
        .from("s@example.com")
        .to("r@example.com")
        .attach(Attachment::new("first.txt", b"1".to_vec(), "text/plain"))
        .attach(Attachment::new("second.txt", b"2".to_vec(), "text/plain"));

    let text = encoded(&message);
    let first = text.find("first.txt").unwrap();
    let second = text.find("second.txt").unwrap();
    assert!(first < second);
    assert_eq!(text.matches("--BOUNDARY\r\n").count(), 2);
}

#[test]
fn test_extra_headers_from_collection() {
    let headers: Headers = [("X-Priority", "1"), ("Message-ID", "<1@example.com>")]
        .into_iter()
        .collect();

    let mut message = Message::new().from("s@example.com").to("r@example.com");
    message.headers = headers;

    let text = encoded(&message);
    let message_id = text.find("Message-ID:").unwrap();
    let priority = text.find("X-Priority:").unwrap();
    assert!(message_id < priority);
}

#[test]
fn test_invalid_recipient_reports_address() {
    let message = Message::new()
        .from("s@example.com")
        .to("good@example.com")
        .to("bad address");

    let Err(Error::Validation(err)) = message.encode() else {
        panic!("expected validation error");
    };
    assert!(matches!(err, ValidationError::InvalidRecipient { .. }));
    assert_eq!(err.address(), Some("bad address"));
}

#[test]
fn test_line_breaks_in_addresses_are_not_encoded() {
    let forged_from = Message::new()
        .from("Evil\r\nBcc: victim@example.com <a@example.com>")
        .to("b@example.com")
        .body("x");
    assert!(matches!(
        forged_from.encode(),
        Err(Error::Validation(ValidationError::InvalidFrom { .. }))
    ));

    let forged_cc = Message::new()
        .from("a@example.com")
        .to("b@example.com")
        .cc("c@example.com\r\nX-Injected: yes")
        .body("x");
    assert!(matches!(
        forged_cc.encode(),
        Err(Error::Validation(ValidationError::InvalidHeader { .. }))
    ));
}

#[test]
fn test_commented_addresses_encode() {
    let message = Message::new()
        .from("sender@example.com (Sender)")
        .to("john@example.com (John Doe)")
        .body("x");

    let text = encoded(&message);
    assert!(text.contains("From: sender@example.com (Sender)\r\n"));
    assert!(text.contains("To: john@example.com (John Doe)\r\n"));
}

#[test]
fn test_mailbox_strips_display_name() {
    let mailbox = Mailbox::parse("\"Report Bot\" <bot@example.com>").unwrap();
    assert_eq!(mailbox.address, "bot@example.com");
    assert_eq!(mailbox.name.as_deref(), Some("Report Bot"));
}

#[test]
fn test_split_lines_public_contract() {
    assert_eq!(split_lines("input", 1).len(), 5);
    assert_eq!(split_lines("input", 20), vec!["input"]);
}
