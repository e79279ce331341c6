//! An authenticated connection ready to submit messages.

use courier_mime::{Mailbox, Message};
use tracing::{debug, info};

use super::{DataWriter, ServerInfo, SmtpCommands};
use crate::error::{EnvelopeStage, Error, Result};

/// A negotiated SMTP session.
///
/// Created by [`Mailer::connect`](crate::Mailer::connect). Sending borrows
/// the session mutably, so one session serves one caller at a time;
/// [`close`](Session::close) consumes it.
#[derive(Debug)]
pub struct Session<C> {
    client: C,
}

impl<C: SmtpCommands> Session<C> {
    pub(crate) const fn new(client: C) -> Self {
        Self { client }
    }

    /// Returns what was negotiated with the server.
    #[must_use]
    pub fn server_info(&self) -> &ServerInfo {
        self.client.server_info()
    }

    /// Submits one message.
    ///
    /// Only the primary recipients become envelope recipients; Cc and Bcc
    /// are carried in the headers.
    ///
    /// # Errors
    ///
    /// Each step fails with its own variant: [`Error::Envelope`] for
    /// `MAIL FROM`/`RCPT TO`, [`Error::DataOpen`], [`Error::Encoding`],
    /// [`Error::DataWrite`] and [`Error::DataClose`].
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let sender = envelope_address(&message.from);
        self.client
            .mail(&sender)
            .await
            .map_err(|e| Error::Envelope {
                stage: EnvelopeStage::Sender,
                address: sender.clone(),
                source: Box::new(e),
            })?;

        for recipient in &message.recipients {
            let address = envelope_address(recipient);
            self.client
                .rcpt(&address)
                .await
                .map_err(|e| Error::Envelope {
                    stage: EnvelopeStage::Recipient,
                    address: address.clone(),
                    source: Box::new(e),
                })?;
        }

        let mut writer = self
            .client
            .data()
            .await
            .map_err(|e| Error::DataOpen(Box::new(e)))?;

        let encoded = match message.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                if let Err(close_err) = writer.close().await {
                    debug!(error = %close_err, "failed to close data stream after encoding error");
                }
                return Err(Error::Encoding(e));
            }
        };

        let written = match writer.write(&encoded).await {
            Ok(n) if n == encoded.len() => Ok(()),
            Ok(n) => Err(Error::DataWrite(Box::new(Error::Protocol(format!(
                "short write: {n} of {} bytes",
                encoded.len()
            ))))),
            Err(e) => Err(Error::DataWrite(Box::new(e))),
        };

        let closed = writer.close().await;
        written?;
        closed.map_err(|e| Error::DataClose(Box::new(e)))?;

        info!(
            from = %sender,
            recipients = message.recipients.len(),
            bytes = encoded.len(),
            "message sent"
        );
        Ok(())
    }

    /// Sends QUIT and releases the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClose`] if QUIT fails. The connection is
    /// released either way.
    pub async fn close(mut self) -> Result<()> {
        self.client
            .quit()
            .await
            .map_err(|e| Error::SessionClose(Box::new(e)))
    }
}

/// Strips a display name when the address parses; otherwise passes the input
/// through and lets the command layer reject it.
fn envelope_address(raw: &str) -> String {
    Mailbox::parse(raw).map_or_else(|_| raw.to_string(), |mailbox| mailbox.address)
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
    use std::io;

    use super::*;
    use crate::connection::{SmtpClient, SmtpStream};
    use tokio_test::io::{Builder, Mock};

    async fn session(mut builder: Builder) -> Session<SmtpClient<Mock>> {
        let mock = builder.build();
        let client = SmtpClient::new(SmtpStream::plain(mock), "localhost")
            .await
            .unwrap();
        Session::new(client)
    }

    fn script() -> Builder {
        let mut builder = Builder::new();
        builder
            .read(b"220 localhost ESMTP\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250 localhost\r\n");
        builder
    }

    fn message() -> Message {
        Message::new()
            .from("Alice <alice@example.com>")
            .to("bob@example.com")
            .to("Carol <carol@example.com>")
            .cc("dave@example.com")
            .subject("Hello")
            .body("Hi there.")
    }

    #[test]
    fn test_envelope_address() {
        assert_eq!(envelope_address("Alice <alice@example.com>"), "alice@example.com");
        assert_eq!(envelope_address("bob@example.com"), "bob@example.com");
        assert_eq!(envelope_address("not an address"), "not an address");
    }

    #[tokio::test]
    async fn test_send() {
        let message = message();
        let encoded = message.encode().unwrap();

        let mut builder = script();
        builder
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<carol@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(&encoded)
            .write(b".\r\n")
            .read(b"250 queued\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n");

        let mut session = session(builder).await;
        session.send(&message).await.unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sender_rejected() {
        let mut builder = script();
        builder
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"553 sender not allowed\r\n");

        let mut session = session(builder).await;
        let err = session.send(&message()).await.unwrap_err();
        match err {
            Error::Envelope { stage, address, .. } => {
                assert_eq!(stage, EnvelopeStage::Sender);
                assert_eq!(address, "alice@example.com");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_recipient_rejected() {
        let mut builder = script();
        builder
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<carol@example.com>\r\n")
            .read(b"550 no such user\r\n");

        let mut session = session(builder).await;
        let err = session.send(&message()).await.unwrap_err();
        assert!(err.is_permanent());
        assert!(matches!(
            err,
            Error::Envelope { stage: EnvelopeStage::Recipient, ref address, .. } if address == "carol@example.com"
        ));
    }

    #[tokio::test]
    async fn test_data_rejected() {
        let mut builder = script();
        builder
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<carol@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"451 try later\r\n");

        let mut session = session(builder).await;
        let err = session.send(&message()).await.unwrap_err();
        assert!(matches!(err, Error::DataOpen(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_encoding_error_still_closes_data() {
        let mut builder = script();
        builder
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b".\r\n")
            .read(b"554 empty message\r\n");

        let message = Message::new().from("alice@example.com").body("no recipients");
        let mut session = session(builder).await;
        let err = session.send(&message).await.unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
    }

    #[tokio::test]
    async fn test_write_error_wins_over_close_error() {
        let message = Message::new()
            .from("alice@example.com")
            .to("bob@example.com")
            .body("Hi");

        let mut builder = script();
        builder
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
            .write(b".\r\n")
            .read(b"451 aborted\r\n");

        let mut session = session(builder).await;
        let err = session.send(&message).await.unwrap_err();
        assert!(matches!(err, Error::DataWrite(_)));
    }

    #[tokio::test]
    async fn test_message_rejected_after_data() {
        let message = Message::new()
            .from("alice@example.com")
            .to("bob@example.com")
            .body("Hi");
        let encoded = message.encode().unwrap();

        let mut builder = script();
        builder
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<bob@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(&encoded)
            .write(b".\r\n")
            .read(b"554 looks like spam\r\n");

        let mut session = session(builder).await;
        let err = session.send(&message).await.unwrap_err();
        assert!(matches!(err, Error::DataClose(_)));
        assert_eq!(err.reply_code(), Some(554));
    }

    #[tokio::test]
    async fn test_close_failure() {
        let mut builder = Builder::new();
        builder
            .read(b"220 localhost ESMTP\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250 localhost\r\n")
            .write(b"QUIT\r\n")
            .read(b"500 what\r\n");

        let session = session(builder).await;
        let err = session.close().await.unwrap_err();
        assert!(matches!(err, Error::SessionClose(_)));
    }
}
