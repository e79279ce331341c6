//! Integration tests for the SMTP client.
//!
//! These tests drive [`Mailer`] over a mock stream that replays canned
//! server replies and captures everything the client sends.

#![allow(clippy::unwrap_used)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use courier_smtp::connection::SmtpStream;
use courier_smtp::{
    Config, Error, Mailer, Message, Result, SmtpClient, SmtpCommands, TlsConfig, Transport,
};

/// Mock stream that returns predefined replies.
#[derive(Debug)]
struct MockStream {
    /// Replies to return (in order).
    responses: Cursor<Vec<u8>>,
    /// Captured bytes sent by the client.
    sent: Arc<Mutex<Vec<u8>>>,
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = usize::try_from(self.responses.position()).unwrap();

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Transport that hands out one mock stream per dial.
#[derive(Default)]
struct ScriptedTransport {
    responses: Vec<u8>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedTransport {
    fn new(responses: &[u8]) -> Self {
        Self {
            responses: responses.to_vec(),
            sent: Arc::default(),
        }
    }

    fn sent(&self) -> String {
        String::from_utf8(self.sent.lock().unwrap().clone()).unwrap()
    }
}

impl Transport for ScriptedTransport {
    type Conn = SmtpStream<MockStream>;
    type Client = SmtpClient<MockStream>;

    async fn dial(&self, _host: &str, _port: u16) -> io::Result<Self::Conn> {
        Ok(SmtpStream::plain(MockStream {
            responses: Cursor::new(self.responses.clone()),
            sent: Arc::clone(&self.sent),
        }))
    }

    async fn wrap_tls(&self, _conn: Self::Conn, _tls: &TlsConfig) -> io::Result<Self::Conn> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "mock stream cannot do TLS",
        ))
    }

    async fn client(&self, conn: Self::Conn, host: &str) -> Result<Self::Client> {
        SmtpClient::new(conn, host).await
    }
}

/// Routes client logs to the test output; filter with `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn mailer(responses: &[u8]) -> Mailer<ScriptedTransport> {
    let config = Config::builder("localhost", 25, "user", "pass")
        .build()
        .unwrap();
    Mailer::with_transport(config, ScriptedTransport::new(responses))
}

fn message() -> Message {
    Message::new()
        .from("Sender <sender@example.com>")
        .to("first@example.com")
        .to("second@example.com")
        .cc("copy@example.com")
        .subject("Status")
        .body("All good.")
}

#[tokio::test]
async fn test_send_with_plain_auth() {
    init_tracing();
    let mailer = mailer(
        b"220 localhost ESMTP\r\n\
          250-localhost\r\n\
          250-AUTH LOGIN PLAIN\r\n\
          250 8BITMIME\r\n\
          235 2.7.0 accepted\r\n\
          250 sender ok\r\n\
          250 recipient ok\r\n\
          250 recipient ok\r\n\
          354 go ahead\r\n\
          250 queued\r\n\
          221 bye\r\n",
    );

    let message = message();
    mailer.send(&message).await.unwrap();

    let encoded = String::from_utf8(message.encode().unwrap()).unwrap();
    let expected = format!(
        "EHLO localhost\r\n\
         AUTH PLAIN AHVzZXIAcGFzcw==\r\n\
         MAIL FROM:<sender@example.com> BODY=8BITMIME\r\n\
         RCPT TO:<first@example.com>\r\n\
         RCPT TO:<second@example.com>\r\n\
         DATA\r\n\
         {encoded}.\r\n\
         QUIT\r\n"
    );
    assert_eq!(mailer.transport().sent(), expected);
}

#[tokio::test]
async fn test_login_fallback_rejected() {
    init_tracing();
    let mailer = mailer(
        b"220 localhost ESMTP\r\n\
          250-localhost\r\n\
          250 AUTH LOGIN\r\n\
          334 VXNlcm5hbWU6\r\n\
          334 UGFzc3dvcmQ6\r\n\
          535 5.7.8 authentication failed\r\n",
    );

    let err = mailer.connect().await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
    assert_eq!(err.reply_code(), Some(535));
    assert!(err.is_permanent());
    assert_eq!(
        mailer.transport().sent(),
        "EHLO localhost\r\nAUTH LOGIN\r\ndXNlcg==\r\ncGFzcw==\r\n"
    );
}

#[tokio::test]
async fn test_helo_fallback_with_local_name() {
    init_tracing();
    let config = Config::builder("localhost", 25, "", "")
        .local_name("client.example.com")
        .build()
        .unwrap();
    let mailer = Mailer::with_transport(
        config,
        ScriptedTransport::new(
            b"220 localhost SMTP\r\n\
              500 unrecognized command\r\n\
              250 localhost\r\n\
              221 bye\r\n",
        ),
    );

    let session = mailer.connect().await.unwrap();
    assert!(session.server_info().extensions.is_empty());
    session.close().await.unwrap();

    assert_eq!(
        mailer.transport().sent(),
        "EHLO client.example.com\r\nHELO client.example.com\r\nQUIT\r\n"
    );
}

#[tokio::test]
async fn test_body_is_dot_stuffed() {
    let config = Config::builder("localhost", 25, "", "").build().unwrap();
    let mailer = Mailer::with_transport(
        config,
        ScriptedTransport::new(
            b"220 localhost ESMTP\r\n\
              250 localhost\r\n\
              250 ok\r\n\
              250 ok\r\n\
              354 go ahead\r\n\
              250 queued\r\n\
              221 bye\r\n",
        ),
    );

    let message = Message::new()
        .from("sender@example.com")
        .to("rcpt@example.com")
        .body("first\n.second\n..third");
    mailer.send(&message).await.unwrap();

    let sent = mailer.transport().sent();
    assert!(sent.contains("\r\nfirst\r\n..second\r\n...third\r\n.\r\nQUIT\r\n"));
}

#[tokio::test]
async fn test_rejected_message_still_quits() {
    init_tracing();
    let config = Config::builder("localhost", 25, "", "").build().unwrap();
    let mailer = Mailer::with_transport(
        config,
        ScriptedTransport::new(
            b"220 localhost ESMTP\r\n\
              250 localhost\r\n\
              250 ok\r\n\
              250 ok\r\n\
              354 go ahead\r\n\
              554 5.7.1 message rejected\r\n\
              221 bye\r\n",
        ),
    );

    let message = Message::new()
        .from("sender@example.com")
        .to("rcpt@example.com")
        .body("spam");
    let err = mailer.send(&message).await.unwrap_err();

    assert!(matches!(err, Error::DataClose(_)));
    assert!(mailer.transport().sent().ends_with(".\r\nQUIT\r\n"));
}

#[tokio::test]
async fn test_implicit_tls_failure() {
    let config = Config::builder("localhost", 465, "user", "pass")
        .build()
        .unwrap();
    let mailer = Mailer::with_transport(config, ScriptedTransport::new(b""));

    let err = mailer.connect().await.unwrap_err();
    assert!(matches!(err, Error::Dial(ref e) if e.kind() == io::ErrorKind::Unsupported));
}

#[tokio::test]
async fn test_connection_closed_during_greeting() {
    let mailer = mailer(b"220-localhost ESMTP\r\n");

    let err = mailer.connect().await.unwrap_err();
    assert!(matches!(err, Error::ClientInit(_)));
}

#[tokio::test]
async fn test_client_reuses_session() {
    let mut client = SmtpClient::new(
        SmtpStream::plain(MockStream {
            responses: Cursor::new(
                b"220 localhost ESMTP\r\n\
                  250-localhost\r\n\
                  250 SIZE 10240000\r\n\
                  250 ok\r\n\
                  250 ok\r\n\
                  221 bye\r\n"
                    .to_vec(),
            ),
            sent: Arc::default(),
        }),
        "localhost",
    )
    .await
    .unwrap();

    assert_eq!(
        client.extension("size").await.unwrap().as_deref(),
        Some("10240000")
    );
    client.mail("a@example.com").await.unwrap();
    client.rcpt("b@example.com").await.unwrap();
    client.quit().await.unwrap();
}
