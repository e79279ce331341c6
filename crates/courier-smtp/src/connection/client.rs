//! SMTP command client.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use super::{DataWriter, ServerInfo, SmtpCommands, SmtpStream, TlsConfig};
use crate::auth::Authenticator;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, Reply, ReplyCode, parse_extension};

const DEFAULT_LOCAL_NAME: &str = "localhost";

/// SMTP client over a plaintext or TLS stream.
///
/// The client greets the server lazily: the first command that needs the
/// extension list sends EHLO (falling back to HELO) unless
/// [`hello`](SmtpCommands::hello) was called first.
#[derive(Debug)]
pub struct SmtpClient<S> {
    stream: Option<SmtpStream<S>>,
    server_info: ServerInfo,
    local_name: String,
    did_hello: bool,
}

impl<S> SmtpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// `host` is the name the caller dialed; it is recorded in
    /// [`ServerInfo::name`].
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns
    /// anything other than 220.
    pub async fn new(mut stream: SmtpStream<S>, host: &str) -> Result<Self> {
        let greeting = read_reply(&mut stream).await?;
        let greeting = greeting.expect_code(ReplyCode::SERVICE_READY)?;
        debug!(host, greeting = %greeting.message_text(), "SMTP greeting received");

        let tls = stream.is_tls();
        Ok(Self {
            stream: Some(stream),
            server_info: ServerInfo::new(host, tls),
            local_name: DEFAULT_LOCAL_NAME.to_string(),
            did_hello: false,
        })
    }

    fn stream(&mut self) -> Result<&mut SmtpStream<S>> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::InvalidState("connection is closed".into()))
    }

    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        trace!(command = cmd.verb(), "sending SMTP command");
        let stream = self.stream()?;
        stream.write_all(&cmd.serialize()).await?;
        let reply = read_reply(stream).await?;
        trace!(command = cmd.verb(), code = reply.code.as_u16(), "SMTP reply");
        Ok(reply)
    }

    async fn ensure_hello(&mut self) -> Result<()> {
        if self.did_hello {
            return Ok(());
        }
        self.did_hello = true;

        match self.ehlo().await {
            Ok(()) => Ok(()),
            Err(Error::Smtp { code, .. }) => {
                debug!(code, "EHLO rejected, falling back to HELO");
                self.helo().await
            }
            Err(e) => Err(e),
        }
    }

    async fn ehlo(&mut self) -> Result<()> {
        let cmd = Command::Ehlo {
            hostname: self.local_name.clone(),
        };
        let reply = self.send_command(cmd).await?.expect_success()?;

        // First line is the server's greeting, the rest are extensions
        self.server_info.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(|line| parse_extension(line))
            .filter(|(keyword, _)| !keyword.is_empty())
            .collect();

        debug!(
            extensions = ?self.server_info.extensions.keys().collect::<Vec<_>>(),
            "EHLO accepted"
        );
        Ok(())
    }

    async fn helo(&mut self) -> Result<()> {
        let cmd = Command::Helo {
            hostname: self.local_name.clone(),
        };
        self.send_command(cmd).await?.expect_success()?;
        self.server_info.extensions.clear();
        Ok(())
    }

    async fn cancel_auth(&mut self) {
        match self.send_command(Command::AuthCancel).await {
            Ok(reply) => debug!(code = reply.code.as_u16(), "authentication cancelled"),
            Err(e) => debug!(error = %e, "failed to cancel authentication"),
        }
    }

    /// Handles one server reply during AUTH. Returns the next response to
    /// send, or `None` when the exchange is over.
    fn auth_step(reply: &Reply, auth: &dyn Authenticator) -> Result<Option<Vec<u8>>> {
        match reply.code {
            ReplyCode::AUTH_CONTINUE => {
                let encoded = reply.message_text();
                let challenge = STANDARD.decode(encoded.trim()).map_err(|e| {
                    Error::Protocol(format!("invalid base64 in AUTH challenge: {e}"))
                })?;
                auth.next(&challenge, true)
            }
            ReplyCode::AUTH_SUCCESS => auth.next(reply.message_text().as_bytes(), false),
            _ => Err(reply.to_error()),
        }
    }
}

impl<S> SmtpCommands for SmtpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Writer<'a>
        = DataStream<'a, S>
    where
        Self: 'a;

    async fn hello(&mut self, name: &str) -> Result<()> {
        if self.did_hello {
            return Err(Error::InvalidState(
                "hello called after other commands".into(),
            ));
        }
        name.clone_into(&mut self.local_name);
        self.ensure_hello().await
    }

    async fn extension(&mut self, name: &str) -> Result<Option<String>> {
        self.ensure_hello().await?;
        Ok(self.server_info.extension(name).map(ToString::to_string))
    }

    async fn start_tls(&mut self, tls: &TlsConfig) -> Result<()> {
        self.ensure_hello().await?;
        self.send_command(Command::StartTls)
            .await?
            .expect_code(ReplyCode::SERVICE_READY)?;

        let stream = self
            .stream
            .take()
            .ok_or_else(|| Error::InvalidState("connection is closed".into()))?;

        let upgraded = stream.upgrade_to_tls(tls).await.map_err(|e| {
            // Surface rustls failures (bad certificate, etc.) as TLS errors
            let tls_error = e
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
                .cloned();
            tls_error.map_or(Error::Io(e), Error::Tls)
        })?;

        self.stream = Some(upgraded);
        self.server_info.tls = true;
        self.server_info.extensions.clear();
        self.did_hello = false;
        debug!(server_name = tls.server_name(), "STARTTLS complete");
        Ok(())
    }

    async fn auth(&mut self, auth: &dyn Authenticator) -> Result<()> {
        self.ensure_hello().await?;

        let (mechanism, initial) = auth.start(&self.server_info)?;
        debug!(mechanism = %mechanism, "starting SMTP authentication");

        let initial_response = initial
            .filter(|resp| !resp.is_empty())
            .map(|resp| STANDARD.encode(resp));
        let mut reply = self
            .send_command(Command::Auth {
                mechanism,
                initial_response,
            })
            .await?;

        loop {
            let response = match Self::auth_step(&reply, auth) {
                Ok(response) => response,
                Err(e @ Error::Smtp { .. }) => return Err(e),
                Err(e) => {
                    self.cancel_auth().await;
                    return Err(e);
                }
            };

            let Some(response) = response else {
                break;
            };
            if reply.code == ReplyCode::AUTH_SUCCESS {
                break;
            }

            reply = self
                .send_command(Command::AuthResponse(STANDARD.encode(response)))
                .await?;
        }

        debug!("SMTP authentication succeeded");
        Ok(())
    }

    async fn mail(&mut self, from: &str) -> Result<()> {
        let from = Address::new(from)?;
        self.ensure_hello().await?;

        let body = self
            .server_info
            .supports("8BITMIME")
            .then(|| "8BITMIME".to_string());
        let smtputf8 = self.server_info.supports("SMTPUTF8");

        self.send_command(Command::MailFrom {
            from,
            body,
            smtputf8,
        })
        .await?
        .expect_success()?;
        Ok(())
    }

    async fn rcpt(&mut self, to: &str) -> Result<()> {
        let to = Address::new(to)?;
        let reply = self.send_command(Command::RcptTo { to }).await?;
        if reply.code == ReplyCode::OK || reply.code == ReplyCode::FORWARD {
            Ok(())
        } else {
            Err(reply.to_error())
        }
    }

    async fn data(&mut self) -> Result<Self::Writer<'_>> {
        self.send_command(Command::Data)
            .await?
            .expect_code(ReplyCode::START_DATA)?;

        Ok(DataStream::new(self.stream()?))
    }

    async fn quit(&mut self) -> Result<()> {
        let reply = match self.ensure_hello().await {
            Ok(()) => self.send_command(Command::Quit).await,
            Err(e) => Err(e),
        };
        let close = self.close().await;

        reply?.expect_code(ReplyCode::CLOSING)?;
        close
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.take() {
            Some(mut stream) => {
                stream.shutdown().await?;
                debug!(host = %self.server_info.name, "SMTP connection closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

async fn read_reply<S>(stream: &mut SmtpStream<S>) -> Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        let is_last = is_last_reply_line(&line);
        lines.push(line);

        if is_last {
            break;
        }
    }

    parse_reply(&lines)
}

/// Message body writer returned by `DATA`.
///
/// Converts bare `\n` to `\r\n` and doubles a `.` at the start of a line.
#[derive(Debug)]
pub struct DataStream<'a, S> {
    stream: &'a mut SmtpStream<S>,
    line_start: bool,
    last_was_cr: bool,
}

impl<'a, S> DataStream<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    const fn new(stream: &'a mut SmtpStream<S>) -> Self {
        Self {
            stream,
            line_start: true,
            last_was_cr: false,
        }
    }

    fn encode(&mut self, buf: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(buf.len() + buf.len() / 64 + 2);

        for &byte in buf {
            if self.line_start && byte == b'.' {
                out.push(b'.');
            }

            if byte == b'\n' {
                if !self.last_was_cr {
                    out.push(b'\r');
                }
                out.push(b'\n');
                self.line_start = true;
            } else {
                out.push(byte);
                self.line_start = false;
            }

            self.last_was_cr = byte == b'\r';
        }

        out
    }
}

impl<S> DataWriter for DataStream<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let encoded = self.encode(buf);
        self.stream.write_all(&encoded).await?;
        Ok(buf.len())
    }

    async fn close(self) -> Result<()> {
        let terminator: &[u8] = if self.last_was_cr {
            b"\n.\r\n"
        } else if self.line_start {
            b".\r\n"
        } else {
            b"\r\n.\r\n"
        };

        self.stream.write_all(terminator).await?;
        let reply = read_reply(self.stream).await?;
        reply.expect_success()?;
        debug!("message accepted");
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
    use crate::auth::{CramMd5Auth, LoginAuth, PlainAuth};
    use tokio_test::io::{Builder, Mock};

    const GREETING: &[u8] = b"220 smtp.example.com ESMTP ready\r\n";

    async fn client(mock: Mock) -> SmtpClient<Mock> {
        SmtpClient::new(SmtpStream::plain(mock), "localhost")
            .await
            .unwrap()
    }

    mod greeting_tests {
        use super::*;

        #[tokio::test]
        async fn reads_greeting() {
            let mock = Builder::new().read(GREETING).build();
            let client = client(mock).await;
            assert_eq!(client.server_info().name, "localhost");
            assert!(!client.server_info().tls);
        }

        #[tokio::test]
        async fn rejects_bad_greeting() {
            let mock = Builder::new().read(b"554 go away\r\n").build();
            let err = SmtpClient::new(SmtpStream::plain(mock), "localhost")
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Smtp { code: 554, .. }));
        }

        #[tokio::test]
        async fn multi_line_greeting() {
            let mock = Builder::new()
                .read(b"220-smtp.example.com ESMTP\r\n220 ready\r\n")
                .build();
            assert!(
                SmtpClient::new(SmtpStream::plain(mock), "localhost")
                    .await
                    .is_ok()
            );
        }
    }

    mod hello_tests {
        use super::*;

        #[tokio::test]
        async fn ehlo_parses_extensions() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"EHLO client.example.com\r\n")
                .read(b"250-smtp.example.com\r\n250-AUTH PLAIN LOGIN\r\n250-SIZE 1000\r\n250 STARTTLS\r\n")
                .build();
            let mut client = client(mock).await;

            client.hello("client.example.com").await.unwrap();
            assert_eq!(
                client.extension("auth").await.unwrap().as_deref(),
                Some("PLAIN LOGIN")
            );
            assert_eq!(client.extension("SIZE").await.unwrap().as_deref(), Some("1000"));
            assert_eq!(client.extension("STARTTLS").await.unwrap().as_deref(), Some(""));
            assert_eq!(client.extension("8BITMIME").await.unwrap(), None);
        }

        #[tokio::test]
        async fn falls_back_to_helo() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"EHLO localhost\r\n")
                .read(b"502 command not implemented\r\n")
                .write(b"HELO localhost\r\n")
                .read(b"250 hello\r\n")
                .build();
            let mut client = client(mock).await;

            assert_eq!(client.extension("STARTTLS").await.unwrap(), None);
        }

        #[tokio::test]
        async fn hello_after_other_commands_is_invalid() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"EHLO localhost\r\n")
                .read(b"250 smtp.example.com\r\n")
                .build();
            let mut client = client(mock).await;

            client.extension("AUTH").await.unwrap();
            let err = client.hello("late.example.com").await.unwrap_err();
            assert!(matches!(err, Error::InvalidState(_)));
        }

        #[tokio::test]
        async fn starttls_rejected() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"EHLO localhost\r\n")
                .read(b"250-smtp.example.com\r\n250 STARTTLS\r\n")
                .write(b"STARTTLS\r\n")
                .read(b"454 TLS not available\r\n")
                .build();
            let mut client = client(mock).await;

            let err = client
                .start_tls(&TlsConfig::new("smtp.example.com"))
                .await
                .unwrap_err();
            assert!(err.is_transient());
        }
    }

    mod auth_tests {
        use super::*;

        const EHLO: &[u8] = b"EHLO localhost\r\n";
        const EHLO_REPLY: &[u8] = b"250-smtp.example.com\r\n250 AUTH PLAIN LOGIN CRAM-MD5\r\n";

        #[tokio::test]
        async fn plain_with_initial_response() {
            let mock = Builder::new()
                .read(GREETING)
                .write(EHLO)
                .read(EHLO_REPLY)
                .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
                .read(b"235 2.7.0 Authentication successful\r\n")
                .build();
            let mut client = client(mock).await;

            let auth = PlainAuth::new("", "user", "pass", "localhost");
            client.auth(&auth).await.unwrap();
        }

        #[tokio::test]
        async fn login_exchange() {
            let mock = Builder::new()
                .read(GREETING)
                .write(EHLO)
                .read(EHLO_REPLY)
                .write(b"AUTH LOGIN\r\n")
                .read(b"334 VXNlcm5hbWU6\r\n")
                .write(b"dXNlcg==\r\n")
                .read(b"334 UGFzc3dvcmQ6\r\n")
                .write(b"cGFzcw==\r\n")
                .read(b"235 ok\r\n")
                .build();
            let mut client = client(mock).await;

            client.auth(&LoginAuth::new("user", "pass")).await.unwrap();
        }

        #[tokio::test]
        async fn cram_md5_exchange() {
            // Challenge "<1896.697170952@postoffice.reston.mci.net>" from RFC 2195
            let mock = Builder::new()
                .read(GREETING)
                .write(EHLO)
                .read(EHLO_REPLY)
                .write(b"AUTH CRAM-MD5\r\n")
                .read(b"334 PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+\r\n")
                .write(b"dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw\r\n")
                .read(b"235 ok\r\n")
                .build();
            let mut client = client(mock).await;

            client
                .auth(&CramMd5Auth::new("tim", "tanstaaftanstaaf"))
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn rejected_credentials() {
            let mock = Builder::new()
                .read(GREETING)
                .write(EHLO)
                .read(EHLO_REPLY)
                .write(b"AUTH PLAIN AHVzZXIAYmFk\r\n")
                .read(b"535 5.7.8 bad credentials\r\n")
                .build();
            let mut client = client(mock).await;

            let auth = PlainAuth::new("", "user", "bad", "localhost");
            let err = client.auth(&auth).await.unwrap_err();
            assert!(matches!(err, Error::Smtp { code: 535, .. }));
        }

        #[tokio::test]
        async fn unexpected_challenge_cancels() {
            let mock = Builder::new()
                .read(GREETING)
                .write(EHLO)
                .read(EHLO_REPLY)
                .write(b"AUTH LOGIN\r\n")
                .read(b"334 V2hvIGFyZSB5b3U/\r\n")
                .write(b"*\r\n")
                .read(b"501 cancelled\r\n")
                .build();
            let mut client = client(mock).await;

            let err = client.auth(&LoginAuth::new("user", "pass")).await.unwrap_err();
            assert!(matches!(err, Error::UnexpectedChallenge(ref c) if c == "Who are you?"));
        }

        #[tokio::test]
        async fn start_failure_sends_nothing() {
            let mock = Builder::new()
                .read(GREETING)
                .write(EHLO)
                .read(EHLO_REPLY)
                .build();
            let mut client = SmtpClient::new(SmtpStream::plain(mock), "smtp.example.com")
                .await
                .unwrap();

            let auth = PlainAuth::new("", "user", "pass", "smtp.example.com");
            let err = client.auth(&auth).await.unwrap_err();
            assert!(matches!(err, Error::Sasl(_)));
        }
    }

    mod transaction_tests {
        use super::*;

        #[tokio::test]
        async fn mail_rcpt_data_quit() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"EHLO localhost\r\n")
                .read(b"250-smtp.example.com\r\n250 8BITMIME\r\n")
                .write(b"MAIL FROM:<sender@example.com> BODY=8BITMIME\r\n")
                .read(b"250 ok\r\n")
                .write(b"RCPT TO:<a@example.com>\r\n")
                .read(b"250 ok\r\n")
                .write(b"RCPT TO:<b@example.com>\r\n")
                .read(b"251 will forward\r\n")
                .write(b"DATA\r\n")
                .read(b"354 go ahead\r\n")
                .write(b"Subject: hi\r\n\r\nbody\r\n")
                .write(b".\r\n")
                .read(b"250 queued\r\n")
                .write(b"QUIT\r\n")
                .read(b"221 bye\r\n")
                .build();
            let mut client = client(mock).await;

            client.mail("sender@example.com").await.unwrap();
            client.rcpt("a@example.com").await.unwrap();
            client.rcpt("b@example.com").await.unwrap();

            let mut writer = client.data().await.unwrap();
            let n = writer.write(b"Subject: hi\n\nbody\n").await.unwrap();
            assert_eq!(n, 18);
            writer.close().await.unwrap();

            client.quit().await.unwrap();
        }

        #[tokio::test]
        async fn rcpt_rejected() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"EHLO localhost\r\n")
                .read(b"250 smtp.example.com\r\n")
                .write(b"MAIL FROM:<sender@example.com>\r\n")
                .read(b"250 ok\r\n")
                .write(b"RCPT TO:<nobody@example.com>\r\n")
                .read(b"550 no such user\r\n")
                .build();
            let mut client = client(mock).await;

            client.mail("sender@example.com").await.unwrap();
            let err = client.rcpt("nobody@example.com").await.unwrap_err();
            assert!(err.is_permanent());
        }

        #[tokio::test]
        async fn invalid_address_sends_nothing() {
            let mock = Builder::new().read(GREETING).build();
            let mut client = client(mock).await;

            let err = client.rcpt("not an address").await.unwrap_err();
            assert!(matches!(err, Error::InvalidAddress(_)));
        }

        #[tokio::test]
        async fn data_rejected() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"DATA\r\n")
                .read(b"503 need RCPT\r\n")
                .build();
            let mut client = client(mock).await;

            assert!(client.data().await.is_err());
        }

        #[tokio::test]
        async fn message_rejected_at_close() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"DATA\r\n")
                .read(b"354 go ahead\r\n")
                .write(b"spam\r\n")
                .write(b".\r\n")
                .read(b"554 rejected as spam\r\n")
                .build();
            let mut client = client(mock).await;

            let mut writer = client.data().await.unwrap();
            writer.write(b"spam\r\n").await.unwrap();
            let err = writer.close().await.unwrap_err();
            assert!(matches!(err, Error::Smtp { code: 554, .. }));
        }

        #[tokio::test]
        async fn quit_closes_without_greeting_twice() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"EHLO localhost\r\n")
                .read(b"250 smtp.example.com\r\n")
                .write(b"QUIT\r\n")
                .read(b"221 bye\r\n")
                .build();
            let mut client = client(mock).await;

            client.quit().await.unwrap();
            // Closing again is a no-op
            client.close().await.unwrap();
        }

        #[tokio::test]
        async fn command_after_close_is_invalid_state() {
            let mock = Builder::new().read(GREETING).build();
            let mut client = client(mock).await;

            client.close().await.unwrap();
            let err = client.data().await.unwrap_err();
            assert!(matches!(err, Error::InvalidState(_)));
        }
    }

    mod data_stream_tests {
        use super::*;

        fn encode_all(chunks: &[&[u8]]) -> Vec<u8> {
            let mock = Builder::new().build();
            let mut stream = SmtpStream::plain(mock);
            let mut data = DataStream::new(&mut stream);
            chunks.iter().flat_map(|c| data.encode(c)).collect()
        }

        #[test]
        fn normalizes_bare_lf() {
            assert_eq!(encode_all(&[b"a\nb\n"]), b"a\r\nb\r\n");
        }

        #[test]
        fn keeps_crlf() {
            assert_eq!(encode_all(&[b"a\r\nb\r\n"]), b"a\r\nb\r\n");
        }

        #[test]
        fn dot_stuffs_line_starts() {
            assert_eq!(
                encode_all(&[b".hidden\r\nnot.here\r\n..two\r\n"]),
                b"..hidden\r\nnot.here\r\n...two\r\n"
            );
        }

        #[test]
        fn state_carries_across_writes() {
            assert_eq!(encode_all(&[b"line\r", b"\n.dot\n"]), b"line\r\n..dot\r\n");
            assert_eq!(encode_all(&[b"line\n", b"."]), b"line\r\n..");
        }
    }
}
