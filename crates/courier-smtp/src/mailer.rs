//! Connection negotiation: dial, TLS, greeting, STARTTLS and authentication.

use std::io;
use std::sync::Arc;

use courier_mime::Message;
use tracing::{debug, info};

use crate::auth::{Authenticator, select_authenticator};
use crate::connection::{Config, Session, SmtpCommands, TcpTransport, Transport};
use crate::error::{Error, Result};

/// Opens negotiated SMTP sessions for one [`Config`].
///
/// # Example
///
/// ```no_run
/// use courier_smtp::{Config, Mailer, Message};
///
/// # async fn example() -> courier_smtp::Result<()> {
/// let config = Config::builder("smtp.example.com", 587, "user", "secret").build()?;
/// let mailer = Mailer::new(config);
///
/// let message = Message::new()
///     .from("user@example.com")
///     .to("friend@example.com")
///     .subject("Hi")
///     .body("Hello!");
///
/// let mut session = mailer.connect().await?;
/// session.send(&message).await?;
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Mailer<T = TcpTransport> {
    config: Config,
    transport: T,
}

impl Mailer<TcpTransport> {
    /// Creates a mailer that connects over TCP.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            transport: TcpTransport,
        }
    }
}

impl<T: Transport> Mailer<T> {
    /// Creates a mailer over a custom transport.
    #[must_use]
    pub const fn with_transport(config: Config, transport: T) -> Self {
        Self { config, transport }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Opens a connection and negotiates it up to an authenticated session.
    ///
    /// On port 465 (or with [`ssl`](crate::ConfigBuilder::ssl)) TLS wraps the
    /// connection before the greeting. Otherwise STARTTLS is used when the
    /// server offers it. If no authenticator was configured and a username
    /// is set, one is chosen from the server's AUTH list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dial`], [`Error::ClientInit`], [`Error::Greeting`],
    /// [`Error::TlsUpgrade`] or [`Error::Authentication`] depending on the
    /// step that failed. The connection is closed before returning any error
    /// raised after the greeting.
    pub async fn connect(&self) -> Result<Session<T::Client>> {
        let config = &self.config;
        let implicit_tls = config.implicit_tls();
        info!(host = %config.host, port = config.port, implicit_tls, "connecting to SMTP server");

        let conn = tokio::time::timeout(
            config.dial_timeout,
            self.transport.dial(&config.host, config.port),
        )
        .await
        .map_err(|_| {
            Error::Dial(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connecting to {} timed out", config.addr()),
            ))
        })?
        .map_err(Error::Dial)?;

        let conn = if implicit_tls {
            self.transport
                .wrap_tls(conn, &config.tls)
                .await
                .map_err(Error::Dial)?
        } else {
            conn
        };

        let mut client = self
            .transport
            .client(conn, &config.host)
            .await
            .map_err(|e| Error::ClientInit(Box::new(e)))?;

        if let Some(name) = &config.local_name
            && let Err(e) = client.hello(name).await
        {
            close_quietly(&mut client).await;
            return Err(Error::Greeting(Box::new(e)));
        }

        if !implicit_tls {
            let starttls = match client.extension("STARTTLS").await {
                Ok(params) => params.is_some(),
                Err(e) => {
                    close_quietly(&mut client).await;
                    return Err(Error::Greeting(Box::new(e)));
                }
            };

            if starttls {
                debug!("server offers STARTTLS, upgrading");
                if let Err(e) = client.start_tls(&config.tls).await {
                    close_quietly(&mut client).await;
                    return Err(Error::TlsUpgrade(Box::new(e)));
                }
            }
        }

        let authenticator: Option<Arc<dyn Authenticator>> = match &config.authenticator {
            Some(auth) => Some(Arc::clone(auth)),
            None if !config.credentials.username.is_empty() => {
                match client.extension("AUTH").await {
                    Ok(Some(advertised)) => Some(select_authenticator(
                        &advertised,
                        &config.credentials,
                        &config.host,
                    )),
                    Ok(None) => {
                        debug!("server does not advertise AUTH, skipping authentication");
                        None
                    }
                    Err(e) => {
                        close_quietly(&mut client).await;
                        return Err(Error::Greeting(Box::new(e)));
                    }
                }
            }
            None => None,
        };

        if let Some(auth) = authenticator
            && let Err(e) = client.auth(auth.as_ref()).await
        {
            close_quietly(&mut client).await;
            return Err(Error::Authentication(Box::new(e)));
        }

        let info = client.server_info();
        info!(host = %info.name, tls = info.tls, "SMTP session ready");
        Ok(Session::new(client))
    }

    /// Connects, sends one message and closes the session.
    ///
    /// # Errors
    ///
    /// Returns the connect error, otherwise the send error. A close error is
    /// returned only when the send succeeded.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let mut session = self.connect().await?;
        let sent = session.send(message).await;
        let closed = session.close().await;

        match sent {
            Ok(()) => closed,
            Err(e) => {
                if let Err(close_err) = closed {
                    debug!(error = %close_err, "failed to close session after send error");
                }
                Err(e)
            }
        }
    }
}

/// Sends a single message over a fresh TCP connection.
///
/// # Errors
///
/// See [`Mailer::send`].
pub async fn send_once(config: Config, message: &Message) -> Result<()> {
    Mailer::new(config).send(message).await
}

async fn close_quietly<C: SmtpCommands>(client: &mut C) {
    if let Err(e) = client.close().await {
        debug!(error = %e, "failed to close connection after negotiation error");
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
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::auth::LoginAuth;
    use crate::connection::{DataWriter, ServerInfo, TlsConfig};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Failure switches for the fake server.
    #[derive(Debug, Clone, Default)]
    struct Script {
        dial_delay: Option<Duration>,
        dial_error: bool,
        tls_error: bool,
        greeting_error: bool,
        hello_error: bool,
        starttls_error: bool,
        auth_error: bool,
        rcpt_error: bool,
        extensions: BTreeMap<String, String>,
    }

    impl Script {
        fn with_extension(mut self, keyword: &str, params: &str) -> Self {
            self.extensions.insert(keyword.into(), params.into());
            self
        }
    }

    #[derive(Debug, Default)]
    struct FakeTransport {
        script: Script,
        log: Log,
    }

    impl FakeTransport {
        fn new(script: Script) -> Self {
            Self {
                script,
                log: Log::default(),
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    fn record(log: &Log, entry: impl Into<String>) {
        log.lock().unwrap().push(entry.into());
    }

    fn fail(what: &str) -> Error {
        Error::smtp_error(554, format!("{what} failed"))
    }

    #[derive(Debug)]
    struct FakeConn {
        tls: bool,
    }

    impl Transport for FakeTransport {
        type Conn = FakeConn;
        type Client = FakeClient;

        async fn dial(&self, host: &str, port: u16) -> io::Result<FakeConn> {
            record(&self.log, format!("dial {host}:{port}"));
            if let Some(delay) = self.script.dial_delay {
                tokio::time::sleep(delay).await;
            }
            if self.script.dial_error {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            Ok(FakeConn { tls: false })
        }

        async fn wrap_tls(&self, _conn: FakeConn, tls: &TlsConfig) -> io::Result<FakeConn> {
            record(&self.log, format!("wrap_tls {}", tls.server_name()));
            if self.script.tls_error {
                return Err(io::Error::other("handshake failed"));
            }
            Ok(FakeConn { tls: true })
        }

        async fn client(&self, conn: FakeConn, host: &str) -> Result<FakeClient> {
            record(&self.log, "client");
            if self.script.greeting_error {
                return Err(fail("greeting"));
            }
            let mut info = ServerInfo::new(host, conn.tls);
            info.extensions = self.script.extensions.clone();
            Ok(FakeClient {
                info,
                script: self.script.clone(),
                log: Arc::clone(&self.log),
            })
        }
    }

    #[derive(Debug)]
    struct FakeClient {
        info: ServerInfo,
        script: Script,
        log: Log,
    }

    #[derive(Debug)]
    struct FakeWriter {
        log: Log,
    }

    impl DataWriter for FakeWriter {
        async fn write(&mut self, buf: &[u8]) -> Result<usize> {
            record(&self.log, format!("write {}", buf.len()));
            Ok(buf.len())
        }

        async fn close(self) -> Result<()> {
            record(&self.log, "data close");
            Ok(())
        }
    }

    impl SmtpCommands for FakeClient {
        type Writer<'a> = FakeWriter;

        async fn hello(&mut self, name: &str) -> Result<()> {
            record(&self.log, format!("hello {name}"));
            if self.script.hello_error {
                return Err(fail("hello"));
            }
            Ok(())
        }

        async fn extension(&mut self, name: &str) -> Result<Option<String>> {
            record(&self.log, format!("extension {name}"));
            Ok(self.info.extension(name).map(ToString::to_string))
        }

        async fn start_tls(&mut self, _tls: &TlsConfig) -> Result<()> {
            record(&self.log, "starttls");
            if self.script.starttls_error {
                return Err(fail("starttls"));
            }
            self.info.tls = true;
            Ok(())
        }

        async fn auth(&mut self, auth: &dyn Authenticator) -> Result<()> {
            let (mechanism, _) = auth.start(&self.info)?;
            record(&self.log, format!("auth {mechanism}"));
            if self.script.auth_error {
                return Err(fail("auth"));
            }
            Ok(())
        }

        async fn mail(&mut self, from: &str) -> Result<()> {
            record(&self.log, format!("mail {from}"));
            Ok(())
        }

        async fn rcpt(&mut self, to: &str) -> Result<()> {
            record(&self.log, format!("rcpt {to}"));
            if self.script.rcpt_error {
                return Err(fail("rcpt"));
            }
            Ok(())
        }

        async fn data(&mut self) -> Result<FakeWriter> {
            record(&self.log, "data");
            Ok(FakeWriter {
                log: Arc::clone(&self.log),
            })
        }

        async fn quit(&mut self) -> Result<()> {
            record(&self.log, "quit");
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            record(&self.log, "close");
            Ok(())
        }

        fn server_info(&self) -> &ServerInfo {
            &self.info
        }
    }

    fn config(port: u16) -> crate::ConfigBuilder {
        Config::builder("localhost", port, "user", "pass")
    }

    fn message() -> Message {
        Message::new()
            .from("Sender <sender@example.com>")
            .to("rcpt@example.com")
            .body("hello")
    }

    async fn connect(config: Config, script: Script) -> (Result<()>, Vec<String>) {
        let mailer = Mailer::with_transport(config, FakeTransport::new(script));
        let result = mailer.connect().await.map(|_| ());
        let log = mailer.transport.log();
        (result, log)
    }

    #[tokio::test]
    async fn test_plain_without_starttls() {
        let script = Script::default().with_extension("AUTH", "LOGIN PLAIN");
        let (result, log) = connect(config(25).build().unwrap(), script).await;

        result.unwrap();
        assert_eq!(
            log,
            vec![
                "dial localhost:25",
                "client",
                "extension STARTTLS",
                "extension AUTH",
                "auth PLAIN",
            ]
        );
    }

    #[tokio::test]
    async fn test_cram_md5_preferred() {
        let script = Script::default()
            .with_extension("STARTTLS", "")
            .with_extension("AUTH", "PLAIN LOGIN CRAM-MD5");
        let (result, log) = connect(config(587).build().unwrap(), script).await;

        result.unwrap();
        assert_eq!(
            log,
            vec![
                "dial localhost:587",
                "client",
                "extension STARTTLS",
                "starttls",
                "extension AUTH",
                "auth CRAM-MD5",
            ]
        );
    }

    #[tokio::test]
    async fn test_login_fallback() {
        let script = Script::default().with_extension("AUTH", "XOAUTH2");
        let (result, log) = connect(config(25).build().unwrap(), script).await;

        result.unwrap();
        assert_eq!(log.last().unwrap(), "auth LOGIN");
    }

    #[tokio::test]
    async fn test_implicit_tls_skips_starttls() {
        let script = Script::default()
            .with_extension("STARTTLS", "")
            .with_extension("AUTH", "PLAIN");
        let (result, log) = connect(config(465).build().unwrap(), script).await;

        result.unwrap();
        assert_eq!(
            log,
            vec![
                "dial localhost:465",
                "wrap_tls localhost",
                "client",
                "extension AUTH",
                "auth PLAIN",
            ]
        );
    }

    #[tokio::test]
    async fn test_no_auth_advertised() {
        let (result, log) = connect(config(25).build().unwrap(), Script::default()).await;

        result.unwrap();
        assert_eq!(log.last().unwrap(), "extension AUTH");
    }

    #[tokio::test]
    async fn test_no_username_skips_auth() {
        let config = Config::builder("localhost", 25, "", "").build().unwrap();
        let script = Script::default().with_extension("AUTH", "PLAIN");
        let (result, log) = connect(config, script).await;

        result.unwrap();
        assert_eq!(log, vec!["dial localhost:25", "client", "extension STARTTLS"]);
    }

    #[tokio::test]
    async fn test_explicit_authenticator() {
        let config = config(25)
            .authenticator(LoginAuth::new("user", "pass"))
            .build()
            .unwrap();
        let script = Script::default().with_extension("AUTH", "CRAM-MD5");
        let (result, log) = connect(config, script).await;

        result.unwrap();
        assert!(!log.contains(&"extension AUTH".to_string()));
        assert_eq!(log.last().unwrap(), "auth LOGIN");
    }

    #[tokio::test]
    async fn test_local_name() {
        let config = config(25).local_name("client.example.com").build().unwrap();
        let (result, log) = connect(config, Script::default()).await;

        result.unwrap();
        assert_eq!(log[2], "hello client.example.com");
    }

    #[tokio::test]
    async fn test_dial_failure() {
        let script = Script {
            dial_error: true,
            ..Script::default()
        };
        let (result, log) = connect(config(25).build().unwrap(), script).await;

        match result {
            Err(Error::Dial(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionRefused),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(log, vec!["dial localhost:25"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dial_timeout() {
        let script = Script {
            dial_delay: Some(Duration::from_secs(60)),
            ..Script::default()
        };
        let config = config(25).dial_timeout(Duration::from_secs(1)).build().unwrap();
        let (result, _) = connect(config, script).await;

        match result {
            Err(Error::Dial(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_implicit_tls_failure_is_dial_error() {
        let script = Script {
            tls_error: true,
            ..Script::default()
        };
        let (result, _) = connect(config(465).build().unwrap(), script).await;
        assert!(matches!(result, Err(Error::Dial(_))));
    }

    #[tokio::test]
    async fn test_bad_greeting() {
        let script = Script {
            greeting_error: true,
            ..Script::default()
        };
        let (result, _) = connect(config(25).build().unwrap(), script).await;
        assert!(matches!(result, Err(Error::ClientInit(_))));
    }

    #[tokio::test]
    async fn test_hello_failure_closes() {
        let script = Script {
            hello_error: true,
            ..Script::default()
        };
        let config = config(25).local_name("client.example.com").build().unwrap();
        let (result, log) = connect(config, script).await;

        assert!(matches!(result, Err(Error::Greeting(_))));
        assert_eq!(log.last().unwrap(), "close");
    }

    #[tokio::test]
    async fn test_starttls_failure_closes_once() {
        let script = Script {
            starttls_error: true,
            ..Script::default()
        }
        .with_extension("STARTTLS", "");
        let (result, log) = connect(config(587).build().unwrap(), script).await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::TlsUpgrade(_)));
        assert_eq!(err.reply_code(), Some(554));
        assert_eq!(log.iter().filter(|entry| *entry == "close").count(), 1);
        assert!(!log.iter().any(|entry| entry.starts_with("auth")));
    }

    #[tokio::test]
    async fn test_auth_failure_closes() {
        let script = Script {
            auth_error: true,
            ..Script::default()
        }
        .with_extension("AUTH", "LOGIN");
        let (result, log) = connect(config(25).build().unwrap(), script).await;

        assert!(matches!(result, Err(Error::Authentication(_))));
        assert_eq!(log.last().unwrap(), "close");
    }

    #[tokio::test]
    async fn test_plain_refuses_cleartext_remote() {
        let config = Config::builder("smtp.example.com", 25, "user", "pass")
            .build()
            .unwrap();
        let script = Script::default().with_extension("AUTH", "PLAIN");
        let (result, log) = connect(config, script).await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Authentication(ref inner) if matches!(**inner, Error::Sasl(_))));
        assert_eq!(log.last().unwrap(), "close");
    }

    #[tokio::test]
    async fn test_send() {
        let script = Script::default().with_extension("AUTH", "PLAIN");
        let mailer = Mailer::with_transport(config(25).build().unwrap(), FakeTransport::new(script));

        mailer.send(&message()).await.unwrap();

        let log = mailer.transport.log();
        let tail: Vec<_> = log.iter().skip(5).map(String::as_str).collect();
        let write = format!("write {}", message().encode().unwrap().len());
        assert_eq!(
            tail,
            vec![
                "mail sender@example.com",
                "rcpt rcpt@example.com",
                "data",
                write.as_str(),
                "data close",
                "quit",
            ]
        );
    }

    #[tokio::test]
    async fn test_send_closes_after_failure() {
        let script = Script {
            rcpt_error: true,
            ..Script::default()
        };
        let mailer = Mailer::with_transport(config(25).build().unwrap(), FakeTransport::new(script));

        let err = mailer.send(&message()).await.unwrap_err();
        assert!(matches!(err, Error::Envelope { .. }));
        assert_eq!(mailer.transport.log().last().unwrap(), "quit");
    }

    #[tokio::test]
    async fn test_send_connect_failure() {
        let script = Script {
            dial_error: true,
            ..Script::default()
        };
        let mailer = Mailer::with_transport(config(25).build().unwrap(), FakeTransport::new(script));

        let err = mailer.send(&message()).await.unwrap_err();
        assert!(matches!(err, Error::Dial(_)));
    }
}
