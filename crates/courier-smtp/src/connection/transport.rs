//! Network primitives used to open an SMTP connection.

use std::future::Future;
use std::io;

use tokio::net::TcpStream;
use tracing::debug;

use super::{SmtpClient, SmtpCommands, SmtpStream, TlsConfig};
use crate::error::Result;

/// Opens connections and builds command clients over them.
///
/// [`Mailer`](crate::Mailer) is generic over this trait so the negotiation
/// can be driven without a network.
pub trait Transport: Send + Sync {
    /// An open byte stream.
    type Conn: Send;

    /// The command layer built over a connection.
    type Client: SmtpCommands;

    /// Opens a connection to `host:port`.
    fn dial(&self, host: &str, port: u16) -> impl Future<Output = io::Result<Self::Conn>> + Send;

    /// Wraps a fresh connection in TLS.
    fn wrap_tls(
        &self,
        conn: Self::Conn,
        tls: &TlsConfig,
    ) -> impl Future<Output = io::Result<Self::Conn>> + Send;

    /// Builds a command client, reading the server greeting.
    fn client(
        &self,
        conn: Self::Conn,
        host: &str,
    ) -> impl Future<Output = Result<Self::Client>> + Send;
}

/// TCP transport with rustls for TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Conn = SmtpStream<TcpStream>;
    type Client = SmtpClient<TcpStream>;

    async fn dial(&self, host: &str, port: u16) -> io::Result<Self::Conn> {
        debug!(host, port, "connecting");
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(SmtpStream::plain(stream))
    }

    async fn wrap_tls(&self, conn: Self::Conn, tls: &TlsConfig) -> io::Result<Self::Conn> {
        debug!(server_name = tls.server_name(), "starting implicit TLS");
        conn.upgrade_to_tls(tls).await
    }

    async fn client(&self, conn: Self::Conn, host: &str) -> Result<Self::Client> {
        SmtpClient::new(conn, host).await
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
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_and_greeting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufReader::new(socket);
            socket
                .get_mut()
                .write_all(b"220 localhost ESMTP\r\n")
                .await
                .unwrap();

            let mut line = String::new();
            socket.read_line(&mut line).await.unwrap();
            assert_eq!(line, "EHLO localhost\r\n");
            socket
                .get_mut()
                .write_all(b"250-localhost\r\n250 8BITMIME\r\n")
                .await
                .unwrap();
        });

        let transport = TcpTransport;
        let conn = transport.dial("127.0.0.1", port).await.unwrap();
        assert!(!conn.is_tls());

        let mut client = transport.client(conn, "127.0.0.1").await.unwrap();
        assert_eq!(client.server_info().name, "127.0.0.1");
        assert_eq!(client.extension("8BITMIME").await.unwrap().as_deref(), Some(""));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(TcpTransport.dial("127.0.0.1", port).await.is_err());
    }
}
