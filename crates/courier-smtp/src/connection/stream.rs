//! Low-level SMTP stream handling.

use std::io;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use super::TlsConfig;

/// SMTP stream (plaintext or TLS) over any async byte stream.
#[derive(Debug)]
pub enum SmtpStream<S = TcpStream> {
    /// Plaintext connection.
    Plain(BufReader<S>),
    /// TLS-encrypted connection (boxed to reduce enum size).
    Tls(Box<BufReader<TlsStream<S>>>),
}

impl<S> SmtpStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps a plaintext stream.
    pub fn plain(stream: S) -> Self {
        Self::Plain(BufReader::new(stream))
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Reads one line, without its line ending.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the peer closed the connection.
    pub async fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        let n = match self {
            Self::Plain(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
        };
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await
            }
        }
    }

    /// Shuts down the write side of the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(reader) => reader.get_mut().shutdown().await,
            Self::Tls(reader) => reader.get_mut().shutdown().await,
        }
    }

    /// Performs a TLS handshake over a plaintext stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already TLS, the server name is
    /// invalid, or the handshake fails.
    pub async fn upgrade_to_tls(self, tls: &TlsConfig) -> io::Result<Self> {
        let stream = match self {
            Self::Plain(reader) => reader.into_inner(),
            Self::Tls(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "stream is already TLS",
                ));
            }
        };

        let server_name = ServerName::try_from(tls.server_name().to_string()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid TLS server name: {}", tls.server_name()),
            )
        })?;

        let tls_stream = tls.connector().connect(server_name, stream).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls_stream))))
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
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_line_strips_crlf() {
        let mock = Builder::new().read(b"220 ready\r\n250 ok\n").build();
        let mut stream = SmtpStream::plain(mock);
        assert_eq!(stream.read_line().await.unwrap(), "220 ready");
        assert_eq!(stream.read_line().await.unwrap(), "250 ok");
    }

    #[tokio::test]
    async fn test_read_line_eof() {
        let mock = Builder::new().build();
        let mut stream = SmtpStream::plain(mock);
        let err = stream.read_line().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_write_all() {
        let mock = Builder::new().write(b"NOOP\r\n").build();
        let mut stream = SmtpStream::plain(mock);
        stream.write_all(b"NOOP\r\n").await.unwrap();
        assert!(!stream.is_tls());
    }
}
