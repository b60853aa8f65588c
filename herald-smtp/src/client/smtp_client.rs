//! SMTP client connection over plain TCP or implicit TLS.

use base64::{Engine, engine::general_purpose::STANDARD};
use herald_common::{incoming, outgoing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{TlsConnector, client::TlsStream, rustls::pki_types::ServerName};

use super::{
    data::DataEncoder,
    error::{ClientError, Result},
    response::Response,
};
use crate::payload::Payload;

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Largest chunk requested from a payload per write during DATA.
const UPLOAD_CHUNK_SIZE: usize = 16 * 1024;

enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.flush().await?,
            Self::Tls(stream) => stream.flush().await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn shutdown(&mut self) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.shutdown().await?,
            Self::Tls(stream) => stream.shutdown().await?,
        }
        Ok(())
    }
}

/// A single SMTP session with a mail server.
///
/// Every command method returns the server's reply as-is; checking the code is
/// left to the caller, except for [`SmtpClient::authenticate`] which has to
/// interpret intermediate replies itself.
pub struct SmtpClient {
    connection: ClientConnection,
    buffer: Vec<u8>,
    buffer_pos: usize,
}

impl SmtpClient {
    /// Open a plain TCP session to `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(ClientConnection::Plain(stream)))
    }

    /// Open a session to `addr` and complete a TLS handshake before any SMTP
    /// traffic is exchanged, verifying the certificate against `domain`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or handshake fails, or `domain` is
    /// not a valid server name.
    pub async fn connect_tls(addr: &str, domain: &str, connector: &TlsConnector) -> Result<Self> {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| ClientError::TlsError(format!("Invalid domain: {e}")))?;

        let stream = TcpStream::connect(addr).await?;
        let tls_stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        Ok(Self::new(ClientConnection::Tls(Box::new(tls_stream))))
    }

    fn new(connection: ClientConnection) -> Self {
        Self {
            connection,
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
        }
    }

    /// Reads the initial server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a command and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");
        self.write_line(command).await?;
        self.read_response().await
    }

    /// Like [`SmtpClient::command`] but keeps `command` out of the logs.
    async fn secret_command(&mut self, label: &str, command: &str) -> Result<Response> {
        outgoing!("{label} <redacted>");
        self.write_line(command).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// Authenticate with the best mechanism the server offers in `ehlo`.
    ///
    /// PLAIN is preferred, LOGIN is the fallback. Returns the final reply,
    /// which is 235 on success.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoAuthMechanism`] if neither is advertised, or
    /// [`ClientError::Rejected`] if the server refuses a continuation step.
    pub async fn authenticate(
        &mut self,
        ehlo: &Response,
        username: &str,
        password: &str,
    ) -> Result<Response> {
        if ehlo.supports_auth("PLAIN") {
            self.auth_plain(username, password).await
        } else if ehlo.supports_auth("LOGIN") {
            self.auth_login(username, password).await
        } else {
            Err(ClientError::NoAuthMechanism)
        }
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let token = STANDARD.encode(format!("\0{username}\0{password}"));
        self.secret_command("AUTH PLAIN", &format!("AUTH PLAIN {token}"))
            .await
    }

    /// # Errors
    ///
    /// Returns an error if a step fails or the server does not ask for the
    /// next credential with a 334 reply.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<Response> {
        let response = self.command("AUTH LOGIN").await?;
        expect_challenge(&response)?;

        let response = self
            .secret_command("AUTH LOGIN username", &STANDARD.encode(username))
            .await?;
        expect_challenge(&response)?;

        self.secret_command("AUTH LOGIN password", &STANDARD.encode(password))
            .await
    }

    /// `from` is the reverse-path including its angle brackets.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:{from}")).await
    }

    /// `to` is the forward-path including its angle brackets.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:{to}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Stream `payload` to the server until it reports end of stream, then
    /// send the end-of-data marker and read the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or reading fails.
    pub async fn send_payload(&mut self, payload: &mut Payload) -> Result<Response> {
        let mut chunk = vec![0u8; UPLOAD_CHUNK_SIZE];
        let mut encoded = Vec::with_capacity(UPLOAD_CHUNK_SIZE + UPLOAD_CHUNK_SIZE / 8);
        let mut encoder = DataEncoder::new();
        let mut sent = 0usize;

        loop {
            let n = payload.read_chunk(&mut chunk);
            if n == 0 {
                break;
            }

            encoded.clear();
            encoder.encode(&chunk[..n], &mut encoded);
            self.connection.send(&encoded).await?;
            sent += n;
        }

        encoded.clear();
        encoder.finish(&mut encoded);
        self.connection.send(&encoded).await?;
        self.connection.flush().await?;
        outgoing!("<{sent} bytes of message data>");

        self.read_response().await
    }

    /// Sends QUIT and closes the write side of the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        let response = self.command("QUIT").await?;
        // The server may already have closed its side after 221.
        let _ = self.connection.shutdown().await;
        Ok(response)
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        self.connection.send(&data).await?;
        self.connection.flush().await
    }

    /// Reads a complete SMTP response from the server.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let n = self
                .connection
                .read(&mut self.buffer[self.buffer_pos..])
                .await?;
            self.buffer_pos += n;
        }
    }
}

fn expect_challenge(response: &Response) -> Result<()> {
    if response.code == 334 {
        Ok(())
    } else {
        Err(ClientError::Rejected {
            command: "AUTH LOGIN",
            code: response.code,
            message: response.message(),
        })
    }
}
