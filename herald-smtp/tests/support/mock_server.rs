//! Scriptable SMTP server for exercising the submission dialogue.
//!
//! Accepts connections on an ephemeral port, answers each command with a
//! configurable reply, and records what it received so tests can assert on
//! the exact dialogue and the message bodies. With
//! [`MockSmtpServerBuilder::with_tls`] every connection starts with a TLS
//! handshake, as an implicit-TLS submission server would.
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_auth_mechanisms(&["LOGIN"])
//!     .with_rcpt_to_response(550, "User unknown")
//!     .build()
//!     .await?;
//!
//! // point a client at server.addr()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```
#![allow(dead_code)] // Not every test uses every knob

use std::{
    net::SocketAddr,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
    sync::RwLock,
    time::timeout,
};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer},
    },
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A throwaway CA plus a `localhost` server certificate it signed.
///
/// The CA is written to a PEM file so it can be used as a client's CA bundle.
pub struct TestCertificates {
    ca_bundle: tempfile::NamedTempFile,
    acceptor: TlsAcceptor,
}

impl TestCertificates {
    /// Name the server certificate is issued for.
    pub const SERVER_NAME: &'static str = "localhost";

    /// # Errors
    ///
    /// Returns an error if key generation, signing or writing the bundle fails.
    pub fn generate() -> Result<Self, BoxError> {
        let ca_key = KeyPair::generate()?;
        let mut ca_params = CertificateParams::new(Vec::<String>::new())?;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "herald test CA");
        let ca = ca_params.self_signed(&ca_key)?;

        let server_key = KeyPair::generate()?;
        let server = CertificateParams::new(vec![Self::SERVER_NAME.to_string()])?
            .signed_by(&server_key, &ca, &ca_key)?;

        let mut ca_bundle = tempfile::NamedTempFile::new()?;
        std::io::Write::write_all(&mut ca_bundle, ca.pem().as_bytes())?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(
                vec![server.der().clone()],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(server_key.serialize_der())),
            )?;

        Ok(Self {
            ca_bundle,
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }

    /// PEM file holding the CA certificate.
    #[must_use]
    pub fn ca_bundle(&self) -> &Path {
        self.ca_bundle.path()
    }

    #[must_use]
    pub fn acceptor(&self) -> TlsAcceptor {
        self.acceptor.clone()
    }
}

/// Something the server received, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    /// `AUTH` with everything after the keyword, e.g. `PLAIN AGpvZQ...`
    Auth(String),
    /// A bare base64 line sent in answer to a 334 challenge
    AuthResponse(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message text with transparency dots removed and the final `.` line
    /// dropped
    MessageContent(Vec<u8>),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    capabilities: Vec<String>,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,

    response_delay: Option<Duration>,
    drop_after_commands: Option<usize>,
    tls: Option<TlsAcceptor>,
}

impl MockServerConfig {
    fn ehlo_bytes(&self) -> Vec<u8> {
        let mut lines = vec!["mock.example.com".to_string()];
        lines.extend(self.capabilities.iter().cloned());

        let last = lines.len() - 1;
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let sep = if i == last { ' ' } else { '-' };
                format!("250{sep}{line}\r\n")
            })
            .collect::<String>()
            .into_bytes()
    }
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "mock.example.com ESMTP"),
            capabilities: vec!["SIZE 10000000".to_string(), "AUTH PLAIN LOGIN".to_string()],
            auth_response: SmtpResponse::new(235, "Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "End data with <CR><LF>.<CR><LF>"),
            data_end_response: SmtpResponse::new(250, "OK: queued"),
            quit_response: SmtpResponse::new(221, "Bye"),
            response_delay: None,
            drop_after_commands: None,
            tls: None,
        }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Bodies of every completed DATA phase so far.
    pub async fn messages(&self) -> Vec<Vec<u8>> {
        self.commands_received
            .read()
            .await
            .iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    /// Poll until `count` messages have been received or `limit` elapses.
    pub async fn wait_for_messages(&self, count: usize, limit: Duration) -> Vec<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let messages = self.messages().await;
            if messages.len() >= count || tokio::time::Instant::now() >= deadline {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn respond(
        writer: &mut (impl AsyncWriteExt + Unpin),
        config: &MockServerConfig,
        bytes: &[u8],
    ) -> std::io::Result<()> {
        if let Some(delay) = config.response_delay {
            tokio::time::sleep(delay).await;
        }
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    async fn handle_client<S>(
        stream: S,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), BoxError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut handled = 0;

        Self::respond(&mut writer, &config, &config.greeting.to_bytes()).await?;

        loop {
            if config
                .drop_after_commands
                .is_some_and(|limit| handled >= limit)
            {
                return Ok(());
            }

            line.clear();
            let Ok(read) = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(());
            };
            if read? == 0 {
                return Ok(());
            }
            handled += 1;

            let cmd_line = line.trim_end();
            let (verb, rest) = cmd_line.split_once(' ').unwrap_or((cmd_line, ""));

            match verb.to_ascii_uppercase().as_str() {
                "EHLO" => {
                    commands.write().await.push(SmtpCommand::Ehlo(rest.to_string()));
                    Self::respond(&mut writer, &config, &config.ehlo_bytes()).await?;
                }
                "AUTH" => {
                    commands.write().await.push(SmtpCommand::Auth(rest.to_string()));
                    if rest.eq_ignore_ascii_case("LOGIN") {
                        for challenge in ["334 VXNlcm5hbWU6\r\n", "334 UGFzc3dvcmQ6\r\n"] {
                            Self::respond(&mut writer, &config, challenge.as_bytes()).await?;
                            line.clear();
                            if reader.read_line(&mut line).await? == 0 {
                                return Ok(());
                            }
                            commands
                                .write()
                                .await
                                .push(SmtpCommand::AuthResponse(line.trim_end().to_string()));
                        }
                    }
                    Self::respond(&mut writer, &config, &config.auth_response.to_bytes()).await?;
                }
                "MAIL" => {
                    let from = rest.strip_prefix("FROM:").unwrap_or(rest).to_string();
                    commands.write().await.push(SmtpCommand::MailFrom(from));
                    Self::respond(&mut writer, &config, &config.mail_from_response.to_bytes())
                        .await?;
                }
                "RCPT" => {
                    let to = rest.strip_prefix("TO:").unwrap_or(rest).to_string();
                    commands.write().await.push(SmtpCommand::RcptTo(to));
                    Self::respond(&mut writer, &config, &config.rcpt_to_response.to_bytes())
                        .await?;
                }
                "DATA" => {
                    commands.write().await.push(SmtpCommand::Data);
                    Self::respond(&mut writer, &config, &config.data_response.to_bytes()).await?;
                    if config.data_response.code != 354 {
                        continue;
                    }

                    let content = Self::read_message(&mut reader).await?;
                    commands
                        .write()
                        .await
                        .push(SmtpCommand::MessageContent(content));
                    Self::respond(&mut writer, &config, &config.data_end_response.to_bytes())
                        .await?;
                }
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    Self::respond(&mut writer, &config, &config.quit_response.to_bytes()).await?;
                    return Ok(());
                }
                _ => {
                    commands
                        .write()
                        .await
                        .push(SmtpCommand::Other(cmd_line.to_string()));
                    Self::respond(&mut writer, &config, b"500 Unknown command\r\n").await?;
                }
            }
        }
    }

    /// Read DATA lines up to the lone `.`, undoing dot transparency.
    async fn read_message(
        reader: &mut (impl AsyncBufReadExt + Unpin),
    ) -> std::io::Result<Vec<u8>> {
        let mut content = Vec::new();
        let mut data_line = Vec::new();

        loop {
            data_line.clear();
            if reader.read_until(b'\n', &mut data_line).await? == 0 {
                return Ok(content);
            }
            if data_line == b".\r\n" {
                return Ok(content);
            }

            let unstuffed = if data_line.starts_with(b"..") {
                &data_line[1..]
            } else {
                &data_line[..]
            };
            content.extend_from_slice(unstuffed);
        }
    }
}

pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// Replace the EHLO extension lines, keeping the greeting line.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.config.capabilities = capabilities.iter().map(ToString::to_string).collect();
        self
    }

    /// Advertise exactly these AUTH mechanisms; an empty list hides AUTH.
    #[must_use]
    pub fn with_auth_mechanisms(mut self, mechanisms: &[&str]) -> Self {
        self.config
            .capabilities
            .retain(|capability| !capability.starts_with("AUTH"));
        if !mechanisms.is_empty() {
            self.config
                .capabilities
                .push(format!("AUTH {}", mechanisms.join(" ")));
        }
        self
    }

    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    /// Reply sent after the terminating `.` line
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Close the connection once N commands have been handled
    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Perform a TLS handshake with `acceptor` before the greeting.
    #[must_use]
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.config.tls = Some(acceptor);
        self
    }

    /// Bind to an ephemeral localhost port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(AtomicUsize::new(0));

        let server_commands = Arc::clone(&commands);
        let server_shutdown = Arc::clone(&shutdown);
        let server_connections = Arc::clone(&connections);

        tokio::spawn(async move {
            while !server_shutdown.load(Ordering::Relaxed) {
                // Bounded accept so the shutdown flag is rechecked
                let Ok(Ok((stream, _peer))) =
                    timeout(Duration::from_millis(100), listener.accept()).await
                else {
                    continue;
                };

                server_connections.fetch_add(1, Ordering::Relaxed);
                let config = Arc::clone(&config);
                let commands = Arc::clone(&server_commands);
                tokio::spawn(async move {
                    let _ = match config.tls.clone() {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => {
                                MockSmtpServer::handle_client(stream, config, commands).await
                            }
                            Err(e) => Err(e.into()),
                        },
                        None => MockSmtpServer::handle_client(stream, config, commands).await,
                    };
                });
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
            connections,
        })
    }
}
