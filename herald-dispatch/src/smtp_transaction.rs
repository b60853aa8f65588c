//! One complete SMTP submission for a [`Transfer`].
//!
//! Connect (implicit TLS unless disabled), greeting, EHLO, AUTH when a
//! username is configured and the server offers PLAIN or LOGIN, MAIL FROM,
//! RCPT TO for each recipient, DATA streamed from the transfer's payload, and
//! QUIT. Every phase is bounded by its [`ClientTimeouts`] entry.

use std::{future::Future, time::Duration};

use herald_common::ClientTimeouts;
use herald_smtp::{ClientError, Payload, Response, SmtpClient, client::connector};

use crate::{
    error::TransferError,
    transport::{RecipientList, Transfer, TransferOptions},
};

/// Await `operation`, turning an elapsed `limit` into [`ClientError::Timeout`].
async fn bounded<T>(
    phase: &'static str,
    limit: Duration,
    operation: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| ClientError::Timeout {
            phase,
            after: limit,
        })?
}

/// Accept `response` only if its code satisfies `accepted`.
fn expect(
    command: &'static str,
    response: Response,
    accepted: impl Fn(u16) -> bool,
) -> Result<Response, ClientError> {
    if accepted(response.code) {
        Ok(response)
    } else {
        Err(ClientError::Rejected {
            command,
            code: response.code,
            message: response.message(),
        })
    }
}

const fn positive(code: u16) -> bool {
    code >= 200 && code < 300
}

pub struct SmtpTransaction<'a> {
    options: &'a TransferOptions,
    mail_from: &'a str,
    recipients: &'a RecipientList,
    payload: &'a mut Payload,
}

impl<'a> SmtpTransaction<'a> {
    /// Borrow everything a submission needs from `transfer`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Incomplete`] if the transfer was never given a
    /// sender, recipients or payload, or was not marked for upload.
    pub fn new(transfer: &'a mut Transfer) -> Result<Self, TransferError> {
        if let Some(missing) = transfer.missing() {
            return Err(TransferError::Incomplete(missing));
        }

        let Transfer {
            options,
            mail_from: Some(mail_from),
            recipients: Some(recipients),
            payload: Some(payload),
            ..
        } = transfer
        else {
            return Err(TransferError::Incomplete("envelope"));
        };

        Ok(Self {
            options,
            mail_from,
            recipients,
            payload,
        })
    }

    const fn timeouts(&self) -> &ClientTimeouts {
        &self.options.timeouts
    }

    #[tracing::instrument(level = "debug", skip_all, fields(server = %self.options.url, port = self.options.port))]
    pub async fn execute(mut self) -> Result<(), TransferError> {
        let mut client = self.connect().await?;

        let ehlo = self.greet(&mut client).await?;
        self.authenticate(&mut client, &ehlo).await?;
        self.envelope(&mut client).await?;
        self.data(&mut client).await?;

        // The message is already accepted; a failed QUIT does not change that.
        let quit = self.timeouts().quit();
        if let Err(e) = bounded("QUIT", quit, client.quit()).await {
            tracing::debug!(error = %e, "QUIT failed after successful delivery");
        }

        Ok(())
    }

    async fn connect(&self) -> Result<SmtpClient, ClientError> {
        let address = self.options.address();
        let limit = self.timeouts().connect();

        if self.options.tls.is_secure() {
            let connector = connector(&self.options.ca_cert_store)?;
            bounded(
                "connect",
                limit,
                SmtpClient::connect_tls(&address, &self.options.host, &connector),
            )
            .await
        } else {
            bounded("connect", limit, SmtpClient::connect(&address)).await
        }
    }

    async fn greet(&self, client: &mut SmtpClient) -> Result<Response, ClientError> {
        let limit = self.timeouts().ehlo();

        let greeting = bounded("greeting", limit, client.read_greeting()).await?;
        expect("greeting", greeting, |code| code == 220)?;

        let ehlo = bounded("EHLO", limit, client.ehlo(&self.options.helo_domain)).await?;
        expect("EHLO", ehlo, positive)
    }

    async fn authenticate(
        &self,
        client: &mut SmtpClient,
        ehlo: &Response,
    ) -> Result<(), ClientError> {
        if self.options.username.is_empty() {
            return Ok(());
        }
        if !ehlo.supports_auth("PLAIN") && !ehlo.supports_auth("LOGIN") {
            tracing::debug!("Server offers neither AUTH PLAIN nor LOGIN, continuing without AUTH");
            return Ok(());
        }

        let response = bounded(
            "AUTH",
            self.timeouts().auth(),
            client.authenticate(ehlo, &self.options.username, &self.options.password),
        )
        .await?;
        expect("AUTH", response, |code| code == 235)?;

        Ok(())
    }

    async fn envelope(&self, client: &mut SmtpClient) -> Result<(), ClientError> {
        let response = bounded(
            "MAIL FROM",
            self.timeouts().mail_from(),
            client.mail_from(self.mail_from),
        )
        .await?;
        expect("MAIL FROM", response, positive)?;

        for recipient in self.recipients.iter() {
            let response = bounded(
                "RCPT TO",
                self.timeouts().rcpt_to(),
                client.rcpt_to(recipient),
            )
            .await?;
            expect("RCPT TO", response, positive)?;
        }

        Ok(())
    }

    async fn data(&mut self, client: &mut SmtpClient) -> Result<(), ClientError> {
        let limit = self.timeouts().data();

        let response = bounded("DATA", limit, client.data()).await?;
        expect("DATA", response, |code| code == 354)?;

        let response = bounded("message data", limit, client.send_payload(&mut *self.payload)).await?;
        expect("message data", response, positive)?;

        Ok(())
    }
}

/// Run the submission for `transfer` to completion.
pub async fn deliver(transfer: &mut Transfer) -> Result<(), TransferError> {
    SmtpTransaction::new(transfer)?.execute().await
}
