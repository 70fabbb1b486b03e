//! SMTP dispatch.
//!
//! The [`Mailer`] trait keeps the interpreter testable without a mail
//! server; [`SmtpMailer`] is the production implementation over a pooled
//! async lettre transport.

use crate::composer::ComposedEmail;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::PoolConfig;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

/// SMTP connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// SMTP server hostname.
    pub host: String,
    /// SMTP server port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
    /// Address to send from.
    pub from_email: String,
    /// Display name to send from.
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

/// Errors from sending mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailerError {
    /// An address could not be parsed into a mailbox.
    InvalidAddress { address: String, reason: String },
    /// The message could not be built.
    BuildFailed { reason: String },
    /// The SMTP transport failed.
    TransportFailed { reason: String },
}

impl fmt::Display for MailerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress { address, reason } => {
                write!(f, "invalid address '{address}': {reason}")
            }
            Self::BuildFailed { reason } => write!(f, "failed to build message: {reason}"),
            Self::TransportFailed { reason } => write!(f, "smtp transport failed: {reason}"),
        }
    }
}

impl std::error::Error for MailerError {}

/// Trait for sending composed emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends a composed email.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be built or the transport
    /// rejects it.
    async fn send(&self, email: &ComposedEmail) -> Result<(), MailerError>;
}

/// Production mailer over a pooled async SMTP transport.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpMailer {
    /// Creates a mailer from SMTP settings.
    #[must_use]
    pub fn new(config: &SmtpConfig) -> Self {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .credentials(credentials)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Self {
            transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        }
    }

    fn build_message(&self, email: &ComposedEmail) -> Result<Message, MailerError> {
        let from: Mailbox = format!("{} <{}>", self.from_name, self.from_email)
            .parse()
            .map_err(|e: lettre::address::AddressError| MailerError::InvalidAddress {
                address: self.from_email.clone(),
                reason: e.to_string(),
            })?;

        let mut builder = Message::builder().from(from).subject(email.subject.clone());
        for address in &email.to {
            let mailbox: Mailbox =
                address
                    .parse()
                    .map_err(|e: lettre::address::AddressError| MailerError::InvalidAddress {
                        address: address.clone(),
                        reason: e.to_string(),
                    })?;
            builder = builder.to(mailbox);
        }

        let message = if let Some(text) = &email.text_body {
            builder
                .multipart(
                    MultiPart::alternative()
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_PLAIN)
                                .body(text.clone()),
                        )
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_HTML)
                                .body(email.html_body.clone()),
                        ),
                )
                .map_err(|e| MailerError::BuildFailed {
                    reason: e.to_string(),
                })?
        } else {
            builder
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(email.html_body.clone()),
                )
                .map_err(|e| MailerError::BuildFailed {
                    reason: e.to_string(),
                })?
        };

        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &ComposedEmail) -> Result<(), MailerError> {
        let message = self.build_message(email)?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!(recipients = email.to.len(), "email sent");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to send email");
                Err(MailerError::TransportFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// A mailer that records sent messages instead of dispatching them.
///
/// Used in tests and dry-run environments.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<ComposedEmail>>>,
    /// If set, every send fails with this error.
    pub fail_with: Option<MailerError>,
}

impl RecordingMailer {
    /// Creates a recording mailer that accepts every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recording mailer that fails every send.
    #[must_use]
    pub fn failing(error: MailerError) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_with: Some(error),
        }
    }

    /// Returns the messages recorded so far.
    #[must_use]
    pub fn sent(&self) -> Vec<ComposedEmail> {
        self.sent.lock().expect("sent mail lock poisoned").clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &ComposedEmail) -> Result<(), MailerError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        self.sent
            .lock()
            .expect("sent mail lock poisoned")
            .push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_email() -> ComposedEmail {
        ComposedEmail {
            to: vec!["dana@example.com".to_string()],
            subject: "Ticket #7".to_string(),
            html_body: "<p>Hello</p>".to_string(),
            text_body: None,
        }
    }

    #[tokio::test]
    async fn recording_mailer_records_sends() {
        let mailer = RecordingMailer::new();
        mailer.send(&sample_email()).await.expect("send");

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Ticket #7");
    }

    #[tokio::test]
    async fn recording_mailer_can_fail() {
        let mailer = RecordingMailer::failing(MailerError::TransportFailed {
            reason: "connection refused".to_string(),
        });

        let result = mailer.send(&sample_email()).await;
        assert!(matches!(result, Err(MailerError::TransportFailed { .. })));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn smtp_mailer_builds_html_message() {
        let config = SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: "user".to_string(),
            password: "pass".to_string(),
            from_email: "relay@example.com".to_string(),
            from_name: "Amber Relay".to_string(),
        };
        let mailer = SmtpMailer::new(&config);

        let message = mailer.build_message(&sample_email()).expect("build");
        let encoded = String::from_utf8(message.formatted()).expect("utf8");
        assert!(encoded.contains("Subject: Ticket #7"));
        assert!(encoded.contains("dana@example.com"));
    }

    #[tokio::test]
    async fn smtp_mailer_rejects_bad_recipient() {
        let config = SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            username: "user".to_string(),
            password: "pass".to_string(),
            from_email: "relay@example.com".to_string(),
            from_name: "Amber Relay".to_string(),
        };
        let mailer = SmtpMailer::new(&config);

        let mut email = sample_email();
        email.to = vec!["not an address".to_string()];
        let result = mailer.build_message(&email);
        assert!(matches!(result, Err(MailerError::InvalidAddress { .. })));
    }
}
