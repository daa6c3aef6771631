use std::sync::Mutex;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use minijinja::{Environment, context};
use thiserror::Error;

use crate::config::SmtpConfig;
use crate::models::user::User;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("failed to render email: {0}")]
    Template(#[from] minijinja::Error),
    #[error("{0}")]
    Other(String),
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let mut builder = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        }
        .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(config.username.clone(), config.password.clone()));
        }
        Ok(Self { transport: builder.build() })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(email.from.parse::<Mailbox>()?)
            .to(email.to.parse::<Mailbox>()?)
            .subject(email.subject)
            .multipart(MultiPart::alternative_plain_html(email.text, email.html))?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Logs messages instead of delivering them; used when no SMTP host is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "email (not delivered):\n{}", email.text);
        Ok(())
    }
}

/// Keeps messages in memory. Can be told to fail so delivery errors can be exercised.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, address: &str) -> Option<OutgoingEmail> {
        self.sent().into_iter().rev().find(|e| e.to == address)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Other("mailer configured to fail".into()));
        }
        self.sent
            .lock()
            .map_err(|_| MailError::Other("mailbox lock poisoned".into()))?
            .push(email);
        Ok(())
    }
}

pub const WELCOME_SUBJECT: &str = "Welcome to the Natours Family!";
pub const RESET_SUBJECT: &str = "Your password reset token (valid for only 10 minutes)";

/// A message to one user, rendered from the `emails/` templates.
pub struct Email {
    to: String,
    first_name: String,
    url: String,
    from: String,
}

impl Email {
    pub fn new(user: &User, url: impl Into<String>, from_address: &str) -> Self {
        Self {
            to: user.email.clone(),
            first_name: user.first_name().to_string(),
            url: url.into(),
            from: format!("Natours <{}>", from_address),
        }
    }

    fn render(&self, env: &Environment<'_>, template: &str, subject: &str) -> Result<OutgoingEmail, MailError> {
        let ctx = context! {
            first_name => &self.first_name,
            url => &self.url,
            subject => subject,
        };
        let html = env.get_template(&format!("emails/{}.html", template))?.render(&ctx)?;
        let text = env.get_template(&format!("emails/{}.txt", template))?.render(&ctx)?;
        Ok(OutgoingEmail {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: subject.to_string(),
            html,
            text,
        })
    }

    async fn send(&self, env: &Environment<'_>, mailer: &dyn Mailer, template: &str, subject: &str) -> Result<(), MailError> {
        let email = self.render(env, template, subject)?;
        mailer.send(email).await
    }

    pub async fn send_welcome(&self, env: &Environment<'_>, mailer: &dyn Mailer) -> Result<(), MailError> {
        self.send(env, mailer, "welcome", WELCOME_SUBJECT).await
    }

    pub async fn send_password_reset(&self, env: &Environment<'_>, mailer: &dyn Mailer) -> Result<(), MailError> {
        self.send(env, mailer, "password_reset", RESET_SUBJECT).await
    }
}
