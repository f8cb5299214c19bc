use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use super::{MailError, Mailer, OutgoingEmail};
use crate::config::SmtpConfig;
use crate::sanitize::redact_email;

/// Sender name used when the configured address has none.
const DEFAULT_SENDER_NAME: &str = "Real Estate System";

/// STARTTLS SMTP delivery.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, MailError> {
        let mut from: Mailbox = config.from.parse()?;
        if from.name.is_none() {
            from.name = Some(DEFAULT_SENDER_NAME.to_string());
        }

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);

        let password = config
            .resolve_password()
            .map_err(|e| MailError::Config(e.to_string()))?;
        if let (Some(user), Some(pass)) = (&config.username, password) {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                pass.expose_secret().to_string(),
            ));
        }

        log::info!("SMTP notifications enabled via {}:{}", config.host, config.port);
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse()?)
            .subject(email.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport.send(message).await?;
        log::debug!("Email sent to {}", redact_email(&email.to));
        Ok(())
    }
}
