//! Email delivery service
//!
//! Sends magic-link emails over SMTP with STARTTLS.

use anyhow::{Context, Result};
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::EmailConfig;

/// SMTP-backed sender for magic-link emails
#[derive(Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    app_name: String,
}

impl EmailService {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .context("Failed to configure SMTP relay")?
            .port(config.smtp_port);

        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }

        let from = config
            .effective_from()
            .parse::<Mailbox>()
            .context("Invalid sender address")?;

        Ok(Self {
            transport: builder.build(),
            from,
            app_name: config.app_name.clone(),
        })
    }

    /// Send a sign-in link to the given recipient
    pub async fn send_magic_link(&self, recipient: &str, link: &str, ttl_hours: u64) -> Result<()> {
        let to = recipient
            .parse::<Mailbox>()
            .context("Invalid recipient address")?;

        let text_body = format!(
            "Click the link below to sign in to {}:\n\n{}\n\n\
             This link expires in {} hours and can only be used once.\n\
             If you did not request it, you can ignore this email.\n",
            self.app_name, link, ttl_hours
        );
        let html_body = format!(
            "<p>Click the link below to sign in to {app}:</p>\
             <p><a href=\"{link}\">Sign in to {app}</a></p>\
             <p>This link expires in {ttl} hours and can only be used once.<br>\
             If you did not request it, you can ignore this email.</p>",
            app = self.app_name,
            link = link,
            ttl = ttl_hours
        );

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!("Sign in to {}", self.app_name))
            .multipart(MultiPart::alternative_plain_html(text_body, html_body))
            .context("Failed to build email")?;

        self.transport
            .send(message)
            .await
            .context("Failed to send email")?;

        info!(recipient = %recipient, "Magic link email sent");
        Ok(())
    }

    /// Probe the SMTP relay without sending anything
    pub async fn check_connection(&self) -> Result<bool> {
        self.transport
            .test_connection()
            .await
            .context("SMTP connection test failed")
    }
}
