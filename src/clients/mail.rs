use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, info};

use crate::models::mail::MailRequest;

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: &MailRequest) -> Result<(), Error>;

    async fn health_check(&self) -> Result<(), Error>;
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, Error> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.port)
            .credentials(credentials)
            .build();

        info!(host = %config.host, port = config.port, "SMTP mailer initialized");

        Ok(Self { transport })
    }

    async fn build_message(mail: &MailRequest) -> Result<Message, Error> {
        let from: Mailbox = mail
            .from
            .parse()
            .map_err(|e| anyhow!("Invalid from address '{}': {}", mail.from, e))?;
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| anyhow!("Invalid to address '{}': {}", mail.to, e))?;

        let builder = Message::builder().from(from).to(to).subject(&mail.subject);

        let message = match &mail.attachment {
            Some(path) => {
                let content = tokio::fs::read(path)
                    .await
                    .map_err(|e| anyhow!("Failed to read attachment {}: {}", path.display(), e))?;

                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "attachment.pdf".to_string());

                let content_type = ContentType::parse("application/pdf")
                    .map_err(|e| anyhow!("Invalid attachment content type: {}", e))?;

                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::html(mail.body.clone()))
                        .singlepart(Attachment::new(filename).body(content, content_type)),
                )
            }
            None => builder
                .header(ContentType::TEXT_HTML)
                .body(mail.body.clone()),
        };

        message.map_err(|e| anyhow!("Failed to build message: {}", e))
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, mail: &MailRequest) -> Result<(), Error> {
        let message = Self::build_message(mail).await?;

        debug!(to = %mail.to, subject = %mail.subject, "Sending mail over SMTP");

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("SMTP delivery failed: {}", e))?;

        info!(to = %mail.to, subject = %mail.subject, "Mail delivered");

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        let reachable = self
            .transport
            .test_connection()
            .await
            .map_err(|e| anyhow!("SMTP health check failed: {}", e))?;

        if !reachable {
            return Err(anyhow!("SMTP server did not accept the connection"));
        }

        Ok(())
    }
}
