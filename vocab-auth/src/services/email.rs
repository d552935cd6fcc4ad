use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use service_core::error::AppError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::MailConfig;

pub const SUBJECT_FOR_VERIFICATION: &str = "Verification code";
pub const SUBJECT_FOR_THANK: &str = "Thank you for registering";

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_verification(
        &self,
        to_email: &str,
        code: &str,
        message: &str,
    ) -> Result<(), AppError>;

    async fn send_thank_for_registering(
        &self,
        to_email: &str,
        username: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: Option<SmtpTransport>,
    from: Mailbox,
}

impl EmailService {
    pub fn new(config: &MailConfig) -> Result<Self, AppError> {
        let from = format!("{} <{}>", config.from_name, config.from)
            .parse::<Mailbox>()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid MAIL_FROM: {}", e)))?;

        if config.suppress_send {
            tracing::warn!("Mail sending is suppressed; messages will only be logged");
            return Ok(Self { mailer: None, from });
        }

        let mut builder = SmtpTransport::starttls_relay(&config.server)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e.to_string())))?
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)));

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        tracing::info!(server = %config.server, port = config.port, "Email service initialized");

        Ok(Self {
            mailer: Some(builder.build()),
            from,
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), AppError> {
        let Some(mailer) = self.mailer.clone() else {
            tracing::info!(to = %to_email, subject = %subject, "Mail suppressed");
            return Ok(());
        };

        let email = Message::builder()
            .from(self.from.clone())
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| AppError::EmailError(e.to_string()))?;

        // SMTP transport is blocking
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");
                Ok(())
            }
            Err(e) => Err(AppError::EmailError(e.to_string())),
        }
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_verification(
        &self,
        to_email: &str,
        code: &str,
        message: &str,
    ) -> Result<(), AppError> {
        let html_body = format!(
            r#"<html>
    <body style="font-family: Arial, sans-serif;">
        <p>{message}</p>
        <h2 style="letter-spacing: 4px;">{code}</h2>
    </body>
</html>"#
        );
        let plain_body = format!("{message}\n\n{code}");

        self.send_email(to_email, SUBJECT_FOR_VERIFICATION, plain_body, html_body)
            .await
    }

    async fn send_thank_for_registering(
        &self,
        to_email: &str,
        username: &str,
    ) -> Result<(), AppError> {
        let html_body = format!(
            r#"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Hi, {username}!</h2>
        <p>Thank you for registering. Happy learning!</p>
    </body>
</html>"#
        );
        let plain_body = format!("Hi, {username}!\n\nThank you for registering. Happy learning!");

        self.send_email(to_email, SUBJECT_FOR_THANK, plain_body, html_body)
            .await
    }
}

/// Fire-and-forget front for an [`EmailProvider`].
///
/// Each send runs on its own task; failures are logged and never reach the
/// request that triggered them.
#[derive(Clone)]
pub struct MailService {
    provider: Arc<dyn EmailProvider>,
}

impl MailService {
    pub fn new(provider: Arc<dyn EmailProvider>) -> Self {
        Self { provider }
    }

    pub fn send_verification(&self, to_email: String, code: String, message: &'static str) {
        let provider = self.provider.clone();
        tokio::spawn(async move {
            if let Err(e) = provider.send_verification(&to_email, &code, message).await {
                tracing::error!(error = %e, to = %to_email, "Failed to send verification mail");
            }
        });
        tracing::info!("Verification mail sending has been pushed to background");
    }

    pub fn send_thank_for_registering(&self, to_email: String, username: String) {
        let provider = self.provider.clone();
        tokio::spawn(async move {
            if let Err(e) = provider
                .send_thank_for_registering(&to_email, &username)
                .await
            {
                tracing::error!(error = %e, to = %to_email, "Failed to send thank mail");
            }
        });
        tracing::info!("Thank mail sending has been pushed to background");
    }
}

/// Mail recorded by [`MockEmailService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records messages instead of sending them.
#[derive(Default)]
pub struct MockEmailService {
    pub sent: Mutex<Vec<SentMail>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<SentMail> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Waits up to a second for background sends to land.
    pub async fn wait_for(&self, count: usize) -> Vec<SentMail> {
        for _ in 0..100 {
            let messages = self.messages();
            if messages.len() >= count {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.messages()
    }

    fn record(&self, mail: SentMail) -> Result<(), AppError> {
        self.sent
            .lock()
            .map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("Mock mailer mutex poisoned: {}", e))
            })?
            .push(mail);
        Ok(())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_verification(
        &self,
        to_email: &str,
        code: &str,
        message: &str,
    ) -> Result<(), AppError> {
        self.record(SentMail {
            to: to_email.to_string(),
            subject: SUBJECT_FOR_VERIFICATION.to_string(),
            body: format!("{message}\n\n{code}"),
        })
    }

    async fn send_thank_for_registering(
        &self,
        to_email: &str,
        username: &str,
    ) -> Result<(), AppError> {
        self.record(SentMail {
            to: to_email.to_string(),
            subject: SUBJECT_FOR_THANK.to_string(),
            body: format!("Hi, {username}! Thank you for registering."),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    #[test]
    fn test_suppressed_service_creation() {
        let service = EmailService::new(&test_config().mail).unwrap();
        assert!(service.mailer.is_none());
    }

    #[test]
    fn test_invalid_sender_rejected() {
        let mut config = test_config().mail;
        config.from = "not an address".to_string();
        assert!(EmailService::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_suppressed_send_is_ok() {
        let service = EmailService::new(&test_config().mail).unwrap();
        assert!(service
            .send_verification("a@b.io", "000001", "msg")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_background_dispatch_reaches_provider() {
        let mock = Arc::new(MockEmailService::new());
        let mail = MailService::new(mock.clone());

        mail.send_thank_for_registering("a@b.io".into(), "reader_one".into());
        let sent = mock.wait_for(1).await;

        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, SUBJECT_FOR_THANK);
        assert!(sent[0].body.contains("reader_one"));
    }
}
