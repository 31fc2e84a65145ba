//! SMTP mailer using lettre

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use secrecy::{ExposeSecret, SecretString};

use super::{Email, Mailer};
use crate::error::{CorpdeskError, Result};
use crate::utils::{flag_env_with_prefix, get_env_with_prefix, parse_env_with_prefix};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    /// Default 587 (STARTTLS)
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub starttls: bool,
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 587,
            username: None,
            password: None,
            starttls: true,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Reads `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`
    /// and `SMTP_STARTTLS`. `None` without a host.
    pub fn from_env() -> Option<Self> {
        let host = get_env_with_prefix("SMTP_HOST")?;
        let mut config = Self::new(host);
        if let Some(port) = parse_env_with_prefix("SMTP_PORT") {
            config.port = port;
        }
        config.username = get_env_with_prefix("SMTP_USERNAME");
        config.password = get_env_with_prefix("SMTP_PASSWORD").map(SecretString::from);
        if let Some(starttls) = flag_env_with_prefix("SMTP_STARTTLS") {
            config.starttls = starttls;
        }
        Some(config)
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        };
        let mut builder = builder
            .map_err(|e| CorpdeskError::internal(format!("Failed to create SMTP transport: {}", e)))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            config,
        })
    }

    fn build_message(&self, email: &Email) -> Result<Message> {
        let parse = |address: &str, field: &str| -> Result<Mailbox> {
            address.parse().map_err(|e| {
                CorpdeskError::bad_request(format!("Invalid '{}' address '{}': {}", field, address, e))
            })
        };

        let mut builder = Message::builder()
            .from(parse(&email.from, "from")?)
            .subject(&email.subject);
        for to in &email.to {
            builder = builder.to(parse(to, "to")?);
        }
        if let Some(reply_to) = &email.reply_to {
            builder = builder.reply_to(parse(reply_to, "reply_to")?);
        }

        let built = match (&email.text, &email.html) {
            (Some(text), Some(html)) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.clone()),
                    ),
            ),
            (Some(text), None) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
            (None, Some(html)) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
            (None, None) => {
                return Err(CorpdeskError::bad_request(
                    "Email must have either text or HTML body",
                ));
            }
        };

        built.map_err(|e| CorpdeskError::internal(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        email.validate()?;
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| CorpdeskError::service_unavailable(format!("Failed to send email: {}", e)))?;

        tracing::debug!(subject = %email.subject, recipients = email.to.len(), "Email sent");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "smtp"
    }
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_multipart_message() {
        let mailer = SmtpMailer::new(SmtpConfig::new("localhost")).unwrap();
        let email = Email::new("Corpdesk <noreply@corpdesk.local>", "user@example.com", "Hi")
            .text("plain")
            .html("<p>html</p>");
        assert!(mailer.build_message(&email).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_address_is_bad_request() {
        let mailer = SmtpMailer::new(SmtpConfig::new("localhost")).unwrap();
        let email = Email::new("noreply@corpdesk.local", "not an address", "Hi").text("plain");
        let err = mailer.build_message(&email).unwrap_err();
        assert!(matches!(err, CorpdeskError::BadRequest(_)));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = SmtpConfig::new("smtp.example.com").credentials("user", "hunter22");
        assert!(!format!("{:?}", config).contains("hunter22"));
    }
}
