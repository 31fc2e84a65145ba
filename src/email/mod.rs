//! Outgoing email.
//!
//! - [`ConsoleMailer`] logs a redacted summary of each message (development)
//! - [`SmtpMailer`] sends through an SMTP relay using lettre
//!
//! Message bodies come from [`templates`].

mod console;
mod smtp;
pub mod templates;

pub use console::ConsoleMailer;
pub use smtp::{SmtpConfig, SmtpMailer};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{CorpdeskError, Result};
use crate::utils::get_env_with_prefix;

/// An email message to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    pub reply_to: Option<String>,
}

impl Email {
    pub fn new(from: impl Into<String>, to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: vec![to.into()],
            subject: subject.into(),
            text: None,
            html: None,
            reply_to: None,
        }
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Validate the email has required fields
    pub fn validate(&self) -> Result<()> {
        if self.from.is_empty() {
            return Err(CorpdeskError::bad_request("Email 'from' is required"));
        }
        if self.to.is_empty() || self.to.iter().any(|to| to.is_empty()) {
            return Err(CorpdeskError::bad_request("Email 'to' is required"));
        }
        if self.subject.is_empty() {
            return Err(CorpdeskError::bad_request("Email 'subject' is required"));
        }
        if self.text.is_none() && self.html.is_none() {
            return Err(CorpdeskError::bad_request(
                "Email must have either 'text' or 'html' body",
            ));
        }
        Ok(())
    }
}

/// Email delivery backend.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;

    /// Short backend name for status reporting.
    fn backend(&self) -> &'static str;

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Sender address and optional SMTP relay.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub from: String,
    /// Console delivery when absent.
    pub smtp: Option<SmtpConfig>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from: "Corpdesk <noreply@corpdesk.local>".to_string(),
            smtp: None,
        }
    }
}

impl EmailConfig {
    /// Reads `EMAIL_FROM` and the `SMTP_*` settings.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(from) = get_env_with_prefix("EMAIL_FROM") {
            config.from = from;
        }
        config.smtp = SmtpConfig::from_env();
        config
    }

    /// The configured mailer: SMTP when a host is set, console otherwise.
    pub fn build_mailer(&self) -> Result<Arc<dyn Mailer>> {
        match &self.smtp {
            Some(smtp) => Ok(Arc::new(SmtpMailer::new(smtp.clone())?)),
            None => {
                tracing::warn!("SMTP_HOST not set, emails will only be logged");
                Ok(Arc::new(ConsoleMailer::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        let email = Email::new("from@example.com", "to@example.com", "Hello");
        assert!(email.validate().is_err());

        let email = email.text("Body");
        assert!(email.validate().is_ok());

        let email = Email::new("from@example.com", "", "Hello").text("Body");
        assert!(email.validate().is_err());
    }

    #[test]
    fn test_console_mailer_without_smtp() {
        let mailer = EmailConfig::default().build_mailer().unwrap();
        assert_eq!(mailer.backend(), "console");
    }
}
