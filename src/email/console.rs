//! Console mailer for development
//!
//! Logs each message instead of sending it. Bodies are redacted by default
//! because they carry verification and portal tokens.

use async_trait::async_trait;

use super::{Email, Mailer};
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct ConsoleMailer {
    show_full_content: bool,
}

impl ConsoleMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log full bodies, links included. Local development only.
    pub fn with_full_output(mut self, enabled: bool) -> Self {
        if enabled {
            tracing::warn!(
                "ConsoleMailer: full output enabled - email content will be visible in logs"
            );
        }
        self.show_full_content = enabled;
        self
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        email.validate()?;

        if self.show_full_content {
            tracing::info!(
                from = %email.from,
                to = ?email.to,
                subject = %email.subject,
                text = email.text.as_deref().unwrap_or(""),
                "Email (console)"
            );
        } else {
            tracing::info!(
                from = %email.from,
                recipients = email.to.len(),
                subject = %email.subject,
                text_bytes = email.text.as_ref().map(String::len).unwrap_or(0),
                html_bytes = email.html.as_ref().map(String::len).unwrap_or(0),
                "Email (console, body redacted)"
            );
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "console"
    }
}
