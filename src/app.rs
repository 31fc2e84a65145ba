use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::{PasswordConfig, PasswordHasher, SessionIssuer};
use crate::billing::{
    BillingError, ConnectService, LiveStripeClient, StripeApi, SubscriptionService, WebhookHandler,
};
use crate::config::Config;
use crate::db::DatabaseClient;
use crate::email::{Mailer, templates::Template};
use crate::error::{CorpdeskError, Result};
use crate::invoice::{ChatClient, InvoiceGenerator, OpenAiChat};
use crate::pdf::{ChromePdfRenderer, PdfRenderer};
use crate::storage::FileStorage;

/// Shared state handed to every handler.
///
/// Holds the configuration and one instance of each service. Cloning is
/// cheap: everything inside is reference counted.
#[derive(Clone)]
pub struct AppContext {
    config: Arc<Config>,
    db: DatabaseClient,
    sessions: Arc<SessionIssuer>,
    passwords: PasswordHasher,
    stripe: Option<Arc<dyn StripeApi>>,
    subscriptions: SubscriptionService,
    connect: ConnectService,
    webhooks: Option<WebhookHandler>,
    mailer: Arc<dyn Mailer>,
    storage: FileStorage,
    pdf: Arc<dyn PdfRenderer>,
    invoices: InvoiceGenerator,
    started_at: Instant,
}

impl AppContext {
    pub fn builder(config: Config) -> AppContextBuilder {
        AppContextBuilder::new(config)
    }

    /// Wire up the live services described by `config`.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be reached or a backend is misconfigured.
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = DatabaseClient::from_config(&config.database).await?;

        let stripe = LiveStripeClient::from_config(&config.stripe)
            .map_err(|e| CorpdeskError::bad_request(e.to_string()))?
            .map(|client| Arc::new(client) as Arc<dyn StripeApi>);
        if stripe.is_none() {
            tracing::warn!("STRIPE_SECRET_KEY not set, billing runs in local-only mode");
        }

        let mailer = config.email.build_mailer()?;
        let storage = FileStorage::from_config(&config.storage)?;
        let chat = OpenAiChat::from_config(&config.inference)?
            .map(|chat| Arc::new(chat) as Arc<dyn ChatClient>);
        if chat.is_none() {
            tracing::info!("Inference API key not set, invoices use the built-in template");
        }

        let mut builder = AppContextBuilder::new(config)
            .with_database(db)
            .with_mailer(mailer)
            .with_storage(storage);
        if let Some(stripe) = stripe {
            builder = builder.with_stripe(stripe);
        }
        if let Some(chat) = chat {
            builder = builder.with_chat(chat);
        }
        Ok(builder.build())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Public web URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.config.server.base_url()
    }

    pub fn db(&self) -> &DatabaseClient {
        &self.db
    }

    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    pub fn passwords(&self) -> &PasswordHasher {
        &self.passwords
    }

    pub fn stripe(&self) -> Option<&Arc<dyn StripeApi>> {
        self.stripe.as_ref()
    }

    pub fn subscriptions(&self) -> &SubscriptionService {
        &self.subscriptions
    }

    pub fn connect(&self) -> &ConnectService {
        &self.connect
    }

    /// 503 when no webhook secret is configured.
    pub fn webhooks(&self) -> Result<&WebhookHandler> {
        self.webhooks
            .as_ref()
            .ok_or_else(|| BillingError::NotConfigured.into())
    }

    pub fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn pdf(&self) -> &Arc<dyn PdfRenderer> {
        &self.pdf
    }

    pub fn invoices(&self) -> &InvoiceGenerator {
        &self.invoices
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Send a templated email. Delivery failures are logged, never returned.
    pub async fn notify(&self, to: &str, template: Template) -> bool {
        let email = template.into_email(self.config.email.from.clone(), to);
        match self.mailer.send(&email).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, subject = %email.subject, "Email delivery failed");
                false
            }
        }
    }
}

/// Builder for [`AppContext`]. Unset services fall back to in-process
/// defaults: in-memory database and storage, console mail, no Stripe and
/// template-only invoices.
#[must_use = "builder does nothing until you call build()"]
pub struct AppContextBuilder {
    config: Config,
    db: Option<DatabaseClient>,
    stripe: Option<Arc<dyn StripeApi>>,
    mailer: Option<Arc<dyn Mailer>>,
    storage: Option<FileStorage>,
    pdf: Option<Arc<dyn PdfRenderer>>,
    chat: Option<Arc<dyn ChatClient>>,
    passwords: PasswordConfig,
}

impl AppContextBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            db: None,
            stripe: None,
            mailer: None,
            storage: None,
            pdf: None,
            chat: None,
            passwords: PasswordConfig::default(),
        }
    }

    pub fn with_database(mut self, db: DatabaseClient) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_stripe(mut self, stripe: Arc<dyn StripeApi>) -> Self {
        self.stripe = Some(stripe);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_storage(mut self, storage: FileStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_pdf_renderer(mut self, pdf: Arc<dyn PdfRenderer>) -> Self {
        self.pdf = Some(pdf);
        self
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatClient>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_password_config(mut self, passwords: PasswordConfig) -> Self {
        self.passwords = passwords;
        self
    }

    pub fn build(self) -> AppContext {
        let config = self.config;
        let db = self.db.unwrap_or_else(DatabaseClient::in_memory);
        let subscriptions = SubscriptionService::new(db.clone(), self.stripe.clone());
        let connect = ConnectService::new(
            db.clone(),
            self.stripe.clone(),
            config.stripe.clone(),
            config.server.base_url(),
        );
        let webhooks = config
            .stripe
            .webhook_secret
            .clone()
            .map(|secret| WebhookHandler::new(db.clone(), subscriptions.clone(), secret));

        AppContext {
            sessions: Arc::new(SessionIssuer::new(&config.auth)),
            passwords: PasswordHasher::new(self.passwords),
            stripe: self.stripe,
            mailer: self
                .mailer
                .unwrap_or_else(|| Arc::new(crate::email::ConsoleMailer::new())),
            storage: self.storage.unwrap_or_else(FileStorage::in_memory),
            pdf: self
                .pdf
                .unwrap_or_else(|| Arc::new(ChromePdfRenderer::new(config.pdf.clone()))),
            invoices: InvoiceGenerator::new(self.chat),
            config: Arc::new(config),
            db,
            subscriptions,
            connect,
            webhooks,
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;

    #[tokio::test]
    async fn test_builder_defaults() {
        let config = ConfigBuilder::new().with_dev_mode(true).build().unwrap();
        let ctx = AppContext::builder(config).build();

        assert!(ctx.stripe().is_none());
        assert!(!ctx.subscriptions().is_configured());
        assert_eq!(ctx.storage().backend(), "memory");
        assert_eq!(ctx.mailer().backend(), "console");
        assert!(!ctx.invoices().is_llm_enabled());
        assert!(matches!(
            ctx.webhooks().err(),
            Some(CorpdeskError::ServiceUnavailable(_))
        ));
        assert!(ctx.db().ping().await.is_ok());
    }
}
