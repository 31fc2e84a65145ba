use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::auth::AuthConfig;
use crate::billing::StripeConfig;
use crate::db::DatabaseConfig;
use crate::email::EmailConfig;
use crate::error::{CorpdeskError, Result};
use crate::invoice::InferenceConfig;
use crate::pdf::PdfConfig;
use crate::storage::StorageConfig;
use crate::utils::{flag_env_with_prefix, get_env_with_prefix, parse_env_with_prefix};

/// Main configuration for a Corpdesk deployment
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub dev: DevConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub stripe: StripeConfig,
    pub storage: StorageConfig,
    pub inference: InferenceConfig,
    pub pdf: PdfConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes (default: 10MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Public URL of the web app, used in emails and portal links
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Whole-request timeout. Invoice generation runs a browser, so keep this generous.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

/// Development mode: permissive CORS and server error details in responses.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DevConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout() -> u64 {
    90
}

impl ServerConfig {
    pub fn addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.server.base_url = base_url.into();
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.server.max_body_size = max_body_size;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.config.dev.enabled = enabled;
        self
    }

    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.jwt_secret = SecretString::from(secret.into());
        self
    }

    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.config.database = database;
        self
    }

    pub fn with_stripe(mut self, stripe: StripeConfig) -> Self {
        self.config.stripe = stripe;
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.config.inference = inference;
        self
    }

    pub fn with_pdf(mut self, pdf: PdfConfig) -> Self {
        self.config.pdf = pdf;
        self
    }

    pub fn with_email(mut self, email: EmailConfig) -> Self {
        self.config.email = email;
        self
    }

    /// Load configuration from environment variables with CORPDESK_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
        if let Some(port) = parse_env_with_prefix("PORT") {
            self.config.server.port = port;
        }
        if let Some(max_body_size) = parse_env_with_prefix("MAX_BODY_SIZE") {
            self.config.server.max_body_size = max_body_size;
        }
        if let Some(base_url) = get_env_with_prefix("BASE_URL") {
            self.config.server.base_url = base_url;
        }
        if let Some(timeout) = parse_env_with_prefix("REQUEST_TIMEOUT_SECONDS") {
            self.config.server.request_timeout_seconds = timeout;
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = flag_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json;
        }
        if let Some(dev) = flag_env_with_prefix("DEV_MODE") {
            self.config.dev.enabled = dev;
        }

        self.config.database = DatabaseConfig::from_env();
        self.config.auth = AuthConfig::from_env();
        self.config.stripe = StripeConfig::from_env();
        self.config.storage = StorageConfig::from_env();
        self.config.inference = InferenceConfig::from_env();
        self.config.pdf = PdfConfig::from_env();
        self.config.email = EmailConfig::from_env();

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if the server address, log level, body size, JWT
    /// secret or Stripe key are invalid.
    pub fn build(self) -> Result<Config> {
        let config = self.config;

        config.server.addr().map_err(|e| {
            CorpdeskError::bad_request(format!(
                "Invalid server address {}:{} - {}",
                config.server.host, config.server.port, e
            ))
        })?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(CorpdeskError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if config.server.port == 0 {
            return Err(CorpdeskError::bad_request("Server port must be greater than 0"));
        }

        if config.server.max_body_size == 0 {
            return Err(CorpdeskError::bad_request(
                "Maximum body size must be greater than 0",
            ));
        }

        if !config.server.base_url.starts_with("http://")
            && !config.server.base_url.starts_with("https://")
        {
            return Err(CorpdeskError::bad_request(format!(
                "Base URL must start with http:// or https://, got: {}",
                config.server.base_url
            )));
        }

        if !config.dev.enabled && config.auth.jwt_secret.expose_secret().len() < 32 {
            return Err(CorpdeskError::bad_request(
                "JWT secret must be at least 32 bytes outside dev mode",
            ));
        }

        if let Some(key) = &config.stripe.secret_key {
            crate::billing::validate_api_key(key.expose_secret())
                .map_err(|e| CorpdeskError::bad_request(e.to_string()))?;
        }

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
