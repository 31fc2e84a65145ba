//! S3-compatible object storage for profile images and invoice PDFs.
//!
//! [`FileStorage`] wraps any `object_store` backend: `AmazonS3Builder` when
//! a bucket is configured (AWS, R2, MinIO, ...) and an in-memory store
//! otherwise.

use object_store::{
    Attribute, Attributes, ObjectStore, PutOptions, PutPayload, aws::AmazonS3Builder,
    memory::InMemory, path::Path,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::error::{CorpdeskError, Result};
use crate::utils::{flag_env_with_prefix, get_env_with_prefix};

/// Largest accepted profile image.
pub const MAX_PROFILE_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// In-memory storage when absent.
    pub bucket: Option<String>,
    /// Custom S3 endpoint (R2, MinIO). AWS when absent.
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<SecretString>,
    /// Base URL objects are publicly served from, e.g. a CDN.
    pub public_url: Option<String>,
    pub path_style: bool,
    pub allow_http: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            endpoint: None,
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            public_url: None,
            path_style: false,
            allow_http: false,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let mut config = Self {
            bucket: get_env_with_prefix("STORAGE_BUCKET"),
            endpoint: get_env_with_prefix("STORAGE_ENDPOINT"),
            access_key_id: get_env_with_prefix("STORAGE_ACCESS_KEY_ID"),
            secret_access_key: get_env_with_prefix("STORAGE_SECRET_ACCESS_KEY")
                .map(SecretString::from),
            public_url: get_env_with_prefix("STORAGE_PUBLIC_URL"),
            ..Self::default()
        };
        if let Some(region) = get_env_with_prefix("STORAGE_REGION") {
            config.region = region;
        }
        if let Some(path_style) = flag_env_with_prefix("STORAGE_PATH_STYLE") {
            config.path_style = path_style;
        }
        if let Some(allow_http) = flag_env_with_prefix("STORAGE_ALLOW_HTTP") {
            config.allow_http = allow_http;
        }
        config
    }
}

/// Image formats accepted for profile pictures, detected from the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Webp,
}

impl ImageKind {
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageKind::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageKind::Jpeg)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageKind::Webp)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::Webp => "webp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Webp => "image/webp",
        }
    }
}

/// Check size and format of an uploaded profile image.
pub fn validate_profile_image(bytes: &[u8]) -> Result<ImageKind> {
    if bytes.is_empty() {
        return Err(CorpdeskError::bad_request("Image is empty"));
    }
    if bytes.len() > MAX_PROFILE_IMAGE_BYTES {
        return Err(CorpdeskError::bad_request("Image must be 5 MiB or smaller"));
    }
    ImageKind::detect(bytes)
        .ok_or_else(|| CorpdeskError::bad_request("Image must be a PNG, JPEG or WebP file"))
}

pub fn profile_image_key(user_id: &str, kind: ImageKind) -> String {
    format!(
        "profile-images/{}/{}.{}",
        user_id,
        uuid::Uuid::new_v4(),
        kind.extension()
    )
}

pub fn invoice_key(user_id: &str, invoice_number: &str) -> String {
    format!("invoices/{}/{}.pdf", user_id, invoice_number)
}

#[derive(Clone)]
pub struct FileStorage {
    store: Arc<dyn ObjectStore>,
    public_base: String,
    backend: &'static str,
}

impl FileStorage {
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let Some(bucket) = &config.bucket else {
            tracing::warn!("STORAGE_BUCKET not set, files are kept in memory");
            return Ok(Self::in_memory());
        };

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&config.region)
            .with_allow_http(config.allow_http)
            .with_virtual_hosted_style_request(!config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder
                .with_access_key_id(key)
                .with_secret_access_key(secret.expose_secret());
        }
        let store = builder
            .build()
            .map_err(|e| CorpdeskError::internal(format!("Invalid storage configuration: {}", e)))?;

        let public_base = match (&config.public_url, &config.endpoint) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(endpoint)) => {
                format!("{}/{}", endpoint.trim_end_matches('/'), bucket)
            }
            (None, None) => format!("https://{}.s3.{}.amazonaws.com", bucket, config.region),
        };

        tracing::info!(bucket = %bucket, public_base = %public_base, "Object storage configured");
        Ok(Self {
            store: Arc::new(store),
            public_base,
            backend: "s3",
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            public_base: "memory://corpdesk".to_string(),
            backend: "memory",
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    /// Store `bytes` under `key` and return its public URL.
    pub async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..PutOptions::default()
        };

        let size = bytes.len();
        self.store
            .put_opts(&Path::from(key), PutPayload::from(bytes), options)
            .await?;
        tracing::debug!(key = %key, size, content_type = %content_type, "Object stored");
        Ok(self.public_url(key))
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let result = self.store.get(&Path::from(key)).await?;
        Ok(result.bytes().await?.to_vec())
    }

    /// Deleting a missing object is not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        match self.store.delete(&Path::from(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Key of an object served from this storage, if `url` is one.
    pub fn key_for_url<'a>(&self, url: &'a str) -> Option<&'a str> {
        url.strip_prefix(self.public_base.as_str())?.strip_prefix('/')
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("backend", &self.backend)
            .field("public_base", &self.public_base)
            .finish()
    }
}
