//! SDK configuration loaded from `WAAS_*` environment variables.
//!
//! Key strings are validated for presence here and imported by
//! [`SdkConfig::credentials`], which fails fast on malformed material.

use anyhow::{Context, Result};
use serde::Deserialize;

use common::SdkError;

use crate::client::Credentials;
use crate::crypto::{keys, PaddingMode, SegmentedCipher};

/// Validated SDK configuration.
#[derive(Clone, Deserialize)]
pub struct SdkConfig {
    /// Merchant application id. **Required.**
    pub app_id: String,

    /// Merchant private key, PKCS#8 (or PKCS#1) base64 or PEM. **Required.**
    pub private_key: String,

    /// Platform public key, SPKI (or PKCS#1) base64 or PEM. **Required.**
    pub platform_public_key: String,

    /// Dedicated key for transaction-parameter signatures. Falls back to
    /// `private_key` when unset.
    #[serde(default)]
    pub sign_private_key: Option<String>,

    /// API host, e.g. `https://api.example.com`. **Required.**
    pub host: String,

    /// API version path segment.
    #[serde(default = "default_version")]
    pub version: String,

    /// Charset stamped into request payloads.
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Decrypt-side padding policy: `lenient` or `strict`.
    #[serde(default)]
    pub padding_mode: PaddingMode,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_version() -> String {
    "v2".into()
}
fn default_charset() -> String {
    "utf-8".into()
}
fn default_log_level() -> String {
    "info".into()
}

impl std::fmt::Debug for SdkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkConfig")
            .field("app_id", &self.app_id)
            .field("private_key", &"[REDACTED]")
            .field("platform_public_key", &self.platform_public_key)
            .field(
                "sign_private_key",
                &self.sign_private_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("host", &self.host)
            .field("version", &self.version)
            .field("charset", &self.charset)
            .field("padding_mode", &self.padding_mode)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl SdkConfig {
    /// Load and validate configuration from `WAAS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("WAAS"))
            .build()
            .context("failed to build configuration from environment")?;

        let c: SdkConfig = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.app_id, "WAAS_APP_ID")?;
        ensure_non_empty(&self.private_key, "WAAS_PRIVATE_KEY")?;
        ensure_non_empty(&self.platform_public_key, "WAAS_PLATFORM_PUBLIC_KEY")?;
        ensure_non_empty(&self.host, "WAAS_HOST")?;
        ensure_non_empty(&self.version, "WAAS_VERSION")?;

        if !(self.host.starts_with("https://") || self.host.starts_with("http://")) {
            anyhow::bail!("WAAS_HOST must be an http(s) URL");
        }
        if let Some(key) = &self.sign_private_key {
            ensure_non_empty(key, "WAAS_SIGN_PRIVATE_KEY")?;
        }
        Ok(())
    }

    /// Import every configured key.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::KeyFormat`] for the first key that fails to decode.
    pub fn credentials(&self) -> Result<Credentials, SdkError> {
        let sign_key = self
            .sign_private_key
            .as_deref()
            .map(keys::import_private_key)
            .transpose()?;
        Ok(Credentials {
            app_id: self.app_id.clone(),
            private_key: keys::import_private_key(&self.private_key)?,
            platform_public_key: keys::import_public_key(&self.platform_public_key)?,
            sign_key,
        })
    }

    /// Cipher configured with [`Self::padding_mode`].
    pub fn cipher(&self) -> SegmentedCipher {
        SegmentedCipher::new(self.padding_mode)
    }

    /// Base URL for endpoint paths: `{host}/api/{version}`.
    pub fn api_base(&self) -> String {
        format!("{}/api/{}", self.host.trim_end_matches('/'), self.version)
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
