//! Configuration Module
//!
//! Consumer credentials of the integrating application and the tunables of
//! the HTTP and handoff layers.

use serde::{Deserialize, Serialize};
use tracing::warn;

const PLACEHOLDER_KEY: &str = "set_your_consumerKey";
const PLACEHOLDER_SECRET: &str = "set_your_consumerSecret";

const DEFAULT_API_URL: &str = "https://external-api.studyplus.jp";
const DEFAULT_STORE_URL: &str = "https://apps.apple.com/jp/app/id505410049?mt=8";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Consumer key and secret issued to the integrating application.
///
/// An empty pair is the "misconfigured" sentinel. Placeholder values copied
/// from sample configuration are normalized to that sentinel.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub consumer_key: String,
    pub consumer_secret: String,
}

impl Configuration {
    /// Create a configuration, demoting placeholder values and keys that are
    /// not valid URL scheme characters to the sentinel
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        let consumer_key = consumer_key.into();
        let consumer_secret = consumer_secret.into();

        if consumer_key.is_empty()
            || consumer_secret.is_empty()
            || consumer_key == PLACEHOLDER_KEY
            || consumer_secret == PLACEHOLDER_SECRET
        {
            warn!("Consumer key and secret are not set; Studyplus is unconfigured");
            return Self::unconfigured();
        }

        // The key becomes part of the callback scheme `studyplus-<key>`
        if !consumer_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            warn!(
                "Consumer key {:?} cannot form a URL scheme; Studyplus is unconfigured",
                consumer_key
            );
            return Self::unconfigured();
        }

        Self {
            consumer_key,
            consumer_secret,
        }
    }

    /// The empty sentinel pair
    pub fn unconfigured() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
        }
    }

    /// Read `STUDYPLUS_CONSUMER_KEY` / `STUDYPLUS_CONSUMER_SECRET`
    pub fn from_env() -> Result<Self, ConfigError> {
        let key = std::env::var("STUDYPLUS_CONSUMER_KEY")
            .map_err(|_| ConfigError::MissingEnv("STUDYPLUS_CONSUMER_KEY"))?;
        let secret = std::env::var("STUDYPLUS_CONSUMER_SECRET")
            .map_err(|_| ConfigError::MissingEnv("STUDYPLUS_CONSUMER_SECRET"))?;
        Ok(Self::new(key, secret))
    }

    pub fn is_configured(&self) -> bool {
        !self.consumer_key.is_empty() && !self.consumer_secret.is_empty()
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .finish()
    }
}

/// How the `fail` outcome of a login callback is encoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackVariant {
    /// `fail` carries no payload and means a generic application error
    #[default]
    Current,
    /// `fail/<code>` carries a numeric failure code
    Coded,
}

/// Transport and handoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub timeout_secs: u64,
    /// Store listing opened when the companion app is not installed
    pub store_url: String,
    pub open_store_if_not_installed: bool,
    pub callback_variant: CallbackVariant,
    /// Accept valid records without sending them
    pub dry_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            store_url: DEFAULT_STORE_URL.to_string(),
            open_store_if_not_installed: true,
            callback_variant: CallbackVariant::Current,
            dry_run: false,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `STUDYPLUS_API_URL`, `STUDYPLUS_TIMEOUT_SECS`
    /// and `STUDYPLUS_DRY_RUN`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Ok(url) = std::env::var("STUDYPLUS_API_URL") {
            settings.api_base_url = url;
        }
        if let Ok(secs) = std::env::var("STUDYPLUS_TIMEOUT_SECS") {
            settings.timeout_secs = secs
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("STUDYPLUS_TIMEOUT_SECS", secs))?;
        }
        if let Ok(flag) = std::env::var("STUDYPLUS_DRY_RUN") {
            settings.dry_run = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        Ok(settings)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidEnv(&'static str, String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_become_the_sentinel() {
        let config = Configuration::new(PLACEHOLDER_KEY, "secret");
        assert!(!config.is_configured());
        assert_eq!(config, Configuration::unconfigured());

        let config = Configuration::new("key", PLACEHOLDER_SECRET);
        assert!(!config.is_configured());
    }

    #[test]
    fn keys_outside_the_scheme_alphabet_become_the_sentinel() {
        for key in ["key_1", "key 1", "kéy", "key/1"] {
            assert_eq!(Configuration::new(key, "secret"), Configuration::unconfigured(), "{}", key);
        }

        assert!(Configuration::new("Key-1.v2+beta", "secret").is_configured());
    }

    #[test]
    fn real_pair_is_configured() {
        let config = Configuration::new("key", "secret");
        assert!(config.is_configured());
        assert_eq!(config.consumer_key, "key");
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let config = Configuration::new("key", "hunter2");
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("key"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"callback_variant":"coded","dry_run":true}"#).unwrap();
        assert_eq!(settings.callback_variant, CallbackVariant::Coded);
        assert!(settings.dry_run);
        assert_eq!(settings.api_base_url, DEFAULT_API_URL);
        assert_eq!(settings.timeout(), std::time::Duration::from_secs(30));
    }
}
