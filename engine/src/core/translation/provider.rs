//! Translation Provider Trait
//!
//! The external translation service sits behind [`TranslationProvider`];
//! the coordinator batches, retries and meters calls through it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DetectedLanguage, TranslatedText};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Provider Configuration
// =============================================================================

/// Supported translation services
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Translation disabled
    #[default]
    None,
    /// LibreTranslate-compatible HTTP API
    LibreTranslate,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::None => write!(f, "none"),
            ProviderKind::LibreTranslate => write!(f, "libretranslate"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(ProviderKind::None),
            "libretranslate" | "libre" => Ok(ProviderKind::LibreTranslate),
            _ => Err(format!("Unknown translation provider: {}", s)),
        }
    }
}

/// Configuration for creating a provider
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn libretranslate(base_url: &str) -> Self {
        Self {
            kind: ProviderKind::LibreTranslate,
            base_url: Some(base_url.to_string()),
            api_key: None,
            timeout_secs: None,
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }
}

/// Builds the provider named by `config`
pub fn create_provider(config: &ProviderConfig) -> CoreResult<Arc<dyn TranslationProvider>> {
    match config.kind {
        ProviderKind::None => Ok(Arc::new(UnconfiguredProvider)),
        #[cfg(feature = "http-translation")]
        ProviderKind::LibreTranslate => Ok(Arc::new(
            super::libretranslate::LibreTranslateProvider::new(config.clone())?,
        )),
        #[cfg(not(feature = "http-translation"))]
        ProviderKind::LibreTranslate => Err(CoreError::Internal(
            "Built without the http-translation feature".to_string(),
        )),
    }
}

// =============================================================================
// Provider Trait
// =============================================================================

/// External machine translation service
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Translates `texts` in one request.
    ///
    /// Must return exactly one entry per input, in input order.
    /// Errors: `TranslationApi` for network or service failures (retried),
    /// `TranslationQuotaExceeded` when the service refuses for quota
    /// reasons (not retried).
    async fn translate(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> CoreResult<Vec<TranslatedText>>;

    /// Detects the language of `text`; `None` when the service cannot tell
    async fn detect(&self, text: &str) -> CoreResult<Option<DetectedLanguage>>;
}

/// Provider used when no translation service is configured
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredProvider;

#[async_trait]
impl TranslationProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "none"
    }

    async fn translate(
        &self,
        _texts: &[String],
        _source_language: &str,
        _target_language: &str,
    ) -> CoreResult<Vec<TranslatedText>> {
        Err(CoreError::Internal(
            "No translation provider configured".to_string(),
        ))
    }

    async fn detect(&self, _text: &str) -> CoreResult<Option<DetectedLanguage>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("LibreTranslate".parse::<ProviderKind>().unwrap(), ProviderKind::LibreTranslate);
        assert_eq!("none".parse::<ProviderKind>().unwrap(), ProviderKind::None);
        assert!("deepl".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::LibreTranslate.to_string(), "libretranslate");
    }

    #[test]
    fn test_create_unconfigured_provider() {
        let provider = create_provider(&ProviderConfig::default()).unwrap();
        assert_eq!(provider.name(), "none");
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let provider = UnconfiguredProvider;
        let err = provider
            .translate(&["hi".to_string()], "en", "es")
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(provider.detect("hello").await.unwrap(), None);
    }
}
