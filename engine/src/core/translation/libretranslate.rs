//! LibreTranslate Provider Implementation
//!
//! Implements the TranslationProvider trait for LibreTranslate-compatible
//! HTTP services (`POST /translate`, `POST /detect`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::provider::{ProviderConfig, TranslationProvider};
use super::{DetectedLanguage, QuotaError, TranslatedText};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// LibreTranslate Provider
// =============================================================================

/// LibreTranslate API provider
pub struct LibreTranslateProvider {
    /// Base URL without trailing slash
    base_url: String,
    /// Optional API key (required by hosted instances)
    api_key: Option<String>,
    /// HTTP client
    client: reqwest::Client,
}

impl LibreTranslateProvider {
    /// Default public instance
    pub const DEFAULT_BASE_URL: &'static str = "https://libretranslate.com";

    /// Creates a new LibreTranslate provider
    pub fn new(config: ProviderConfig) -> CoreResult<Self> {
        let base_url = config
            .base_url
            .unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CoreError::field(
                "translation.baseUrl",
                "must be an http:// or https:// URL",
            ));
        }

        let api_key = config.api_key.filter(|k| !k.trim().is_empty());
        let timeout_secs = config.timeout_secs.unwrap_or(60);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> CoreResult<(u16, String)> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::TranslationApi(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CoreError::TranslationApi(format!("Failed to read response: {}", e)))?;
        Ok((status, body))
    }
}

// =============================================================================
// API Types
// =============================================================================

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a [String],
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TranslatedField {
    Many(Vec<String>),
    One(String),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: TranslatedField,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    q: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct DetectCandidate {
    language: String,
    /// 0-100
    confidence: f32,
}

#[derive(Deserialize)]
struct ApiError {
    error: String,
}

/// Maps a non-success response onto the error taxonomy
fn error_for_status(status: u16, body: &str, requested: u64) -> CoreError {
    let message = serde_json::from_str::<ApiError>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    match status {
        402 | 456 => QuotaError::ProviderQuotaExceeded { requested }.into(),
        403 if message.to_lowercase().contains("quota") => {
            QuotaError::ProviderQuotaExceeded { requested }.into()
        }
        400 => CoreError::field("language", message),
        _ => CoreError::TranslationApi(format!("LibreTranslate error ({}): {}", status, message)),
    }
}

fn parse_translate_response(body: &str, expected: usize) -> CoreResult<Vec<TranslatedText>> {
    let response: TranslateResponse = serde_json::from_str(body)
        .map_err(|e| CoreError::TranslationApi(format!("Failed to parse response: {}", e)))?;

    let texts = match response.translated_text {
        TranslatedField::Many(texts) => texts,
        TranslatedField::One(text) => vec![text],
    };
    if texts.len() != expected {
        return Err(CoreError::TranslationApi(format!(
            "Service returned {} translations for {} texts",
            texts.len(),
            expected
        )));
    }

    // LibreTranslate does not score translations
    Ok(texts
        .into_iter()
        .map(|text| TranslatedText {
            text,
            confidence: None,
        })
        .collect())
}

fn parse_detect_response(body: &str) -> CoreResult<Option<DetectedLanguage>> {
    let candidates: Vec<DetectCandidate> = serde_json::from_str(body)
        .map_err(|e| CoreError::TranslationApi(format!("Failed to parse response: {}", e)))?;

    Ok(candidates
        .into_iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|c| DetectedLanguage::new(&c.language, c.confidence / 100.0)))
}

#[async_trait]
impl TranslationProvider for LibreTranslateProvider {
    fn name(&self) -> &str {
        "libretranslate"
    }

    async fn translate(
        &self,
        texts: &[String],
        source_language: &str,
        target_language: &str,
    ) -> CoreResult<Vec<TranslatedText>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = TranslateRequest {
            q: texts,
            source: source_language,
            target: target_language,
            format: "text",
            api_key: self.api_key.as_deref(),
        };
        let (status, body) = self.post("translate", &request).await?;

        if !(200..300).contains(&status) {
            let requested = texts.iter().map(|t| t.chars().count() as u64).sum();
            return Err(error_for_status(status, &body, requested));
        }
        parse_translate_response(&body, texts.len())
    }

    async fn detect(&self, text: &str) -> CoreResult<Option<DetectedLanguage>> {
        let request = DetectRequest {
            q: text,
            api_key: self.api_key.as_deref(),
        };
        let (status, body) = self.post("detect", &request).await?;

        if !(200..300).contains(&status) {
            return Err(error_for_status(status, &body, text.chars().count() as u64));
        }
        parse_detect_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider =
            LibreTranslateProvider::new(ProviderConfig::libretranslate("http://localhost:5000/"))
                .unwrap();

        assert_eq!(provider.name(), "libretranslate");
        assert_eq!(provider.base_url(), "http://localhost:5000");
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn test_default_base_url_and_key() {
        let config = ProviderConfig {
            base_url: None,
            ..ProviderConfig::libretranslate("").with_api_key("secret")
        };
        let provider = LibreTranslateProvider::new(config).unwrap();

        assert_eq!(provider.base_url(), LibreTranslateProvider::DEFAULT_BASE_URL);
        assert_eq!(provider.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_base_url() {
        let result = LibreTranslateProvider::new(ProviderConfig::libretranslate("localhost:5000"));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_translate_response() {
        let parsed =
            parse_translate_response(r#"{"translatedText": ["Hola", "Adiós"]}"#, 2).unwrap();
        assert_eq!(parsed[0].text, "Hola");
        assert_eq!(parsed[1].confidence, None);

        let single = parse_translate_response(r#"{"translatedText": "Hola"}"#, 1).unwrap();
        assert_eq!(single.len(), 1);

        let err = parse_translate_response(r#"{"translatedText": ["Hola"]}"#, 2).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_parse_detect_response() {
        let detected = parse_detect_response(
            r#"[{"language": "fr", "confidence": 40.0}, {"language": "es", "confidence": 92.0}]"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(detected.language, "es");
        assert!((detected.confidence - 0.92).abs() < 1e-6);

        assert_eq!(parse_detect_response("[]").unwrap(), None);
    }

    #[test]
    fn test_error_mapping() {
        let quota = error_for_status(456, "", 300);
        assert!(matches!(
            quota,
            CoreError::TranslationQuotaExceeded { requested: 300, .. }
        ));

        let quota = error_for_status(403, r#"{"error": "Monthly quota reached"}"#, 10);
        assert!(matches!(quota, CoreError::TranslationQuotaExceeded { .. }));

        let bad_pair = error_for_status(400, r#"{"error": "xx is not supported"}"#, 10);
        assert_eq!(
            bad_pair.field_errors().unwrap().get("language"),
            Some("xx is not supported")
        );

        let unavailable = error_for_status(503, "Service Unavailable", 10);
        assert!(unavailable.is_transient());
        let rate_limited = error_for_status(429, "{\"error\": \"Slowdown\"}", 10);
        assert!(rate_limited.is_transient());
    }
}
