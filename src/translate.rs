//! Translation of paper synopses.
//!
//! - [`Translate`]: one call to a translation backend
//! - [`GoogleTranslator`]: the public `translate_a/single` endpoint
//! - [`Translator`]: retry with a fixed delay, falling back to the source
//!   text when every attempt fails. Translation failures never leave this
//!   module.

use crate::errors::TranslateError;
use crate::models::NOT_AVAILABLE;
use crate::utils::truncate_for_log;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use url::Url;

/// A translation backend.
pub trait Translate {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError>;
}

impl<T: Translate + ?Sized> Translate for &T {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError> {
        (**self).translate(text, source, target).await
    }
}

/// Client for Google's keyless `translate_a/single` endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslator {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl Translate for GoogleTranslator {
    #[instrument(level = "debug", skip(self, text), fields(chars = text.chars().count()))]
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError> {
        let url = Url::parse_with_params(
            &self.endpoint,
            &[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ],
        )
        .map_err(|e| TranslateError::Malformed(format!("bad endpoint: {e}")))?;

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::Status(status.as_u16()));
        }
        let raw = response.text().await?;
        let body: Value = serde_json::from_str(&raw)
            .map_err(|e| TranslateError::Malformed(format!("{e}: {}", truncate_for_log(&raw, 200))))?;
        parse_google_response(&body)
    }
}

/// Join the translated pieces of a `translate_a/single` response.
///
/// The payload looks like `[[["Hola", "Hello", ...], ["mundo", "world", ...]], ...]`.
pub fn parse_google_response(body: &Value) -> Result<String, TranslateError> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslateError::Malformed(truncate_for_log(&body.to_string(), 200)))?;
    let text: String = segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        return Err(TranslateError::Malformed("empty translation".to_string()));
    }
    Ok(text)
}

/// The translation stage: bounded retries and a source-text fallback.
#[derive(Debug, Clone)]
pub struct Translator<T> {
    backend: T,
    max_attempts: usize,
    delay: Duration,
}

impl<T: Translate> Translator<T> {
    pub fn new(backend: T, max_attempts: usize, delay: Duration) -> Self {
        Self {
            backend,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Translate `text` into each language.
    ///
    /// Returns an empty map when `text` is empty or [`NOT_AVAILABLE`].
    pub async fn translate_all(&self, text: &str, languages: &[String]) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if text.trim().is_empty() || text == NOT_AVAILABLE {
            return out;
        }
        for lang in languages {
            let translated = self.translate_with_retry(text, lang).await;
            out.insert(lang.clone(), translated);
        }
        out
    }

    /// One language, retried; the source text on exhaustion.
    #[instrument(level = "debug", skip(self, text))]
    pub async fn translate_with_retry(&self, text: &str, lang: &str) -> String {
        for attempt in 1..=self.max_attempts {
            match self.backend.translate(text, "auto", lang).await {
                Ok(translated) => {
                    debug!(attempt, "Translation succeeded");
                    return translated;
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        %lang,
                        error = %e,
                        "Translation attempt failed"
                    );
                    if attempt < self.max_attempts {
                        sleep(self.delay).await;
                    }
                }
            }
        }
        warn!(%lang, text = %truncate_for_log(text, 50), "Translation exhausted; keeping source text");
        text.to_string()
    }
}
