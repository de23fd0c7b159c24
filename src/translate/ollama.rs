use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::Translator;
use super::languages::{is_supported, language_name, same_language};
use crate::config::TranslationConfig;
use crate::error::{Result, VidsubError};
use crate::transcript::TimedSegment;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResponse {
    pub response: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub text: String,
}

/// Translates one segment at a time, passing the previous segment along as
/// context.
pub struct OllamaTranslator {
    client: Client,
    config: TranslationConfig,
}

impl OllamaTranslator {
    pub fn new(config: TranslationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn check_pair(&self, source: &str, target: &str) -> Result<()> {
        let source_known = is_supported(source) || is_undetermined(source);
        if !source_known || !is_supported(target) {
            return Err(VidsubError::Translation(format!(
                "Unsupported language pair {} -> {}",
                source, target
            )));
        }
        Ok(())
    }

    /// Perform the actual translation using Ollama with JSON format
    pub async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
        context: Option<&str>,
    ) -> Result<String> {
        let prompt = build_translation_prompt(text, target_language, context);

        let request = TranslationRequest {
            model: self.config.model.clone(),
            prompt,
            stream: false,
            format: "json".to_string(),
        };

        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));

        debug!("Sending translation request to: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| VidsubError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VidsubError::Translation(format!(
                "Ollama API error {}: {}",
                status, error_text
            )));
        }

        let translation_response: TranslationResponse = response
            .json()
            .await
            .map_err(|e| VidsubError::Translation(format!("Failed to parse response: {}", e)))?;

        parse_translation(&translation_response.response)
    }

    async fn translate_with_retries(
        &self,
        text: &str,
        target_language: &str,
        context: Option<&str>,
    ) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.translate_text(text, target_language, context).await {
                Ok(translation) => return Ok(translation),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "Translation attempt {}/{} failed: {}",
                        attempt, self.config.max_retries, e
                    );
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn translate(
        &self,
        segments: &[TimedSegment],
        source: &str,
        target: &str,
    ) -> Result<Vec<TimedSegment>> {
        self.check_pair(source, target)?;

        if same_language(source, target) {
            info!("Source and target are both {}, keeping text as-is", target);
            return Ok(segments
                .iter()
                .map(|s| s.clone().with_language(target))
                .collect());
        }

        info!(
            "Translating {} segments from {} to {} with {}",
            segments.len(),
            source,
            target,
            self.config.model
        );

        let progress = ProgressBar::new(segments.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            progress.set_style(style.progress_chars("#>-"));
        }

        let mut translated = Vec::with_capacity(segments.len());
        let mut previous: Option<&str> = None;

        for segment in segments {
            let text = segment.text.trim();
            let translation = if text.chars().any(char::is_alphabetic) {
                self.translate_with_retries(text, target, previous).await?
            } else {
                text.to_string()
            };

            translated.push(TimedSegment {
                start: segment.start,
                end: segment.end,
                text: translation,
                language: Some(target.to_string()),
            });
            previous = Some(text);
            progress.inc(1);
        }

        progress.finish_and_clear();
        info!("Translation completed");
        Ok(translated)
    }
}

fn is_undetermined(tag: &str) -> bool {
    matches!(tag.trim().to_ascii_lowercase().as_str(), "" | "und" | "auto")
}

fn build_translation_prompt(text: &str, target_language: &str, context: Option<&str>) -> String {
    let language_name = language_name(target_language).unwrap_or(target_language);

    let mut prompt = format!(
        "You are a professional subtitle translator.\n\
         \n\
         CRITICAL: You must translate the text to {} ONLY. Do not translate to any other language.\n\
         The target language is: {} (language code: {})\n\
         \n\
         Return ONLY the translation in JSON format as {{\"text\":\"your {} translation here\"}}.\n\
         Do not include any explanations, alternatives, or text in other languages.\n\
         \n\
         [Text to translate]\n\
         {}\n\
         \n",
        language_name, language_name, target_language, language_name, text
    );

    if let Some(ctx) = context {
        if !ctx.trim().is_empty() {
            prompt.push_str(&format!(
                "[Previous line for reference - DO NOT translate this part]\n\
                 {}\n\n\
                 Remember: Only translate the text in the [Text to translate] section above to {}.\n",
                ctx, language_name
            ));
        }
    }

    prompt
}

fn parse_translation(raw: &str) -> Result<String> {
    let raw_response = raw.trim();
    debug!("Raw Ollama response: {}", raw_response);

    if raw_response.is_empty() {
        return Err(VidsubError::Translation("Empty translation received".to_string()));
    }

    if let Ok(result) = serde_json::from_str::<TranslationResult>(raw_response) {
        return Ok(result.text.trim().to_string());
    }

    Ok(clean_translation_response(raw_response))
}

/// Pick the translation out of a chatty free-text answer.
fn clean_translation_response(response: &str) -> String {
    let lines: Vec<&str> = response.lines().collect();

    for &line in &lines {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with("Here are")
            || trimmed.starts_with("Option")
            || trimmed.starts_with("**Option")
            || trimmed.starts_with("Translation:")
            || trimmed.starts_with("- ")
            || trimmed.starts_with("* ")
        {
            continue;
        }

        if trimmed.starts_with("**") && trimmed.ends_with("**") {
            continue;
        }

        if trimmed.chars().count() > 3 {
            return trimmed.to_string();
        }
    }

    lines
        .iter()
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
        .unwrap_or(response)
        .to_string()
}

/// Check if Ollama is reachable and the model is installed
pub async fn check_ollama_availability(endpoint: &str, model: &str) -> Result<()> {
    let client = Client::new();
    let url = format!("{}/api/show", endpoint.trim_end_matches('/'));

    let response = client
        .post(&url)
        .json(&serde_json::json!({ "name": model }))
        .send()
        .await
        .map_err(|e| VidsubError::Translation(format!("Failed to connect to Ollama: {}", e)))?;

    if response.status().is_success() {
        info!("Ollama model {} is available", model);
        Ok(())
    } else {
        Err(VidsubError::Translation(format!(
            "Model {} is not available on {} (status {})",
            model,
            endpoint,
            response.status()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> OllamaTranslator {
        OllamaTranslator::new(TranslationConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            max_retries: 0,
            request_timeout_secs: 1,
            ..TranslationConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parse_json_translation() {
        assert_eq!(parse_translation(r#"{"text": " Merhaba "}"#).unwrap(), "Merhaba");
        assert!(parse_translation("   ").is_err());
    }

    #[test]
    fn test_clean_chatty_response() {
        let raw = "Here are some options:\n**Option 1**\nNasılsın bugün?\n- alternative";
        assert_eq!(parse_translation(raw).unwrap(), "Nasılsın bugün?");
    }

    #[test]
    fn test_prompt_names_target_and_context() {
        let prompt = build_translation_prompt("How are you?", "tur_Latn", Some("Hello."));
        assert!(prompt.contains("translate the text to Turkish ONLY"));
        assert!(prompt.contains("language code: tur_Latn"));
        assert!(prompt.contains("[Previous line for reference"));
        assert!(!build_translation_prompt("Hi", "de", None).contains("Previous line"));
    }

    #[tokio::test]
    async fn test_unsupported_pair_is_rejected() {
        let segments = vec![TimedSegment::new(0.0, 1.0, "Hello")];
        let err = translator()
            .translate(&segments, "en", "xx_Fake")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported language pair"));
    }

    #[tokio::test]
    async fn test_same_language_keeps_segments() {
        let segments = vec![TimedSegment::new(0.0, 1.0, "Hello")];
        let result = translator()
            .translate(&segments, "en", "eng_Latn")
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "Hello");
        assert_eq!(result[0].language.as_deref(), Some("eng_Latn"));
    }
}
