//! Gemini `generateContent` client

use super::{AiConfig, GenerativeService};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter())
            .into_iter()
            .flatten()
    }

    fn finish_reason(&self) -> &str {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .unwrap_or("unknown")
    }

    /// First inline image of the first candidate, decoded
    fn image(&self) -> Result<Vec<u8>> {
        let data = self
            .parts()
            .find_map(|part| part.inline_data.as_ref())
            .ok_or_else(|| Error::AiService {
                reason: format!("no image generated (finish reason: {})", self.finish_reason()),
            })?;
        Ok(base64::engine::general_purpose::STANDARD.decode(data.data.trim())?)
    }

    /// Concatenated text parts of the first candidate
    fn text(&self) -> Result<String> {
        let text: String = self.parts().filter_map(|part| part.text.as_deref()).collect();
        if text.trim().is_empty() {
            return Err(Error::AiService {
                reason: format!("no text generated (finish reason: {})", self.finish_reason()),
            });
        }
        Ok(text)
    }
}

/// Remove a surrounding markdown code fence (```json ... ```) if present
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// HTTP client for the Gemini API
pub struct GeminiClient {
    http: reqwest::Client,
    config: AiConfig,
    api_key: String,
}

impl GeminiClient {
    /// Build a client; fails with [`Error::AiNotConfigured`] when no API key is set
    pub fn new(config: AiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(Error::AiNotConfigured)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(Error::HttpRequest)?;

        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );
        tracing::debug!(model, "Calling Gemini generateContent");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AiService {
                reason: format!("{} returned {}: {}", model, status, api_error_message(&body)),
            });
        }

        Ok(response.json().await?)
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn image_request(input: &[u8], mime_type: &str, prompt: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                Part {
                    inline_data: Some(InlineData {
                        mime_type: mime_type.to_string(),
                        data: base64::engine::general_purpose::STANDARD.encode(input),
                    }),
                    ..Part::default()
                },
                Part {
                    text: Some(prompt.to_string()),
                    ..Part::default()
                },
            ],
        }],
        generation_config: None,
    }
}

fn json_config(schema: Option<&Value>) -> GenerationConfig {
    GenerationConfig {
        response_mime_type: "application/json".to_string(),
        response_schema: schema.cloned(),
    }
}

/// Image plus prompt, answered as JSON
fn image_json_request(
    input: &[u8],
    mime_type: &str,
    prompt: &str,
    schema: Option<&Value>,
) -> GenerateContentRequest {
    GenerateContentRequest {
        generation_config: Some(json_config(schema)),
        ..image_request(input, mime_type, prompt)
    }
}

fn text_request(prompt: &str, schema: Option<&Value>, json_output: bool) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![Part {
                text: Some(prompt.to_string()),
                ..Part::default()
            }],
        }],
        generation_config: json_output.then(|| json_config(schema)),
    }
}

#[async_trait]
impl GenerativeService for GeminiClient {
    async fn generate_image(&self, input: &[u8], mime_type: &str, prompt: &str) -> Result<Vec<u8>> {
        let request = image_request(input, mime_type, prompt);
        self.generate(&self.config.image_model, &request).await?.image()
    }

    async fn generate_structured_text(
        &self,
        prompt: &str,
        schema: Option<&Value>,
    ) -> Result<Value> {
        let request = text_request(prompt, schema, true);
        let text = self.generate(&self.config.text_model, &request).await?.text()?;
        Ok(serde_json::from_str(strip_code_fences(&text))?)
    }

    async fn generate_structured_from_image(
        &self,
        input: &[u8],
        mime_type: &str,
        prompt: &str,
        schema: Option<&Value>,
    ) -> Result<Value> {
        let request = image_json_request(input, mime_type, prompt, schema);
        let text = self.generate(&self.config.text_model, &request).await?.text()?;
        Ok(serde_json::from_str(strip_code_fences(&text))?)
    }

    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let request = text_request(prompt, None, false);
        self.generate(&self.config.text_model, &request).await?.text()
    }
}
