//! Remote generative AI collaborator
//!
//! Tools talk to the model through [`GenerativeService`] so the server can be
//! built with any implementation; [`GeminiClient`] is the production one.

pub mod gemini;
pub mod prompts;

pub use gemini::GeminiClient;
pub use prompts::{DocxElement, GeneratedResumeContent, ResumeData};

use crate::batch::{BatchItem, ItemProcessor};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Generative model operations used by the tools
#[async_trait]
pub trait GenerativeService: Send + Sync {
    /// Transform `input` according to `prompt`, returning encoded image bytes
    async fn generate_image(&self, input: &[u8], mime_type: &str, prompt: &str) -> Result<Vec<u8>>;

    /// Produce JSON, constrained by `schema` when given
    async fn generate_structured_text(&self, prompt: &str, schema: Option<&Value>) -> Result<Value>;

    /// Produce JSON describing `input`, constrained by `schema` when given
    async fn generate_structured_from_image(
        &self,
        input: &[u8],
        mime_type: &str,
        prompt: &str,
        schema: Option<&Value>,
    ) -> Result<Value>;

    /// Produce free-form text
    async fn generate_text(&self, prompt: &str) -> Result<String>;
}

/// Connection settings for the AI service
#[derive(Debug, Clone, PartialEq)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub image_model: String,
    pub text_model: String,
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Runs every queued image through the same image prompt
pub struct ImagePromptProcessor {
    service: Arc<dyn GenerativeService>,
    prompt: String,
}

impl ImagePromptProcessor {
    pub fn new(service: Arc<dyn GenerativeService>, prompt: impl Into<String>) -> Self {
        Self {
            service,
            prompt: prompt.into(),
        }
    }

    /// Processor for document scanning
    pub fn scanner(service: Arc<dyn GenerativeService>) -> Self {
        Self::new(service, prompts::SCAN_PROMPT)
    }
}

#[async_trait]
impl ItemProcessor for ImagePromptProcessor {
    async fn process(&self, item: &BatchItem) -> Result<Vec<u8>> {
        self.service
            .generate_image(&item.input, &item.mime_type, &self.prompt)
            .await
    }
}

/// Retouch a selfie into a passport photo; a random suit colour is used when none is given
pub async fn enhance_passport_photo(
    service: &dyn GenerativeService,
    image: &[u8],
    mime_type: &str,
    suit_color: Option<&str>,
) -> Result<Vec<u8>> {
    let color = suit_color.unwrap_or_else(|| prompts::pick_suit_color());
    tracing::debug!(suit_color = color, "Enhancing passport photo");
    service
        .generate_image(image, mime_type, &prompts::passport_prompt(color))
        .await
}

pub async fn generate_resume_content(
    service: &dyn GenerativeService,
    data: &ResumeData,
) -> Result<GeneratedResumeContent> {
    let schema = prompts::resume_schema();
    let value = service
        .generate_structured_text(&prompts::resume_prompt(data), Some(&schema))
        .await?;
    Ok(serde_json::from_value(value)?)
}

/// Summary and key takeaways for extracted document text
pub async fn summarize_text(service: &dyn GenerativeService, text: &str) -> Result<String> {
    service.generate_text(&prompts::summary_prompt(text)).await
}

/// Transcribe one rendered page into word-processor blocks
pub async fn extract_page_structure(
    service: &dyn GenerativeService,
    jpeg: &[u8],
) -> Result<Vec<DocxElement>> {
    let schema = prompts::document_structure_schema();
    let value = service
        .generate_structured_from_image(
            jpeg,
            "image/jpeg",
            prompts::DOCUMENT_STRUCTURE_PROMPT,
            Some(&schema),
        )
        .await?;
    let page: prompts::PageStructure = serde_json::from_value(value)?;
    Ok(page.elements)
}


#[cfg(test)]
mod tests {
    use super::testing::FakeService;
    use super::*;
    use crate::batch::{BatchQueue, ItemStatus};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_passport_uses_given_colour() {
        let service = FakeService::default();
        let out = enhance_passport_photo(&service, b"selfie", "image/jpeg", Some("Navy Blue"))
            .await
            .unwrap();
        assert_eq!(out, b"ai:selfie".to_vec());
        assert!(service.prompts.lock()[0].contains("Navy Blue business suit"));
    }

    #[tokio::test]
    async fn test_resume_content_parsed_from_structured_output() {
        let service = FakeService {
            structured: json!({
                "careerObjective": "Deliver safe installations.",
                "skills": ["Wiring", "Safety"],
                "responsibilities": ["Install panels"],
                "summary": "Experienced electrician."
            }),
            ..FakeService::default()
        };
        let content = generate_resume_content(&service, &ResumeData::default())
            .await
            .unwrap();
        assert_eq!(
            content,
            GeneratedResumeContent {
                career_objective: "Deliver safe installations.".to_string(),
                skills: vec!["Wiring".to_string(), "Safety".to_string()],
                responsibilities: vec!["Install panels".to_string()],
                summary: "Experienced electrician.".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_page_structure_extraction() {
        let service = FakeService {
            structured: json!({
                "elements": [
                    { "type": "heading2", "text": "Terms" },
                    { "type": "paragraph", "text": "Payment within 30 days.", "alignment": "justify" }
                ]
            }),
            ..FakeService::default()
        };
        let elements = extract_page_structure(&service, b"jpeg").await.unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].text.as_deref(), Some("Terms"));
        assert!(service.prompts.lock()[0].contains("OCR engine"));
    }

    #[tokio::test]
    async fn test_page_structure_rejects_unknown_element_type() {
        let service = FakeService {
            structured: json!({ "elements": [{ "type": "footnote", "text": "1" }] }),
            ..FakeService::default()
        };
        assert!(matches!(
            extract_page_structure(&service, b"jpeg").await,
            Err(crate::error::Error::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_scanner_processor_in_queue() {
        let service = Arc::new(FakeService {
            fail_marker: Some(b"BAD".to_vec()),
            ..FakeService::default()
        });
        let mut queue = BatchQueue::new();
        queue.submit("one.jpg", "image/jpeg", b"page1".to_vec());
        queue.submit("two.jpg", "image/jpeg", b"BAD page".to_vec());

        let processor = ImagePromptProcessor::scanner(service.clone());
        queue.run(&processor).await;

        let statuses: Vec<_> = queue.items().iter().map(|i| i.status).collect();
        assert_eq!(statuses, vec![ItemStatus::Completed, ItemStatus::Failed]);
        assert_eq!(queue.items()[0].output, Some(b"ai:page1".to_vec()));
        assert!(service.prompts.lock().iter().all(|p| p.contains("Document Scanning")));
    }
}
