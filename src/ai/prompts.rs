//! Prompts and payload types for the AI-backed tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Suit colours offered for passport retouching
pub const SUIT_COLORS: [&str; 6] = [
    "Navy Blue",
    "Charcoal Grey",
    "Dark Slate",
    "Deep Black",
    "Midnight Blue",
    "Dark Brown",
];

/// Characters of document text sent for summarization
pub const SUMMARY_INPUT_LIMIT: usize = 8000;

pub const SCAN_PROMPT: &str = r#"Task: Intelligent Document Scanning & Enhancement.

Input: An image containing a document (CV, Passport, ID Card, or Paper Document).

Strict Requirements:
1. **Crop**: Identify the document boundaries and crop out the background/table surface completely.
2. **Perspective**: Correct any skew or angle so the document appears flat (top-down view).
3. **Enhance**: Increase contrast and sharpness to make the text highly readable. Make the background of the paper clean (remove shadows/noise).
4. **Text Fidelity**: PRESERVE ORIGINAL TEXT EXACTLY. Do not change, summarize, or hallucinate a single character. The text must remain legible and identical to the source.

Output: The high-quality cropped and enhanced image file only."#;

/// Pick a suit colour at random
pub fn pick_suit_color() -> &'static str {
    let byte = uuid::Uuid::new_v4().as_bytes()[0];
    SUIT_COLORS[usize::from(byte) % SUIT_COLORS.len()]
}

pub fn passport_prompt(suit_color: &str) -> String {
    format!(
        r#"Act as a professional photo retoucher.

TASK: Transform this selfie into a professional Passport Photo.

INSTRUCTIONS:
1. **Identity**: Strictly preserve the facial features and identity.
2. **Attire**: Change the clothing to a professional {suit_color} business suit with a white shirt and tie.
3. **Style**: Realistic photography style. Avoid cartoonish or 3D rendered looks.
4. **Lighting**: Soft, even studio lighting.
5. **Background**: Pure white background.

Output the processed image ONLY."#
    )
}

/// Personal details entered for résumé generation
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeData {
    pub full_name: String,
    pub father_name: String,
    pub dob: String,
    pub passport_no: String,
    pub cnic_no: String,
    pub marital_status: String,
    pub nationality: String,
    pub religion: String,
    pub gender: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub experience_local: String,
    pub experience_abroad: String,
    pub education: String,
    /// Role the résumé is aimed at
    pub target_role: String,
}

/// Generated résumé sections
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedResumeContent {
    #[serde(default)]
    pub career_objective: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

pub fn resume_prompt(data: &ResumeData) -> String {
    format!(
        r#"Generate professional resume content for:
Name: {}
Target Role: {}
Experience Local: {}
Experience Abroad: {}

Please provide:
1. A strong Career Objective (2-3 sentences).
2. Key Skills (list of 8-10 relevant skills).
3. Key Responsibilities (bullet points suitable for their experience).
4. A Professional Summary (short paragraph).

Return ONLY raw JSON with keys: careerObjective, skills (array of strings), responsibilities (array of strings), summary."#,
        data.full_name, data.target_role, data.experience_local, data.experience_abroad
    )
}

/// Response schema in the Gemini `responseSchema` dialect
pub fn resume_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "careerObjective": { "type": "STRING" },
            "skills": { "type": "ARRAY", "items": { "type": "STRING" } },
            "responsibilities": { "type": "ARRAY", "items": { "type": "STRING" } },
            "summary": { "type": "STRING" }
        }
    })
}

pub fn summary_prompt(text: &str) -> String {
    let chunk: String = text.chars().take(SUMMARY_INPUT_LIMIT).collect();
    format!(
        "Analyze this document text and provide a concise summary and 3 key takeaways:\n\n{}",
        chunk
    )
}

pub const DOCUMENT_STRUCTURE_PROMPT: &str = r#"You are a highly accurate OCR engine. Your ONLY job is to transcribe the content of this image into structured JSON for a Word document.

DO NOT converse. DO NOT ask questions. DO NOT summarize.
EXTRACT EVERYTHING VISIBLE.

Instructions:
1. Identify headings and paragraphs.
2. Identify TABLES. If you see a grid or list of data, extract it as a 'table' type with 'rows'.
3. Identify Lists.
4. Preserve alignment (center/left/right).

Output JSON Format:
{
    "elements": [
        { "type": "heading1", "text": "Title Here", "alignment": "center" },
        { "type": "paragraph", "text": "Content goes here..." },
        { "type": "table", "rows": [ ["Header1", "Header2"], ["Cell1", "Cell2"] ] }
    ]
}"#;

/// Block-level kind of a transcribed element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocxElementKind {
    Heading1,
    Heading2,
    Paragraph,
    Bullet,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

/// One block of a page transcribed for a word-processor document
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct DocxElement {
    #[serde(rename = "type")]
    pub kind: DocxElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Table cells, row by row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<String>>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
}

/// Model answer for one page
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageStructure {
    #[serde(default)]
    pub elements: Vec<DocxElement>,
}

pub fn document_structure_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "elements": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "type": {
                            "type": "STRING",
                            "enum": ["heading1", "heading2", "paragraph", "bullet", "table"]
                        },
                        "text": { "type": "STRING" },
                        "rows": {
                            "type": "ARRAY",
                            "items": { "type": "ARRAY", "items": { "type": "STRING" } }
                        },
                        "bold": { "type": "BOOLEAN" },
                        "italic": { "type": "BOOLEAN" },
                        "alignment": {
                            "type": "STRING",
                            "enum": ["left", "center", "right", "justify"]
                        }
                    },
                    "required": ["type"]
                }
            }
        }
    })
}
