//! MCP Server implementation using rmcp

use crate::ai::{
    self, prompts, AiConfig, DocxElement, GeminiClient, GeneratedResumeContent,
    GenerativeService, ImagePromptProcessor, ResumeData,
};
use crate::archive;
use crate::batch::{BatchQueue, ItemStatus};
use crate::editor::{EditOp, EditorConfig};
use crate::error::Error;
use crate::pdf::{self, qpdf};
use crate::source::{
    detect_mime, BlobCache, FileSource, InputKind, Resolved, ResolverConfig, SourceResolver,
    PDF_MIME, ZIP_MIME,
};
use base64::Engine;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

/// Security, resource and collaborator configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories local reads and writes are confined to (empty: unrestricted)
    pub resource_dirs: Vec<String>,
    /// Allow URLs that resolve to private/reserved IPs (default: false)
    pub allow_private_urls: bool,
    /// Maximum download size in bytes for URL sources (default: 100MB)
    pub max_download_bytes: u64,
    /// Maximum total bytes in cache (default: 512MB)
    pub cache_max_bytes: usize,
    /// Maximum number of cache entries (default: 100)
    pub cache_max_entries: usize,
    /// Maximum pixels per point for any rendering (default: 10.0)
    pub max_render_scale: f64,
    /// Maximum pixel area of a rendered page or embedded image (default: 100_000_000)
    pub max_image_pixels: u64,
    pub editor: EditorConfig,
    pub ai: AiConfig,
    /// Items of a batch processed at once; 1 keeps batches strictly sequential
    pub batch_workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            allow_private_urls: false,
            max_download_bytes: 100 * 1024 * 1024, // 100MB
            cache_max_bytes: 512 * 1024 * 1024,    // 512MB
            cache_max_entries: 100,
            max_render_scale: 10.0,
            max_image_pixels: 100_000_000,
            editor: EditorConfig::default(),
            ai: AiConfig::default(),
            batch_workers: 1,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `DOCDESK_*` environment variables and the AI API key
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values returned by `lookup`; unparsable values are logged and ignored
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(dirs) = get("DOCDESK_RESOURCE_DIRS") {
            self.resource_dirs = std::env::split_paths(&dirs)
                .map(|p| p.display().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }
        if let Some(value) = get("DOCDESK_ALLOW_PRIVATE_URLS") {
            if let Some(allow) = parse_flag("DOCDESK_ALLOW_PRIVATE_URLS", &value) {
                self.allow_private_urls = allow;
            }
        }
        set_parsed(&mut self.max_download_bytes, "DOCDESK_MAX_DOWNLOAD_BYTES", &get);
        set_parsed(&mut self.cache_max_bytes, "DOCDESK_CACHE_MAX_BYTES", &get);
        set_parsed(&mut self.cache_max_entries, "DOCDESK_CACHE_MAX_ENTRIES", &get);
        set_parsed(&mut self.max_render_scale, "DOCDESK_MAX_RENDER_SCALE", &get);
        set_parsed(&mut self.max_image_pixels, "DOCDESK_MAX_IMAGE_PIXELS", &get);
        set_parsed(&mut self.batch_workers, "DOCDESK_BATCH_WORKERS", &get);
        self.batch_workers = self.batch_workers.max(1);

        let editor = &mut self.editor;
        set_parsed(&mut editor.default_render_scale, "DOCDESK_RENDER_SCALE", &get);
        set_parsed(&mut editor.pen_width, "DOCDESK_PEN_WIDTH", &get);
        set_parsed(&mut editor.eraser_width, "DOCDESK_ERASER_WIDTH", &get);
        set_parsed(&mut editor.default_font_size, "DOCDESK_FONT_SIZE", &get);
        set_parsed(&mut editor.undo_depth, "DOCDESK_UNDO_DEPTH", &get);
        set_parsed(&mut editor.undo_max_bytes, "DOCDESK_UNDO_MAX_BYTES", &get);
        set_parsed(&mut editor.burn_in.baseline_offset_em, "DOCDESK_TEXT_BASELINE_EM", &get);

        if let Some(key) = get("GEMINI_API_KEY").or_else(|| get("API_KEY")) {
            self.ai.api_key = Some(key);
        }
        if let Some(url) = get("DOCDESK_AI_BASE_URL") {
            self.ai.base_url = url;
        }
        if let Some(model) = get("DOCDESK_AI_IMAGE_MODEL") {
            self.ai.image_model = model;
        }
        if let Some(model) = get("DOCDESK_AI_TEXT_MODEL") {
            self.ai.text_model = model;
        }
        set_parsed(&mut self.ai.request_timeout_secs, "DOCDESK_AI_TIMEOUT_SECS", &get);

        self
    }
}

fn set_parsed<T, F>(target: &mut T, key: &str, get: &F)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = get(key) else { return };
    match value.parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => tracing::warn!(key, value = %value, "Ignoring invalid configuration value"),
    }
}

fn parse_flag(key: &str, value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value, "Ignoring invalid configuration flag");
            None
        }
    }
}

/// Document desk MCP server
#[derive(Clone)]
pub struct DocDeskServer {
    resolver: Arc<SourceResolver>,
    ai: Option<Arc<dyn GenerativeService>>,
    tool_router: ToolRouter<Self>,
    /// Server configuration
    config: Arc<ServerConfig>,
}

fn default_page() -> u32 {
    1
}

fn default_image_scale() -> f64 {
    2.0
}

// ============================================================================
// Request/Response types for preview_page
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PreviewPageParams {
    /// PDF source
    pub source: FileSource,
    /// Page number (1-indexed, default: 1)
    #[serde(default = "default_page")]
    pub page: u32,
    /// Pixels per PDF point (default: 1.5). Use the same value for edit_pdf_page.
    #[serde(default)]
    pub scale: Option<f64>,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PreviewPageResult {
    pub source: String,
    pub page: u32,
    pub page_count: u32,
    pub scale: f64,
    /// Raster size in pixels; edit coordinates refer to this raster
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Page size in PDF points
    pub page_width: f64,
    pub page_height: f64,
    /// PNG raster, base64 encoded
    pub image_base64: String,
    pub output_cache_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for edit_pdf_page
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EditPdfPageParams {
    /// PDF source
    pub source: FileSource,
    /// Page number (1-indexed, default: 1)
    #[serde(default = "default_page")]
    pub page: u32,
    /// Pixels per PDF point the operations were authored at (default: 1.5)
    #[serde(default)]
    pub scale: Option<f64>,
    /// Edit operations in raster pixel coordinates, applied in order
    pub operations: Vec<EditOp>,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SkippedEdit {
    /// Creation index of the annotation within the operations list
    pub annotation: u64,
    pub reason: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct EditPdfPageResult {
    pub source: String,
    pub page: u32,
    pub output_cache_key: String,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub annotations_created: usize,
    /// Annotations written onto the page
    pub applied_count: usize,
    /// Whether freehand ink was written onto the page
    pub strokes_applied: bool,
    /// Annotations the document backend rejected; everything else was saved
    pub skipped: Vec<SkippedEdit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for merge_pdfs
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MergePdfsParams {
    /// PDF sources, merged in order
    pub sources: Vec<FileSource>,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct MergePdfsResult {
    pub source_count: u32,
    pub output_cache_key: String,
    pub output_page_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for split_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SplitPdfParams {
    /// PDF source
    pub source: FileSource,
    /// Pages to extract (e.g., "1-3,5", "z", "r2", "1-10:odd"). Default: all pages.
    #[serde(default)]
    pub pages: Option<String>,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
    /// Output ZIP file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ArchiveResult {
    pub source: String,
    /// Cache key of the ZIP archive
    pub output_cache_key: String,
    /// Archive entry names in order
    pub entries: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for pdf_to_images
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PdfToImagesParams {
    /// PDF source
    pub source: FileSource,
    /// Pixels per PDF point (default: 2.0)
    #[serde(default = "default_image_scale")]
    pub scale: f64,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
    /// Output ZIP file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

// ============================================================================
// Request/Response types for images_to_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ImagesToPdfParams {
    /// Image sources (PNG, JPEG, ...), one page each, in order
    pub sources: Vec<FileSource>,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ImagesToPdfResult {
    pub image_count: u32,
    pub output_cache_key: String,
    pub output_page_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for compress_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompressPdfParams {
    /// PDF source
    pub source: FileSource,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CompressPdfResult {
    pub source: String,
    pub output_cache_key: String,
    pub original_size: u64,
    pub compressed_size: u64,
    /// compressed_size / original_size
    pub compression_ratio: f64,
    pub bytes_saved: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for scan_documents
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScanDocumentsParams {
    /// Photos of documents, processed in order
    pub sources: Vec<FileSource>,
    /// Output ZIP file path for the scanned images (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ScanItemResult {
    pub source: String,
    /// Archive entry name stem
    pub name: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ScanDocumentsResult {
    pub items: Vec<ScanItemResult>,
    pub completed: usize,
    pub failed: usize,
    /// Cache key of the ZIP of completed scans (absent when none completed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for enhance_passport_photo
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PassportPhotoParams {
    /// Photo of the person
    pub source: FileSource,
    /// Suit colour (default: picked from a fixed palette)
    #[serde(default)]
    pub suit_color: Option<String>,
    /// Output file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PassportPhotoResult {
    pub source: String,
    pub suit_color: String,
    pub mime_type: String,
    pub image_base64: String,
    pub output_cache_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for generate_resume_content
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateResumeParams {
    /// Personal and career details of the candidate
    pub resume: ResumeData,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct GenerateResumeResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<GeneratedResumeContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for summarize_pdf
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SummarizePdfParams {
    /// PDF source
    pub source: FileSource,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SummarizePdfResult {
    pub source: String,
    pub summary: String,
    /// Characters of extracted text sent to the model
    pub characters_analyzed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for pdf_to_document_structure
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PdfToDocumentStructureParams {
    /// PDF source
    pub source: FileSource,
    /// Pixels per PDF point for the page images read by the model (default: 2.0)
    #[serde(default = "default_image_scale")]
    pub scale: f64,
    /// Password for encrypted PDFs
    #[serde(default)]
    pub password: Option<String>,
    /// Output JSON file path (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PageStructureResult {
    /// Page number (1-indexed)
    pub page: u32,
    pub elements: Vec<DocxElement>,
    /// Cached JPEG of the page, present when nothing was transcribed so it can be embedded instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PdfToDocumentStructureResult {
    pub source: String,
    pub pages: Vec<PageStructureResult>,
    /// Cache key of the page list as JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================

fn respond<T: Serialize>(result: T) -> String {
    let response = serde_json::json!({ "results": [result] });
    serde_json::to_string_pretty(&response).unwrap_or_default()
}

async fn run_blocking<T, F>(f: F) -> crate::error::Result<T>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin {
            reason: e.to_string(),
        })?
}

fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn scan_entry_name(source: &FileSource, index: usize, mime_type: &str) -> String {
    source.file_name().unwrap_or_else(|| {
        let ext = image::ImageFormat::from_mime_type(mime_type)
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("img");
        format!("document_{}.{}", index + 1, ext)
    })
}

#[tool_router]
impl DocDeskServer {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a server whose AI collaborator is built from `config.ai`
    pub fn with_config(config: ServerConfig) -> Self {
        let ai = match GeminiClient::new(config.ai.clone()) {
            Ok(client) => Some(Arc::new(client) as Arc<dyn GenerativeService>),
            Err(Error::AiNotConfigured) => {
                tracing::info!("No AI API key configured, AI tools are disabled");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "AI client unavailable, AI tools are disabled");
                None
            }
        };
        Self::with_services(config, ai)
    }

    /// Create a server with an explicit AI collaborator
    pub fn with_services(config: ServerConfig, ai: Option<Arc<dyn GenerativeService>>) -> Self {
        let cache = Arc::new(BlobCache::new(
            config.cache_max_entries,
            config.cache_max_bytes,
        ));
        let resolver = SourceResolver::new(
            ResolverConfig {
                resource_dirs: config.resource_dirs.clone(),
                allow_private_urls: config.allow_private_urls,
                max_download_bytes: config.max_download_bytes,
            },
            cache,
        );
        Self {
            resolver: Arc::new(resolver),
            ai,
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        }
    }

    /// Render a page for editing
    #[tool(
        description = "Render one PDF page as a PNG raster for editing. Returns the raster (base64) with its pixel size and the page size in points.

Coordinates for edit_pdf_page are pixels of this raster (origin top-left, y down); pass the same scale to both tools.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn preview_page(&self, Parameters(params): Parameters<PreviewPageParams>) -> String {
        let result = self
            .process_preview_page(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "preview_page failed");
                PreviewPageResult {
                    source: params.source.display_name(),
                    page: params.page,
                    page_count: 0,
                    scale: params.scale.unwrap_or(self.config.editor.default_render_scale),
                    pixel_width: 0,
                    pixel_height: 0,
                    page_width: 0.0,
                    page_height: 0.0,
                    image_base64: String::new(),
                    output_cache_key: String::new(),
                    error: Some(e.client_message()),
                }
            });
        respond(result)
    }

    /// Edit a page and burn the edits in
    #[tool(
        description = "Edit one PDF page and save the edits into the document. Operations use raster pixel coordinates from preview_page at the same scale and are applied in order:
- {\"op\": \"stroke\", \"points\": [[x, y], ...], \"mode\": \"draw\"|\"erase\", \"color\": \"#rrggbb\", \"width\": 3}
- {\"op\": \"add_text\", \"x\": 50, \"y\": 50, \"content\": \"...\", \"font_size\": 16, \"color\": \"#000000\"}
- {\"op\": \"add_image\", \"x\": 100, \"y\": 100, \"width\": 200, \"height\": 200, \"image_base64\": \"...\"}
- {\"op\": \"move\", \"target\": 1, \"x\": 10, \"y\": 10}, {\"op\": \"edit_text\", \"target\": 1, ...}, {\"op\": \"resize\", \"target\": 2, \"width\": 80, \"height\": 40}, {\"op\": \"remove\", \"target\": 1}
- {\"op\": \"reset_strokes\"}, {\"op\": \"undo_stroke\"}
target is the 1-based index of the annotation among those created by this list.

Ink is written as one image covering the page, then annotations in creation order. Annotations the PDF backend cannot write are reported in skipped; the rest are still saved.

The output is always cached (output_cache_key) for chaining with other tools.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn edit_pdf_page(&self, Parameters(params): Parameters<EditPdfPageParams>) -> String {
        let result = self
            .process_edit_pdf_page(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "edit_pdf_page failed");
                EditPdfPageResult {
                    source: params.source.display_name(),
                    page: params.page,
                    output_cache_key: String::new(),
                    pixel_width: 0,
                    pixel_height: 0,
                    annotations_created: 0,
                    applied_count: 0,
                    strokes_applied: false,
                    skipped: vec![],
                    output_path: None,
                    error: Some(e.client_message()),
                }
            });
        respond(result)
    }

    /// Merge multiple PDFs into one
    #[tool(
        description = "Merge multiple PDF files into a single PDF, pages in source order.

The output is always cached (output_cache_key) for chaining with other tools.

Source format: each element must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn merge_pdfs(&self, Parameters(params): Parameters<MergePdfsParams>) -> String {
        let result = self
            .process_merge_pdfs(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "merge_pdfs failed");
                MergePdfsResult {
                    source_count: params.sources.len() as u32,
                    output_cache_key: String::new(),
                    output_page_count: 0,
                    output_path: None,
                    error: Some(e.client_message()),
                }
            });
        respond(result)
    }

    /// Split a PDF into one PDF per page
    #[tool(
        description = "Split a PDF into single-page PDFs packaged as a ZIP archive with entries page_N.pdf.

Page selection examples: \"1-3,5\", \"z\" (last page), \"r2\" (second to last), \"1-10:even\". Default: every page.

The archive is always cached (output_cache_key).

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn split_pdf(&self, Parameters(params): Parameters<SplitPdfParams>) -> String {
        let result = self
            .process_split_pdf(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "split_pdf failed");
                ArchiveResult {
                    source: params.source.display_name(),
                    output_cache_key: String::new(),
                    entries: vec![],
                    output_path: None,
                    error: Some(e.client_message()),
                }
            });
        respond(result)
    }

    /// Render every page as a JPEG
    #[tool(
        description = "Convert every page of a PDF into a JPEG image, packaged as a ZIP archive with entries page_N.jpg. Scale is pixels per PDF point (default: 2.0).

The archive is always cached (output_cache_key).

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn pdf_to_images(&self, Parameters(params): Parameters<PdfToImagesParams>) -> String {
        let result = self
            .process_pdf_to_images(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "pdf_to_images failed");
                ArchiveResult {
                    source: params.source.display_name(),
                    output_cache_key: String::new(),
                    entries: vec![],
                    output_path: None,
                    error: Some(e.client_message()),
                }
            });
        respond(result)
    }

    /// Build a PDF from images
    #[tool(
        description = "Create a PDF with one page per image, in order. Each page is as large (in points) as its image is in pixels.

The output is always cached (output_cache_key) for chaining with other tools.

Source format: each element must be one of {\"path\": \"/absolute/path.png\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn images_to_pdf(&self, Parameters(params): Parameters<ImagesToPdfParams>) -> String {
        let result = self
            .process_images_to_pdf(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "images_to_pdf failed");
                ImagesToPdfResult {
                    image_count: params.sources.len() as u32,
                    output_cache_key: String::new(),
                    output_page_count: 0,
                    output_path: None,
                    error: Some(e.client_message()),
                }
            });
        respond(result)
    }

    /// Compress a PDF
    #[tool(
        description = "Reduce PDF size by compressing streams, packing objects into object streams and dropping unreferenced objects. Content is not rasterized.

The output is always cached (output_cache_key) for chaining with other tools.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn compress_pdf(&self, Parameters(params): Parameters<CompressPdfParams>) -> String {
        let result = self
            .process_compress_pdf(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "compress_pdf failed");
                CompressPdfResult {
                    source: params.source.display_name(),
                    output_cache_key: String::new(),
                    original_size: 0,
                    compressed_size: 0,
                    compression_ratio: 0.0,
                    bytes_saved: 0,
                    output_path: None,
                    error: Some(e.client_message()),
                }
            });
        respond(result)
    }

    /// Scan a batch of document photos
    #[tool(
        description = "Turn photos of documents into clean scans with the AI image model. Items are processed one by one in order; a failed item does not stop the batch.

Completed scans are packaged into a ZIP archive (entries scanned_<name>, in input order) cached under archive_cache_key. Each item reports its own status and error.

Source format: each element must be one of {\"path\": \"/absolute/path.jpg\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn scan_documents(&self, Parameters(params): Parameters<ScanDocumentsParams>) -> String {
        let result = self
            .process_scan_documents(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "scan_documents failed");
                ScanDocumentsResult {
                    items: vec![],
                    completed: 0,
                    failed: 0,
                    archive_cache_key: None,
                    output_path: None,
                    error: Some(e.client_message()),
                }
            });
        respond(result)
    }

    /// Retouch a photo into a passport photo
    #[tool(
        description = "Turn a photo of a person into a passport-style photo with the AI image model: plain background, formal suit, centred framing.

The output is always cached (output_cache_key) for chaining with other tools.

Source format: must be one of {\"path\": \"/absolute/path.jpg\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn enhance_passport_photo(
        &self,
        Parameters(params): Parameters<PassportPhotoParams>,
    ) -> String {
        let result = self
            .process_enhance_passport_photo(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "enhance_passport_photo failed");
                PassportPhotoResult {
                    source: params.source.display_name(),
                    suit_color: params.suit_color.clone().unwrap_or_default(),
                    mime_type: String::new(),
                    image_base64: String::new(),
                    output_cache_key: String::new(),
                    output_path: None,
                    error: Some(e.client_message()),
                }
            });
        respond(result)
    }

    /// Write resume sections
    #[tool(
        description = "Write a career objective, skills, responsibilities and a professional summary for a resume from the candidate's details, using the AI text model."
    )]
    async fn generate_resume_content(
        &self,
        Parameters(params): Parameters<GenerateResumeParams>,
    ) -> String {
        let result = match self.ai() {
            Ok(service) => ai::generate_resume_content(service.as_ref(), &params.resume).await,
            Err(e) => Err(e),
        };
        let result = match result {
            Ok(content) => GenerateResumeResult {
                content: Some(content),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "generate_resume_content failed");
                GenerateResumeResult {
                    content: None,
                    error: Some(e.client_message()),
                }
            }
        };
        respond(result)
    }

    /// Summarize a PDF
    #[tool(
        description = "Extract the text of a PDF and summarize it with the AI text model: a short summary followed by key takeaways. Only the first 8000 characters are analyzed.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn summarize_pdf(&self, Parameters(params): Parameters<SummarizePdfParams>) -> String {
        let result = self
            .process_summarize_pdf(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "summarize_pdf failed");
                SummarizePdfResult {
                    source: params.source.display_name(),
                    summary: String::new(),
                    characters_analyzed: 0,
                    error: Some(e.client_message()),
                }
            });
        respond(result)
    }

    /// Transcribe PDF pages into word-processor blocks
    #[tool(
        description = "Convert a PDF into the structure of a Word document. Each page is rendered as a JPEG and read by the AI model, which returns blocks: heading1, heading2, paragraph, bullet and table (with rows), plus bold, italic and alignment. Pages are processed in order; a page that fails or yields nothing gets an image_cache_key with its JPEG so it can be embedded as a picture.

Source format: must be one of {\"path\": \"/absolute/path.pdf\"}, {\"url\": \"https://...\"}, {\"base64\": \"...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn pdf_to_document_structure(
        &self,
        Parameters(params): Parameters<PdfToDocumentStructureParams>,
    ) -> String {
        let result = self
            .process_pdf_to_document_structure(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "pdf_to_document_structure failed");
                PdfToDocumentStructureResult {
                    source: params.source.display_name(),
                    pages: vec![],
                    output_cache_key: None,
                    output_path: None,
                    error: Some(e.client_message()),
                }
            });
        respond(result)
    }
}

impl DocDeskServer {
    fn ai(&self) -> crate::error::Result<Arc<dyn GenerativeService>> {
        self.ai.clone().ok_or(Error::AiNotConfigured)
    }

    fn check_scale(&self, scale: f64) -> crate::error::Result<f64> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(Error::InvalidRaster {
                detail: format!("render scale must be positive, got {}", scale),
            });
        }
        if scale > self.config.max_render_scale {
            return Err(Error::ImageDimensionExceeded {
                detail: format!(
                    "scale {} exceeds maximum {}",
                    scale, self.config.max_render_scale
                ),
            });
        }
        Ok(scale)
    }

    fn cache_output(&self, data: Vec<u8>, mime_type: &str) -> String {
        self.resolver.cache().insert(data, mime_type)
    }

    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        self.resolver.write_output(output_path.as_deref(), data)
    }

    async fn resolve_all(
        &self,
        sources: &[FileSource],
        kind: InputKind,
    ) -> crate::error::Result<Vec<Resolved>> {
        if sources.is_empty() {
            return Err(Error::SourceResolution {
                reason: "At least one source is required".to_string(),
            });
        }
        let mut resolved = Vec::with_capacity(sources.len());
        for source in sources {
            resolved.push(self.resolver.resolve(source, kind).await?);
        }
        Ok(resolved)
    }

    async fn process_preview_page(
        &self,
        params: &PreviewPageParams,
    ) -> crate::error::Result<PreviewPageResult> {
        let scale = self.check_scale(
            params
                .scale
                .unwrap_or(self.config.editor.default_render_scale),
        )?;
        let resolved = self.resolver.resolve(&params.source, InputKind::Pdf).await?;

        let data = resolved.data;
        let password = params.password.clone();
        let page = params.page;
        let max_pixels = self.config.max_image_pixels;
        let preview = run_blocking(move || {
            pdf::render_preview(&data, password.as_deref(), page, scale, max_pixels)
        })
        .await?;

        let image_base64 = encode_base64(&preview.png);
        let output_cache_key = self.cache_output(preview.png, "image/png");

        Ok(PreviewPageResult {
            source: resolved.source_name,
            page: preview.page,
            page_count: preview.page_count,
            scale: preview.raster.scale,
            pixel_width: preview.raster.pixel_width,
            pixel_height: preview.raster.pixel_height,
            page_width: preview.document_page.page_width,
            page_height: preview.document_page.page_height,
            image_base64,
            output_cache_key,
            error: None,
        })
    }

    async fn process_edit_pdf_page(
        &self,
        params: &EditPdfPageParams,
    ) -> crate::error::Result<EditPdfPageResult> {
        let scale = self.check_scale(
            params
                .scale
                .unwrap_or(self.config.editor.default_render_scale),
        )?;
        let resolved = self.resolver.resolve(&params.source, InputKind::Pdf).await?;

        let data = resolved.data;
        let password = params.password.clone();
        let page = params.page;
        let operations = params.operations.clone();
        let editor = self.config.editor.clone();
        let max_pixels = self.config.max_image_pixels;
        let edited = run_blocking(move || {
            pdf::edit_page(
                &data,
                password.as_deref(),
                page,
                scale,
                max_pixels,
                &operations,
                &editor,
            )
        })
        .await?;

        for skipped in &edited.burn_in.skipped {
            tracing::warn!(
                annotation = %skipped.id,
                reason = %skipped.reason,
                "Annotation not written"
            );
        }
        let skipped = edited
            .burn_in
            .skipped
            .iter()
            .map(|s| SkippedEdit {
                annotation: s.id.value(),
                reason: s.reason.clone(),
            })
            .collect();

        let output_path = self.write_output(&params.output_path, &edited.pdf)?;
        let output_cache_key = self.cache_output(edited.pdf, PDF_MIME);

        Ok(EditPdfPageResult {
            source: resolved.source_name,
            page,
            output_cache_key,
            pixel_width: edited.raster.pixel_width,
            pixel_height: edited.raster.pixel_height,
            annotations_created: edited.annotations_created,
            applied_count: edited.burn_in.applied_count,
            strokes_applied: edited.burn_in.strokes_applied,
            skipped,
            output_path,
            error: None,
        })
    }

    async fn process_merge_pdfs(
        &self,
        params: &MergePdfsParams,
    ) -> crate::error::Result<MergePdfsResult> {
        let resolved = self.resolve_all(&params.sources, InputKind::Pdf).await?;
        let source_count = resolved.len() as u32;
        let inputs: Vec<Vec<u8>> = resolved.into_iter().map(|r| r.data).collect();

        let (merged, output_page_count) = run_blocking(move || {
            let merged = qpdf::merge(&inputs)?;
            let pages = qpdf::page_count(&merged, None)?;
            Ok((merged, pages))
        })
        .await?;

        let output_path = self.write_output(&params.output_path, &merged)?;
        let output_cache_key = self.cache_output(merged, PDF_MIME);

        Ok(MergePdfsResult {
            source_count,
            output_cache_key,
            output_page_count,
            output_path,
            error: None,
        })
    }

    async fn process_split_pdf(
        &self,
        params: &SplitPdfParams,
    ) -> crate::error::Result<ArchiveResult> {
        let resolved = self.resolver.resolve(&params.source, InputKind::Pdf).await?;

        let data = resolved.data;
        let password = params.password.clone();
        let selection = params.pages.clone();
        let (zip, entries) = run_blocking(move || {
            let pages = qpdf::split_pages(&data, password.as_deref(), selection.as_deref())?;
            archive::package_pages(pages, "pdf")
        })
        .await?;

        let output_path = self.write_output(&params.output_path, &zip)?;
        let output_cache_key = self.cache_output(zip, ZIP_MIME);

        Ok(ArchiveResult {
            source: resolved.source_name,
            output_cache_key,
            entries,
            output_path,
            error: None,
        })
    }

    async fn process_pdf_to_images(
        &self,
        params: &PdfToImagesParams,
    ) -> crate::error::Result<ArchiveResult> {
        let scale = self.check_scale(params.scale)?;
        let resolved = self.resolver.resolve(&params.source, InputKind::Pdf).await?;

        let data = resolved.data;
        let password = params.password.clone();
        let max_pixels = self.config.max_image_pixels;
        let (zip, entries) = run_blocking(move || {
            let pages = pdf::render_pages_jpeg(&data, password.as_deref(), scale, max_pixels)?;
            archive::package_pages(pages, "jpg")
        })
        .await?;

        let output_path = self.write_output(&params.output_path, &zip)?;
        let output_cache_key = self.cache_output(zip, ZIP_MIME);

        Ok(ArchiveResult {
            source: resolved.source_name,
            output_cache_key,
            entries,
            output_path,
            error: None,
        })
    }

    async fn process_images_to_pdf(
        &self,
        params: &ImagesToPdfParams,
    ) -> crate::error::Result<ImagesToPdfResult> {
        let resolved = self.resolve_all(&params.sources, InputKind::Image).await?;
        let image_count = resolved.len() as u32;
        let images: Vec<Vec<u8>> = resolved.into_iter().map(|r| r.data).collect();

        let max_pixels = self.config.max_image_pixels;
        let (output, output_page_count) = run_blocking(move || {
            let output = pdf::images_to_pdf(&images, max_pixels)?;
            let pages = qpdf::page_count(&output, None)?;
            Ok((output, pages))
        })
        .await?;

        let output_path = self.write_output(&params.output_path, &output)?;
        let output_cache_key = self.cache_output(output, PDF_MIME);

        Ok(ImagesToPdfResult {
            image_count,
            output_cache_key,
            output_page_count,
            output_path,
            error: None,
        })
    }

    async fn process_compress_pdf(
        &self,
        params: &CompressPdfParams,
    ) -> crate::error::Result<CompressPdfResult> {
        let resolved = self.resolver.resolve(&params.source, InputKind::Pdf).await?;
        let original_size = resolved.data.len() as u64;

        let data = resolved.data;
        let password = params.password.clone();
        let output = run_blocking(move || qpdf::compress(&data, password.as_deref())).await?;

        let compressed_size = output.len() as u64;
        let compression_ratio = if original_size > 0 {
            compressed_size as f64 / original_size as f64
        } else {
            1.0
        };

        let output_path = self.write_output(&params.output_path, &output)?;
        let output_cache_key = self.cache_output(output, PDF_MIME);

        Ok(CompressPdfResult {
            source: resolved.source_name,
            output_cache_key,
            original_size,
            compressed_size,
            compression_ratio,
            bytes_saved: original_size as i64 - compressed_size as i64,
            output_path,
            error: None,
        })
    }

    async fn process_scan_documents(
        &self,
        params: &ScanDocumentsParams,
    ) -> crate::error::Result<ScanDocumentsResult> {
        let service = self.ai()?;
        if params.sources.is_empty() {
            return Err(Error::SourceResolution {
                reason: "At least one source is required".to_string(),
            });
        }

        let mut queue = BatchQueue::new();
        let mut slots: Vec<(String, std::result::Result<Uuid, (String, String)>)> =
            Vec::with_capacity(params.sources.len());
        for (index, source) in params.sources.iter().enumerate() {
            match self.resolver.resolve(source, InputKind::Image).await {
                Ok(resolved) => {
                    let name = scan_entry_name(source, index, &resolved.mime_type);
                    let id = queue.submit(name, resolved.mime_type, resolved.data);
                    slots.push((resolved.source_name, Ok(id)));
                }
                Err(e) => {
                    tracing::warn!(
                        source = %source.display_name(),
                        error = %e,
                        "Scan input could not be resolved"
                    );
                    let name = source
                        .file_name()
                        .unwrap_or_else(|| format!("document_{}", index + 1));
                    slots.push((source.display_name(), Err((name, e.client_message()))));
                }
            }
        }

        let mut updates = queue.subscribe();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => tracing::debug!(
                        id = %update.id,
                        name = %update.name,
                        status = ?update.status,
                        "Scan item status"
                    ),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::debug!(missed, "Scan status updates dropped")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let processor = Arc::new(ImagePromptProcessor::scanner(service));
        queue
            .run_concurrent(processor, self.config.batch_workers)
            .await;

        let mut items = Vec::with_capacity(slots.len());
        for (source, slot) in slots {
            let item = match slot {
                Ok(id) => match queue.get(id) {
                    Some(item) => ScanItemResult {
                        source,
                        name: item.name.clone(),
                        status: item.status,
                        output_cache_key: item.output.as_ref().map(|output| {
                            let mime = detect_mime(output).unwrap_or(item.mime_type.as_str());
                            self.cache_output(output.clone(), mime)
                        }),
                        error: item.error.clone(),
                    },
                    None => continue,
                },
                Err((name, error)) => ScanItemResult {
                    source,
                    name,
                    status: ItemStatus::Failed,
                    output_cache_key: None,
                    error: Some(error),
                },
            };
            items.push(item);
        }

        let archive = archive::package_completed(&queue, "scanned_")?;
        let (archive_cache_key, output_path) = match archive {
            Some(zip) => {
                let output_path = self.write_output(&params.output_path, &zip)?;
                (Some(self.cache_output(zip, ZIP_MIME)), output_path)
            }
            None => (None, None),
        };

        let completed = items
            .iter()
            .filter(|item| item.status == ItemStatus::Completed)
            .count();
        let failed = items.len() - completed;
        tracing::info!(completed, failed, "Document scan finished");

        Ok(ScanDocumentsResult {
            items,
            completed,
            failed,
            archive_cache_key,
            output_path,
            error: None,
        })
    }

    async fn process_enhance_passport_photo(
        &self,
        params: &PassportPhotoParams,
    ) -> crate::error::Result<PassportPhotoResult> {
        let service = self.ai()?;
        let resolved = self.resolver.resolve(&params.source, InputKind::Image).await?;

        let suit_color = params
            .suit_color
            .clone()
            .unwrap_or_else(|| prompts::pick_suit_color().to_string());
        let output = ai::enhance_passport_photo(
            service.as_ref(),
            &resolved.data,
            &resolved.mime_type,
            Some(&suit_color),
        )
        .await?;

        let mime_type = detect_mime(&output).unwrap_or("image/png").to_string();
        let image_base64 = encode_base64(&output);
        let output_path = self.write_output(&params.output_path, &output)?;
        let output_cache_key = self.cache_output(output, &mime_type);

        Ok(PassportPhotoResult {
            source: resolved.source_name,
            suit_color,
            mime_type,
            image_base64,
            output_cache_key,
            output_path,
            error: None,
        })
    }

    async fn process_summarize_pdf(
        &self,
        params: &SummarizePdfParams,
    ) -> crate::error::Result<SummarizePdfResult> {
        let service = self.ai()?;
        let resolved = self.resolver.resolve(&params.source, InputKind::Pdf).await?;

        let data = resolved.data;
        let password = params.password.clone();
        let text = run_blocking(move || pdf::extract_text(&data, password.as_deref())).await?;
        if text.trim().is_empty() {
            return Err(Error::InvalidPdf {
                reason: "document has no extractable text".to_string(),
            });
        }

        let summary = ai::summarize_text(service.as_ref(), &text).await?;
        Ok(SummarizePdfResult {
            source: resolved.source_name,
            summary,
            characters_analyzed: text.chars().count().min(prompts::SUMMARY_INPUT_LIMIT),
            error: None,
        })
    }

    async fn process_pdf_to_document_structure(
        &self,
        params: &PdfToDocumentStructureParams,
    ) -> crate::error::Result<PdfToDocumentStructureResult> {
        let service = self.ai()?;
        let scale = self.check_scale(params.scale)?;
        let resolved = self.resolver.resolve(&params.source, InputKind::Pdf).await?;

        let data = resolved.data;
        let password = params.password.clone();
        let max_pixels = self.config.max_image_pixels;
        let pages = run_blocking(move || {
            pdf::render_pages_jpeg(&data, password.as_deref(), scale, max_pixels)
        })
        .await?;

        let pages = self.structure_pages(service.as_ref(), pages).await;
        let json = serde_json::to_vec_pretty(&pages)?;
        let output_path = self.write_output(&params.output_path, &json)?;
        let output_cache_key = self.cache_output(json, "application/json");

        Ok(PdfToDocumentStructureResult {
            source: resolved.source_name,
            pages,
            output_cache_key: Some(output_cache_key),
            output_path,
            error: None,
        })
    }

    /// Transcribe rendered pages one at a time; a failing page does not stop the rest
    async fn structure_pages(
        &self,
        service: &dyn GenerativeService,
        pages: Vec<(u32, Vec<u8>)>,
    ) -> Vec<PageStructureResult> {
        let total = pages.len();
        let mut results = Vec::with_capacity(total);
        for (page, jpeg) in pages {
            tracing::info!(page, total, "Transcribing page");
            let (elements, error) = match ai::extract_page_structure(service, &jpeg).await {
                Ok(elements) => (elements, None),
                Err(e) => {
                    tracing::warn!(page, error = %e, "Page transcription failed");
                    (Vec::new(), Some(e.client_message()))
                }
            };
            let image_cache_key = elements
                .is_empty()
                .then(|| self.cache_output(jpeg, "image/jpeg"));
            results.push(PageStructureResult {
                page,
                elements,
                image_cache_key,
                error,
            });
        }
        results
    }
}

impl Default for DocDeskServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for DocDeskServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "DocDesk edits PDF pages (ink, text and images burned into the document), \
                 merges, splits, converts and compresses PDFs, and offers AI document scanning, \
                 Word-style page transcription, passport photos, resume writing and summaries. \
                 Every output is cached; pass {\"cache_key\": ...} to chain tools."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with configuration from the environment
pub async fn run_server() -> anyhow::Result<()> {
    run_server_with_config(ServerConfig::from_env()).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> anyhow::Result<()> {
    let server = DocDeskServer::with_config(config);

    tracing::info!("DocDesk MCP Server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::FakeService;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::io::Read;

    const PNG_HEADER: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
    ];

    fn png_source(tail: &[u8]) -> FileSource {
        let mut data = PNG_HEADER.to_vec();
        data.extend_from_slice(tail);
        FileSource::Base64 {
            base64: encode_base64(&data),
        }
    }

    fn server_with(service: FakeService) -> DocDeskServer {
        DocDeskServer::with_services(ServerConfig::default(), Some(Arc::new(service)))
    }

    fn first_result(response: &str) -> Value {
        let value: Value = serde_json::from_str(response).unwrap();
        value["results"][0].clone()
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert!(config.resource_dirs.is_empty());
        assert!(!config.allow_private_urls);
        assert_eq!(config.batch_workers, 1);
        assert_eq!(config.editor.default_render_scale, 1.5);
        assert_eq!(config.editor.burn_in.baseline_offset_em, 1.0);
        assert_eq!(config.ai.image_model, "gemini-2.5-flash-image");
        assert_eq!(config.ai.api_key, None);
    }

    #[test]
    fn test_config_overlay() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DOCDESK_RESOURCE_DIRS", "/srv/docs:/tmp/out"),
            ("DOCDESK_ALLOW_PRIVATE_URLS", "true"),
            ("DOCDESK_BATCH_WORKERS", "4"),
            ("DOCDESK_RENDER_SCALE", "2"),
            ("DOCDESK_TEXT_BASELINE_EM", "0.8"),
            ("DOCDESK_UNDO_MAX_BYTES", "1048576"),
            ("API_KEY", "secret"),
        ]);
        let config = ServerConfig::default().overlay(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.resource_dirs, vec!["/srv/docs", "/tmp/out"]);
        assert!(config.allow_private_urls);
        assert_eq!(config.batch_workers, 4);
        assert_eq!(config.editor.default_render_scale, 2.0);
        assert_eq!(config.editor.burn_in.baseline_offset_em, 0.8);
        assert_eq!(config.editor.undo_max_bytes, 1_048_576);
        assert_eq!(config.ai.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_config_overlay_ignores_invalid_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DOCDESK_BATCH_WORKERS", "0"),
            ("DOCDESK_MAX_RENDER_SCALE", "huge"),
            ("DOCDESK_ALLOW_PRIVATE_URLS", "maybe"),
            ("GEMINI_API_KEY", "  "),
        ]);
        let config = ServerConfig::default().overlay(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.batch_workers, 1);
        assert_eq!(config.max_render_scale, 10.0);
        assert!(!config.allow_private_urls);
        assert_eq!(config.ai.api_key, None);
    }

    #[test]
    fn test_params_deserialization() {
        let params: EditPdfPageParams = serde_json::from_value(json!({
            "source": {"path": "/docs/form.pdf"},
            "operations": [
                {"op": "stroke", "points": [[0, 0], [10, 10]]},
                {"op": "add_text", "content": "Approved"},
                {"op": "move", "target": 1, "x": 20, "y": 30}
            ]
        }))
        .unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.scale, None);
        assert_eq!(params.operations.len(), 3);

        let params: PdfToImagesParams =
            serde_json::from_value(json!({"source": {"cache_key": "abc"}})).unwrap();
        assert_eq!(params.scale, 2.0);

        let params: ScanDocumentsParams = serde_json::from_value(json!({
            "sources": [{"path": "/a.jpg"}, {"url": "https://x.test/b.png"}]
        }))
        .unwrap();
        assert_eq!(params.sources.len(), 2);
        assert_eq!(params.output_path, None);
    }

    #[rstest]
    #[case(1.5, true)]
    #[case(10.0, true)]
    #[case(10.5, false)]
    #[case(0.0, false)]
    #[case(-1.0, false)]
    #[case(f64::NAN, false)]
    fn test_check_scale(#[case] scale: f64, #[case] ok: bool) {
        let server = DocDeskServer::with_services(ServerConfig::default(), None);
        assert_eq!(server.check_scale(scale).is_ok(), ok);
    }

    #[rstest]
    #[case(FileSource::Path { path: "/in/receipt.jpg".into() }, "image/jpeg", "receipt.jpg")]
    #[case(FileSource::Base64 { base64: "AA".into() }, "image/png", "document_3.png")]
    #[case(FileSource::CacheRef { cache_key: "k".into() }, "image/jpeg", "document_3.jpg")]
    fn test_scan_entry_name(
        #[case] source: FileSource,
        #[case] mime: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(scan_entry_name(&source, 2, mime), expected);
    }

    #[tokio::test]
    async fn test_scan_documents_reports_each_item() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("scans.zip");
        let server = server_with(FakeService {
            fail_marker: Some(b"FAIL".to_vec()),
            ..FakeService::default()
        });

        let params = ScanDocumentsParams {
            sources: vec![
                png_source(b"one"),
                png_source(b"FAIL"),
                FileSource::Base64 {
                    base64: encode_base64(b"not an image"),
                },
                png_source(b"two"),
            ],
            output_path: Some(zip_path.display().to_string()),
        };
        let result = first_result(&server.scan_documents(Parameters(params)).await);

        assert_eq!(result["completed"], 2);
        assert_eq!(result["failed"], 2);
        let statuses: Vec<&str> = result["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["status"].as_str().unwrap())
            .collect();
        assert_eq!(statuses, vec!["completed", "failed", "failed", "completed"]);
        assert_eq!(result["items"][2]["error"], "Invalid image");

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&zip_path).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["scanned_document_1.png", "scanned_document_4.png"]);

        let mut first = Vec::new();
        archive.by_index(0).unwrap().read_to_end(&mut first).unwrap();
        assert!(first.starts_with(b"ai:"));
        assert!(first.ends_with(b"one"));

        let key = result["archive_cache_key"].as_str().unwrap();
        assert!(server.resolver.cache().contains(key));
    }

    #[tokio::test]
    async fn test_scan_documents_with_workers_keeps_order() {
        let config = ServerConfig {
            batch_workers: 3,
            ..ServerConfig::default()
        };
        let server = DocDeskServer::with_services(config, Some(Arc::new(FakeService::default())));
        let params = ScanDocumentsParams {
            sources: (0..5).map(|i| png_source(&[i])).collect(),
            output_path: None,
        };
        let result = server.process_scan_documents(&params).await.unwrap();

        assert_eq!(result.completed, 5);
        let names: Vec<&str> = result.items.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "document_1.png",
                "document_2.png",
                "document_3.png",
                "document_4.png",
                "document_5.png"
            ]
        );
    }

    #[tokio::test]
    async fn test_ai_tools_require_configuration() {
        let server = DocDeskServer::with_services(ServerConfig::default(), None);

        let scan = first_result(
            &server
                .scan_documents(Parameters(ScanDocumentsParams {
                    sources: vec![png_source(b"x")],
                    output_path: None,
                }))
                .await,
        );
        assert_eq!(scan["error"], "AI service is not configured");

        let resume = first_result(
            &server
                .generate_resume_content(Parameters(GenerateResumeParams {
                    resume: ResumeData::default(),
                }))
                .await,
        );
        assert_eq!(resume["error"], "AI service is not configured");
        assert!(resume.get("content").is_none());
    }

    #[tokio::test]
    async fn test_enhance_passport_photo() {
        let server = server_with(FakeService::default());
        let params = PassportPhotoParams {
            source: png_source(b"face"),
            suit_color: None,
            output_path: None,
        };
        let result = server.process_enhance_passport_photo(&params).await.unwrap();

        assert!(prompts::SUIT_COLORS.contains(&result.suit_color.as_str()));
        let cached = server.resolver.cache().get(&result.output_cache_key).unwrap();
        assert!(cached.data.starts_with(b"ai:"));
        assert_eq!(
            encode_base64(&cached.data),
            result.image_base64
        );
    }

    #[tokio::test]
    async fn test_generate_resume_content() {
        let server = server_with(FakeService {
            structured: json!({
                "careerObjective": "Deliver safe builds",
                "skills": ["Welding"],
                "responsibilities": ["Inspect joints"],
                "summary": "Ten years on site"
            }),
            ..FakeService::default()
        });
        let resume = ResumeData {
            full_name: "Sam Doe".into(),
            target_role: "Welder".into(),
            ..ResumeData::default()
        };
        let result = first_result(
            &server
                .generate_resume_content(Parameters(GenerateResumeParams { resume }))
                .await,
        );

        assert_eq!(result["content"]["skills"], json!(["Welding"]));
        assert!(result.get("error").is_none());
    }

    #[tokio::test]
    async fn test_merge_requires_sources() {
        let server = DocDeskServer::with_services(ServerConfig::default(), None);
        let result = first_result(
            &server
                .merge_pdfs(Parameters(MergePdfsParams {
                    sources: vec![],
                    output_path: None,
                }))
                .await,
        );
        assert_eq!(result["error"], "Failed to resolve source");
        assert_eq!(result["source_count"], 0);
    }

    #[tokio::test]
    async fn test_wrong_input_kind_is_rejected() {
        let server = server_with(FakeService::default());

        let images = server
            .process_images_to_pdf(&ImagesToPdfParams {
                sources: vec![FileSource::Base64 {
                    base64: encode_base64(b"%PDF-1.7"),
                }],
                output_path: None,
            })
            .await;
        assert!(matches!(images, Err(Error::InvalidImage { .. })));

        let summary = server
            .process_summarize_pdf(&SummarizePdfParams {
                source: png_source(b""),
                password: None,
            })
            .await;
        assert!(matches!(summary, Err(Error::InvalidPdf { .. })));
    }

    #[tokio::test]
    async fn test_missing_cache_key() {
        let server = DocDeskServer::with_services(ServerConfig::default(), None);
        let result = server
            .process_compress_pdf(&CompressPdfParams {
                source: FileSource::CacheRef {
                    cache_key: "missing".into(),
                },
                password: None,
                output_path: None,
            })
            .await;
        assert!(matches!(result, Err(Error::CacheKeyNotFound { .. })));
    }

    #[test]
    fn test_router_lists_every_tool() {
        let server = DocDeskServer::with_services(ServerConfig::default(), None);
        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "compress_pdf",
                "edit_pdf_page",
                "enhance_passport_photo",
                "generate_resume_content",
                "images_to_pdf",
                "merge_pdfs",
                "pdf_to_document_structure",
                "pdf_to_images",
                "preview_page",
                "scan_documents",
                "split_pdf",
                "summarize_pdf",
            ]
        );
        assert!(server.get_info().capabilities.tools.is_some());
    }

    #[tokio::test]
    async fn test_merge_then_split_by_cache_key() {
        let server = DocDeskServer::with_services(ServerConfig::default(), None);
        let pdf = crate::pdf::qpdf::testing::pdf_with_pages(&[(200, 100), (300, 150)]);
        let source = || FileSource::Base64 {
            base64: encode_base64(&pdf),
        };

        let merged = server
            .process_merge_pdfs(&MergePdfsParams {
                sources: vec![source(), source()],
                output_path: None,
            })
            .await
            .unwrap();
        assert_eq!(merged.output_page_count, 4);

        let split = server
            .process_split_pdf(&SplitPdfParams {
                source: FileSource::CacheRef {
                    cache_key: merged.output_cache_key,
                },
                pages: Some("z,1".to_string()),
                password: None,
                output_path: None,
            })
            .await
            .unwrap();
        assert_eq!(split.entries, vec!["page_4.pdf", "page_1.pdf"]);

        let zip = server
            .resolver
            .cache()
            .get(&split.output_cache_key)
            .unwrap();
        assert_eq!(zip.mime_type, ZIP_MIME);
    }

    #[tokio::test]
    async fn test_structure_pages_isolates_failures() {
        let service = FakeService {
            fail_marker: Some(b"BAD".to_vec()),
            structured: json!({ "elements": [{ "type": "paragraph", "text": "Hello" }] }),
            ..FakeService::default()
        };
        let server = DocDeskServer::with_services(ServerConfig::default(), None);
        let pages = vec![
            (1, b"jpeg one".to_vec()),
            (2, b"BAD jpeg".to_vec()),
            (3, b"jpeg three".to_vec()),
        ];

        let results = server.structure_pages(&service, pages).await;
        let numbers: Vec<u32> = results.iter().map(|r| r.page).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        assert_eq!(results[0].elements.len(), 1);
        assert!(results[0].image_cache_key.is_none());
        assert!(results[0].error.is_none());

        assert!(results[1].elements.is_empty());
        assert!(results[1].error.is_some());
        let key = results[1].image_cache_key.as_ref().unwrap();
        let blob = server.resolver.cache().get(key).unwrap();
        assert_eq!(*blob.data, b"BAD jpeg".to_vec());
        assert_eq!(blob.mime_type, "image/jpeg");

        assert_eq!(results[2].elements[0].text.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_document_structure_requires_ai() {
        let server = DocDeskServer::with_services(ServerConfig::default(), None);
        let result = server
            .process_pdf_to_document_structure(&PdfToDocumentStructureParams {
                source: FileSource::Base64 {
                    base64: encode_base64(b"%PDF-1.7"),
                },
                scale: 2.0,
                password: None,
                output_path: None,
            })
            .await;
        assert!(matches!(result, Err(Error::AiNotConfigured)));
    }
}
