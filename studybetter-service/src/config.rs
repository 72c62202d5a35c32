//! Static configuration loaded once at startup.
//! Extraction thresholds are policy parameters with documented defaults;
//! they are not derived values and should not be "tuned" without evidence.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub groq: GroqConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Upload limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

/// Extraction cascade policy parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum trimmed length of combined native text before the next
    /// fallback tier is triggered.
    #[serde(default = "default_min_native_text_len")]
    pub min_native_text_len: usize,

    /// Minimum trimmed length an OCR trial must reach before the bare-default
    /// retry against the unpreprocessed image is attempted.
    #[serde(default = "default_ocr_floor_len")]
    pub ocr_floor_len: usize,

    /// DPI used when rasterizing PDF pages for full-page OCR.
    #[serde(default = "default_raster_dpi")]
    pub raster_dpi: f32,

    /// Upper bound on a single OCR recognition call. Expiry is treated the
    /// same as the engine producing no text for that unit.
    #[serde(default = "default_ocr_timeout_secs")]
    pub ocr_timeout_secs: u64,

    /// OCR language passed to the engine.
    #[serde(default = "default_ocr_language")]
    pub ocr_language: String,

    /// Extension point: whether legacy DOC files should attempt
    /// embedded-image OCR. Off by default; the legacy container has no
    /// addressable media in this design.
    #[serde(default)]
    pub doc_embedded_ocr: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_native_text_len: default_min_native_text_len(),
            ocr_floor_len: default_ocr_floor_len(),
            raster_dpi: default_raster_dpi(),
            ocr_timeout_secs: default_ocr_timeout_secs(),
            ocr_language: default_ocr_language(),
            doc_embedded_ocr: false,
        }
    }
}

/// Groq API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GroqConfig {
    #[serde(default = "default_groq_url")]
    pub api_url: String,

    #[serde(default = "default_groq_model")]
    pub model: String,

    /// API key; unset or placeholder means generation falls back to
    /// content-based items.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_groq_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GroqConfig {
    fn default() -> Self {
        Self {
            api_url: default_groq_url(),
            model: default_groq_model(),
            api_key: None,
            request_timeout_secs: default_groq_timeout_secs(),
        }
    }
}

impl GroqConfig {
    /// Check if the API key is usable (set and not a placeholder)
    pub fn is_configured(&self) -> bool {
        match &self.api_key {
            Some(key) => !key.is_empty() && key != "your-groq-api-key-here",
            None => false,
        }
    }
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_upload_bytes: default_max_upload_bytes(),
    }
}

pub(crate) fn default_max_upload_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_min_native_text_len() -> usize {
    50
}

fn default_ocr_floor_len() -> usize {
    10
}

fn default_raster_dpi() -> f32 {
    300.0
}

fn default_ocr_timeout_secs() -> u64 {
    60
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_groq_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_groq_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_groq_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_defaults() {
        let config = ExtractionConfig::default();
        assert_eq!(config.min_native_text_len, 50);
        assert_eq!(config.ocr_floor_len, 10);
        assert_eq!(config.raster_dpi, 300.0);
        assert!(!config.doc_embedded_ocr);
    }

    #[test]
    fn test_groq_configured() {
        let mut config = GroqConfig::default();
        assert!(!config.is_configured());

        config.api_key = Some("your-groq-api-key-here".to_string());
        assert!(!config.is_configured());

        config.api_key = Some("gsk_real_key".to_string());
        assert!(config.is_configured());
    }
}
