//! Configuration for document digitization.
//!
//! All behaviour is controlled through [`DigitizerConfig`], built via its
//! [`DigitizerConfigBuilder`]. One struct holds every knob so a config can
//! be shared across tasks and logged as a whole.

use crate::error::DigitizeError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Default model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Upper bound for [`DigitizerConfig::retry_backoff_ms`]: one minute.
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// Configuration for a digitization run.
///
/// # Example
/// ```rust
/// use fra_digitizer::DigitizerConfig;
///
/// let config = DigitizerConfig::builder()
///     .model("gpt-4.1-mini")
///     .temperature(0.0)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DigitizerConfig {
    /// LLM model identifier, e.g. "gpt-4.1-mini", "gemini-2.0-flash".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for every stage. Default: 0.1.
    ///
    /// Transcription and field mapping reward faithfulness, not creativity.
    pub temperature: f32,

    /// Maximum tokens the model may generate per stage call. Default: 4096.
    ///
    /// A dense two-page claim form transcribes to roughly 1 500 tokens; the
    /// JSON wrapping adds little.
    pub max_tokens: usize,

    /// Extra attempts per capability call on provider failure. Default: 0.
    ///
    /// The pipeline itself never retries; this budget belongs to the LLM
    /// backend and is off unless asked for.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout enforced by the LLM backend, in seconds. Default: 60.
    /// `0` disables the timeout.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Largest document accepted, in bytes. Default: 20 MiB.
    ///
    /// Hosted multimodal APIs reject inline attachments above roughly 20 MB.
    pub max_document_bytes: usize,

    /// Most PDF pages rasterised and attached for extraction. Default: 10.
    ///
    /// Claim forms run one to four pages; later pages are skipped with a
    /// warning.
    pub max_pages: usize,

    /// Longest edge, in pixels, of a rasterised PDF page or a re-encoded
    /// TIFF/BMP scan. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Optional stage-transition observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DigitizerConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            max_document_bytes: 20 * 1024 * 1024,
            max_pages: 10,
            max_rendered_pixels: 2000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DigitizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigitizerConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("max_pages", &self.max_pages)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn StageProgressCallback>"),
            )
            .finish()
    }
}

impl DigitizerConfig {
    /// Create a new builder for `DigitizerConfig`.
    pub fn builder() -> DigitizerConfigBuilder {
        DigitizerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`DigitizerConfig`].
#[derive(Debug)]
pub struct DigitizerConfigBuilder {
    config: DigitizerConfig,
}

impl DigitizerConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_document_bytes(mut self, n: usize) -> Self {
        self.config.max_document_bytes = n;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DigitizerConfig, DigitizeError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(DigitizeError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.max_document_bytes == 0 {
            return Err(DigitizeError::InvalidConfig(
                "max_document_bytes must be ≥ 1".into(),
            ));
        }
        if c.max_retries > 10 {
            return Err(DigitizeError::InvalidConfig(format!(
                "max_retries must be 0–10, got {}",
                c.max_retries
            )));
        }
        if c.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(DigitizeError::InvalidConfig(format!(
                "retry_backoff_ms must be at most {MAX_RETRY_BACKOFF_MS}, got {}",
                c.retry_backoff_ms
            )));
        }
        if c.max_pages == 0 {
            return Err(DigitizeError::InvalidConfig(
                "max_pages must be ≥ 1".into(),
            ));
        }
        if !(100..=10_000).contains(&c.max_rendered_pixels) {
            return Err(DigitizeError::InvalidConfig(format!(
                "max_rendered_pixels must be 100–10000, got {}",
                c.max_rendered_pixels
            )));
        }
        Ok(self.config)
    }
}
