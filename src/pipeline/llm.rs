//! LLM-backed capabilities: the production [`DocumentCapabilities`].
//!
//! Each stage is one chat completion: the shared system prompt, then a user
//! message carrying the stage prompt (and, for extraction, the document as
//! attachments). The reply is parsed into the stage's output schema by
//! [`postprocess::parse_json_reply`]; a reply without that structure is a
//! `MissingOutput`, which the orchestrator turns into the stage's error.
//!
//! Extraction attachments come from [`render::prepare_attachments`]: PDF
//! pages are rasterised and TIFF/BMP scans re-encoded, so the provider only
//! ever sees PNG, JPEG, GIF or WebP.
//!
//! ## Retries and timeouts
//!
//! Both live here, not in the orchestrator. By default a call is attempted
//! once with a 60 s timeout. With `max_retries > 0`, provider errors and
//! timeouts are retried with exponential backoff (`retry_backoff_ms *
//! 2^(retry - 1)`, saturating); a reply that arrives but cannot be parsed is
//! not retried.

use crate::capability::DocumentCapabilities;
use crate::config::DigitizerConfig;
use crate::error::CapabilityError;
use crate::pipeline::encode::EncodedDocument;
use crate::pipeline::postprocess;
use crate::pipeline::render::{self, RenderLimits};
use crate::prompts::{
    normalization_prompt, recognition_prompt, structuring_prompt, EXTRACTION_PROMPT,
    SYSTEM_PROMPT,
};
use crate::schema::{
    ExtractionInput, ExtractionOutput, FieldResolutionInput, NormalizationInput,
    NormalizationOutput, RecognitionOutput, StructuredRecord,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Capabilities implemented with chat completions on an `LLMProvider`.
pub struct LlmCapabilities {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
    render_limits: RenderLimits,
}

impl fmt::Debug for LlmCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmCapabilities")
            .field("label", &self.label)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl LlmCapabilities {
    /// Wrap `provider`; `label` names it in logs (e.g. `"openai/gpt-4.1-nano"`).
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        label: impl Into<String>,
        config: &DigitizerConfig,
    ) -> Self {
        Self {
            provider,
            label: label.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
            render_limits: RenderLimits::from_config(config),
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    /// Send `messages` and return the reply text, retrying within budget.
    async fn complete(
        &self,
        stage: &str,
        messages: &[ChatMessage],
    ) -> Result<String, CapabilityError> {
        let start = Instant::now();
        let options = self.options();
        let mut last_err = CapabilityError::Provider("no attempt made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    stage, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.chat_once(messages, &options).await {
                Ok(content) => {
                    debug!(
                        "{}: reply of {} chars in {:?}",
                        stage,
                        content.len(),
                        start.elapsed()
                    );
                    return Ok(content);
                }
                Err(e) => {
                    warn!("{}: attempt {} failed: {}", stage, attempt + 1, e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    async fn chat_once(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, CapabilityError> {
        let call = self.provider.chat(messages, Some(options));
        let response = if self.api_timeout_secs == 0 {
            call.await
        } else {
            timeout(Duration::from_secs(self.api_timeout_secs), call)
                .await
                .map_err(|_| CapabilityError::Timeout {
                    secs: self.api_timeout_secs,
                })?
        }
        .map_err(|e| CapabilityError::Provider(e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`.
fn backoff_ms(base: u64, retry: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)))
}

#[async_trait]
impl DocumentCapabilities for LlmCapabilities {
    fn name(&self) -> &str {
        &self.label
    }

    async fn extract(&self, input: ExtractionInput) -> Result<ExtractionOutput, CapabilityError> {
        // The orchestrator already validated the URI; a failure here means a
        // caller bypassed it.
        let doc = EncodedDocument::parse(input.document_data_uri)
            .map_err(|e| CapabilityError::missing(e.to_string()))?;

        let attachments = render::prepare_attachments(&doc, self.render_limits)
            .await
            .map_err(|e| CapabilityError::Attachment(e.to_string()))?;

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user_with_images(EXTRACTION_PROMPT, attachments),
        ];
        let reply = self.complete("extract", &messages).await?;
        postprocess::parse_json_reply(&reply)
    }

    async fn normalize(
        &self,
        input: NormalizationInput,
    ) -> Result<NormalizationOutput, CapabilityError> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(normalization_prompt(&input.extracted_text)),
        ];
        let reply = self.complete("normalize", &messages).await?;
        postprocess::parse_json_reply(&reply)
    }

    async fn recognize(&self, text: String) -> Result<RecognitionOutput, CapabilityError> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(recognition_prompt(&text)),
        ];
        let reply = self.complete("recognize", &messages).await?;
        postprocess::parse_json_reply(&reply)
    }

    async fn structure(
        &self,
        input: FieldResolutionInput,
    ) -> Result<StructuredRecord, CapabilityError> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(structuring_prompt(&input)),
        ];
        let reply = self.complete("structure", &messages).await?;
        postprocess::parse_record_reply(&reply)
    }
}
