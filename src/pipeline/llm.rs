//! VLM interaction: send the receipt image plus instruction, get text back.
//!
//! The [`Extractor`] trait is the seam between the pipeline and the
//! inference vendor. [`VisionExtractor`] is the production implementation on
//! top of an `edgequake-llm` provider; tests plug in scripted extractors.
//!
//! There is no retry here. A failed or empty completion fails the request and
//! the caller decides whether to resubmit the image.

use crate::config::IngestConfig;
use crate::error::IngestError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw text answer of the model plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Something that can read a receipt image and answer in text.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Submit `image` with `instruction` and return the model's completion.
    ///
    /// Implementations report vendor errors as
    /// [`IngestError::InferenceFailed`]; they do not need to check for empty
    /// content, which the pipeline does uniformly.
    async fn extract(&self, image: ImageData, instruction: &str) -> Result<Completion, IngestError>;
}

/// [`Extractor`] backed by an `edgequake-llm` vision provider.
pub struct VisionExtractor {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl VisionExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &IngestConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl Extractor for VisionExtractor {
    /// ## Message Layout
    ///
    /// A single user message holding the instruction text and the receipt as
    /// an image attachment. Several OpenAI-compatible vision hosts ignore
    /// system messages when an image is present, so the instruction travels
    /// with the image.
    async fn extract(&self, image: ImageData, instruction: &str) -> Result<Completion, IngestError> {
        let messages = vec![ChatMessage::user_with_images(instruction, vec![image])];

        match self.provider.chat(&messages, Some(&self.options)).await {
            Ok(response) => {
                debug!(
                    "Extraction: {} input tokens, {} output tokens",
                    response.prompt_tokens, response.completion_tokens
                );
                Ok(Completion {
                    content: response.content,
                    prompt_tokens: response.prompt_tokens,
                    completion_tokens: response.completion_tokens,
                })
            }
            Err(e) => {
                let message = format!("{}", e);
                warn!("Extraction call failed: {}", message);
                Err(IngestError::InferenceFailed { message })
            }
        }
    }
}

/// Build `CompletionOptions` from the ingest config.
fn build_options(config: &IngestConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
