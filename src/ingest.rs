//! Ingestion entry points: one receipt image in, one ledger row out.
//!
//! [`Ingestor`] owns the two outbound collaborators (an [`Extractor`] and a
//! [`LedgerStore`]) plus the immutable [`IngestConfig`], and runs the
//! pipeline stages in order for each request:
//!
//! ```text
//! validate ─▶ encode ─▶ extract (bounded) ─▶ parse ─▶ normalize ─▶ insert
//! ```
//!
//! The insert only happens when every earlier stage succeeded, so a failed
//! request never leaves a partial row behind.

use crate::config::IngestConfig;
use crate::error::{Bill2LedgerError, IngestError};
use crate::output::{IngestOutput, IngestStats};
use crate::pipeline::llm::{Extractor, VisionExtractor};
use crate::pipeline::{encode, input, normalize, postprocess};
use crate::prompts::{render_extraction_prompt, DEFAULT_EXTRACTION_PROMPT};
use crate::store::LedgerStore;
use chrono::{DateTime, FixedOffset, Utc};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Runs the ingestion pipeline. Cheap to share behind an `Arc`.
pub struct Ingestor {
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn LedgerStore>,
    config: IngestConfig,
}

impl fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor")
            .field("extractor", &"<dyn Extractor>")
            .field("store", &"<dyn LedgerStore>")
            .field("config", &self.config)
            .finish()
    }
}

impl Ingestor {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn LedgerStore>,
        config: IngestConfig,
    ) -> Self {
        Self {
            extractor,
            store,
            config,
        }
    }

    /// Resolve the configured vision provider and wrap it as the extractor.
    ///
    /// Fails fast when no provider can be configured, so a misconfigured
    /// deployment dies at start instead of on the first request.
    pub async fn from_config(
        config: IngestConfig,
        store: Arc<dyn LedgerStore>,
    ) -> Result<Self, Bill2LedgerError> {
        let provider = resolve_provider(&config).await?;
        info!(
            "Using LLM provider '{}' (model: {})",
            config.provider_name.as_deref().unwrap_or("auto"),
            config.model.as_deref().unwrap_or(DEFAULT_MODEL)
        );
        let extractor: Arc<dyn Extractor> = Arc::new(VisionExtractor::new(provider, &config));
        Ok(Self::new(extractor, store, config))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Current time in the reference time zone.
    pub fn reference_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.config.reference_offset())
    }

    /// Ingest one receipt at the current reference time.
    ///
    /// `image_base64` is the raw request field, absent or not.
    pub async fn ingest(&self, image_base64: Option<&str>) -> Result<IngestOutput, IngestError> {
        self.ingest_at(image_base64, self.reference_now()).await
    }

    /// Ingest one receipt with an explicit reference "now".
    ///
    /// `now` is shown to the model and substituted for unusable dates; one
    /// value serves both so the prompt and the fallback never disagree.
    pub async fn ingest_at(
        &self,
        image_base64: Option<&str>,
        now: DateTime<FixedOffset>,
    ) -> Result<IngestOutput, IngestError> {
        let total_start = Instant::now();

        // ── Step 1: Validate payload ─────────────────────────────────────────
        let image = input::validate_image(image_base64)?;
        info!(
            "Ingesting {} receipt ({} bytes)",
            image.mime_type, image.byte_len
        );

        // ── Step 2: Build the request ────────────────────────────────────────
        let current_time = normalize::format_reference_time(now);
        debug!("Reference time: {}", current_time);
        let template = self
            .config
            .extraction_prompt
            .as_deref()
            .unwrap_or(DEFAULT_EXTRACTION_PROMPT);
        let instruction = render_extraction_prompt(template, &current_time);
        let image_data = encode::encode_receipt(&image);

        // ── Step 3: Extraction call ──────────────────────────────────────────
        let llm_start = Instant::now();
        let timeout_secs = self.config.api_timeout_secs;
        let completion = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.extractor.extract(image_data, &instruction),
        )
        .await
        .map_err(|_| {
            warn!("Extraction call timed out after {}s", timeout_secs);
            IngestError::InferenceTimeout { secs: timeout_secs }
        })??;
        let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

        if completion.content.trim().is_empty() {
            warn!("Extraction returned an empty completion");
            return Err(IngestError::EmptyCompletion);
        }

        // ── Step 4: Clean + parse ────────────────────────────────────────────
        let raw = postprocess::parse_completion(&completion.content).inspect_err(|e| {
            warn!("{}", e);
        })?;

        // ── Step 5: Normalise ────────────────────────────────────────────────
        let record = normalize::normalize_bill(&raw, now);

        // ── Step 6: Persist ──────────────────────────────────────────────────
        self.store.insert(&record).await?;

        let stats = IngestStats {
            input_tokens: completion.prompt_tokens,
            output_tokens: completion.completion_tokens,
            llm_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Recorded {} {} at '{}' ({}ms, {} tokens in / {} out)",
            record.category,
            record.amount,
            record.merchant,
            stats.total_duration_ms,
            stats.input_tokens,
            stats.output_tokens
        );

        Ok(IngestOutput { record, stats })
    }
}

// ── Provider resolution ──────────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Bill2LedgerError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Bill2LedgerError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — used as-is.
/// 2. **Named provider + model** (`config.provider_name`) — built by
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key (`OPENAI_API_KEY`, …) from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Full auto-detection** (`ProviderFactory::from_env`).
pub async fn resolve_provider(
    config: &IngestConfig,
) -> Result<Arc<dyn LLMProvider>, Bill2LedgerError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Bill2LedgerError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set BILL2LEDGER_LLM_PROVIDER and the provider's API key (e.g. OPENAI_API_KEY).\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
