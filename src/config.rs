//! Configuration types for bill ingestion.
//!
//! All pipeline behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. The config is resolved once at process start
//! and shared read-only by every request; nothing in it changes afterwards.
//!
//! Credentials are not part of it: provider API keys are read by
//! `edgequake-llm` from its own environment variables, and the ledger store
//! key lives inside [`crate::store::PostgrestStore`].

use crate::error::Bill2LedgerError;
use chrono::{FixedOffset, Offset, Utc};
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Offset of the reference time zone used when none is configured (UTC+8).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;

/// Configuration for the ingestion pipeline.
///
/// Built via [`IngestConfig::builder()`] or using [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_bill2ledger::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .model("Qwen/Qwen2-VL-72B-Instruct")
///     .api_timeout_secs(30)
///     .utc_offset_hours(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.api_timeout_secs, 30);
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the extraction call. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 512.
    pub max_tokens: usize,

    /// Upper bound on a single inference call, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Offset from UTC, in whole hours, of the reference time zone. Default: 8.
    ///
    /// "Now" in this zone is shown to the model (so month-day dates resolve
    /// against the right year) and substituted for unusable extracted dates.
    pub utc_offset_hours: i32,

    /// Custom extraction instruction. If None, uses the built-in prompt.
    ///
    /// The placeholders `{current_time}` and `{current_year}` are substituted
    /// before the call.
    pub extraction_prompt: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 512,
            api_timeout_secs: 60,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            extraction_prompt: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("utc_offset_hours", &self.utc_offset_hours)
            .field("extraction_prompt", &self.extraction_prompt.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }

    /// The reference time zone as a chrono offset.
    ///
    /// `build()` guarantees the hour count is in range; a hand-assembled
    /// config with a bogus value falls back to UTC+8.
    pub fn reference_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .or_else(|| FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600))
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
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

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn utc_offset_hours(mut self, hours: i32) -> Self {
        self.config.utc_offset_hours = hours;
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, Bill2LedgerError> {
        let c = &self.config;
        if !(-12..=14).contains(&c.utc_offset_hours) {
            return Err(Bill2LedgerError::InvalidConfig(format!(
                "UTC offset must be between -12 and +14 hours, got {}",
                c.utc_offset_hours
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(Bill2LedgerError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Bill2LedgerError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
