//! Error types for the edgequake-bill2ledger library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Bill2LedgerError`] — **Fatal**: the service cannot start at all
//!   (provider not configured, store URL unusable, port already taken).
//!   Surfaced once, at process start.
//!
//! * [`IngestError`] — **Per-request**: a single bill could not be ingested
//!   (missing image, model returned garbage, store rejected the row). Every
//!   variant maps onto an HTTP status via [`IngestError::http_status`] and is
//!   reported to the caller inside the JSON failure envelope.
//!
//! Neither type distinguishes transient from permanent failures: nothing in
//! the pipeline retries, so every per-request error is terminal.

use thiserror::Error;

/// Longest slice of a raw completion quoted back in error messages.
const RAW_EXCERPT_CHARS: usize = 200;

/// Fatal errors raised while configuring or starting the service.
#[derive(Debug, Error)]
pub enum Bill2LedgerError {
    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Store errors ──────────────────────────────────────────────────────
    /// The ledger store URL could not be parsed.
    #[error("Invalid ledger store URL '{url}': {reason}\nSet SUPABASE_URL to the project URL, e.g. https://<ref>.supabase.co")]
    InvalidStoreUrl { url: String, reason: String },

    /// The HTTP client for the ledger store could not be constructed.
    #[error("Failed to build ledger store client: {0}")]
    StoreClient(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Server errors ─────────────────────────────────────────────────────
    /// Could not bind the HTTP listener.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an I/O error.
    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Per-request failure of the ingestion pipeline.
///
/// Grouped by where the request failed: client input, the inference call,
/// the completion content, or the ledger store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    // ── Client input ──────────────────────────────────────────────────────
    /// The request did not carry an `imageBase64` payload (or it was blank).
    #[error("No image data received: provide a non-empty imageBase64 field")]
    MissingImage,

    /// The payload was present but is not a usable base64-encoded image.
    #[error("Invalid image payload: {reason}")]
    InvalidImage { reason: String },

    /// The request body could not be read as the expected JSON document.
    #[error("Invalid request body: {reason}")]
    InvalidBody { reason: String },

    // ── Inference ─────────────────────────────────────────────────────────
    /// The inference provider reported an error.
    #[error("Inference call failed: {message}")]
    InferenceFailed { message: String },

    /// The inference provider did not answer within the configured timeout.
    #[error("Inference call timed out after {secs}s")]
    InferenceTimeout { secs: u64 },

    /// The provider answered but the completion carried no text.
    #[error("Inference returned an empty completion")]
    EmptyCompletion,

    // ── Completion content ────────────────────────────────────────────────
    /// The completion is not a JSON object after fence stripping.
    #[error("Model returned malformed bill JSON ({detail}): {excerpt}")]
    MalformedCompletion { detail: String, excerpt: String },

    // ── Persistence ───────────────────────────────────────────────────────
    /// The ledger store rejected the insert or could not be reached.
    #[error("Failed to record bill: {detail}")]
    Persistence {
        status: Option<u16>,
        detail: String,
    },
}

impl IngestError {
    /// Build a [`IngestError::MalformedCompletion`], quoting at most
    /// 200 characters of the raw completion.
    pub fn malformed(detail: impl Into<String>, raw: &str) -> Self {
        let mut excerpt: String = raw.chars().take(RAW_EXCERPT_CHARS).collect();
        if raw.chars().count() > RAW_EXCERPT_CHARS {
            excerpt.push('\u{2026}');
        }
        IngestError::MalformedCompletion {
            detail: detail.into(),
            excerpt,
        }
    }

    /// `true` when the caller sent something unusable (HTTP 400).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::MissingImage
                | IngestError::InvalidImage { .. }
                | IngestError::InvalidBody { .. }
        )
    }

    /// HTTP status reported to the caller: 400 for client input, 500 for
    /// any downstream failure.
    pub fn http_status(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }
}
