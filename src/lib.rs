//! # edgequake-bill2ledger
//!
//! Turn receipt and bill photos into ledger rows using Vision Language Models.
//!
//! ## Why this crate?
//!
//! Receipts come in every layout, language and level of crumpledness. Rather
//! than template-matching OCR output, this crate shows the photo to a VLM,
//! asks for a handful of fields as JSON, and then treats the answer as
//! untrusted input: every field is normalised by total rules (closed category
//! set, non-negative amount, sentinels for missing text, a usable date) before
//! a single row is appended to the ledger.
//!
//! ## Pipeline Overview
//!
//! ```text
//! imageBase64
//!  │
//!  ├─ 1. Input      strip data URI, decode base64, sniff image format
//!  ├─ 2. Encode     ImageData for the multimodal request
//!  ├─ 3. VLM        one call to gpt-4.1-nano / claude / gemini / … (bounded)
//!  ├─ 4. Parse      strip ```json fences, require a JSON object
//!  ├─ 5. Normalise  category table, |amount|, sentinels, date fallback
//!  └─ 6. Persist    one INSERT into the ledger table (PostgREST)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use edgequake_bill2ledger::{IngestConfig, Ingestor, PostgrestStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgrestStore::new(
//!         "https://example.supabase.co",
//!         std::env::var("SUPABASE_SERVICE_ROLE_KEY")?,
//!         "transactions",
//!         30,
//!     )?;
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let ingestor = Ingestor::from_config(IngestConfig::default(), Arc::new(store)).await?;
//!     let output = ingestor.ingest(Some("data:image/jpeg;base64,/9j/4AAQ...")).await?;
//!     println!("{} {}", output.record.category, output.record.amount);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bill2ledger` binary (clap + anyhow + tracing-subscriber + dotenvy) |
//!
//! Disable `cli` when embedding the router or the pipeline in another service:
//! ```toml
//! edgequake-bill2ledger = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder};
pub use error::{Bill2LedgerError, IngestError};
pub use ingest::{resolve_provider, Ingestor};
pub use output::{BillRecord, Category, IngestOutput, IngestStats};
pub use pipeline::llm::{Completion, Extractor, VisionExtractor};
pub use server::{router, serve};
pub use store::{LedgerStore, MemoryStore, PostgrestStore};
