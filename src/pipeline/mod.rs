//! Pipeline stages for receipt-to-ledger ingestion.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the vendor-facing stage can be swapped without
//! touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm ──▶ postprocess ──▶ normalize
//! (base64)  (ImageData) (VLM)   (JSON object)   (BillRecord)
//! ```
//!
//! 1. [`input`]       — validate the `imageBase64` payload and sniff its format
//! 2. [`encode`]      — wrap the image for the multimodal API request body
//! 3. [`llm`]         — the [`llm::Extractor`] seam; the only stage with network I/O
//! 4. [`postprocess`] — strip markdown fences and parse the completion as an object
//! 5. [`normalize`]   — total field rules: category table, amount, defaults, date

pub mod encode;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod postprocess;
