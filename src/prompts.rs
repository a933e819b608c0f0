//! Extraction prompt for the receipt-reading VLM call.
//!
//! Centralising the prompt here keeps prompt wording out of the call and
//! parsing code, and lets unit tests inspect the exact text sent to the model.
//!
//! Callers can override the default via
//! [`crate::config::IngestConfig::extraction_prompt`]; the template below is
//! used only when no override is provided.

use crate::output::Category;

/// Default extraction instruction.
///
/// Placeholders: `{current_time}` (reference "now", `yyyy-MM-dd HH:mm:ss`),
/// `{current_year}` and `{categories}`.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are a bill parsing assistant. Analyse the receipt image and extract the bill.

The current reference time is: {current_time}

Return these fields:
1. amount: the total amount as a number.
2. merchant: the merchant name.
3. category: exactly one of [{categories}].
4. date: formatted as yyyy-MM-dd HH:mm:ss.
   - If the image shows a full date, copy it.
   - If the image shows only month and day (e.g. 12-21), complete it with the current reference year: {current_year}-12-21.
   - If the image shows no date at all, return: {current_time}.
5. note: a short remark.

Return plain JSON only. Do NOT wrap it in markdown fences and do NOT add any other text."#;

/// Comma-separated list of the closed category labels, in priority order.
pub fn category_list() -> String {
    Category::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render an extraction prompt template for the given reference time.
///
/// `current_time` must be formatted as `yyyy-MM-dd HH:mm:ss`; the year is
/// taken from its first four characters.
pub fn render_extraction_prompt(template: &str, current_time: &str) -> String {
    let current_year = current_time.get(..4).unwrap_or(current_time);
    template
        .replace("{current_time}", current_time)
        .replace("{current_year}", current_year)
        .replace("{categories}", &category_list())
}
