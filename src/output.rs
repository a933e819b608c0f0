//! Output types: the ledger record and per-ingestion statistics.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel stored when the model could not read a merchant name.
pub const UNKNOWN_MERCHANT: &str = "unknown merchant";

/// Sentinel stored when the model produced no note.
pub const DEFAULT_NOTE: &str = "auto-recorded by AI";

/// The closed set of ledger categories.
///
/// Serialised as the lowercase English label (`"food"`, `"transport"`, …).
/// Every record leaving the normaliser carries one of these eight values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Transport,
    Shopping,
    Entertainment,
    Housing,
    Medical,
    Salary,
    Other,
}

impl Category {
    /// All categories, in keyword-matching priority order with `Other` last.
    pub const ALL: [Category; 8] = [
        Category::Food,
        Category::Transport,
        Category::Shopping,
        Category::Entertainment,
        Category::Housing,
        Category::Medical,
        Category::Salary,
        Category::Other,
    ];

    /// Lowercase English label, as stored in the ledger.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Shopping => "shopping",
            Category::Entertainment => "entertainment",
            Category::Housing => "housing",
            Category::Medical => "medical",
            Category::Salary => "salary",
            Category::Other => "other",
        }
    }

    /// Canonical Chinese label of the same category.
    ///
    /// Receipts are frequently Chinese and models asked in English still
    /// answer with these labels, so they count as exact matches too.
    pub fn zh_label(self) -> &'static str {
        match self {
            Category::Food => "餐饮",
            Category::Transport => "交通",
            Category::Shopping => "购物",
            Category::Entertainment => "娱乐",
            Category::Housing => "居住",
            Category::Medical => "医疗",
            Category::Salary => "工资",
            Category::Other => "其他",
        }
    }

    /// Exact match against either label. No keyword heuristics here; see
    /// [`crate::pipeline::normalize::normalize_category`] for the total version.
    pub fn from_label(label: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == label || c.zh_label() == label)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalised ledger row, ready for insertion.
///
/// Field names match the columns of the ledger table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillRecord {
    /// Absolute amount; `0` when the model gave nothing parseable.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Merchant name or [`UNKNOWN_MERCHANT`].
    pub merchant: String,
    pub category: Category,
    /// `yyyy-MM-dd HH:mm:ss` as extracted, or the ingestion time in the
    /// reference time zone when the extracted value was unusable.
    pub date: String,
    /// Free-text note or [`DEFAULT_NOTE`].
    pub note: String,
}

/// Timing and token usage of a single ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Wall-clock time spent waiting on the inference provider.
    pub llm_duration_ms: u64,
    /// Wall-clock time of the whole pipeline, insert included.
    pub total_duration_ms: u64,
}

/// Result of a successful ingestion: the stored record plus stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutput {
    pub record: BillRecord,
    pub stats: IngestStats,
}
