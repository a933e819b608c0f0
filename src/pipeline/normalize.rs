//! Field normalisation: untrusted model output → a well-formed [`BillRecord`].
//!
//! Every accessor here is total. Whatever the model put in a field (wrong
//! type, blank string, missing key) the result is a value the ledger table
//! accepts:
//!
//! | Field | Rule |
//! |-------|------|
//! | `category` | exact label → keyword table → `other` |
//! | `amount` | leading decimal number, absolute value, else `0` |
//! | `merchant` | trimmed text, else [`UNKNOWN_MERCHANT`] |
//! | `date` | kept if ≥ 10 characters, else reference "now" |
//! | `note` | trimmed text, else [`DEFAULT_NOTE`] |

use crate::output::{BillRecord, Category, DEFAULT_NOTE, UNKNOWN_MERCHANT};
use crate::pipeline::postprocess::RawBill;
use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

/// Format of ledger timestamps (`yyyy-MM-dd HH:mm:ss`).
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Extracted dates shorter than this many characters are replaced.
pub const MIN_DATE_CHARS: usize = 10;

/// Ordered keyword table. The first row with a matching keyword wins, so row
/// order is the tie-break when an input hits several categories.
pub const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::Food, &["食", "餐", "吃", "饮"]),
    (Category::Transport, &["交通", "车", "行", "路"]),
    (Category::Shopping, &["购", "买", "超", "店"]),
    (Category::Entertainment, &["玩", "乐", "游", "影"]),
    (Category::Housing, &["房", "住", "电", "水"]),
    (Category::Medical, &["医", "药", "病"]),
    (Category::Salary, &["薪", "资"]),
];

/// Build the ledger record from the model's field map.
///
/// `now` is the reference-zone time captured for this request; it is the
/// same instant that was shown to the model in the prompt.
pub fn normalize_bill(raw: &RawBill, now: DateTime<FixedOffset>) -> BillRecord {
    BillRecord {
        amount: normalize_amount(raw.get("amount")),
        merchant: text_or(raw.get("merchant"), UNKNOWN_MERCHANT),
        category: normalize_category(raw.get("category").and_then(Value::as_str)),
        date: normalize_date(raw.get("date"), now),
        note: text_or(raw.get("note"), DEFAULT_NOTE),
    }
}

// ── Category ─────────────────────────────────────────────────────────────────

/// Map any claimed category onto the closed set. Never fails.
pub fn normalize_category(input: Option<&str>) -> Category {
    let input = match input.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return Category::Other,
    };

    if let Some(exact) = Category::from_label(input) {
        return exact;
    }

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| input.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(Category::Other)
}

// ── Amount ───────────────────────────────────────────────────────────────────

/// Leading decimal number, optionally signed, optionally with an exponent.
static RE_LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-]?)(\d*\.?\d+)(?:[eE][+-]?\d+)?").unwrap());

/// Absolute amount, or zero when nothing numeric can be read.
///
/// A number outside the range of [`Decimal`] (about ±7.9e28) is also
/// recorded as zero, with a warning.
///
/// Strings are read up to the first character that cannot continue a number,
/// so `"12.5元"` is 12.5 while `"¥12.5"` and `"1,234"`'s tail are not read.
pub fn normalize_amount(value: Option<&Value>) -> Decimal {
    let parsed = match value {
        Some(Value::Number(n)) => parse_leading_decimal(&n.to_string()),
        Some(Value::String(s)) => parse_leading_decimal(s),
        _ => None,
    };
    parsed.map(|d| d.abs().normalize()).unwrap_or(Decimal::ZERO)
}

fn parse_leading_decimal(text: &str) -> Option<Decimal> {
    let caps = RE_LEADING_NUMBER.captures(text.trim_start())?;
    let whole = caps.get(0)?.as_str();
    // rust_decimal wants a digit before the point and no explicit plus sign.
    let sign = if &caps[1] == "-" { "-" } else { "" };
    let digits = &caps[2];
    let lead = if digits.starts_with('.') { "0" } else { "" };
    let exponent = &whole[caps[1].len() + digits.len()..];
    let number = format!("{sign}{lead}{digits}{exponent}");
    let parsed = if exponent.is_empty() {
        Decimal::from_str(&number)
    } else {
        Decimal::from_scientific(&number)
    };
    parsed
        .inspect_err(|e| warn!("Amount '{}' does not fit a decimal, recording 0: {}", whole, e))
        .ok()
}

// ── Text fields ──────────────────────────────────────────────────────────────

/// Trimmed text of a string or number field, else `fallback`.
fn text_or(value: Option<&Value>, fallback: &str) -> String {
    let text = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if text.is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

// ── Date ─────────────────────────────────────────────────────────────────────

/// Keep an extracted date of at least [`MIN_DATE_CHARS`] characters; replace
/// anything shorter, missing or non-textual by `now`.
pub fn normalize_date(value: Option<&Value>, now: DateTime<FixedOffset>) -> String {
    match value.and_then(Value::as_str).map(str::trim) {
        Some(date) if date.chars().count() >= MIN_DATE_CHARS => date.to_string(),
        _ => format_reference_time(now),
    }
}

/// Format a reference-zone instant as a ledger timestamp.
pub fn format_reference_time(now: DateTime<FixedOffset>) -> String {
    now.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 9, 21, 5, 7)
            .unwrap()
    }

    fn raw(value: Value) -> RawBill {
        match value {
            Value::Object(map) => map,
            other => panic!("fixture must be an object: {other}"),
        }
    }

    // ── category ──

    #[test]
    fn category_output_is_always_in_closed_set() {
        let inputs = [
            None,
            Some(""),
            Some("   "),
            Some("food"),
            Some("餐饮"),
            Some("午餐"),
            Some("打车"),
            Some("Supermarket"),
            Some("电影票"),
            Some("水电费"),
            Some("药房"),
            Some("工资"),
            Some("年终薪酬"),
            Some("🤷"),
            Some("zzz"),
            Some("FOOD"),
        ];
        for input in inputs {
            let c = normalize_category(input);
            assert!(Category::ALL.contains(&c), "{input:?} → {c:?}");
        }
    }

    #[test]
    fn exact_labels_pass_through() {
        for c in Category::ALL {
            assert_eq!(normalize_category(Some(c.as_str())), c);
            assert_eq!(normalize_category(Some(c.zh_label())), c);
        }
    }

    #[test]
    fn empty_or_absent_is_other() {
        assert_eq!(normalize_category(None), Category::Other);
        assert_eq!(normalize_category(Some("")), Category::Other);
        assert_eq!(normalize_category(Some(" \t")), Category::Other);
    }

    #[test]
    fn keyword_matches() {
        assert_eq!(normalize_category(Some("午饭")), Category::Other);
        assert_eq!(normalize_category(Some("外卖餐")), Category::Food);
        assert_eq!(normalize_category(Some("地铁交通卡")), Category::Transport);
        assert_eq!(normalize_category(Some("便利店")), Category::Shopping);
        assert_eq!(normalize_category(Some("游戏充值")), Category::Entertainment);
        assert_eq!(normalize_category(Some("房租")), Category::Housing);
        assert_eq!(normalize_category(Some("药品")), Category::Medical);
        assert_eq!(normalize_category(Some("薪酬")), Category::Salary);
    }

    #[test]
    fn english_words_only_match_exact_labels() {
        assert_eq!(normalize_category(Some(" food ")), Category::Food);
        for word in [
            "business",
            "sewage",
            "current account",
            "restore",
            "parent fee",
            "Omnibus",
            "Taxi ride",
            "Restaurant",
        ] {
            assert_eq!(normalize_category(Some(word)), Category::Other, "{word}");
        }
    }

    #[test]
    fn first_row_wins_on_ties() {
        // 餐 (food) and 车 (transport)
        assert_eq!(normalize_category(Some("餐车")), Category::Food);
        // 超 (shopping) and 药 (medical)
        assert_eq!(normalize_category(Some("超市药店")), Category::Shopping);
        // 电 (housing) and 影 (entertainment): entertainment row comes first
        assert_eq!(normalize_category(Some("电影")), Category::Entertainment);
    }

    #[test]
    fn unmatched_is_other() {
        assert_eq!(normalize_category(Some("donation")), Category::Other);
        assert_eq!(normalize_category(Some("捐款")), Category::Other);
    }

    // ── amount ──

    #[test]
    fn negative_string_amount_becomes_positive() {
        assert_eq!(normalize_amount(Some(&json!("-42.50"))), Decimal::new(425, 1));
        assert_eq!(normalize_amount(Some(&json!("-42.50"))).to_string(), "42.5");
    }

    #[test]
    fn numeric_amounts() {
        assert_eq!(normalize_amount(Some(&json!(18))), Decimal::new(18, 0));
        assert_eq!(normalize_amount(Some(&json!(-3.75))), Decimal::new(375, 2));
        assert_eq!(normalize_amount(Some(&json!("1e2"))), Decimal::new(100, 0));
    }

    #[test]
    fn amount_reads_leading_number_only() {
        assert_eq!(normalize_amount(Some(&json!("12.5元"))), Decimal::new(125, 1));
        assert_eq!(normalize_amount(Some(&json!("  7 CNY"))), Decimal::new(7, 0));
        assert_eq!(normalize_amount(Some(&json!("1,234.00"))), Decimal::new(1, 0));
        assert_eq!(normalize_amount(Some(&json!(".5"))), Decimal::new(5, 1));
        assert_eq!(normalize_amount(Some(&json!("+8."))), Decimal::new(8, 0));
    }

    #[test]
    fn unreadable_amount_is_zero() {
        for v in [json!("¥12"), json!("abc"), json!(""), json!(null), json!(true), json!([1])] {
            assert_eq!(normalize_amount(Some(&v)), Decimal::ZERO, "{v}");
        }
        assert_eq!(normalize_amount(None), Decimal::ZERO);
    }

    #[test]
    fn out_of_range_amount_is_zero() {
        for v in [
            json!("1e40"),
            json!(1e300),
            json!("12345678901234567890123456789012"),
        ] {
            assert_eq!(normalize_amount(Some(&v)), Decimal::ZERO, "{v}");
        }
        assert_eq!(
            normalize_amount(Some(&json!("79228162514264337593543950335"))),
            Decimal::MAX
        );
    }

    #[test]
    fn amount_is_never_negative() {
        for v in [json!(-0.01), json!("-0"), json!("-1e3"), json!(-99999999.99)] {
            assert!(!normalize_amount(Some(&v)).is_sign_negative(), "{v}");
        }
    }

    // ── text ──

    #[test]
    fn missing_text_fields_get_sentinels() {
        let record = normalize_bill(&raw(json!({})), fixed_now());
        assert_eq!(record.merchant, UNKNOWN_MERCHANT);
        assert_eq!(record.note, DEFAULT_NOTE);

        let record = normalize_bill(
            &raw(json!({"merchant": "  ", "note": null})),
            fixed_now(),
        );
        assert_eq!(record.merchant, UNKNOWN_MERCHANT);
        assert_eq!(record.note, DEFAULT_NOTE);
    }

    #[test]
    fn present_text_fields_are_trimmed() {
        let record = normalize_bill(
            &raw(json!({"merchant": " 7-Eleven ", "note": "snacks"})),
            fixed_now(),
        );
        assert_eq!(record.merchant, "7-Eleven");
        assert_eq!(record.note, "snacks");
    }

    // ── date ──

    #[test]
    fn short_date_falls_back_to_now() {
        assert_eq!(
            normalize_date(Some(&json!("2024")), fixed_now()),
            "2025-03-09 21:05:07"
        );
        assert_eq!(normalize_date(None, fixed_now()), "2025-03-09 21:05:07");
        assert_eq!(
            normalize_date(Some(&json!(20240501)), fixed_now()),
            "2025-03-09 21:05:07"
        );
    }

    #[test]
    fn well_formed_date_passes_through() {
        assert_eq!(
            normalize_date(Some(&json!("2024-05-01 12:00:00")), fixed_now()),
            "2024-05-01 12:00:00"
        );
        assert_eq!(
            normalize_date(Some(&json!("2024-05-01")), fixed_now()),
            "2024-05-01"
        );
    }

    #[test]
    fn date_length_counts_characters_not_bytes() {
        // 9 characters, 19 bytes
        assert_eq!(
            normalize_date(Some(&json!("2024年5月1日")), fixed_now()),
            "2025-03-09 21:05:07"
        );
    }

    #[test]
    fn full_record() {
        let bill = raw(json!({
            "amount": "-42.50",
            "merchant": "Lanzhou Noodles",
            "category": "午餐",
            "date": "2024-05-01 12:00:00",
            "note": "lunch"
        }));
        let record = normalize_bill(&bill, fixed_now());
        assert_eq!(record.amount, Decimal::new(425, 1));
        assert_eq!(record.category, Category::Food);
        assert_eq!(record.date, "2024-05-01 12:00:00");
    }
}
