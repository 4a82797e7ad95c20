use std::sync::LazyLock;

use regex::Regex;

use crate::services::pms::PmsBooking;

/// Number of trailing digits that identify a local mobile number.
pub const PHONE_SUFFIX_LEN: usize = 9;

/// Remark markers meaning the rate excludes breakfast. Case-sensitive.
const NO_BREAKFAST_MARKERS: &[&str] = &["OTAnfb", "不含早", "breakfast not included"];

static REMARKS_GUEST_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Guest Name:\s*([A-Za-z\s]+?)(?:\s+benefit|\s+request|$)")
        .expect("guest name pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breakfast {
    Included,
    Excluded,
}

impl Breakfast {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Included => "included",
            Self::Excluded => "excluded",
        }
    }
}

/// Display name for a PMS booking: structured name parts first, then the
/// name OTAs embed in remarks, then the raw unstructured name.
pub fn resolve_guest_name(booking: &PmsBooking) -> String {
    let raw = trimmed(booking.guest_name.as_deref()).unwrap_or_default();
    let last = trimmed(booking.guest_last_name.as_deref());
    let first = trimmed(booking.guest_first_name.as_deref());

    let structured = match (last, first) {
        (Some(last), Some(first)) => Some(format!("{last}{first}")),
        _ => None,
    };

    if let Some(name) = &structured {
        if name != raw {
            return name.clone();
        }
    }

    booking
        .remarks
        .as_deref()
        .and_then(extract_remarks_guest_name)
        .or(structured)
        .unwrap_or_else(|| raw.to_string())
}

pub fn extract_remarks_guest_name(remarks: &str) -> Option<String> {
    REMARKS_GUEST_NAME
        .captures(remarks)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Canonical local phone: last nine digits behind a single leading zero.
///
/// Lossy on purpose: country codes and extensions are discarded, and inputs
/// with fewer than nine digits pass through untouched.
pub fn normalize_phone(raw: &str) -> String {
    let digits = digits_only(raw);
    if digits.len() >= PHONE_SUFFIX_LEN {
        format!("0{}", &digits[digits.len() - PHONE_SUFFIX_LEN..])
    } else {
        raw.to_string()
    }
}

/// Up to the last nine digits of a phone number, used for walk-in matching.
pub fn phone_suffix(raw: &str) -> String {
    let digits = digits_only(raw);
    let start = digits.len().saturating_sub(PHONE_SUFFIX_LEN);
    digits[start..].to_string()
}

pub fn breakfast_from_remarks(remarks: Option<&str>) -> Breakfast {
    match remarks {
        Some(text) if NO_BREAKFAST_MARKERS.iter().any(|marker| text.contains(marker)) => {
            Breakfast::Excluded
        }
        _ => Breakfast::Included,
    }
}

/// Reference with its leading upper-case channel prefix removed
/// (`RMAG1671721966` -> `1671721966`). Chat-bot storage often keys by this form.
pub fn strip_alpha_prefix(reference: &str) -> &str {
    reference.trim_start_matches(|ch: char| ch.is_ascii_uppercase())
}

/// Trimmed, non-empty view of an optional string.
pub fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(last: &str, first: &str, name: &str, remarks: &str) -> PmsBooking {
        PmsBooking {
            booking_id: "A100".to_string(),
            guest_last_name: Some(last.to_string()),
            guest_first_name: Some(first.to_string()),
            guest_name: Some(name.to_string()),
            remarks: Some(remarks.to_string()),
            ..PmsBooking::default()
        }
    }

    #[test]
    fn structured_name_parts_are_concatenated() {
        let b = booking("王", "小明", "WANG XIAOMING", "");
        assert_eq!(resolve_guest_name(&b), "王小明");
    }

    #[test]
    fn remarks_name_is_extracted_when_parts_missing() {
        let b = booking("", "", "", "Guest Name: John Smith benefit early checkin");
        assert_eq!(resolve_guest_name(&b), "John Smith");

        let b = booking("", "", "Agoda Guest", "guest name: Jane Doe request high floor");
        assert_eq!(resolve_guest_name(&b), "Jane Doe");

        let b = booking("", "", "", "Guest Name: Ann Lee");
        assert_eq!(resolve_guest_name(&b), "Ann Lee");
    }

    #[test]
    fn raw_name_is_kept_without_remarks_pattern() {
        let b = booking("", "Mary", "Mary Chen", "late arrival");
        assert_eq!(resolve_guest_name(&b), "Mary Chen");
    }

    #[test]
    fn phone_keeps_last_nine_digits_behind_zero() {
        assert_eq!(normalize_phone("0912-345-678"), "0912345678");
        assert_eq!(normalize_phone("+886912345678"), "0912345678");
        assert_eq!(normalize_phone("12345"), "12345");
        assert_eq!(normalize_phone("ext. 12"), "ext. 12");
    }

    #[test]
    fn phone_normalization_is_idempotent() {
        for raw in ["0912345678", "+886 912 345 678", "(08) 882-5631", "123"] {
            let once = normalize_phone(raw);
            assert_eq!(normalize_phone(&once), once, "input {raw}");
        }
    }

    #[test]
    fn phone_suffix_takes_trailing_digits() {
        assert_eq!(phone_suffix("0912-345-678"), "912345678");
        assert_eq!(phone_suffix("+886912345678"), "912345678");
        assert_eq!(phone_suffix("12-34"), "1234");
        assert_eq!(phone_suffix(""), "");
    }

    #[test]
    fn alpha_prefix_is_stripped() {
        assert_eq!(strip_alpha_prefix("RMAG1671721966"), "1671721966");
        assert_eq!(strip_alpha_prefix("00605201"), "00605201");
        assert_eq!(strip_alpha_prefix("RMBK"), "");
        // Channel prefixes are upper-case; lower-case letters are part of the id.
        assert_eq!(strip_alpha_prefix("ab123"), "ab123");
        assert_eq!(strip_alpha_prefix("RMab12"), "ab12");
    }

    #[test]
    fn breakfast_defaults_to_included() {
        assert_eq!(breakfast_from_remarks(None), Breakfast::Included);
        assert_eq!(
            breakfast_from_remarks(Some("web001:官網優惠價")),
            Breakfast::Included
        );
        assert_eq!(
            breakfast_from_remarks(Some("OTAnfb:OTA定價不含早")),
            Breakfast::Excluded
        );
        assert_eq!(breakfast_from_remarks(Some("住宿不含早餐")), Breakfast::Excluded);
        assert_eq!(
            breakfast_from_remarks(Some("otanfb room only")),
            Breakfast::Included
        );
    }
}
