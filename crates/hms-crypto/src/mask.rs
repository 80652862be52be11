//! Display surrogates for low-privilege reads
//!
//! Each mask is a pure function of one field (or the record id). Nothing here
//! touches key material and nothing here can be reversed.

const CONTACT_PLACEHOLDER: &str = "XXX-XXX-XXXX";
const CONTACT_PREFIX: &str = "XXX-XXX-";
const CONTACT_VISIBLE_DIGITS: usize = 4;
const FILLER: char = 'X';

const TEXT_SENTINEL: &str = "REDACTED";
const TEXT_KEEP_CHARS: usize = 3;
const TEXT_SUFFIX: &str = "***";

/// `ANON_` followed by the id zero-padded to at least 4 digits.
///
/// Wider ids are emitted in full, never truncated.
pub fn mask_identity(record_id: i64) -> String {
    format!("ANON_{record_id:04}")
}

/// Reveal only the last four digits of a contact number.
///
/// Any Unicode digit counts, so `۱۲۳۴` is kept like `1234`. Other characters
/// are dropped; fewer than four digits are left-padded with `X`.
pub fn mask_contact(raw: Option<&str>) -> String {
    let raw = match raw {
        Some(r) if !r.is_empty() => r,
        _ => return CONTACT_PLACEHOLDER.to_string(),
    };

    let digits: Vec<char> = raw.chars().filter(|c| is_digit(*c)).collect();
    let tail = &digits[digits.len().saturating_sub(CONTACT_VISIBLE_DIGITS)..];

    let mut masked = String::with_capacity(CONTACT_PREFIX.len() + CONTACT_VISIBLE_DIGITS);
    masked.push_str(CONTACT_PREFIX);
    masked.extend(std::iter::repeat(FILLER).take(CONTACT_VISIBLE_DIGITS - tail.len()));
    masked.extend(tail);
    masked
}

/// Decimal digits in any script, plus digit forms such as `²` or `①`.
/// Letter-like numerals (`Ⅻ`) are excluded.
pub fn is_digit(c: char) -> bool {
    c.is_numeric() && !c.is_alphabetic()
}

/// First three characters of the first word, upper-cased, plus `***`.
///
/// Empty or whitespace-only text yields `REDACTED`.
pub fn mask_text(raw: Option<&str>) -> String {
    let first_word = match raw.and_then(|r| r.split_whitespace().next()) {
        Some(word) => word,
        None => return TEXT_SENTINEL.to_string(),
    };

    let prefix: String = first_word.chars().take(TEXT_KEEP_CHARS).collect();
    format!("{}{TEXT_SUFFIX}", prefix.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_identity_padding() {
        assert_eq!(mask_identity(7), "ANON_0007");
        assert_eq!(mask_identity(42), "ANON_0042");
        assert_eq!(mask_identity(9999), "ANON_9999");
    }

    #[test]
    fn test_mask_identity_wide_ids_not_truncated() {
        assert_eq!(mask_identity(12345), "ANON_12345");
    }

    #[test]
    fn test_mask_contact_last_four() {
        assert_eq!(mask_contact(Some("+92-300-1234567")), "XXX-XXX-4567");
        assert_eq!(mask_contact(Some("+92-321-5678901")), "XXX-XXX-8901");
    }

    #[test]
    fn test_mask_contact_placeholder() {
        assert_eq!(mask_contact(None), "XXX-XXX-XXXX");
        assert_eq!(mask_contact(Some("")), "XXX-XXX-XXXX");
        assert_eq!(mask_contact(Some("abc")), "XXX-XXX-XXXX");
    }

    #[test]
    fn test_mask_contact_non_ascii_digits() {
        assert_eq!(mask_contact(Some("+۹۲-۳۰۰-۱۲۳۴۵۶۷")), "XXX-XXX-۴۵۶۷");
        assert_eq!(mask_contact(Some("٠٣٠٠-12")), "XXX-XXX-٠٠12");
        assert_eq!(mask_contact(Some("Ⅻ 5")), "XXX-XXX-XXX5");
    }

    #[test]
    fn test_mask_contact_short_digits_padded() {
        assert_eq!(mask_contact(Some("ext. 12")), "XXX-XXX-XX12");
        assert_eq!(mask_contact(Some("5")), "XXX-XXX-XXX5");
    }

    #[test]
    fn test_mask_text() {
        assert_eq!(mask_text(Some("Type 2 Diabetes")), "TYP***");
        assert_eq!(mask_text(Some("asthma")), "AST***");
        assert_eq!(mask_text(Some("  migraine with aura")), "MIG***");
    }

    #[test]
    fn test_mask_text_short_word() {
        assert_eq!(mask_text(Some("Flu")), "FLU***");
        assert_eq!(mask_text(Some("a b")), "A***");
    }

    #[test]
    fn test_mask_text_sentinel() {
        assert_eq!(mask_text(None), "REDACTED");
        assert_eq!(mask_text(Some("")), "REDACTED");
        assert_eq!(mask_text(Some("   \t")), "REDACTED");
    }

    #[test]
    fn test_mask_text_counts_characters_not_bytes() {
        assert_eq!(mask_text(Some("Ödem der Beine")), "ÖDE***");
    }
}
