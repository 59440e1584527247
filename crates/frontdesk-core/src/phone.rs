//! Free-form phone string coercion to E.164.

/// Normalize a free-form phone string to E.164, or `None` when the input
/// cannot be a dialable number.
///
/// Rules:
/// - Strip formatting characters (spaces, parens, dashes, dots).
/// - `+`-prefixed input keeps its country code; 7–15 digits total.
/// - Bare 10-digit input is presumed NANP and gains `+1`.
/// - Bare 11-digit input starting with `1` gains `+`.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if has_plus {
        if !(7..=15).contains(&digits.len()) || digits.starts_with('0') {
            return None;
        }
        return Some(format!("+{digits}"));
    }

    match digits.len() {
        10 => Some(format!("+1{digits}")),
        11 if digits.starts_with('1') => Some(format!("+{digits}")),
        _ => None,
    }
}

/// Last four digits of an already-normalized number, for masked display.
pub fn last_four(e164: &str) -> Option<&str> {
    let digits_start = e164.len().checked_sub(4)?;
    let tail = &e164[digits_start..];
    tail.chars().all(|c| c.is_ascii_digit()).then_some(tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanp_ten_digit_gains_country_code() {
        assert_eq!(
            normalize_phone("(555) 123-4567").as_deref(),
            Some("+15551234567")
        );
        assert_eq!(
            normalize_phone("555.123.4567").as_deref(),
            Some("+15551234567")
        );
    }

    #[test]
    fn eleven_digit_with_leading_one() {
        assert_eq!(
            normalize_phone("1 555 123 4567").as_deref(),
            Some("+15551234567")
        );
    }

    #[test]
    fn plus_prefixed_kept_verbatim() {
        assert_eq!(
            normalize_phone("+44 20 7946 0958").as_deref(),
            Some("+442079460958")
        );
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(normalize_phone("call me"), None);
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("12345"), None);
        // 12 digits without + or leading 1 is ambiguous.
        assert_eq!(normalize_phone("225551234567"), None);
    }

    #[test]
    fn plus_with_leading_zero_rejected() {
        assert_eq!(normalize_phone("+0123456789"), None);
    }

    #[test]
    fn last_four_of_e164() {
        assert_eq!(last_four("+15551234567"), Some("4567"));
        assert_eq!(last_four("+1"), None);
    }
}
