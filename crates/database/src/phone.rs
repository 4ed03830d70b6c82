//! Phone normalization and suffix matching.
//!
//! Lead phones arrive with inconsistent country and area-code prefixes
//! (`5511999998888`, `11999998888`, `+55 (11) 99999-8888`). Stored phones are
//! digits-only and compared on their trailing digits.

/// Minimum number of trailing digits that must agree for two phones to match.
pub const SUFFIX_MATCH_DIGITS: usize = 8;

/// Number of trailing digits compared when ranking several matches.
pub const SUFFIX_RANK_DIGITS: usize = 10;

/// Strip everything but ASCII digits.
pub fn normalize(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Last `n` digits of a normalized phone (the whole phone when shorter).
pub fn suffix(digits: &str, n: usize) -> &str {
    if digits.len() <= n {
        digits
    } else {
        &digits[digits.len() - n..]
    }
}

/// Number of trailing digits two normalized phones share, capped at
/// [`SUFFIX_RANK_DIGITS`].
pub fn shared_suffix_len(a: &str, b: &str) -> usize {
    a.bytes()
        .rev()
        .zip(b.bytes().rev())
        .take(SUFFIX_RANK_DIGITS)
        .take_while(|(x, y)| x == y)
        .count()
}

/// Whether two phones refer to the same lead.
///
/// Phones shorter than [`SUFFIX_MATCH_DIGITS`] only match exactly.
pub fn phones_match(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a.len() < SUFFIX_MATCH_DIGITS || b.len() < SUFFIX_MATCH_DIGITS {
        return a == b;
    }
    shared_suffix_len(&a, &b) >= SUFFIX_MATCH_DIGITS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("+55 (11) 99999-8888"), "5511999998888");
        assert_eq!(normalize("abc"), "");
    }

    #[test]
    fn test_suffix() {
        assert_eq!(suffix("5511999998888", 8), "99998888");
        assert_eq!(suffix("1234", 8), "1234");
    }

    #[test]
    fn test_country_code_drift_matches() {
        assert!(phones_match("5511999998888", "11999998888"));
        assert!(phones_match("+55 11 99999-8888", "999998888"));
    }

    #[test]
    fn test_ninth_digit_drift_matches() {
        assert!(phones_match("5511999998888", "551199998888"));
    }

    #[test]
    fn test_different_numbers_do_not_match() {
        assert!(!phones_match("5511999998888", "5511999997777"));
        assert!(!phones_match("", "5511999997777"));
    }

    #[test]
    fn test_short_numbers_need_exact_match() {
        assert!(phones_match("1234", "1234"));
        assert!(!phones_match("1234", "991234"));
    }

    #[test]
    fn test_shared_suffix_len_is_capped() {
        assert_eq!(shared_suffix_len("5511999998888", "5511999998888"), 10);
        assert_eq!(shared_suffix_len("5511999998888", "551199998888"), 8);
    }
}
