//! Abbreviated like-count parsing
//!
//! Like counts are rendered as "987", "12,345", "1.2K", "3M" or "1.1B".
//! Parsing reads the leading numeric prefix of the text, the way the page's
//! own formatting produces it, and ignores anything after it.

/// Error type for count parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CountError {
    #[error("Empty count text")]
    Empty,
    #[error("No numeric prefix in {0:?}")]
    NotANumber(String),
    #[error("Negative count in {0:?}")]
    Negative(String),
}

const BILLION: f64 = 1_000_000_000.0;
const MILLION: f64 = 1_000_000.0;
const THOUSAND: f64 = 1_000.0;

/// Parse an abbreviated count.
///
/// Thousands separators are removed first. A trailing `B`, `M` or `K` (any
/// case) scales the leading decimal; otherwise the leading integer is used,
/// so `"1.5"` reads as 1. Scaled values are rounded to the nearest integer.
pub fn parse_abbreviated(text: &str) -> Result<u64, CountError> {
    let cleaned: String = text.chars().filter(|&c| c != ',').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(CountError::Empty);
    }

    let scale = match cleaned.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('B') => Some(BILLION),
        Some('M') => Some(MILLION),
        Some('K') => Some(THOUSAND),
        _ => None,
    };

    let value = match scale {
        Some(scale) => decimal_prefix(cleaned).map(|v| v * scale),
        None => integer_prefix(cleaned),
    }
    .ok_or_else(|| CountError::NotANumber(text.to_string()))?;

    if !value.is_finite() {
        return Err(CountError::NotANumber(text.to_string()));
    }
    if value < 0.0 {
        return Err(CountError::Negative(text.to_string()));
    }

    Ok(value.round() as u64)
}

/// Find the first numeric token in an accessible label.
///
/// A token is a run of digits and commas with an optional fractional part,
/// followed by an optional `K`/`M`/`B` suffix after optional whitespace. The
/// suffix only counts when it is not the start of a longer word, so
/// "1,234 bookmarks" does not read as billions.
pub fn first_numeric_token(label: &str) -> Option<String> {
    let bytes = label.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;

    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b',') {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }

    let mut token = label[start..end].to_string();

    let mut next = end;
    while next < bytes.len() && bytes[next].is_ascii_whitespace() {
        next += 1;
    }
    if next < bytes.len() && matches!(bytes[next].to_ascii_uppercase(), b'K' | b'M' | b'B') {
        let ends_word = bytes
            .get(next + 1)
            .map_or(true, |b| !b.is_ascii_alphabetic());
        if ends_word {
            token.push(bytes[next] as char);
        }
    }

    Some(token)
}

/// Leading `[+-]?digits[.digits]` as a float.
fn decimal_prefix(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = sign_len(bytes);
    let mut digits = 0usize;

    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        digits += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            digits += 1;
        }
    }

    if digits == 0 {
        return None;
    }
    s[..end].parse().ok()
}

/// Leading `[+-]?digits` as a float (avoids overflow on absurd inputs).
fn integer_prefix(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let sign = sign_len(bytes);
    let mut end = sign;

    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }

    if end == sign {
        return None;
    }
    s[..end].parse().ok()
}

#[inline]
fn sign_len(bytes: &[u8]) -> usize {
    match bytes.first() {
        Some(b'+') | Some(b'-') => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(parse_abbreviated("1.2K"), Ok(1200));
        assert_eq!(parse_abbreviated("3M"), Ok(3_000_000));
        assert_eq!(parse_abbreviated("1.1B"), Ok(1_100_000_000));
        assert_eq!(parse_abbreviated("7k"), Ok(7000));
        assert_eq!(parse_abbreviated("2.5m"), Ok(2_500_000));
    }

    #[test]
    fn test_parse_plain() {
        assert_eq!(parse_abbreviated("12,345"), Ok(12345));
        assert_eq!(parse_abbreviated("987"), Ok(987));
        assert_eq!(parse_abbreviated("  42  "), Ok(42));
        assert_eq!(parse_abbreviated("0"), Ok(0));
        // Integer prefix only, like the page's own integer parsing
        assert_eq!(parse_abbreviated("1.5"), Ok(1));
        assert_eq!(parse_abbreviated("15 likes"), Ok(15));
    }

    #[test]
    fn test_parse_failures() {
        assert_eq!(parse_abbreviated(""), Err(CountError::Empty));
        assert_eq!(parse_abbreviated(" , "), Err(CountError::Empty));
        assert!(matches!(parse_abbreviated("Like"), Err(CountError::NotANumber(_))));
        assert!(matches!(parse_abbreviated("K"), Err(CountError::NotANumber(_))));
        assert!(matches!(parse_abbreviated("-5"), Err(CountError::Negative(_))));
        assert!(matches!(parse_abbreviated("-1.2K"), Err(CountError::Negative(_))));
    }

    #[test]
    fn test_first_numeric_token() {
        assert_eq!(
            first_numeric_token("like this video along with 1,234 other people"),
            Some("1,234".to_string())
        );
        assert_eq!(first_numeric_token("1.2K likes"), Some("1.2K".to_string()));
        assert_eq!(first_numeric_token("Like 3 M"), Some("3M".to_string()));
        assert_eq!(first_numeric_token("12 bookmarks"), Some("12".to_string()));
        assert_eq!(first_numeric_token("Like"), None);
    }

    #[test]
    fn test_youtube_like_labels() {
        let cases = [
            ("like this video along with 12K other people", "12K", 12_000),
            ("like this video along with 1.2M other people", "1.2M", 1_200_000),
            ("like this video along with 1,234,567 other people", "1,234,567", 1_234_567),
            ("like this video along with 1 other person", "1", 1),
            ("Like (3.4K)", "3.4K", 3_400),
        ];
        for (label, token, count) in cases {
            let found = first_numeric_token(label);
            assert_eq!(found.as_deref(), Some(token), "{}", label);
            assert_eq!(parse_abbreviated(token), Ok(count), "{}", label);
        }
    }
}
