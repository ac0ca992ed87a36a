//! Text helpers for file and directory names.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Fold accented letters to their ASCII base letter.
///
/// Letters are decomposed (NFKD) and their combining marks dropped. Stroked
/// letters have no decomposition and are mapped directly.
pub fn to_ascii_fallback(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' => 'd',
            'Đ' => 'D',
            'ł' => 'l',
            'Ł' => 'L',
            'ø' => 'o',
            'Ø' => 'O',
            _ => c,
        })
        .collect()
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^_,\-\d\w ]").unwrap())
}

/// Make `text` safe for use as a file or directory name.
///
/// Accents are folded, remaining non-ASCII characters dropped, anything other
/// than word characters, digits, `_`, `,`, `-` and spaces becomes a space.
pub fn slugify(text: &str) -> String {
    let ascii: String = to_ascii_fallback(text)
        .chars()
        .filter(|c| c.is_ascii())
        .collect();
    unsafe_chars().replace_all(&ascii, " ").trim().to_string()
}

/// `screenshot-007.png` or `screenshot-007-<slug>.png`
pub fn screenshot_file_name(index: u32, suffix: Option<&str>) -> String {
    match suffix.map(slugify).filter(|s| !s.is_empty()) {
        Some(slug) => format!("screenshot-{:03}-{}.png", index, slug),
        None => format!("screenshot-{:03}.png", index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_fallback() {
        assert_eq!(to_ascii_fallback("Việt Nam"), "Viet Nam");
        assert_eq!(to_ascii_fallback("Crème brûlée"), "Creme brulee");
        assert_eq!(to_ascii_fallback("Hello"), "Hello");
        assert_eq!(to_ascii_fallback("Łódź, Kraków"), "Lodz, Krakow");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("I tap on \"Login\""), "I tap on  Login");
        assert_eq!(slugify("résumé/cv.pdf"), "resume cv pdf");
        assert_eq!(slugify("a_b,c-d 1"), "a_b,c-d 1");
        assert_eq!(slugify("日本"), "");
        assert_eq!(slugify("Świeży źródło čaj"), "Swiezy zrodlo caj");
    }

    #[test]
    fn test_screenshot_file_name() {
        assert_eq!(screenshot_file_name(0, None), "screenshot-000.png");
        assert_eq!(
            screenshot_file_name(12, Some("I tap on Login")),
            "screenshot-012-I tap on Login.png"
        );
        assert_eq!(screenshot_file_name(3, Some("???")), "screenshot-003.png");
    }
}
