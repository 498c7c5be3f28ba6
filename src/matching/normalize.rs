// src/matching/normalize.rs
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("invalid WHITESPACE_RUN"));

pub const MIN_TOKEN_LENGTH: usize = 2;

/// Canonical form of a raw field value, or `None` when nothing is left.
///
/// Transliterates to ASCII, collapses whitespace runs (newlines included) to a
/// single space, strips surrounding whitespace and quote characters, and
/// lower-cases. Applying it to its own output returns the same value.
pub fn normalize_value(raw: &str) -> Option<String> {
    let ascii = transliterate(raw);
    let collapsed = WHITESPACE_RUN.replace_all(&ascii, " ");
    let stripped = collapsed.trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'');
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_ascii_lowercase())
    }
}

/// `normalize_value` lifted over an absent value.
pub fn normalize_field(raw: Option<&str>) -> Option<String> {
    raw.and_then(normalize_value)
}

/// Replaces every non-ASCII character with its closest ASCII spelling.
/// Characters with no ASCII equivalent are dropped.
pub fn transliterate(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        if let Some(replacement) = special_case(c) {
            out.push_str(replacement);
            continue;
        }
        for decomposed in std::iter::once(c).nfkd() {
            if decomposed.is_ascii() {
                out.push(decomposed);
            } else if let Some(replacement) = special_case(decomposed) {
                out.push_str(replacement);
            } else if is_combining_mark(decomposed) {
                continue;
            }
        }
    }
    out
}

// Letters and punctuation that compatibility decomposition leaves non-ASCII.
fn special_case(c: char) -> Option<&'static str> {
    let replacement = match c {
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        'ø' => "o",
        'Ø' => "O",
        'đ' | 'ð' => "d",
        'Đ' | 'Ð' => "D",
        'ł' => "l",
        'Ł' => "L",
        'þ' => "th",
        'Þ' => "Th",
        'ı' => "i",
        'ħ' => "h",
        'Ħ' => "H",
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => "'",
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' | '«' | '»' => "\"",
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' | '\u{2015}' | '\u{2212}' => "-",
        '\u{2022}' | '·' => "*",
        '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{3000}' => " ",
        _ => return None,
    };
    Some(replacement)
}

/// Alphanumeric tokens of a normalized value, in order of appearance.
pub fn tokenize(value: &str) -> Vec<&str> {
    value
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| t.len() >= MIN_TOKEN_LENGTH)
        .collect()
}
