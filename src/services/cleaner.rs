//! Normalization applied once to every extracted document.

/// Quote-like characters and their common mojibake spellings, mapped to ASCII.
const QUOTE_REPLACEMENTS: &[(&str, &str)] = &[
    ("â€œ", "\""),
    ("â€\u{9d}", "\""),
    ("â€™", "'"),
    ("â€˜", "'"),
    ("\u{201C}", "\""),
    ("\u{201D}", "\""),
    ("\u{201E}", "\""),
    ("\u{201F}", "\""),
    ("\u{00AB}", "\""),
    ("\u{00BB}", "\""),
    ("\u{2033}", "\""),
    ("\u{2018}", "'"),
    ("\u{2019}", "'"),
    ("\u{201A}", "'"),
    ("\u{201B}", "'"),
    ("\u{2032}", "'"),
    ("&apos;", "'"),
    ("&quot;", "\""),
];

/// Clean extracted text: ASCII quotes, ASCII only, no newlines, single spaces.
///
/// Idempotent.
pub fn clean(text: &str) -> String {
    let quoted = replace_unicode_quotes(text);
    let ascii = clean_non_ascii_chars(&quoted);
    let flat = ascii.replace(['\n', '\r'], "");
    collapse_whitespace(&flat)
}

pub fn replace_unicode_quotes(text: &str) -> String {
    QUOTE_REPLACEMENTS
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}

pub fn clean_non_ascii_chars(text: &str) -> String {
    text.chars().filter(char::is_ascii).collect()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
