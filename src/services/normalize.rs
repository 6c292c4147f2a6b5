//! Canonical form used to compare cell text against the mapping table.

use once_cell::sync::Lazy;
use regex::Regex;

// `_x000D_` and friends, written by Excel for characters XML cannot hold,
// plus escape sequences that survived as literal text.
static ESCAPE_ARTIFACTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)_x[0-9a-f]{4}_|\\[nrt]").expect("valid escape regex"));

static ENUMERATION_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[-–—•*·]+|\(?\d{1,3}[.)]|\(?[a-z]\)|\(?[ivx]{1,4}\))\s+")
        .expect("valid prefix regex")
});

// Control, format, private-use and unassigned code points never print
static INVISIBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{Cc}\p{Cf}\p{Co}\p{Cn}\x{FFFD}]").expect("valid invisible regex")
});

/// Drops characters left behind by lossy decoding of malformed UTF-8.
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER && c != '\0')
        .collect()
}

/// Normalizes a cell value for lookup.
///
/// Invisible characters are dropped, escape artifacts become spaces, the
/// text is lowercased, whitespace runs collapse to one space and leading
/// enumeration markers such as `a)`, `1.` or `-` are stripped. Applying it
/// twice gives the same result as applying it once.
pub fn normalize_item(text: &str) -> String {
    let spaced: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let visible = INVISIBLE.replace_all(&spaced, "");

    let lowered = ESCAPE_ARTIFACTS.replace_all(&visible, " ").to_lowercase();
    let mut collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");

    while let Some(m) = ENUMERATION_PREFIX.find(&collapsed) {
        collapsed = collapsed[m.end()..].to_string();
    }

    collapsed
}
