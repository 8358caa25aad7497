//! Text cleanup passes applied to extracted fields.
//!
//! Every pass is idempotent: applying it to its own output is a no-op.

use std::sync::LazyLock;

use regex::Regex;

/// Trim, then collapse each newline and the whitespace around it into one space.
pub fn clean_text(s: &str) -> String {
    static NEWLINE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s*\n\s*").expect("valid regex"));

    NEWLINE_RE.replace_all(s.trim(), " ").into_owned()
}

/// Strip wrapping quotation marks and whitespace from a quote.
///
/// Only applies when the unwrapped quote starts with a word character and is
/// at least two characters long; anything else is returned trimmed.
/// Guillemets are left alone, the publication builder keys off them.
pub fn clean_quote(s: &str) -> String {
    static QUOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"^[ “'"]*(\w.+?)[ '”"]*$"#).expect("valid regex")
    });

    let trimmed = s.trim();
    QUOTE_RE.replace(trimmed, "$1").trim().to_string()
}

/// Title-case a slug the way region links are spelled: `shadow-isles` -> `Shadow-Isles`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
