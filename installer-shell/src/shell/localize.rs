// `[Key]` token localization for dialog titles and text.

use regex::Regex;
use std::sync::OnceLock;

fn token_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\[([A-Za-z_][A-Za-z0-9_.]*)\]").ok())
        .as_ref()
}

/// Replaces every `[Key]` whose key `lookup` knows; unknown tokens stay verbatim.
pub fn localize_text(text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let Some(pattern) = token_pattern() else {
        return text.to_string();
    };
    pattern
        .replace_all(text, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
