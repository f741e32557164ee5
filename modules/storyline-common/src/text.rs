use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static RE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\B@[a-z0-9_-]+").unwrap());

const ELLIPSIS: &str = "...";

/// Shorten `text` to at most `limit` characters for a push body, ending in
/// `...` when anything was cut. Limits too small for the ellipsis cut hard.
pub fn trim_for_push(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit <= ELLIPSIS.len() {
        return text.chars().take(limit).collect();
    }
    let keep = limit - ELLIPSIS.len();
    let mut trimmed: String = text.chars().take(keep).collect();
    trimmed.push_str(ELLIPSIS);
    trimmed
}

/// Usernames mentioned as `@name`, lowercased, without the `@`, deduplicated.
///
/// An `@` directly after a word character (as in an email address) is not a
/// mention.
pub fn extract_mentions(text: &str) -> BTreeSet<String> {
    RE_MENTION
        .find_iter(text)
        .map(|m| m.as_str()[1..].to_lowercase())
        .collect()
}
