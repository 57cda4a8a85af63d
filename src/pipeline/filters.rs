//! Content policy checks applied before any page work starts.
//!
//! Checks run in rejection order: animated kind first (handled by the
//! pipeline directly), then the author ban list, then the forbidden-word
//! list. Adult-content markers do not reject; they flip the record's
//! visibility instead.

use crate::types::IllustTag;
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Bookmark-milestone tags, e.g. `500users入り`, say nothing about the work
/// itself and are dropped before translation lookup.
fn noise_tag_regex() -> Option<&'static Regex> {
    static NOISE_TAG: OnceLock<Option<Regex>> = OnceLock::new();
    NOISE_TAG
        .get_or_init(|| match Regex::new(r"^\d+users入り$") {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Invalid noise tag pattern: {}", e);
                None
            }
        })
        .as_ref()
}

/// Whether a tag is a bookmark-count marker rather than a descriptive tag.
pub(crate) fn is_noise_tag(name: &str) -> bool {
    noise_tag_regex().is_some_and(|re| re.is_match(name))
}

/// Whether a tag is one of the gallery's adult-content markers.
pub(crate) fn is_restriction_marker(name: &str) -> bool {
    matches!(name, "R-18" | "R-18G")
}

/// Find the first forbidden word appearing in any tag.
///
/// Each tag is checked as its original text and gallery translation joined
/// together, so a listed word matches regardless of which language the tag
/// was reported in. Matching is a case-insensitive substring test.
pub(crate) fn find_forbidden_word<'a>(
    tags: &[IllustTag],
    words: &'a [String],
) -> Option<&'a String> {
    if words.is_empty() {
        return None;
    }

    for tag in tags {
        let search_text = format!("{} {}", tag.name, tag.translated.as_deref().unwrap_or(""))
            .to_lowercase();

        for word in words {
            if !word.is_empty() && search_text.contains(&word.to_lowercase()) {
                return Some(word);
            }
        }
    }

    None
}
