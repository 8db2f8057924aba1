//! Slug derivation for blog posts.

use regex::Regex;

lazy_static::lazy_static! {
    /// Characters that do not survive slugification (anything outside word
    /// characters, whitespace and hyphens).
    static ref NON_WORD: Regex = Regex::new(r"[^\w\s-]").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    /// Valid slug pattern: lowercase letters, numbers, and hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9_]+(?:-[a-z0-9_]+)*$").unwrap();
}

/// Derive a URL-safe slug from a post title: lowercase, strip punctuation,
/// collapse whitespace runs into single hyphens.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    WHITESPACE.replace_all(stripped.trim(), "-").into_owned()
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}
