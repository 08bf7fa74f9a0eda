//! Placeholder discovery on a template's reference page.

use crate::document::Template;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Matches a bracketed token and captures its name.
static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]").unwrap());

/// Collect the distinct placeholder names on the reference page.
///
/// Only the first page is scanned. Names are trimmed. The result is
/// diagnostic: substitution does not depend on it.
pub fn extract_placeholders(template: &Template) -> BTreeSet<String> {
    let Some(page) = &template.reference_page else {
        return BTreeSet::new();
    };

    page.shapes
        .iter()
        .filter_map(|shape| shape.text())
        .flat_map(|text| placeholders_in(&text))
        .collect()
}

/// Placeholder names appearing in a piece of text, in order of appearance.
pub fn placeholders_in(text: &str) -> Vec<String> {
    PLACEHOLDER_REGEX
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}
