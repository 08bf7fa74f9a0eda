//! Style-preserving placeholder substitution.
//!
//! A placeholder is a key wrapped in literal square brackets. Substitution
//! works paragraph by paragraph: a matching paragraph has its text rewritten
//! and the first run's font style reapplied to the result.

use crate::document::{Paragraph, Shape, TextBlock, TextBody};
use crate::error::{Error, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

/// Effective key (`Column` or `Column_<slot>`) to cell value for one page.
pub type SlotReplacementMap = BTreeMap<String, String>;

/// A compiled set of replacements.
///
/// Keys are ordered by descending length (ties broken alphabetically) and
/// applied one after another in that order, so `[Name_2]` is always replaced
/// before `[Name]`. The combined pattern only answers whether any key occurs.
#[derive(Debug, Clone)]
pub struct Replacements {
    values: HashMap<String, String>,
    ordered_keys: Vec<String>,
    pattern: Option<Regex>,
}

impl Replacements {
    /// Build from key/value pairs. A `None` value substitutes as empty.
    ///
    /// Empty keys are ignored; later duplicates win.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut values = HashMap::new();
        for (key, value) in entries {
            let key = key.into();
            if key.is_empty() {
                continue;
            }
            values.insert(key, value.map(Into::into).unwrap_or_default());
        }

        let mut ordered_keys: Vec<String> = values.keys().cloned().collect();
        ordered_keys.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });

        let pattern = if ordered_keys.is_empty() {
            None
        } else {
            let alternation = ordered_keys
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            // Escaped literals only; the pattern cannot be invalid short of the size limit.
            match Regex::new(&format!(r"\[(?:{})\]", alternation)) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Falling back to per-key matching: {}", e);
                    None
                }
            }
        };

        Self {
            values,
            ordered_keys,
            pattern,
        }
    }

    /// Keys in matching order.
    pub fn keys(&self) -> &[String] {
        &self.ordered_keys
    }

    /// Whether there is nothing to replace.
    pub fn is_empty(&self) -> bool {
        self.ordered_keys.is_empty()
    }

    /// Whether `text` contains at least one bracketed key.
    pub fn matches(&self, text: &str) -> bool {
        match &self.pattern {
            Some(re) => re.is_match(text),
            None => self
                .ordered_keys
                .iter()
                .any(|k| text.contains(&bracketed(k))),
        }
    }

    /// Replace every bracketed key in `text` with its value.
    ///
    /// Each key is applied to the output of the previous one, so a value that
    /// contains the token of a later (shorter) key is substituted again.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for key in &self.ordered_keys {
            let token = bracketed(key);
            if !out.contains(&token) {
                continue;
            }
            let value = self.values.get(key).map(String::as_str).unwrap_or_default();
            out = out.replace(&token, value);
        }
        out
    }
}

impl From<&SlotReplacementMap> for Replacements {
    fn from(map: &SlotReplacementMap) -> Self {
        Self::from_entries(map.iter().map(|(k, v)| (k.as_str(), Some(v.as_str()))))
    }
}

fn bracketed(key: &str) -> String {
    format!("[{}]", key)
}

/// Substitute placeholders in every paragraph of a text block.
///
/// Returns whether any paragraph was rewritten.
pub fn substitute(block: &mut TextBlock, replacements: &Replacements) -> bool {
    let mut changed = false;
    for paragraph in &mut block.paragraphs {
        changed |= substitute_paragraph(paragraph, replacements);
    }
    changed
}

/// Substitute placeholders in one paragraph.
///
/// A paragraph without text runs is never rewritten: there is no style to carry over.
pub fn substitute_paragraph(paragraph: &mut Paragraph, replacements: &Replacements) -> bool {
    let original = paragraph.text();
    if !replacements.matches(&original) {
        return false;
    }

    let Some(reference) = paragraph.first_text_run() else {
        return false;
    };
    let style = reference.style.clone();

    let rewritten = replacements.apply(&original);
    if rewritten == original {
        return false;
    }

    paragraph.set_text(&rewritten, &style);
    true
}

/// Substitute placeholders in a shape, descending into groups.
///
/// Fails with [`Error::ShapeProcessing`] when a text body could not be read.
pub fn substitute_shape(shape: &mut Shape, replacements: &Replacements) -> Result<bool> {
    match shape {
        Shape::Text(text) => match &mut text.body {
            TextBody::Parsed(block) => Ok(substitute(block, replacements)),
            TextBody::Unreadable { reason, .. } => Err(Error::ShapeProcessing {
                shape: text.name.clone(),
                reason: reason.clone(),
            }),
        },
        Shape::Group(group) => {
            let mut changed = false;
            for child in &mut group.children {
                changed |= substitute_shape(child, replacements)?;
            }
            Ok(changed)
        }
        Shape::Picture(_) | Shape::Other(_) => Ok(false),
    }
}
