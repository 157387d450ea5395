//! Filename label extraction.
//!
//! A label identifies which configuration a render belongs to, e.g.
//! `BreakfastRoom_KiaraDawn_User_SingleBounce` for
//! `BreakfastRoom_KiaraDawn_User_SingleBounce_GI-1.1.1_1684_0.016680Reflection.png`.
//! Test images are matched to references by their label.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A non-empty label extracted from a filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    /// Wrap a caller-chosen label (used for single-pair runs).
    ///
    /// Returns `None` for empty or whitespace-only strings.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Option<Self> {
        let label = label.into();
        if label.trim().is_empty() { None } else { Some(Self(label)) }
    }

    /// The label text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

/// Rules for cutting a label out of a file stem.
///
/// 1. If `start_delimiter` is set and present, keep the text after its last
///    occurrence.
/// 2. Cut at the earliest occurrence of any `end_markers` entry. A marker
///    only counts as a whole token: an alphanumeric end of the marker must
///    not touch another alphanumeric character, so `test` ends `A_test` but
///    not `Latest_Kitchen`.
/// 3. Trim `trim_chars` from both ends.
///
/// # Example
///
/// ```
/// use flip_batch::batch::label::LabelRule;
///
/// let rule = LabelRule::default();
/// let label = rule.extract("BreakfastRoom_User_SingleBounce_GI-1.1.1_1684").unwrap();
/// assert_eq!(label.as_str(), "BreakfastRoom_User_SingleBounce");
/// assert_eq!(rule.extract("A_test").unwrap().as_str(), "A");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelRule {
    /// Text preceding the label.
    pub start_delimiter: Option<String>,
    /// Markers that end the label (e.g. a version token).
    pub end_markers: Vec<String>,
    /// Separator characters stripped from both ends.
    pub trim_chars: Vec<char>,
}

impl Default for LabelRule {
    fn default() -> Self {
        Self {
            start_delimiter: None,
            end_markers: vec!["GI-1.1".to_string(), "test".to_string()],
            trim_chars: vec!['_', '-', '.', ' '],
        }
    }
}

impl LabelRule {
    /// Set the start delimiter.
    #[must_use]
    pub fn with_start_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.start_delimiter = Some(delimiter.into());
        self
    }

    /// Replace the end markers.
    #[must_use]
    pub fn with_end_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.end_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Extract a label from a file stem (no directory, no extension).
    ///
    /// Returns `None` when nothing is left after cutting and trimming.
    #[must_use]
    pub fn extract(&self, stem: &str) -> Option<Label> {
        let mut text = stem;

        if let Some(delim) = self.start_delimiter.as_deref().filter(|d| !d.is_empty()) {
            if let Some(pos) = text.rfind(delim) {
                text = &text[pos + delim.len()..];
            }
        }

        let cut = self
            .end_markers
            .iter()
            .filter(|m| !m.is_empty())
            .filter_map(|m| find_token(text, m))
            .min();
        if let Some(cut) = cut {
            text = &text[..cut];
        }

        let text = text.trim_matches(|c| self.trim_chars.contains(&c));
        Label::new(text)
    }

    /// Extract a label from a path's file stem.
    #[must_use]
    pub fn extract_from_path(&self, path: &Path) -> Option<Label> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| self.extract(s))
    }
}

/// First occurrence of `marker` in `text` not glued to surrounding
/// alphanumerics.
fn find_token(text: &str, marker: &str) -> Option<usize> {
    let glued = |a: Option<char>, b: Option<char>| {
        matches!((a, b), (Some(a), Some(b)) if a.is_alphanumeric() && b.is_alphanumeric())
    };
    text.match_indices(marker).map(|(pos, _)| pos).find(|&pos| {
        let before = text[..pos].chars().next_back();
        let after = text[pos + marker.len()..].chars().next();
        !glued(before, marker.chars().next()) && !glued(marker.chars().next_back(), after)
    })
}
