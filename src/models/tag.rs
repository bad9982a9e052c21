use std::fmt;

use serde::{Deserialize, Serialize};

use crate::normalize::TagNormalizer;

/// A stored tag value.
///
/// The text is always normalized (HTML-decoded, trimmed, lowercase) and
/// never empty, so two tags are equal exactly when they refer to the same
/// row of the tag table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag {
    text: String,
}

impl Tag {
    /// Creates a tag from raw input, normalizing it first.
    ///
    /// Returns `None` when the input is empty after normalization.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagr::Tag;
    ///
    /// let tag = Tag::new("  Red  ").expect("non-empty tag");
    /// assert_eq!(tag.text(), "red");
    /// assert!(Tag::new("   ").is_none());
    /// ```
    pub fn new(text: &str) -> Option<Self> {
        let text = TagNormalizer::normalize_tag(text);
        (!text.is_empty()).then_some(Self { text })
    }

    /// Returns the normalized tag text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consumes the tag, returning its text.
    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.text
    }
}
