//! Tag text normalization.
//!
//! Every tag is stored in a single canonical form, so `"  Red  "`,
//! `"RED"` and `"&#82;ed"` all name the same row.

use std::borrow::Cow;
use std::collections::HashSet;

/// Normalization rules applied to tag text before storage or lookup.
pub struct TagNormalizer;

impl TagNormalizer {
    /// Normalizes a single tag.
    ///
    /// # Normalization rules
    ///
    /// - Decodes HTML character references (`&amp;`, `&#39;`, `&#x41;`, ...)
    /// - Trims leading/trailing whitespace
    /// - Converts to lowercase
    ///
    /// Inner whitespace and punctuation are kept. An empty result means the
    /// input names no tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagr::normalize::TagNormalizer;
    ///
    /// assert_eq!(TagNormalizer::normalize_tag("  Red  "), "red");
    /// assert_eq!(TagNormalizer::normalize_tag("Rock &amp; Roll"), "rock & roll");
    /// assert_eq!(TagNormalizer::normalize_tag("   "), "");
    /// ```
    #[must_use]
    pub fn normalize_tag(tag: &str) -> String {
        decode_html_entities(tag).trim().to_lowercase()
    }

    /// Normalizes a collection of tags, removing duplicates and empty strings.
    ///
    /// Preserves the order of first occurrence.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagr::normalize::TagNormalizer;
    ///
    /// let tags = TagNormalizer::normalize_tags(["Red", "red ", "", "Blue"]);
    /// assert_eq!(tags, vec!["red", "blue"]);
    /// ```
    #[must_use]
    pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        tags.into_iter()
            .map(|tag| Self::normalize_tag(tag.as_ref()))
            .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
            .collect()
    }

    /// Splits comma-separated input and normalizes each part.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagr::normalize::TagNormalizer;
    ///
    /// assert_eq!(TagNormalizer::split_tags(" Red, blue ,,red"), vec!["red", "blue"]);
    /// ```
    #[must_use]
    pub fn split_tags(input: &str) -> Vec<String> {
        Self::normalize_tags(input.split(','))
    }
}

/// Decodes named and numeric HTML character references.
///
/// Unknown or malformed references are left untouched.
pub fn decode_html_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        match decode_reference(tail) {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    Cow::Owned(out)
}

/// Decodes the reference at the start of `s` (which begins with `&`).
///
/// Returns the character and the number of bytes consumed, including `;`.
fn decode_reference(s: &str) -> Option<(char, usize)> {
    let end = s
        .char_indices()
        .take(12)
        .find(|&(_, c)| c == ';')
        .map(|(i, _)| i)?;
    let name = &s[1..end];

    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)?
        }
    };

    Some((ch, end + 1))
}
