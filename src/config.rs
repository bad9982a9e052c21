//! Tagging configuration read from the environment.
//!
//! Parsed at startup; a `.env` file is honored when the binary loads it first.

use std::path::PathBuf;

use anyhow::Result;

use crate::error::TagError;
use crate::models::SortDirection;
use crate::normalize::TagNormalizer;
use crate::registry::{RelatedOrdering, TagTypeSpec};

/// Settings for the store and the single tag type the CLI works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggingConfig {
    /// Database path override (`TAGR_DB`).
    pub db_path: Option<PathBuf>,
    /// Tag table (`TAGR_TAG_TABLE`, default `tags`).
    pub tag_table: String,
    /// Tag text column (`TAGR_TAG_COLUMN`, default `tag`).
    pub tag_column: String,
    /// Preset tags (`TAGR_PRESETS`, comma-separated).
    pub presets: Vec<String>,
    /// Per related type orderings (`TAGR_ORDERINGS`).
    pub orderings: Vec<(String, RelatedOrdering)>,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            tag_table: "tags".to_string(),
            tag_column: "tag".to_string(),
            presets: Vec::new(),
            orderings: Vec::new(),
        }
    }
}

impl TaggingConfig {
    /// Parses configuration from environment variables.
    ///
    /// Falls back to defaults when variables are unset or empty.
    ///
    /// # Environment Variables
    ///
    /// - `TAGR_DB` (path): database file
    /// - `TAGR_TAG_TABLE` (default `tags`): tag table
    /// - `TAGR_TAG_COLUMN` (default `tag`): tag text column
    /// - `TAGR_PRESETS` (e.g. `featured,news`): preset tags
    /// - `TAGR_ORDERINGS` (e.g. `posts=title,photos=taken_at:desc`): sort proxies
    ///
    /// # Errors
    ///
    /// Returns [`TagError::InvalidOrdering`] for a malformed `TAGR_ORDERINGS` entry.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let orderings = match var("TAGR_ORDERINGS") {
            Some(raw) => parse_orderings(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            db_path: var("TAGR_DB").map(PathBuf::from),
            tag_table: var("TAGR_TAG_TABLE").unwrap_or(defaults.tag_table),
            tag_column: var("TAGR_TAG_COLUMN").unwrap_or(defaults.tag_column),
            presets: var("TAGR_PRESETS")
                .map(|raw| TagNormalizer::split_tags(&raw))
                .unwrap_or_default(),
            orderings,
        })
    }

    /// Registry input for the configured tag type.
    pub fn to_spec(&self) -> TagTypeSpec {
        self.orderings.iter().fold(
            TagTypeSpec::new(&self.tag_table, &self.tag_column).presets(self.presets.clone()),
            |spec, (related, ordering)| spec.ordering(related, ordering.clone()),
        )
    }
}

/// Parses `related=column[:asc|:desc]` entries separated by commas.
///
/// # Examples
///
/// ```
/// use tagr::config::parse_orderings;
/// use tagr::registry::RelatedOrdering;
///
/// let orderings = parse_orderings("posts=title, photos=taken_at:desc").unwrap();
/// assert_eq!(orderings[0], ("posts".to_string(), RelatedOrdering::ascending("title")));
/// assert_eq!(orderings[1], ("photos".to_string(), RelatedOrdering::descending("taken_at")));
/// ```
pub fn parse_orderings(raw: &str) -> Result<Vec<(String, RelatedOrdering)>, TagError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = || TagError::InvalidOrdering(entry.to_string());

            let (related, rest) = entry.split_once('=').ok_or_else(invalid)?;
            let (proxy, direction) = match rest.split_once(':') {
                Some((proxy, direction)) => {
                    (proxy, direction.parse::<SortDirection>().map_err(|_| invalid())?)
                }
                None => (rest, SortDirection::Ascending),
            };

            let (related, proxy) = (related.trim(), proxy.trim());
            if related.is_empty() || proxy.is_empty() {
                return Err(invalid());
            }

            Ok((
                related.to_string(),
                RelatedOrdering {
                    proxy: proxy.to_string(),
                    direction,
                },
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "TAGR_DB",
        "TAGR_TAG_TABLE",
        "TAGR_TAG_COLUMN",
        "TAGR_PRESETS",
        "TAGR_ORDERINGS",
    ];

    fn clear_env() {
        for name in VARS {
            // SAFETY: tests touching the environment are serialized.
            unsafe { std::env::remove_var(name) };
        }
    }

    fn set_env(name: &str, value: &str) {
        // SAFETY: tests touching the environment are serialized.
        unsafe { std::env::set_var(name, value) };
    }

    #[test]
    #[serial]
    fn from_env_uses_defaults_when_unset() {
        clear_env();

        let config = TaggingConfig::from_env().unwrap();

        assert_eq!(config, TaggingConfig::default());
    }

    #[test]
    #[serial]
    fn from_env_reads_every_variable() {
        clear_env();
        set_env("TAGR_DB", "/tmp/tagr-test.db");
        set_env("TAGR_TAG_TABLE", "labels");
        set_env("TAGR_TAG_COLUMN", "name");
        set_env("TAGR_PRESETS", "Featured, news,,");
        set_env("TAGR_ORDERINGS", "posts=title:desc");

        let config = TaggingConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/tagr-test.db")));
        assert_eq!(config.tag_table, "labels");
        assert_eq!(config.tag_column, "name");
        assert_eq!(config.presets, vec!["featured", "news"]);
        assert_eq!(
            config.orderings,
            vec![("posts".to_string(), RelatedOrdering::descending("title"))]
        );
    }

    #[test]
    #[serial]
    fn from_env_rejects_malformed_orderings() {
        clear_env();
        set_env("TAGR_ORDERINGS", "posts");

        let err = TaggingConfig::from_env().unwrap_err();
        clear_env();

        assert_eq!(
            err.downcast_ref::<TagError>(),
            Some(&TagError::InvalidOrdering("posts".to_string()))
        );
    }

    #[test]
    fn parse_orderings_rejects_bad_direction_and_blanks() {
        assert!(parse_orderings("posts=title:sideways").is_err());
        assert!(parse_orderings("=title").is_err());
        assert!(parse_orderings("posts=").is_err());
        assert!(parse_orderings(" , ").unwrap().is_empty());
    }

    #[test]
    fn to_spec_carries_presets_and_orderings() {
        let config = TaggingConfig {
            presets: vec!["featured".to_string()],
            orderings: vec![("posts".to_string(), RelatedOrdering::ascending("title"))],
            ..Default::default()
        };

        let spec = config.to_spec();

        assert_eq!(spec.tag_type(), "tags");
        assert_eq!(spec.tag_column(), "tag");
        assert_eq!(
            spec.orderings(),
            &[("posts".to_string(), RelatedOrdering::ascending("title"))]
        );
    }
}
