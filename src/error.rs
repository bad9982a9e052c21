use thiserror::Error;

/// Configuration and usage errors raised by the tagging core.
///
/// Storage failures are not represented here; they propagate as the
/// underlying `rusqlite::Error` inside an `anyhow::Error`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagError {
    /// The tag type was never passed to `TagRegistry::configure`.
    #[error("tag type '{0}' is not configured")]
    UnknownTagType(String),

    /// No tag type has been configured yet, so there is no default.
    #[error("no tag types are configured")]
    NoTagTypes,

    /// A table named in configuration does not exist.
    #[error("table '{0}' does not exist")]
    MissingTable(String),

    /// A column named in configuration does not exist on its table.
    #[error("column '{column}' does not exist on table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// The related type has no many-to-many relation to the tag type.
    #[error(
        "'{related}' is not related to tag type '{tag_type}' (valid types: {})",
        valid.join(", ")
    )]
    UnknownRelatedType {
        tag_type: String,
        related: String,
        valid: Vec<String>,
    },

    /// An ordering entry could not be parsed.
    #[error("invalid ordering '{0}': expected related=column[:asc|:desc]")]
    InvalidOrdering(String),

    /// The tag is not stored under the tag type.
    #[error("tag '{0}' does not exist")]
    UnknownTag(String),

    /// The tag text is empty after normalization.
    #[error("tag text is empty")]
    EmptyTag,

    /// The operation would remove or rename a preset tag.
    #[error("tag '{0}' is a preset tag")]
    PresetTag(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_related_type_lists_valid_types() {
        let err = TagError::UnknownRelatedType {
            tag_type: "tags".to_string(),
            related: "comments".to_string(),
            valid: vec!["photos".to_string(), "posts".to_string()],
        };

        assert_eq!(
            err.to_string(),
            "'comments' is not related to tag type 'tags' (valid types: photos, posts)"
        );
    }

    #[test]
    fn unknown_column_names_table_and_column() {
        let err = TagError::UnknownColumn {
            table: "tags".to_string(),
            column: "label".to_string(),
        };

        assert!(err.to_string().contains("'label'"));
        assert!(err.to_string().contains("'tags'"));
    }

    #[test]
    fn errors_survive_anyhow_downcast() {
        let err: anyhow::Error = TagError::NoTagTypes.into();
        assert_eq!(err.downcast_ref::<TagError>(), Some(&TagError::NoTagTypes));
    }
}
