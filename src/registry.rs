//! Tag type registry.
//!
//! Each configured tag type records its text column, the related types
//! discovered through junction tables, a default ordering per related type,
//! and the preset tags that are never garbage-collected.

use std::collections::BTreeSet;

use anyhow::Result;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::schema::quote_ident;
use crate::error::TagError;
use crate::models::SortDirection;
use crate::normalize::TagNormalizer;
use crate::store;

/// Default ordering of one related type inside merged results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedOrdering {
    /// Column used as the sort proxy.
    pub proxy: String,
    /// Direction used when a request does not name one.
    pub direction: SortDirection,
}

impl RelatedOrdering {
    /// Ascending ordering on `proxy`.
    pub fn ascending(proxy: impl Into<String>) -> Self {
        Self {
            proxy: proxy.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending ordering on `proxy`.
    pub fn descending(proxy: impl Into<String>) -> Self {
        Self {
            proxy: proxy.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Input to [`TagRegistry::configure`].
///
/// # Examples
///
/// ```
/// use tagr::registry::TagTypeSpec;
///
/// let spec = TagTypeSpec::new("tags", "tag")
///     .order_by("posts", "title")
///     .preset("featured");
/// assert_eq!(spec.tag_type(), "tags");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTypeSpec {
    tag_type: String,
    tag_column: String,
    orderings: Vec<(String, RelatedOrdering)>,
    presets: Vec<String>,
}

impl TagTypeSpec {
    /// Starts a spec for the tag table `tag_type` whose text lives in `tag_column`.
    pub fn new(tag_type: impl Into<String>, tag_column: impl Into<String>) -> Self {
        Self {
            tag_type: tag_type.into(),
            tag_column: tag_column.into(),
            orderings: Vec::new(),
            presets: Vec::new(),
        }
    }

    /// Orders `related` ascending by `proxy`.
    pub fn order_by(self, related: impl Into<String>, proxy: impl Into<String>) -> Self {
        self.ordering(related, RelatedOrdering::ascending(proxy))
    }

    /// Sets the ordering of `related`, replacing any earlier one.
    pub fn ordering(mut self, related: impl Into<String>, ordering: RelatedOrdering) -> Self {
        let related = related.into();
        self.orderings.retain(|(name, _)| *name != related);
        self.orderings.push((related, ordering));
        self
    }

    /// Adds a preset tag.
    pub fn preset(mut self, tag: impl Into<String>) -> Self {
        self.presets.push(tag.into());
        self
    }

    /// Adds several preset tags.
    pub fn presets<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.presets.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn tag_type(&self) -> &str {
        &self.tag_type
    }

    pub fn tag_column(&self) -> &str {
        &self.tag_column
    }

    pub fn orderings(&self) -> &[(String, RelatedOrdering)] {
        &self.orderings
    }
}

/// A many-to-many relation between a tag type and one related type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Related table.
    pub related: String,
    /// Junction table linking tags to `related`.
    pub junction: String,
    /// Junction column referencing the related table.
    pub related_column: String,
    /// Related-table column that `related_column` references.
    pub related_key: String,
    /// Junction column referencing the tag text.
    pub tag_column: String,
    /// Default ordering inside merged results.
    pub ordering: RelatedOrdering,
}

/// Registered configuration of one tag type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTypeConfig {
    tag_type: String,
    tag_column: String,
    relations: Vec<Relation>,
    presets: BTreeSet<String>,
}

impl TagTypeConfig {
    /// The tag table.
    pub fn tag_type(&self) -> &str {
        &self.tag_type
    }

    /// Column of the tag table holding the tag text.
    pub fn tag_column(&self) -> &str {
        &self.tag_column
    }

    /// Relations in junction-name order.
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Names of the related types, in relation order.
    pub fn related_types(&self) -> Vec<&str> {
        self.relations.iter().map(|r| r.related.as_str()).collect()
    }

    /// Looks up the relation to `related`.
    pub fn relation(&self, related: &str) -> Result<&Relation, TagError> {
        self.relations
            .iter()
            .find(|r| r.related == related)
            .ok_or_else(|| TagError::UnknownRelatedType {
                tag_type: self.tag_type.clone(),
                related: related.to_string(),
                valid: self.related_types().into_iter().map(String::from).collect(),
            })
    }

    /// Normalized preset tags.
    pub fn presets(&self) -> &BTreeSet<String> {
        &self.presets
    }

    /// Whether `text` (already normalized) is a preset tag.
    pub fn is_preset(&self, text: &str) -> bool {
        self.presets.contains(text)
    }
}

/// All configured tag types, in registration order.
///
/// Built once at startup and passed by reference to every operation.
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    types: Vec<TagTypeConfig>,
}

impl TagRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tag type, replacing any earlier configuration of it.
    ///
    /// Validates the tag column, discovers related types from foreign keys,
    /// validates each ordering proxy, and creates any missing preset tags.
    ///
    /// # Errors
    ///
    /// Returns [`TagError`] for a missing table, an unknown column, or an
    /// ordering for a type that has no junction table to this tag type.
    /// Storage failures are propagated unchanged.
    pub fn configure(&mut self, conn: &Connection, spec: TagTypeSpec) -> Result<&TagTypeConfig> {
        let tag_columns = table_columns(conn, &spec.tag_type)?;
        if tag_columns.is_empty() {
            return Err(TagError::MissingTable(spec.tag_type).into());
        }
        if !tag_columns.contains(&spec.tag_column) {
            return Err(TagError::UnknownColumn {
                table: spec.tag_type,
                column: spec.tag_column,
            }
            .into());
        }

        let mut relations = discover_relations(conn, &spec.tag_type, &spec.tag_column)?;

        for (related, ordering) in &spec.orderings {
            match relations.iter().position(|r| r.related == *related) {
                Some(index) => relations[index].ordering = ordering.clone(),
                None => {
                    return Err(TagError::UnknownRelatedType {
                        tag_type: spec.tag_type.clone(),
                        related: related.clone(),
                        valid: relations.iter().map(|r| r.related.clone()).collect(),
                    }
                    .into());
                }
            }
        }

        for relation in &relations {
            require_column(conn, &relation.related, &relation.ordering.proxy)?;
        }

        let config = TagTypeConfig {
            tag_type: spec.tag_type,
            tag_column: spec.tag_column,
            relations,
            presets: TagNormalizer::normalize_tags(&spec.presets)
                .into_iter()
                .collect(),
        };

        for preset in &config.presets {
            store::ensure_tag(conn, &config, preset)?;
        }

        info!(
            tag_type = %config.tag_type,
            related = ?config.related_types(),
            presets = config.presets.len(),
            "configured tag type"
        );

        let index = match self.types.iter().position(|t| t.tag_type == config.tag_type) {
            Some(index) => {
                self.types[index] = config;
                index
            }
            None => {
                self.types.push(config);
                self.types.len() - 1
            }
        };

        Ok(&self.types[index])
    }

    /// Whether `tag_type` has been configured.
    pub fn is_configured(&self, tag_type: &str) -> bool {
        self.types.iter().any(|t| t.tag_type == tag_type)
    }

    /// Configuration of `tag_type`.
    pub fn get(&self, tag_type: &str) -> Result<&TagTypeConfig, TagError> {
        self.types
            .iter()
            .find(|t| t.tag_type == tag_type)
            .ok_or_else(|| TagError::UnknownTagType(tag_type.to_string()))
    }

    /// Configuration of `tag_type`, or of the default tag type when `None`.
    pub fn resolve(&self, tag_type: Option<&str>) -> Result<&TagTypeConfig, TagError> {
        match tag_type {
            Some(name) => self.get(name),
            None => self.types.first().ok_or(TagError::NoTagTypes),
        }
    }

    /// Related types of `tag_type`, in relation order.
    pub fn related_types_for(&self, tag_type: &str) -> Result<Vec<&str>, TagError> {
        Ok(self.get(tag_type)?.related_types())
    }

    /// The first registered tag type.
    pub fn default_tag_type(&self) -> Option<&str> {
        self.types.first().map(|t| t.tag_type.as_str())
    }

    /// All configured tag types, in registration order.
    pub fn tag_types(&self) -> impl Iterator<Item = &TagTypeConfig> {
        self.types.iter()
    }
}

/// Column names of `table`, empty when the table does not exist.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let rows = stmt.query_map([table], |row| row.get::<_, String>(0))?;

    let mut columns = Vec::new();
    for row_result in rows {
        columns.push(row_result?);
    }
    Ok(columns)
}

/// Fails with [`TagError::UnknownColumn`] unless `table` has `column`.
pub(crate) fn require_column(conn: &Connection, table: &str, column: &str) -> Result<()> {
    if table_columns(conn, table)?.iter().any(|c| c == column) {
        Ok(())
    } else {
        Err(TagError::UnknownColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
        .into())
    }
}

/// First primary-key column of `table`, falling back to `rowid`.
fn primary_key(conn: &Connection, table: &str) -> Result<String> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
    let mut rows = stmt.query([table])?;

    match rows.next()? {
        Some(row) => Ok(row.get(0)?),
        None => Ok("rowid".to_string()),
    }
}

/// A foreign key as reported by `pragma_foreign_key_list`.
struct ForeignKey {
    table: String,
    from: String,
    to: Option<String>,
}

/// Finds every junction table between the tag table and another table.
///
/// A junction has exactly two foreign keys: one to the tag text column and
/// one to the related table.
fn discover_relations(conn: &Connection, tag_type: &str, tag_column: &str) -> Result<Vec<Relation>> {
    let mut stmt = conn.prepare(
        "SELECT m.name, f.\"table\", f.\"from\", f.\"to\"
         FROM sqlite_master m
         JOIN pragma_foreign_key_list(m.name) f
         WHERE m.type = 'table'
         ORDER BY m.name, f.id, f.seq",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            ForeignKey {
                table: row.get(1)?,
                from: row.get(2)?,
                to: row.get(3)?,
            },
        ))
    })?;

    let mut by_table: Vec<(String, Vec<ForeignKey>)> = Vec::new();
    for row_result in rows {
        let (junction, key) = row_result?;
        match by_table.last_mut() {
            Some((name, keys)) if *name == junction => keys.push(key),
            _ => by_table.push((junction, vec![key])),
        }
    }

    let tag_pk = primary_key(conn, tag_type)?;
    let mut relations = Vec::new();

    for (junction, keys) in by_table {
        if keys.len() != 2 {
            continue;
        }

        let references_tag = |key: &ForeignKey| {
            key.table.eq_ignore_ascii_case(tag_type)
                && key.to.as_deref().unwrap_or(&tag_pk) == tag_column
        };
        let Some(tag_key) = keys.iter().find(|k| references_tag(k)) else {
            continue;
        };
        let Some(related_key) = keys.iter().find(|k| !references_tag(k)) else {
            continue;
        };

        let key_column = match &related_key.to {
            Some(to) => to.clone(),
            None => primary_key(conn, &related_key.table)?,
        };

        debug!(
            junction = %junction,
            related = %related_key.table,
            "discovered tag relation"
        );

        relations.push(Relation {
            related: related_key.table.clone(),
            junction: junction.clone(),
            related_column: related_key.from.clone(),
            tag_column: tag_key.from.clone(),
            ordering: RelatedOrdering::ascending(key_column.clone()),
            related_key: key_column,
        });
    }

    Ok(relations)
}

/// Quoted `table.column` reference for SQL built from registry names.
pub(crate) fn qualified(alias: &str, column: &str) -> String {
    format!("{alias}.{}", quote_ident(column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::schema::create_junction_table;

    fn setup() -> Database {
        let db = Database::in_memory().unwrap();
        let conn = db.connection();
        conn.execute_batch(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, published INTEGER);
             CREATE TABLE photos (id INTEGER PRIMARY KEY, caption TEXT);
             CREATE TABLE comments (id INTEGER PRIMARY KEY, body TEXT);",
        )
        .unwrap();
        create_junction_table(conn, "tags", "tag", "posts").unwrap();
        create_junction_table(conn, "tags", "tag", "photos").unwrap();
        db
    }

    #[test]
    fn configure_discovers_related_types_in_junction_order() {
        let db = setup();
        let mut registry = TagRegistry::new();

        let config = registry
            .configure(db.connection(), TagTypeSpec::new("tags", "tag"))
            .unwrap();

        assert_eq!(config.related_types(), vec!["photos", "posts"]);
        let posts = config.relation("posts").unwrap();
        assert_eq!(posts.junction, "posts_tags");
        assert_eq!(posts.related_column, "related_id");
        assert_eq!(posts.related_key, "id");
        assert_eq!(posts.tag_column, "tag");
    }

    #[test]
    fn default_ordering_is_primary_key_ascending() {
        let db = setup();
        let mut registry = TagRegistry::new();

        let config = registry
            .configure(
                db.connection(),
                TagTypeSpec::new("tags", "tag").ordering("posts", RelatedOrdering::descending("title")),
            )
            .unwrap();

        assert_eq!(config.relation("photos").unwrap().ordering, RelatedOrdering::ascending("id"));
        assert_eq!(
            config.relation("posts").unwrap().ordering,
            RelatedOrdering::descending("title")
        );
    }

    #[test]
    fn configure_rejects_unknown_tag_column() {
        let db = setup();
        let mut registry = TagRegistry::new();

        let err = registry
            .configure(db.connection(), TagTypeSpec::new("tags", "label"))
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<TagError>(),
            Some(&TagError::UnknownColumn {
                table: "tags".to_string(),
                column: "label".to_string(),
            })
        );
        assert!(!registry.is_configured("tags"));
    }

    #[test]
    fn configure_rejects_missing_table() {
        let db = setup();
        let mut registry = TagRegistry::new();

        let err = registry
            .configure(db.connection(), TagTypeSpec::new("labels", "tag"))
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<TagError>(),
            Some(&TagError::MissingTable("labels".to_string()))
        );
    }

    #[test]
    fn configure_rejects_ordering_for_unrelated_type() {
        let db = setup();
        let mut registry = TagRegistry::new();

        let err = registry
            .configure(db.connection(), TagTypeSpec::new("tags", "tag").order_by("comments", "body"))
            .unwrap_err();

        match err.downcast_ref::<TagError>() {
            Some(TagError::UnknownRelatedType { related, valid, .. }) => {
                assert_eq!(related, "comments");
                assert_eq!(valid, &vec!["photos".to_string(), "posts".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn configure_rejects_unknown_proxy_column() {
        let db = setup();
        let mut registry = TagRegistry::new();

        let err = registry
            .configure(db.connection(), TagTypeSpec::new("tags", "tag").order_by("posts", "headline"))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TagError>(),
            Some(TagError::UnknownColumn { column, .. }) if column == "headline"
        ));
    }

    #[test]
    fn configure_creates_normalized_presets() {
        let db = setup();
        let mut registry = TagRegistry::new();

        let config = registry
            .configure(
                db.connection(),
                TagTypeSpec::new("tags", "tag").presets(["  Featured ", "news"]),
            )
            .unwrap();

        assert!(config.is_preset("featured"));
        assert!(config.is_preset("news"));

        let stored: Vec<String> = db
            .connection()
            .prepare("SELECT tag FROM tags ORDER BY tag")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert_eq!(stored, vec!["featured", "news"]);
    }

    #[test]
    fn reconfigure_replaces_previous_configuration() {
        let db = setup();
        let mut registry = TagRegistry::new();

        registry
            .configure(db.connection(), TagTypeSpec::new("tags", "tag").preset("featured"))
            .unwrap();
        registry
            .configure(db.connection(), TagTypeSpec::new("tags", "tag").preset("pinned"))
            .unwrap();

        let config = registry.get("tags").unwrap();
        assert!(!config.is_preset("featured"));
        assert!(config.is_preset("pinned"));
        assert_eq!(registry.tag_types().count(), 1);
    }

    #[test]
    fn default_tag_type_is_first_registered() {
        let db = setup();
        db.connection()
            .execute_batch("CREATE TABLE labels (name TEXT PRIMARY KEY)")
            .unwrap();
        let mut registry = TagRegistry::new();

        assert_eq!(registry.default_tag_type(), None);
        assert_eq!(registry.resolve(None).unwrap_err(), TagError::NoTagTypes);

        registry
            .configure(db.connection(), TagTypeSpec::new("tags", "tag"))
            .unwrap();
        registry
            .configure(db.connection(), TagTypeSpec::new("labels", "name"))
            .unwrap();

        assert_eq!(registry.default_tag_type(), Some("tags"));
        assert_eq!(registry.resolve(None).unwrap().tag_type(), "tags");
        assert_eq!(registry.resolve(Some("labels")).unwrap().tag_type(), "labels");
        assert!(registry.related_types_for("labels").unwrap().is_empty());
    }

    #[test]
    fn relation_lookup_reports_valid_types() {
        let db = setup();
        let mut registry = TagRegistry::new();
        let config = registry
            .configure(db.connection(), TagTypeSpec::new("tags", "tag"))
            .unwrap();

        let err = config.relation("comments").unwrap_err();
        assert_eq!(
            err,
            TagError::UnknownRelatedType {
                tag_type: "tags".to_string(),
                related: "comments".to_string(),
                valid: vec!["photos".to_string(), "posts".to_string()],
            }
        );
    }
}
