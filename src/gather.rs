//! Gathering related records by tag.
//!
//! Tags act as an OR filter: every record linked to any of the requested
//! tags is returned once, merged across all selected related types and
//! ordered by each type's sort proxy.

use std::collections::HashSet;

use anyhow::Result;
use rand::Rng;
use rand::seq::SliceRandom;
use rusqlite::Connection;
use tracing::debug;

use crate::compare::CrossTypeComparator;
use crate::db::NATURAL_COLLATION;
use crate::db::schema::quote_ident;
use crate::models::{EntityRef, RelatedRecord, SortDirection, Tag};
use crate::normalize::TagNormalizer;
use crate::registry::{Relation, TagRegistry, TagTypeConfig, qualified, require_column};

/// The tags to filter by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    /// Comma-separated tag list, e.g. `"red, blue"`.
    Text(String),
    /// Explicit tag texts.
    List(Vec<String>),
}

impl TagFilter {
    /// Normalized, de-duplicated tag texts.
    pub fn normalized(&self) -> Vec<String> {
        match self {
            TagFilter::Text(text) => TagNormalizer::split_tags(text),
            TagFilter::List(tags) => TagNormalizer::normalize_tags(tags),
        }
    }
}

impl Default for TagFilter {
    fn default() -> Self {
        TagFilter::List(Vec::new())
    }
}

impl From<&str> for TagFilter {
    fn from(text: &str) -> Self {
        TagFilter::Text(text.to_string())
    }
}

impl From<String> for TagFilter {
    fn from(text: String) -> Self {
        TagFilter::Text(text)
    }
}

impl From<Vec<String>> for TagFilter {
    fn from(tags: Vec<String>) -> Self {
        TagFilter::List(tags)
    }
}

impl From<&[&str]> for TagFilter {
    fn from(tags: &[&str]) -> Self {
        TagFilter::List(tags.iter().map(|t| t.to_string()).collect())
    }
}

impl From<&[Tag]> for TagFilter {
    fn from(tags: &[Tag]) -> Self {
        TagFilter::List(tags.iter().map(|t| t.text().to_string()).collect())
    }
}

impl From<Vec<Tag>> for TagFilter {
    fn from(tags: Vec<Tag>) -> Self {
        TagFilter::List(tags.into_iter().map(Tag::into_text).collect())
    }
}

/// Which related types to gather from, and by which proxy to order them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelatedSelection {
    /// Every related type of the tag type, with its registered ordering.
    #[default]
    All,
    /// The named related types, with their registered orderings.
    Types(Vec<String>),
    /// The named related types, each ordered by the given proxy column.
    Orderings(Vec<(String, String)>),
}

/// Options for gathering related records.
///
/// # Examples
///
/// ```
/// use tagr::gather::GatherRequest;
///
/// let request = GatherRequest {
///     limit: Some(10),
///     ..GatherRequest::new("red, blue")
/// };
/// assert_eq!(request.tags.normalized(), vec!["red", "blue"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GatherRequest {
    /// Tags to match; a record matching any of them is included.
    pub tags: TagFilter,
    /// Maximum number of records. `None` or `Some(0)` means no limit.
    pub limit: Option<usize>,
    /// Related types and proxies to use.
    pub related: RelatedSelection,
    /// Sort direction. Defaults to the first selected type's registered direction.
    pub direction: Option<SortDirection>,
    /// Tag type to query. Defaults to the first registered tag type.
    pub tag_type: Option<String>,
    /// Record to leave out of the result.
    pub exclude: Option<EntityRef>,
    /// Shuffle instead of sorting.
    pub random: bool,
}

impl GatherRequest {
    /// A request for `tags` with every other option at its default.
    pub fn new(tags: impl Into<TagFilter>) -> Self {
        Self {
            tags: tags.into(),
            ..Default::default()
        }
    }
}

/// Gathers records linked to any of the requested tags.
///
/// `conn` must have [`NATURAL_COLLATION`] registered; connections from
/// [`crate::Database`] do. See [`crate::db::register_collations`].
///
/// # Errors
///
/// Returns [`crate::TagError`] for an unconfigured tag type, a related type
/// with no junction to the tag type, or an unknown proxy column. Storage
/// failures are propagated unchanged.
pub fn gather<R: RelatedRecord>(
    conn: &Connection,
    registry: &TagRegistry,
    request: &GatherRequest,
) -> Result<Vec<R>> {
    gather_with_rng(conn, registry, request, &mut rand::thread_rng())
}

/// Same as [`gather`], drawing shuffles from `rng`.
pub fn gather_with_rng<R, G>(
    conn: &Connection,
    registry: &TagRegistry,
    request: &GatherRequest,
    rng: &mut G,
) -> Result<Vec<R>>
where
    R: RelatedRecord,
    G: Rng + ?Sized,
{
    let config = registry.resolve(request.tag_type.as_deref())?;
    let targets = resolve_targets(conn, config, &request.related)?;

    let tags = request.tags.normalized();
    if tags.is_empty() {
        return Ok(Vec::new());
    }

    let direction = request
        .direction
        .or_else(|| targets.first().map(|(relation, _)| relation.ordering.direction))
        .unwrap_or_default();
    let limit = request.limit.filter(|&n| n > 0);
    // Sorted fetches keep one row of headroom per type for the excluded
    // record. Random fetches are uncapped so every match can be drawn.
    let fetch = if request.random {
        None
    } else {
        limit.map(|n| n + 1)
    };

    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for (relation, proxy) in &targets {
        let order = (!request.random).then_some((proxy.as_str(), direction));
        let rows: Vec<R> = fetch_related(conn, relation, &tags, order, fetch)?;
        debug!(related = %relation.related, rows = rows.len(), "fetched related records");

        for record in rows {
            if seen.insert(record.entity_ref()) {
                records.push(record);
            }
        }
    }

    if let Some(excluded) = &request.exclude {
        records.retain(|record| record.entity_ref() != *excluded);
    }

    if request.random {
        records.shuffle(rng);
    } else {
        let comparator = CrossTypeComparator::new(
            targets
                .iter()
                .map(|(relation, proxy)| (relation.related.as_str(), proxy.as_str())),
            direction,
        );
        comparator.sort(&mut records);
    }

    if let Some(n) = limit {
        records.truncate(n);
    }

    debug!(tags = ?tags, returned = records.len(), "gathered related records");
    Ok(records)
}

/// Resolves the selection into relations paired with their sort proxies.
fn resolve_targets<'a>(
    conn: &Connection,
    config: &'a TagTypeConfig,
    selection: &RelatedSelection,
) -> Result<Vec<(&'a Relation, String)>> {
    let targets = match selection {
        RelatedSelection::All => config
            .relations()
            .iter()
            .map(|relation| (relation, relation.ordering.proxy.clone()))
            .collect(),
        RelatedSelection::Types(types) => {
            let mut targets = Vec::with_capacity(types.len());
            for related in types {
                let relation = config.relation(related)?;
                targets.push((relation, relation.ordering.proxy.clone()));
            }
            targets
        }
        RelatedSelection::Orderings(orderings) => {
            let mut targets = Vec::with_capacity(orderings.len());
            for (related, proxy) in orderings {
                let relation = config.relation(related)?;
                require_column(conn, &relation.related, proxy)?;
                targets.push((relation, proxy.clone()));
            }
            targets
        }
    };
    Ok(targets)
}

/// Loads records of one related type linked to any of `tags`.
///
/// With `order` set, rows come back sorted by that proxy under
/// [`NATURAL_COLLATION`], so a capped fetch holds the same prefix the
/// final comparator would pick. Without it, row order is unspecified.
fn fetch_related<R: RelatedRecord>(
    conn: &Connection,
    relation: &Relation,
    tags: &[String],
    order: Option<(&str, SortDirection)>,
    fetch: Option<usize>,
) -> Result<Vec<R>> {
    let placeholders = vec!["?"; tags.len()].join(", ");
    let key = qualified("r", &relation.related_key);

    let order_clause = order
        .map(|(proxy, direction)| {
            format!(
                " ORDER BY {} COLLATE {NATURAL_COLLATION} {dir}, {key} {dir}",
                qualified("r", proxy),
                dir = direction.sql()
            )
        })
        .unwrap_or_default();
    let limit_clause = fetch.map(|n| format!(" LIMIT {n}")).unwrap_or_default();

    let sql = format!(
        "SELECT r.* FROM {related} r
         WHERE {key} IN (SELECT {link} FROM {junction} WHERE {tag} IN ({placeholders})){order_clause}{limit_clause}",
        related = quote_ident(&relation.related),
        link = quote_ident(&relation.related_column),
        junction = quote_ident(&relation.junction),
        tag = quote_ident(&relation.tag_column),
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(tags.iter()), |row| {
        R::from_row(&relation.related, &relation.related_key, row)
    })?;

    let mut records = Vec::new();
    for row_result in rows {
        records.push(row_result?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_filter_splits_on_commas() {
        let filter = TagFilter::from(" Red , blue,, RED ");
        assert_eq!(filter.normalized(), vec!["red", "blue"]);
    }

    #[test]
    fn list_filter_is_not_split() {
        let filter = TagFilter::from(vec!["rock, roll".to_string(), "Jazz".to_string()]);
        assert_eq!(filter.normalized(), vec!["rock, roll", "jazz"]);
    }

    #[test]
    fn tag_filter_from_tags_uses_their_text() {
        let tags = vec![Tag::new("red").unwrap(), Tag::new("blue").unwrap()];
        assert_eq!(TagFilter::from(tags.as_slice()).normalized(), vec!["red", "blue"]);
        assert_eq!(TagFilter::from(tags).normalized(), vec!["red", "blue"]);
    }

    #[test]
    fn default_request_selects_everything_unbounded() {
        let request = GatherRequest::new("red");

        assert_eq!(request.limit, None);
        assert_eq!(request.related, RelatedSelection::All);
        assert_eq!(request.direction, None);
        assert!(!request.random);
    }
}
