//! Tag and link persistence on top of a configured tag type.
//!
//! All functions expect tag text that is already normalized.

use anyhow::Result;
use rusqlite::{Connection, ErrorCode};
use tracing::{info, warn};

use crate::db::schema::quote_ident;
use crate::registry::{Relation, TagTypeConfig};

/// Whether a tag with this text is stored.
pub(crate) fn tag_exists(conn: &Connection, config: &TagTypeConfig, text: &str) -> Result<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1)",
        quote_ident(config.tag_type()),
        quote_ident(config.tag_column())
    );
    let exists: bool = conn.query_row(&sql, [text], |row| row.get(0))?;
    Ok(exists)
}

/// Creates the tag unless it already exists.
///
/// Returns `true` when this call created it.
pub(crate) fn ensure_tag(conn: &Connection, config: &TagTypeConfig, text: &str) -> Result<bool> {
    if tag_exists(conn, config, text)? {
        return Ok(false);
    }
    insert_tag(conn, config, text)
}

/// Inserts the tag row; returns `true` when inserted.
///
/// A uniqueness violation means another writer stored the tag first and
/// counts as "already exists".
pub(crate) fn insert_tag(conn: &Connection, config: &TagTypeConfig, text: &str) -> Result<bool> {
    let sql = format!(
        "INSERT INTO {} ({}) VALUES (?1)",
        quote_ident(config.tag_type()),
        quote_ident(config.tag_column())
    );

    match conn.execute(&sql, [text]) {
        Ok(_) => {
            info!(tag_type = %config.tag_type(), tag = %text, "created tag");
            Ok(true)
        }
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            warn!(tag_type = %config.tag_type(), tag = %text, "tag created concurrently");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Deletes the tag row.
///
/// The store rejects this while links remain; that error is returned as is.
pub(crate) fn delete_tag(conn: &Connection, config: &TagTypeConfig, text: &str) -> Result<()> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?1",
        quote_ident(config.tag_type()),
        quote_ident(config.tag_column())
    );
    conn.execute(&sql, [text])?;
    info!(tag_type = %config.tag_type(), tag = %text, "deleted tag");
    Ok(())
}

/// Number of links to this tag across every related type.
pub(crate) fn link_count(conn: &Connection, config: &TagTypeConfig, text: &str) -> Result<i64> {
    let mut total = 0;
    for relation in config.relations() {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            quote_ident(&relation.junction),
            quote_ident(&relation.tag_column)
        );
        let count: i64 = conn.query_row(&sql, [text], |row| row.get(0))?;
        total += count;
    }
    Ok(total)
}

/// Tag texts linked to one related row, sorted.
pub(crate) fn linked_tags(conn: &Connection, relation: &Relation, id: i64) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT {tag} FROM {junction} WHERE {related} = ?1 ORDER BY {tag}",
        tag = quote_ident(&relation.tag_column),
        junction = quote_ident(&relation.junction),
        related = quote_ident(&relation.related_column),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([id], |row| row.get::<_, String>(0))?;

    let mut tags = Vec::new();
    for row_result in rows {
        tags.push(row_result?);
    }
    Ok(tags)
}

/// Links a related row to a tag; linking twice is a no-op.
pub(crate) fn link(conn: &Connection, relation: &Relation, id: i64, text: &str) -> Result<()> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?1, ?2)",
        quote_ident(&relation.junction),
        quote_ident(&relation.related_column),
        quote_ident(&relation.tag_column)
    );
    conn.execute(&sql, rusqlite::params![id, text])?;
    Ok(())
}

/// Removes the link between a related row and a tag, if present.
pub(crate) fn unlink(conn: &Connection, relation: &Relation, id: i64, text: &str) -> Result<()> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
        quote_ident(&relation.junction),
        quote_ident(&relation.related_column),
        quote_ident(&relation.tag_column)
    );
    conn.execute(&sql, rusqlite::params![id, text])?;
    Ok(())
}

/// Every stored tag text of the tag type, sorted.
pub(crate) fn all_tags(conn: &Connection, config: &TagTypeConfig) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT {col} FROM {table} ORDER BY {col}",
        col = quote_ident(config.tag_column()),
        table = quote_ident(config.tag_type())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut tags = Vec::new();
    for row_result in rows {
        tags.push(row_result?);
    }
    Ok(tags)
}

/// Renames a tag in place; links follow through `ON UPDATE CASCADE`.
pub(crate) fn rename_tag(conn: &Connection, config: &TagTypeConfig, from: &str, to: &str) -> Result<()> {
    let sql = format!(
        "UPDATE {table} SET {col} = ?1 WHERE {col} = ?2",
        col = quote_ident(config.tag_column()),
        table = quote_ident(config.tag_type())
    );
    conn.execute(&sql, [to, from])?;
    Ok(())
}

/// Moves every link of `from` onto `to`, dropping links `to` already has.
pub(crate) fn move_links(conn: &Connection, config: &TagTypeConfig, from: &str, to: &str) -> Result<()> {
    for relation in config.relations() {
        let junction = quote_ident(&relation.junction);
        let related = quote_ident(&relation.related_column);
        let tag = quote_ident(&relation.tag_column);

        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {junction} ({related}, {tag})
                 SELECT {related}, ?1 FROM {junction} WHERE {tag} = ?2"
            ),
            [to, from],
        )?;
        conn.execute(&format!("DELETE FROM {junction} WHERE {tag} = ?1"), [from])?;
    }
    Ok(())
}
