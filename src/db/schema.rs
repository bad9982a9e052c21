use anyhow::Result;
use rusqlite::Connection;

/// Default tag table, created on every database open.
///
/// Uses CREATE TABLE IF NOT EXISTS for idempotent execution.
pub const INITIAL_SCHEMA: &str = r#"
-- Tags table: one row per lowercase tag text
CREATE TABLE IF NOT EXISTS tags (
    tag TEXT PRIMARY KEY
);
"#;

/// Quotes an SQLite identifier, doubling any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Name of the junction table linking `related` to its tags.
pub fn junction_name(related: &str) -> String {
    format!("{related}_tags")
}

/// DDL for a tag table holding `column` as its text primary key.
pub fn tag_table_ddl(table: &str, column: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {} TEXT PRIMARY KEY\n);",
        quote_ident(table),
        quote_ident(column)
    )
}

/// DDL for the junction table between `related` and a tag table.
///
/// Deleting a related row cascades to its links. Deleting a tag is
/// restricted while links exist; renaming a tag cascades to its links.
pub fn junction_table_ddl(tag_table: &str, tag_column: &str, related: &str) -> String {
    let junction = junction_name(related);
    format!(
        "CREATE TABLE IF NOT EXISTS {junction_q} (
    related_id INTEGER REFERENCES {related_q}(id) ON DELETE CASCADE,
    {tag_col} TEXT REFERENCES {tag_table_q}({tag_col}) ON DELETE RESTRICT ON UPDATE CASCADE,
    PRIMARY KEY({tag_col}, related_id)
);
CREATE INDEX IF NOT EXISTS {index_q} ON {junction_q}(related_id);",
        junction_q = quote_ident(&junction),
        related_q = quote_ident(related),
        tag_table_q = quote_ident(tag_table),
        tag_col = quote_ident(tag_column),
        index_q = quote_ident(&format!("idx_{junction}_related")),
    )
}

/// Creates a tag table if it does not exist.
pub fn create_tag_table(conn: &Connection, table: &str, column: &str) -> Result<()> {
    conn.execute_batch(&tag_table_ddl(table, column))?;
    Ok(())
}

/// Creates the junction table for `related` if it does not exist.
///
/// Returns the junction table name.
pub fn create_junction_table(
    conn: &Connection,
    tag_table: &str,
    tag_column: &str,
    related: &str,
) -> Result<String> {
    conn.execute_batch(&junction_table_ddl(tag_table, tag_column, related))?;
    Ok(junction_name(related))
}
