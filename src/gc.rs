//! Full sweep of orphaned tags.
//!
//! Reconciliation already deletes the tags it orphans. The sweep catches
//! tags orphaned elsewhere, such as links removed by a cascading delete of
//! their related rows.

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::db::in_transaction;
use crate::registry::TagTypeConfig;
use crate::store;

/// Deletes every non-preset tag of the tag type that has no links.
///
/// Returns the deleted tag texts, sorted. Runs in one transaction.
pub fn sweep(conn: &Connection, config: &TagTypeConfig) -> Result<Vec<String>> {
    in_transaction(conn, |conn| {
        let mut deleted = Vec::new();

        for text in store::all_tags(conn, config)? {
            if config.is_preset(&text) {
                continue;
            }
            if store::link_count(conn, config, &text)? == 0 {
                store::delete_tag(conn, config, &text)?;
                deleted.push(text);
            }
        }

        info!(
            tag_type = %config.tag_type(),
            deleted = deleted.len(),
            "swept orphaned tags"
        );
        Ok(deleted)
    })
}
