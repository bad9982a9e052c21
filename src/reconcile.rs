//! Aligning an entity's tag links with a desired set of tags.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use crate::db::in_transaction;
use crate::models::EntityRef;
use crate::normalize::TagNormalizer;
use crate::registry::TagTypeConfig;
use crate::store;

/// What a reconciliation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Tags that did not exist and were created.
    pub created: Vec<String>,
    /// Tags newly linked to the entity.
    pub linked: Vec<String>,
    /// Tags whose link to the entity was removed.
    pub unlinked: Vec<String>,
    /// Unlinked tags deleted because nothing else referenced them.
    pub deleted: Vec<String>,
}

impl ReconcileOutcome {
    /// Whether the entity's links were left as they were.
    pub fn is_unchanged(&self) -> bool {
        self.linked.is_empty() && self.unlinked.is_empty()
    }
}

/// Replaces the tags linked to `entity` with exactly `desired`.
///
/// Desired tags are normalized (HTML-decoded, trimmed, lowercased, blanks
/// dropped) and created if missing. Tags that lose their link to `entity`
/// are deleted when no other entity links them, unless they are presets.
/// Runs in one transaction.
///
/// # Errors
///
/// Returns [`crate::TagError::UnknownRelatedType`] when the entity's type is
/// not related to the tag type. Storage failures are propagated unchanged
/// and roll the transaction back.
pub fn reconcile<S: AsRef<str>>(
    conn: &Connection,
    config: &TagTypeConfig,
    entity: &EntityRef,
    desired: &[S],
) -> Result<ReconcileOutcome> {
    let relation = config.relation(entity.kind())?;
    let desired = TagNormalizer::normalize_tags(desired);

    in_transaction(conn, |conn| {
        let mut outcome = ReconcileOutcome::default();

        for text in &desired {
            if store::ensure_tag(conn, config, text)? {
                outcome.created.push(text.clone());
            }
        }

        let previous = store::linked_tags(conn, relation, entity.id())?;

        for text in previous.iter().filter(|t| !desired.contains(t)) {
            store::unlink(conn, relation, entity.id(), text)?;
            outcome.unlinked.push(text.clone());

            if config.is_preset(text) {
                continue;
            }
            if store::link_count(conn, config, text)? == 0 {
                store::delete_tag(conn, config, text)?;
                outcome.deleted.push(text.clone());
            }
        }

        for text in desired.iter().filter(|t| !previous.contains(t)) {
            store::link(conn, relation, entity.id(), text)?;
            outcome.linked.push(text.clone());
        }

        debug!(entity = %entity, ?outcome, "reconciled tags");
        Ok(outcome)
    })
}

/// Points in a host entity's persistence lifecycle where tagging runs.
///
/// A host calls `before_validate` with the tags decoded from its request
/// payload before validating and storing the entity, and `before_tag_store`
/// on any tag text it is about to write itself.
pub trait TagLifecycle {
    /// Reconciles the entity's tags with `desired`.
    fn before_validate(&self, entity: &EntityRef, desired: &[String]) -> Result<ReconcileOutcome>;

    /// Canonical form of a tag about to be stored, or `None` if it is blank.
    fn before_tag_store(&self, text: &str) -> Option<String> {
        let normalized = TagNormalizer::normalize_tag(text);
        (!normalized.is_empty()).then_some(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::db::schema::create_junction_table;
    use crate::registry::{TagRegistry, TagTypeSpec};

    fn setup() -> (Database, TagRegistry) {
        let db = Database::in_memory().unwrap();
        let conn = db.connection();
        conn.execute_batch(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT);
             INSERT INTO posts (id, title) VALUES (1, 'first'), (2, 'second');",
        )
        .unwrap();
        create_junction_table(conn, "tags", "tag", "posts").unwrap();

        let mut registry = TagRegistry::new();
        registry
            .configure(conn, TagTypeSpec::new("tags", "tag").preset("featured"))
            .unwrap();
        (db, registry)
    }

    #[test]
    fn reconcile_links_and_creates_desired_tags() {
        let (db, registry) = setup();
        let config = registry.get("tags").unwrap();
        let post = EntityRef::new("posts", 1);

        let outcome = reconcile(db.connection(), config, &post, &["Red", " blue "]).unwrap();

        assert_eq!(outcome.created, vec!["red", "blue"]);
        assert_eq!(outcome.linked, vec!["red", "blue"]);
        assert!(outcome.unlinked.is_empty());
        assert_eq!(
            store::linked_tags(db.connection(), config.relation("posts").unwrap(), 1).unwrap(),
            vec!["blue", "red"]
        );
    }

    #[test]
    fn second_identical_reconcile_is_a_no_op() {
        let (db, registry) = setup();
        let config = registry.get("tags").unwrap();
        let post = EntityRef::new("posts", 1);

        reconcile(db.connection(), config, &post, &["red", "blue"]).unwrap();
        let outcome = reconcile(db.connection(), config, &post, &["blue", "RED"]).unwrap();

        assert!(outcome.is_unchanged());
        assert!(outcome.created.is_empty());
    }

    #[test]
    fn removed_orphan_is_deleted_shared_tag_is_kept() {
        let (db, registry) = setup();
        let config = registry.get("tags").unwrap();
        let conn = db.connection();
        let first = EntityRef::new("posts", 1);
        let second = EntityRef::new("posts", 2);

        reconcile(conn, config, &first, &["red", "shared"]).unwrap();
        reconcile(conn, config, &second, &["shared"]).unwrap();

        let outcome = reconcile(conn, config, &first, &[] as &[&str]).unwrap();

        assert_eq!(outcome.unlinked, vec!["red", "shared"]);
        assert_eq!(outcome.deleted, vec!["red"]);
        assert!(!store::tag_exists(conn, config, "red").unwrap());
        assert!(store::tag_exists(conn, config, "shared").unwrap());
    }

    #[test]
    fn preset_tag_survives_losing_last_link() {
        let (db, registry) = setup();
        let config = registry.get("tags").unwrap();
        let conn = db.connection();
        let post = EntityRef::new("posts", 1);

        reconcile(conn, config, &post, &["featured"]).unwrap();
        let outcome = reconcile(conn, config, &post, &["red"]).unwrap();

        assert_eq!(outcome.unlinked, vec!["featured"]);
        assert!(outcome.deleted.is_empty());
        assert!(store::tag_exists(conn, config, "featured").unwrap());
    }

    #[test]
    fn unknown_entity_type_is_rejected() {
        let (db, registry) = setup();
        let config = registry.get("tags").unwrap();

        let err = reconcile(
            db.connection(),
            config,
            &EntityRef::new("comments", 1),
            &["red"],
        )
        .unwrap_err();

        assert!(err.downcast_ref::<crate::TagError>().is_some());
    }

    #[test]
    fn missing_entity_rolls_back_created_tags() {
        let (db, registry) = setup();
        let config = registry.get("tags").unwrap();
        let conn = db.connection();

        let result = reconcile(conn, config, &EntityRef::new("posts", 99), &["ghost"]);

        assert!(result.is_err(), "linking a missing row violates the foreign key");
        assert!(!store::tag_exists(conn, config, "ghost").unwrap());
    }

    struct Normalizing;

    impl TagLifecycle for Normalizing {
        fn before_validate(&self, _entity: &EntityRef, _desired: &[String]) -> Result<ReconcileOutcome> {
            Ok(ReconcileOutcome::default())
        }
    }

    #[test]
    fn before_tag_store_lowercases_and_rejects_blank() {
        assert_eq!(Normalizing.before_tag_store("  Red "), Some("red".to_string()));
        assert_eq!(Normalizing.before_tag_store("   "), None);
    }
}
