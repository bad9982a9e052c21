use anyhow::Result;
use rand::Rng;
use tracing::info;

use crate::db::in_transaction;
use crate::gather::{self, GatherRequest, TagFilter};
use crate::models::{EntityRef, RelatedRecord};
use crate::normalize::TagNormalizer;
use crate::reconcile::{self, ReconcileOutcome, TagLifecycle};
use crate::registry::{TagRegistry, TagTypeConfig, TagTypeSpec};
use crate::{Database, Tag, TagError, gc, store};

/// Service layer providing tagging operations.
///
/// TagService owns a Database instance and the registry of configured tag
/// types. It is UI-independent and backs the CLI as well as embedding
/// applications.
///
/// Methods taking a `tag_type: Option<&str>` act on the default (first
/// configured) tag type when given `None`.
///
/// # Examples
///
/// ```
/// use tagr::{Database, TagService, TagTypeSpec};
///
/// # fn main() -> anyhow::Result<()> {
/// let db = Database::in_memory()?;
/// let mut service = TagService::new(db);
/// service.configure(TagTypeSpec::new("tags", "tag"))?;
/// assert!(service.all_tags(None)?.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct TagService {
    db: Database,
    registry: TagRegistry,
}

impl TagService {
    /// Creates a service with no tag types configured.
    pub fn new(db: Database) -> Self {
        Self::with_registry(db, TagRegistry::new())
    }

    /// Creates a service around an already built registry.
    ///
    /// The registry must have been configured against this database.
    pub fn with_registry(db: Database, registry: TagRegistry) -> Self {
        Self { db, registry }
    }

    /// Returns a reference to the underlying database.
    ///
    /// Useful for testing or advanced operations that need direct database access.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Registers a tag type; see [`TagRegistry::configure`].
    pub fn configure(&mut self, spec: TagTypeSpec) -> Result<&TagTypeConfig> {
        self.registry.configure(self.db.connection(), spec)
    }

    /// Gathers records linked to any of the requested tags.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagr::{Database, EntityRef, GatherRequest, Record, TagService, TagTypeSpec};
    /// use tagr::db::schema::create_junction_table;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let db = Database::in_memory()?;
    /// db.connection().execute_batch(
    ///     "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT);
    ///      INSERT INTO posts (id, title) VALUES (1, 'Hello');",
    /// )?;
    /// create_junction_table(db.connection(), "tags", "tag", "posts")?;
    ///
    /// let mut service = TagService::new(db);
    /// service.configure(TagTypeSpec::new("tags", "tag").order_by("posts", "title"))?;
    /// service.reconcile(&EntityRef::new("posts", 1), &["Greeting"])?;
    ///
    /// let found: Vec<Record> = service.gather(&GatherRequest::new("greeting"))?;
    /// assert_eq!(found.len(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn gather<R: RelatedRecord>(&self, request: &GatherRequest) -> Result<Vec<R>> {
        gather::gather(self.db.connection(), &self.registry, request)
    }

    /// Same as [`TagService::gather`], drawing shuffles from `rng`.
    pub fn gather_with_rng<R, G>(&self, request: &GatherRequest, rng: &mut G) -> Result<Vec<R>>
    where
        R: RelatedRecord,
        G: Rng + ?Sized,
    {
        gather::gather_with_rng(self.db.connection(), &self.registry, request, rng)
    }

    /// Gathers records sharing any tag with `entity`, leaving `entity` out.
    ///
    /// The request's own tags and exclusion are replaced.
    pub fn related_to<R: RelatedRecord>(
        &self,
        entity: &EntityRef,
        request: &GatherRequest,
    ) -> Result<Vec<R>> {
        let tags = self.tags_in(request.tag_type.as_deref(), entity)?;

        let request = GatherRequest {
            tags: TagFilter::List(tags),
            exclude: Some(entity.clone()),
            ..request.clone()
        };
        self.gather(&request)
    }

    /// Replaces the entity's tags in the default tag type with `desired`.
    pub fn reconcile<S: AsRef<str>>(
        &self,
        entity: &EntityRef,
        desired: &[S],
    ) -> Result<ReconcileOutcome> {
        let config = self.registry.resolve(None)?;
        reconcile::reconcile(self.db.connection(), config, entity, desired)
    }

    /// Replaces the entity's tags in `tag_type` with `desired`.
    pub fn reconcile_in<S: AsRef<str>>(
        &self,
        tag_type: &str,
        entity: &EntityRef,
        desired: &[S],
    ) -> Result<ReconcileOutcome> {
        let config = self.registry.get(tag_type)?;
        reconcile::reconcile(self.db.connection(), config, entity, desired)
    }

    /// Deletes every orphaned non-preset tag; returns the deleted texts.
    pub fn sweep(&self, tag_type: Option<&str>) -> Result<Vec<String>> {
        gc::sweep(self.db.connection(), self.registry.resolve(tag_type)?)
    }

    /// Tags of the default tag type linked to `entity`, sorted.
    pub fn tags_for(&self, entity: &EntityRef) -> Result<Vec<String>> {
        self.tags_in(None, entity)
    }

    fn tags_in(&self, tag_type: Option<&str>, entity: &EntityRef) -> Result<Vec<String>> {
        let relation = self.registry.resolve(tag_type)?.relation(entity.kind())?;
        store::linked_tags(self.db.connection(), relation, entity.id())
    }

    /// Every stored tag, sorted.
    pub fn all_tags(&self, tag_type: Option<&str>) -> Result<Vec<String>> {
        store::all_tags(self.db.connection(), self.registry.resolve(tag_type)?)
    }

    /// Every stored tag with the number of entities linked to it, sorted by tag.
    pub fn tag_counts(&self, tag_type: Option<&str>) -> Result<Vec<(String, i64)>> {
        let config = self.registry.resolve(tag_type)?;
        let conn = self.db.connection();

        let mut counts = Vec::new();
        for text in store::all_tags(conn, config)? {
            let count = store::link_count(conn, config, &text)?;
            counts.push((text, count));
        }
        Ok(counts)
    }

    /// Whether the tag is stored. The text is normalized first.
    pub fn tag_exists(&self, tag_type: Option<&str>, text: &str) -> Result<bool> {
        let config = self.registry.resolve(tag_type)?;
        match Tag::new(text) {
            Some(tag) => store::tag_exists(self.db.connection(), config, tag.text()),
            None => Ok(false),
        }
    }

    /// Creates the tag unless it exists; returns `true` when created.
    pub fn create_tag(&self, tag_type: Option<&str>, tag: &Tag) -> Result<bool> {
        store::ensure_tag(self.db.connection(), self.registry.resolve(tag_type)?, tag.text())
    }

    /// Renames a tag, merging into `to` when that tag already exists.
    ///
    /// Both texts are normalized. Links move with the tag; on a merge any
    /// entity already linked to `to` keeps a single link.
    ///
    /// # Errors
    ///
    /// - [`TagError::EmptyTag`] if `to` is blank
    /// - [`TagError::UnknownTag`] if `from` is not stored
    /// - [`TagError::PresetTag`] if `from` is a preset tag
    pub fn rename_tag(&self, tag_type: Option<&str>, from: &str, to: &str) -> Result<()> {
        let config = self.registry.resolve(tag_type)?;
        let to = Tag::new(to).ok_or(TagError::EmptyTag)?.into_text();
        let from = TagNormalizer::normalize_tag(from);

        if !store::tag_exists(self.db.connection(), config, &from)? {
            return Err(TagError::UnknownTag(from).into());
        }
        if config.is_preset(&from) {
            return Err(TagError::PresetTag(from).into());
        }
        if from == to {
            return Ok(());
        }

        in_transaction(self.db.connection(), |conn| {
            if store::tag_exists(conn, config, &to)? {
                store::move_links(conn, config, &from, &to)?;
                store::delete_tag(conn, config, &from)?;
            } else {
                store::rename_tag(conn, config, &from, &to)?;
            }
            Ok(())
        })?;

        info!(tag_type = %config.tag_type(), from = %from, to = %to, "renamed tag");
        Ok(())
    }
}

impl TagLifecycle for TagService {
    fn before_validate(&self, entity: &EntityRef, desired: &[String]) -> Result<ReconcileOutcome> {
        self.reconcile(entity, desired)
    }
}
