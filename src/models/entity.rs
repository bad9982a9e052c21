use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of a taggable row: its table (the related type) and primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    kind: String,
    id: i64,
}

impl EntityRef {
    /// Creates a reference to row `id` of table `kind`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tagr::EntityRef;
    ///
    /// let post = EntityRef::new("posts", 1);
    /// assert_eq!(post.kind(), "posts");
    /// assert_eq!(post.id(), 1);
    /// assert_eq!(post.to_string(), "posts#1");
    /// ```
    pub fn new(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }

    /// Returns the related type (table name).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the primary key value.
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Direction applied to sort-proxy comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest proxy value first
    #[default]
    Ascending,
    /// Largest proxy value first
    Descending,
}

impl SortDirection {
    /// SQL keyword for this direction.
    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_refs_compare_by_kind_and_id() {
        assert_eq!(EntityRef::new("posts", 1), EntityRef::new("posts", 1));
        assert_ne!(EntityRef::new("posts", 1), EntityRef::new("photos", 1));
        assert_ne!(EntityRef::new("posts", 1), EntityRef::new("posts", 2));
    }

    #[test]
    fn sort_direction_parses_short_and_long_forms() {
        assert_eq!("asc".parse(), Ok(SortDirection::Ascending));
        assert_eq!("DESC".parse(), Ok(SortDirection::Descending));
        assert_eq!("descending".parse(), Ok(SortDirection::Descending));
        assert!("sideways".parse::<SortDirection>().is_err());
    }

    #[test]
    fn default_direction_is_ascending() {
        assert_eq!(SortDirection::default().sql(), "ASC");
        assert_eq!(SortDirection::Descending.sql(), "DESC");
    }
}
