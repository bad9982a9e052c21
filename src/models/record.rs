use std::collections::BTreeMap;
use std::fmt;

use rusqlite::Row;
use rusqlite::types::ValueRef;
use serde::Serialize;
use serde_json::Value;

use super::EntityRef;

/// A row of some related type, as produced by gathering.
///
/// Applications normally implement this on an enum with one variant per
/// related type they tag, so a merged result is a closed, typed set.
/// `sort_value` is the typed accessor table: it maps a sort-proxy name
/// (a column of the variant's table) to the value used for ordering.
pub trait RelatedRecord: Sized {
    /// Builds a record of type `kind` from a full row of that table.
    ///
    /// `key` names the table's key column, the one junction rows reference.
    fn from_row(kind: &str, key: &str, row: &Row<'_>) -> rusqlite::Result<Self>;

    /// The related type (table) this record belongs to.
    fn kind(&self) -> &str;

    /// Primary key of the record.
    fn id(&self) -> i64;

    /// Value of the named sort proxy, or `None` when absent.
    fn sort_value(&self, proxy: &str) -> Option<String>;

    /// Identity of the record.
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id())
    }
}

/// A related row with all of its columns captured dynamically.
///
/// Useful when the related types are only known at runtime, as in the CLI.
/// The identity is read from the table's key column, which must be an integer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    kind: String,
    id: i64,
    #[serde(skip)]
    key_column: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Returns the value of a column, if the row had it.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns all captured columns.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }
}

impl RelatedRecord for Record {
    fn from_row(kind: &str, key: &str, row: &Row<'_>) -> rusqlite::Result<Self> {
        let stmt = row.as_ref();
        let mut fields = BTreeMap::new();

        for (index, name) in stmt.column_names().into_iter().enumerate() {
            let value = match row.get_ref(index)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(i) => Value::from(i),
                ValueRef::Real(f) => Value::from(f),
                ValueRef::Text(bytes) => Value::from(String::from_utf8_lossy(bytes).into_owned()),
                ValueRef::Blob(bytes) => Value::from(format!("<{} bytes>", bytes.len())),
            };
            fields.insert(name.to_string(), value);
        }

        Ok(Self {
            kind: kind.to_string(),
            id: row.get(key)?,
            key_column: key.to_string(),
            fields,
        })
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn sort_value(&self, proxy: &str) -> Option<String> {
        match self.fields.get(proxy)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)?;
        for (name, value) in self.fields.iter().filter(|(name, _)| **name != self.key_column) {
            match value {
                Value::String(s) => write!(f, " {name}={s}")?,
                other => write!(f, " {name}={other}")?,
            }
        }
        Ok(())
    }
}
