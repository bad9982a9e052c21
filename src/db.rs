pub mod schema;

use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use crate::compare::natural_cmp;
use schema::INITIAL_SCHEMA;

/// Name of the collation ordering text the way merged results are sorted.
pub const NATURAL_COLLATION: &str = "tagr_natural";

/// Database wrapper providing connection management and schema initialization.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens an in-memory SQLite database.
    ///
    /// Automatically initializes the schema on connection open.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Opens a file-based SQLite database at the given path.
    ///
    /// Creates the database file if it does not exist.
    /// Automatically initializes the schema on connection open.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Enables foreign keys, registers collations and creates the default tag table.
    ///
    /// Foreign keys must be on for the junction cascade/restrict rules to hold.
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute("PRAGMA foreign_keys = ON", [])?;
        register_collations(&self.conn)?;
        self.conn.execute_batch(INITIAL_SCHEMA)?;
        Ok(())
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Registers [`NATURAL_COLLATION`] on a connection.
///
/// [`Database`] does this on open. Connections opened elsewhere need it
/// before they are passed to gathering.
pub fn register_collations(conn: &Connection) -> Result<()> {
    conn.create_collation(NATURAL_COLLATION, natural_cmp)?;
    Ok(())
}

/// Runs `f` inside a savepoint on `conn`.
///
/// Savepoints nest, so this works both standalone and inside a transaction
/// the caller already opened. Releases the savepoint when `f` succeeds;
/// rolls back to it and returns the original error otherwise.
pub(crate) fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute_batch("SAVEPOINT tagr")?;

    match f(conn) {
        Ok(value) => {
            conn.execute_batch("RELEASE tagr")?;
            Ok(value)
        }
        Err(e) => {
            conn.execute_batch("ROLLBACK TO tagr; RELEASE tagr").ok();
            Err(e)
        }
    }
}
