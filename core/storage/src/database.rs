//! SQLite-backed local database.
//!
//! Holds the preference and key/value tables itself and lends its
//! connection to the event buffers in the course and sync crates, which
//! create their own tables through [`Database::migrate`].

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use coursesync_common::{Error, Result};

use crate::store::{KeyValueStore, PreferenceStore};

/// Local database manager using SQLite.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create or open a database file.
    ///
    /// # Errors
    /// - Database creation or schema initialisation failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(to_db_error)?;
        let db = Self::init(conn)?;
        info!("Local database opened at {}", db_path.as_ref().display());
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(to_db_error)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS key_values (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(to_db_error)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply an idempotent schema script (`CREATE TABLE IF NOT EXISTS ...`).
    pub fn migrate(&self, schema: &str) -> Result<()> {
        self.with_conn(|conn| conn.execute_batch(schema))
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// The call is synchronous and holds the connection lock until `f`
    /// returns, so async callers sharing one `Database` take turns on it.
    /// SQLite errors are mapped to [`Error::Database`].
    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| Error::Database("connection lock poisoned".to_string()))?;
        f(&mut *conn).map_err(to_db_error)
    }

    fn get_from(&self, table: &str, key: &str) -> Result<Option<String>> {
        let sql = format!("SELECT value FROM {} WHERE key = ?1", table);
        self.with_conn(|conn| {
            conn.query_row(&sql, [key], |row| row.get::<_, String>(0))
                .optional()
        })
    }

    fn put_into(&self, table: &str, key: &str, value: &str) -> Result<()> {
        debug!("Upserting {} entry: {}", table, key);
        let sql = format!("INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)", table);
        self.with_conn(|conn| conn.execute(&sql, params![key, value]).map(|_| ()))
    }
}

fn to_db_error(err: rusqlite::Error) -> Error {
    Error::Database(err.to_string())
}

#[async_trait]
impl PreferenceStore for Database {
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.get_from("preferences", key)
    }

    async fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.put_into("preferences", key, value)
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        self.get_from("key_values", key)
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.put_into("key_values", key, value)
    }

    async fn remove_value(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM key_values WHERE key = ?1", [key])
                .map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_preference_roundtrip() {
        let db = Database::in_memory().unwrap();
        assert!(db.get_string("mode").await.unwrap().is_none());

        db.put_string("mode", "ALWAYS_ON").await.unwrap();
        db.put_string("mode", "OFF").await.unwrap();
        assert_eq!(db.get_string("mode").await.unwrap().as_deref(), Some("OFF"));
    }

    #[tokio::test]
    async fn test_key_value_remove() {
        let db = Database::in_memory().unwrap();
        db.set_value("faq-en", "{}").await.unwrap();
        db.remove_value("faq-en").await.unwrap();
        assert!(db.get_value("faq-en").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sdk.db");

        {
            let db = Database::open(&path).unwrap();
            db.put_string("k", "v").await.unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_string("k").await.unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let schema = "CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY);";
        db.migrate(schema).unwrap();
        db.migrate(schema).unwrap();

        let count: i64 = db
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0)))
            .unwrap();
        assert_eq!(count, 0);
    }
}
