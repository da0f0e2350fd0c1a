use crate::libs::data_storage::DataStorage;
use crate::libs::error::StoreError;
use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub const DB_FILE_NAME: &str = "rollcall.db";

const SCHEMA_COLLECTIONS: &str = "CREATE TABLE IF NOT EXISTS collections (
    name TEXT NOT NULL PRIMARY KEY,
    data TEXT NOT NULL,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);";
const SELECT_COLLECTION: &str = "SELECT data FROM collections WHERE name = ?1";
const UPSERT_COLLECTION: &str = "INSERT INTO collections (name, data, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
    ON CONFLICT(name) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at";
const DELETE_COLLECTION: &str = "DELETE FROM collections WHERE name = ?1";

/// Local key/value area backed by SQLite.
///
/// Each key holds one JSON document, normally a whole entity collection. Reads
/// and writes always move the full document; there are no partial updates.
/// Clones share the same connection.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Opens `rollcall.db` in the default data directory.
    pub fn new() -> Result<Db> {
        let db_file_path = DataStorage::new().get_path(DB_FILE_NAME)?;
        Ok(Self::open(db_file_path)?)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Db, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Db, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Db, StoreError> {
        conn.execute(SCHEMA_COLLECTIONS, [])?;
        Ok(Db {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Reads a collection; a missing key reads as empty.
    pub fn read_collection<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StoreError> {
        Ok(self.read_value(name)?.unwrap_or_default())
    }

    pub fn write_collection<T: Serialize>(&self, name: &str, items: &[T]) -> Result<(), StoreError> {
        self.write_value(name, &items)
    }

    pub fn read_value<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        let data: Option<String> = self
            .conn
            .lock()
            .query_row(SELECT_COLLECTION, params![name], |row| row.get(0))
            .optional()?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub fn write_value<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let data = serde_json::to_string(value)?;
        self.conn.lock().execute(UPSERT_COLLECTION, params![name, data])?;
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.conn.lock().execute(DELETE_COLLECTION, params![name])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_collection_reads_empty() {
        let db = Db::open_in_memory().unwrap();
        let items: Vec<String> = db.read_collection("nothing").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_collection_is_replaced_whole() {
        let db = Db::open_in_memory().unwrap();
        db.write_collection("names", &["a".to_string(), "b".to_string()]).unwrap();
        db.write_collection("names", &["c".to_string()]).unwrap();

        let items: Vec<String> = db.read_collection("names").unwrap();
        assert_eq!(items, vec!["c".to_string()]);

        db.remove("names").unwrap();
        assert!(db.read_value::<Vec<String>>("names").unwrap().is_none());
    }
}
