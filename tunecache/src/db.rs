//! Stockage durable des enregistrements de cache
//!
//! Les caches gardent leurs entrées en mémoire et les recopient dans un
//! [`RecordStore`]. L'implémentation par défaut est une table SQLite
//! `(key, record_json, updated_at)`.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Stockage clé/valeur d'enregistrements JSON
pub trait RecordStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insère ou remplace l'enregistrement stocké sous `key`
    fn put(&self, key: &str, record_json: &str) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    fn all(&self) -> Result<Vec<(String, String)>>;
}

/// Base de données SQLite, une table par cache
#[derive(Debug)]
pub struct DB {
    conn: Mutex<Connection>,
    table_name: String,
}

impl DB {
    /// Ouvre (ou crée) la base et la table `table_name`
    ///
    /// ```rust,no_run
    /// use tunecache::DB;
    /// use std::path::Path;
    ///
    /// let db = DB::init(Path::new("cache.db"), "track_records").unwrap();
    /// ```
    pub fn init(path: &Path, table_name: &str) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, table_name)
    }

    /// Base en mémoire, perdue à la fermeture
    pub fn in_memory(table_name: &str) -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, table_name)
    }

    fn with_connection(conn: Connection, table_name: &str) -> rusqlite::Result<Self> {
        let create_table_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                record_json TEXT NOT NULL,
                updated_at TEXT
            )",
            table_name
        );
        conn.execute(&create_table_sql, [])?;

        Ok(Self {
            conn: Mutex::new(conn),
            table_name: table_name.to_string(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn upsert(&self, key: &str, record_json: &str) -> rusqlite::Result<()> {
        let sql = format!(
            "INSERT INTO {} (key, record_json, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 record_json = excluded.record_json,
                 updated_at = excluded.updated_at",
            self.table_name
        );
        self.conn()
            .execute(&sql, params![key, record_json, Utc::now().to_rfc3339()])?;
        Ok(())
    }

    pub fn get_record(&self, key: &str) -> rusqlite::Result<Option<String>> {
        let sql = format!("SELECT record_json FROM {} WHERE key = ?1", self.table_name);
        self.conn()
            .query_row(&sql, [key], |row| row.get(0))
            .optional()
    }

    pub fn remove(&self, key: &str) -> rusqlite::Result<()> {
        let sql = format!("DELETE FROM {} WHERE key = ?1", self.table_name);
        self.conn().execute(&sql, [key])?;
        Ok(())
    }

    pub fn get_all(&self) -> rusqlite::Result<Vec<(String, String)>> {
        let conn = self.conn();
        let sql = format!("SELECT key, record_json FROM {}", self.table_name);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> rusqlite::Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table_name);
        let count: i64 = self.conn().query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl RecordStore for DB {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_record(key)?)
    }

    fn put(&self, key: &str, record_json: &str) -> Result<()> {
        Ok(self.upsert(key, record_json)?)
    }

    fn delete(&self, key: &str) -> Result<()> {
        Ok(self.remove(key)?)
    }

    fn all(&self) -> Result<Vec<(String, String)>> {
        Ok(self.get_all()?)
    }
}

/// [`RecordStore`] volatile, quand aucune base n'est souhaitée
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.records().get(key).cloned())
    }

    fn put(&self, key: &str, record_json: &str) -> Result<()> {
        self.records().insert(key.to_string(), record_json.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.records().remove(key);
        Ok(())
    }

    fn all(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .records()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let db = DB::init(&dir.path().join("cache.db"), "records").unwrap();

        db.put("a.mp3", r#"{"title":"A"}"#).unwrap();
        db.put("a.mp3", r#"{"title":"B"}"#).unwrap();
        db.put("b.mp3", r#"{"title":"C"}"#).unwrap();

        assert_eq!(db.get("a.mp3").unwrap().as_deref(), Some(r#"{"title":"B"}"#));
        assert_eq!(db.count().unwrap(), 2);

        db.delete("a.mp3").unwrap();
        assert_eq!(db.get("a.mp3").unwrap(), None);
        assert_eq!(db.all().unwrap().len(), 1);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        DB::init(&path, "records").unwrap().put("k", "{}").unwrap();

        let db = DB::init(&path, "records").unwrap();
        assert_eq!(db.all().unwrap(), vec![("k".to_string(), "{}".to_string())]);
    }

    #[test]
    fn tables_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let tracks = DB::init(&path, "tracks").unwrap();
        let covers = DB::init(&path, "covers").unwrap();

        tracks.put("k", "1").unwrap();
        assert_eq!(covers.get("k").unwrap(), None);
    }
}
