use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, warn};

use crate::model::Entry;

pub const ENTRIES_KEY: &str = "nutrisnap_food_entries";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),
    #[error("storage directory unavailable: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored journal is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("failed to encode journal: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("entry id already present: {0}")]
    DuplicateId(String),
}

/// Persistent key-value storage with atomic single-key writes.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

pub struct SqliteKv {
    conn: Connection,
}

impl SqliteKv {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self { conn })
    }
}

fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
"#,
    )
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let value = stmt.query_row([key], |row| row.get(0)).optional()?;
        Ok(value)
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let updated_at = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        self.conn.execute(
            r#"
INSERT INTO kv (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value=excluded.value,
  updated_at=excluded.updated_at
"#,
            (key, value, &updated_at),
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }
}

/// The journal as a single JSON array under one storage key.
pub struct EntryStore<S> {
    kv: S,
}

impl<S: KvStore> EntryStore<S> {
    pub fn new(kv: S) -> Self {
        Self { kv }
    }

    pub fn load(&self) -> Result<Vec<Entry>, StoreError> {
        match self.kv.get(ENTRIES_KEY)? {
            Some(raw) => serde_json::from_str(&raw).map_err(StoreError::Corrupt),
            None => Ok(Vec::new()),
        }
    }

    pub fn append(&mut self, entry: Entry) -> Result<Vec<Entry>, StoreError> {
        let mut entries = self.load_or_empty()?;
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::DuplicateId(entry.id));
        }
        entries.insert(0, entry);
        self.write(&entries)?;
        Ok(entries)
    }

    pub fn remove(&mut self, id: &str) -> Result<Vec<Entry>, StoreError> {
        let mut entries = self.load_or_empty()?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        debug!("remove {id}: {} entries dropped", before - entries.len());
        self.write(&entries)?;
        Ok(entries)
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.kv.remove(ENTRIES_KEY)
    }

    // A corrupt blob reads as an empty journal; the next write replaces it.
    fn load_or_empty(&self) -> Result<Vec<Entry>, StoreError> {
        match self.load() {
            Err(StoreError::Corrupt(err)) => {
                warn!("discarding corrupt journal record: {err}");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    fn write(&mut self, entries: &[Entry]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(entries).map_err(StoreError::Encode)?;
        self.kv.put(ENTRIES_KEY, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FoodComponent, NutritionData};

    fn entry(id: &str, timestamp: i64, calories: f64) -> Entry {
        Entry {
            id: id.to_string(),
            timestamp,
            nutrition: NutritionData {
                food_name: format!("meal {id}"),
                calories,
                fat: 1.5,
                sugar: 0.25,
                components: vec![FoodComponent {
                    name: "rice".to_string(),
                    calories: calories / 2.0,
                }],
            },
            image_base64: "data:image/jpeg;base64,/9j/".to_string(),
        }
    }

    fn store() -> EntryStore<SqliteKv> {
        EntryStore::new(SqliteKv::open_in_memory().unwrap())
    }

    #[test]
    fn load_on_empty_storage_is_empty() {
        assert!(store().load().unwrap().is_empty());
    }

    #[test]
    fn append_prepends_and_reload_matches() {
        let mut s = store();
        let a = entry("a", 1_000, 100.0);
        let b = entry("b", 2_000, 200.0);

        s.append(a.clone()).unwrap();
        let returned = s.append(b.clone()).unwrap();

        assert_eq!(returned, vec![b.clone(), a.clone()]);
        assert_eq!(s.load().unwrap(), returned);
    }

    #[test]
    fn append_rejects_duplicate_id() {
        let mut s = store();
        s.append(entry("a", 1, 10.0)).unwrap();
        let err = s.append(entry("a", 2, 20.0)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == "a"));
        assert_eq!(s.load().unwrap().len(), 1);
    }

    #[test]
    fn remove_drops_matching_id_and_ignores_unknown() {
        let mut s = store();
        s.append(entry("a", 1, 10.0)).unwrap();
        s.append(entry("b", 2, 20.0)).unwrap();

        let unchanged = s.remove("zzz").unwrap();
        assert_eq!(unchanged.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), ["b", "a"]);

        let after = s.remove("b").unwrap();
        assert_eq!(after.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), ["a"]);
        assert_eq!(s.load().unwrap(), after);
    }

    #[test]
    fn clear_empties_even_without_entries() {
        let mut s = store();
        s.clear().unwrap();
        assert!(s.load().unwrap().is_empty());

        s.append(entry("a", 1, 10.0)).unwrap();
        s.clear().unwrap();
        assert!(s.load().unwrap().is_empty());
    }

    #[test]
    fn corrupt_record_fails_load_and_is_replaced_on_append() {
        let mut kv = SqliteKv::open_in_memory().unwrap();
        kv.put(ENTRIES_KEY, "{not json").unwrap();
        let mut s = EntryStore::new(kv);

        assert!(matches!(s.load(), Err(StoreError::Corrupt(_))));

        let after = s.append(entry("a", 1, 10.0)).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(s.load().unwrap(), after);
    }

    #[test]
    fn wrong_shape_is_corrupt() {
        let mut kv = SqliteKv::open_in_memory().unwrap();
        kv.put(ENTRIES_KEY, r#"{"id":"a"}"#).unwrap();
        let s = EntryStore::new(kv);
        assert!(matches!(s.load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn round_trip_is_lossless_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.db");
        let mut e = entry("round", 1_760_692_800_123, 0.1 + 0.2);
        e.nutrition.fat = 12.345678901234567;
        e.nutrition.sugar = 1e-7;

        {
            let mut s = EntryStore::new(SqliteKv::open(&path).unwrap());
            s.append(e.clone()).unwrap();
        }

        let reopened = EntryStore::new(SqliteKv::open(&path).unwrap());
        assert_eq!(reopened.load().unwrap(), vec![e]);
    }
}
