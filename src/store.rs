use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

use crate::entry::{ConfigEntry, EntryOptions};
use crate::now_s;

/// Key-value persistence for config entries, keyed by unique id.
pub trait EntryStore {
    fn get(&self, unique_id: &str) -> Result<Option<ConfigEntry>>;

    fn contains(&self, unique_id: &str) -> Result<bool> {
        Ok(self.get(unique_id)?.is_some())
    }

    /// Insert a new entry. Fails if the unique id is already stored.
    fn insert(&mut self, entry: &ConfigEntry) -> Result<()>;

    fn update_options(&mut self, unique_id: &str, options: &EntryOptions) -> Result<()>;

    /// Remove an entry, returning whether it existed.
    fn remove(&mut self, unique_id: &str) -> Result<bool>;

    /// All entries, ordered by unique id.
    fn entries(&self) -> Result<Vec<ConfigEntry>>;
}

pub struct SqliteEntryStore {
    conn: Connection,
}

impl SqliteEntryStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS config_entries (
              unique_id TEXT PRIMARY KEY,
              title TEXT NOT NULL,
              data_json TEXT NOT NULL,
              options_json TEXT NOT NULL,
              created_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

fn decode_row(
    unique_id: String,
    title: String,
    data_json: String,
    options_json: String,
) -> Result<ConfigEntry> {
    let data = serde_json::from_str(&data_json)
        .map_err(|e| anyhow!("corrupt config entry {}: {}", unique_id, e))?;
    let options = serde_json::from_str(&options_json)
        .map_err(|e| anyhow!("corrupt options for {}: {}", unique_id, e))?;
    Ok(ConfigEntry {
        unique_id,
        title,
        data,
        options,
    })
}

impl EntryStore for SqliteEntryStore {
    fn get(&self, unique_id: &str) -> Result<Option<ConfigEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT unique_id, title, data_json, options_json FROM config_entries WHERE unique_id = ?1",
                params![unique_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, title, data, options)| decode_row(id, title, data, options))
            .transpose()
    }

    fn insert(&mut self, entry: &ConfigEntry) -> Result<()> {
        if self.contains(&entry.unique_id)? {
            return Err(anyhow!("config entry {} already exists", entry.unique_id));
        }
        let created_at = i64::try_from(now_s()?)
            .map_err(|_| anyhow!("current time exceeds i64 range"))?;
        self.conn.execute(
            r#"
            INSERT INTO config_entries(unique_id, title, data_json, options_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entry.unique_id,
                entry.title,
                serde_json::to_string(&entry.data)?,
                serde_json::to_string(&entry.options)?,
                created_at
            ],
        )?;
        Ok(())
    }

    fn update_options(&mut self, unique_id: &str, options: &EntryOptions) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE config_entries SET options_json = ?1 WHERE unique_id = ?2",
            params![serde_json::to_string(options)?, unique_id],
        )?;
        if changed == 0 {
            return Err(anyhow!("unknown config entry {}", unique_id));
        }
        Ok(())
    }

    fn remove(&mut self, unique_id: &str) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM config_entries WHERE unique_id = ?1",
            params![unique_id],
        )?;
        Ok(removed > 0)
    }

    fn entries(&self) -> Result<Vec<ConfigEntry>> {
        let rows = {
            let mut stmt = self.conn.prepare(
                "SELECT unique_id, title, data_json, options_json FROM config_entries ORDER BY unique_id ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ));
            }
            out
        };

        rows.into_iter()
            .map(|(id, title, data, options)| decode_row(id, title, data, options))
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryEntryStore {
    entries: BTreeMap<String, ConfigEntry>,
}

impl InMemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryStore for InMemoryEntryStore {
    fn get(&self, unique_id: &str) -> Result<Option<ConfigEntry>> {
        Ok(self.entries.get(unique_id).cloned())
    }

    fn insert(&mut self, entry: &ConfigEntry) -> Result<()> {
        if self.entries.contains_key(&entry.unique_id) {
            return Err(anyhow!("config entry {} already exists", entry.unique_id));
        }
        self.entries.insert(entry.unique_id.clone(), entry.clone());
        Ok(())
    }

    fn update_options(&mut self, unique_id: &str, options: &EntryOptions) -> Result<()> {
        let entry = self
            .entries
            .get_mut(unique_id)
            .ok_or_else(|| anyhow!("unknown config entry {}", unique_id))?;
        entry.options = options.clone();
        Ok(())
    }

    fn remove(&mut self, unique_id: &str) -> Result<bool> {
        Ok(self.entries.remove(unique_id).is_some())
    }

    fn entries(&self) -> Result<Vec<ConfigEntry>> {
        Ok(self.entries.values().cloned().collect())
    }
}
