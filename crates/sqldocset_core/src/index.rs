use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, params, params_from_iter};

use crate::entry::{EntryType, IndexEntry};

const SEARCH_INDEX_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS searchIndex (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    path TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS anchor ON searchIndex (name, type, path);
"#;

/// Field-equality filter for [`IndexStore::count`]; unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryCriteria {
    pub name: Option<String>,
    pub entry_type: Option<EntryType>,
    pub path: Option<String>,
}

impl EntryCriteria {
    pub fn name_and_type(name: &str, entry_type: EntryType) -> Self {
        Self {
            name: Some(name.to_string()),
            entry_type: Some(entry_type),
            path: None,
        }
    }

    pub fn of_type(entry_type: EntryType) -> Self {
        Self {
            entry_type: Some(entry_type),
            ..Self::default()
        }
    }
}

/// The docset search index: one `searchIndex` table, unique over `(name, type, path)`.
pub struct IndexStore {
    connection: Connection,
}

impl IndexStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create database parent directory {}",
                    parent.display()
                )
            })?;
        }
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        connection
            .busy_timeout(Duration::from_secs(5))
            .context("failed to set sqlite busy timeout")?;
        Self::with_connection(connection)
    }

    /// Open a previously built index; `None` when nothing has been built yet.
    pub fn open_existing(db_path: &Path) -> Result<Option<Self>> {
        if !db_path.exists() {
            return Ok(None);
        }
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        if !table_exists(&connection, "searchIndex")? {
            return Ok(None);
        }
        Ok(Some(Self { connection }))
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory index")?;
        Self::with_connection(connection)
    }

    fn with_connection(connection: Connection) -> Result<Self> {
        connection
            .execute_batch(SEARCH_INDEX_SCHEMA_SQL)
            .context("failed to initialize searchIndex schema")?;
        Ok(Self { connection })
    }

    /// Start the build transaction. Dropping it without commit rolls back.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        self.connection
            .unchecked_transaction()
            .context("failed to start index transaction")
    }

    pub fn clear(&self) -> Result<usize> {
        self.connection
            .execute("DELETE FROM searchIndex", [])
            .context("failed to clear searchIndex table")
    }

    /// Insert one row. Returns `false` when the exact triple already exists.
    pub fn insert(&self, entry: &IndexEntry) -> Result<bool> {
        let affected = self
            .connection
            .prepare_cached(
                "INSERT INTO searchIndex (name, type, path) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name, type, path) DO NOTHING",
            )
            .context("failed to prepare searchIndex insert")?
            .execute(params![entry.name, entry.entry_type.as_str(), entry.path])
            .with_context(|| {
                format!(
                    "failed to insert {} `{}` at {}",
                    entry.entry_type, entry.name, entry.path
                )
            })?;
        Ok(affected > 0)
    }

    pub fn count(&self, criteria: &EntryCriteria) -> Result<usize> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(name) = &criteria.name {
            values.push(name.clone());
            clauses.push(format!("name = ?{}", values.len()));
        }
        if let Some(entry_type) = criteria.entry_type {
            values.push(entry_type.as_str().to_string());
            clauses.push(format!("type = ?{}", values.len()));
        }
        if let Some(path) = &criteria.path {
            values.push(path.clone());
            clauses.push(format!("path = ?{}", values.len()));
        }

        let mut sql = "SELECT COUNT(*) FROM searchIndex".to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let count: i64 = self
            .connection
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))
            .with_context(|| format!("failed query: {sql}"))?;
        usize::try_from(count).context("count does not fit into usize")
    }

    /// All rows ordered by `(name, type, path)`.
    pub fn entries(&self) -> Result<Vec<IndexEntry>> {
        let mut statement = self
            .connection
            .prepare("SELECT name, type, path FROM searchIndex ORDER BY name, type, path")
            .context("failed to prepare searchIndex listing")?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("failed to list searchIndex rows")?;

        let mut out = Vec::new();
        for row in rows {
            let (name, entry_type, path) = row.context("failed to decode searchIndex row")?;
            let entry_type = entry_type
                .parse::<EntryType>()
                .with_context(|| format!("searchIndex row `{name}` has an invalid type"))?;
            out.push(IndexEntry {
                name,
                entry_type,
                path,
            });
        }
        Ok(out)
    }

    pub fn counts_by_type(&self) -> Result<BTreeMap<String, usize>> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT type, COUNT(*) AS count
                 FROM searchIndex
                 GROUP BY type
                 ORDER BY type ASC",
            )
            .context("failed to prepare type aggregation query")?;
        let rows = statement
            .query_map([], |row| {
                let entry_type: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((entry_type, count))
            })
            .context("failed to run type aggregation query")?;

        let mut out = BTreeMap::new();
        for row in rows {
            let (entry_type, count) = row.context("failed to read type aggregation row")?;
            let count = usize::try_from(count).context("type count does not fit into usize")?;
            out.insert(entry_type, count);
        }
        Ok(out)
    }
}

fn table_exists(connection: &Connection, table_name: &str) -> Result<bool> {
    let exists: i64 = connection
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table_name],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to check sqlite_master for table {table_name}"))?;
    Ok(exists == 1)
}
