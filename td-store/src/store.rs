use crate::error::{Result, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use rusqlite::types::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS task_lists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    icon TEXT NOT NULL DEFAULT '📋',
    color TEXT NOT NULL DEFAULT '#0078d4',
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    completed BOOLEAN NOT NULL DEFAULT 0,
    priority TEXT NOT NULL DEFAULT 'medium',
    due_date DATE,
    list_id INTEGER REFERENCES task_lists (id),
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    completed_at TIMESTAMP,
    is_important BOOLEAN NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_tasks_list_id ON tasks (list_id);
CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks (created_at);

CREATE TABLE IF NOT EXISTS user_preferences (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    theme TEXT NOT NULL DEFAULT 'light',
    language TEXT NOT NULL DEFAULT 'zh-CN',
    accent_color TEXT NOT NULL DEFAULT '#0078d4',
    font_size TEXT NOT NULL DEFAULT 'medium',
    animations_enabled BOOLEAN NOT NULL DEFAULT 1,
    transparency_enabled BOOLEAN NOT NULL DEFAULT 1,
    view_mode TEXT NOT NULL DEFAULT 'list',
    show_completed BOOLEAN NOT NULL DEFAULT 1,
    default_list_id INTEGER,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

INSERT OR IGNORE INTO user_preferences (id) VALUES (1);
"#;

#[derive(Debug, Clone)]
pub struct TaskStore {
    db_path: PathBuf,
}

impl TaskStore {
    /// Points at a database file without touching it.
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Opens (creating if needed) the database and makes sure the schema and
    /// the preferences row exist.
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let store = Self::new(db_path);
        store.bootstrap().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[tracing::instrument(level = "info", skip_all, fields(db_path = %self.db_path.display()))]
    pub async fn bootstrap(&self) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::Database(format!("create {}: {e}", parent.display()))
                })?;
            }
        }
        self.with_conn("bootstrap", |conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        tracing::info!("task store schema ready");
        Ok(())
    }

    pub(crate) async fn with_conn<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = open_connection(&db_path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Join(format!("{op}: {e}")))?
        .inspect_err(|e| tracing::debug!(op, error = %e, "task store operation failed"))
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| StoreError::Database(format!("open {}: {e}", path.display())))?;
    conn.busy_timeout(Duration::from_millis(1000))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

pub(crate) fn timestamp_value(ts: DateTime<Utc>) -> Value {
    Value::Text(ts.format("%F %T%.9f%:z").to_string())
}

pub(crate) fn date_value(date: Option<NaiveDate>) -> Value {
    match date {
        Some(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        None => Value::Null,
    }
}

pub(crate) fn text_value(text: Option<String>) -> Value {
    text.map(Value::Text).unwrap_or(Value::Null)
}

pub(crate) fn id_value(id: Option<i64>) -> Value {
    id.map(Value::Integer).unwrap_or(Value::Null)
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn ensure_list_exists(conn: &Connection, list_id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM task_lists WHERE id = ?1)",
        [list_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(StoreError::NotFound(format!("task list {list_id}")));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_store;
    use super::*;

    #[tokio::test]
    async fn bootstrap_is_idempotent_and_seeds_preferences_once() {
        let (_dir, store) = temp_store().await;
        store.bootstrap().await.expect("second bootstrap");

        let rows: i64 = store
            .with_conn("count", |conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM user_preferences", [], |r| r.get(0))?)
            })
            .await
            .expect("count preferences");
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn unreadable_database_path_surfaces_an_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        // A directory is not a database file.
        let store = TaskStore::new(dir.path());
        assert!(store.counts().await.is_err());
    }
}
