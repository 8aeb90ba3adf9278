use crate::error::{Result, StoreError};
use crate::models::{NewTask, SearchHit, Task, TaskCounts, TaskFilter, TaskPatch, TaskStats};
use crate::store::{
    TaskStore, date_value, ensure_list_exists, id_value, require_non_empty, text_value,
    timestamp_value,
};
use chrono::{Days, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

const TASK_COLUMNS: &str = "id, title, description, completed, priority, due_date, list_id, \
                            is_important, created_at, updated_at, completed_at";

const DISPLAY_ORDER: &str =
    "ORDER BY is_important DESC, due_date IS NULL, due_date ASC, created_at DESC, id DESC";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
        priority: row.get(4)?,
        due_date: row.get(5)?,
        list_id: row.get(6)?,
        is_important: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

fn select_task(conn: &Connection, id: i64) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], task_from_row).optional()?)
}

fn count(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<i64> {
    Ok(conn.query_row(sql, params, |row| row.get(0))?)
}

/// Percentage with one decimal place, ties rounded to even; zero when there
/// is nothing to complete.
pub fn completion_rate(completed: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (completed as f64 / total as f64 * 1000.0).round_ties_even() / 10.0
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

impl TaskStore {
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.with_conn("list_tasks", move |conn| {
            let mut clauses = Vec::new();
            let mut values = Vec::new();
            if let Some(list_id) = filter.list_id {
                clauses.push("list_id = ?");
                values.push(Value::Integer(list_id));
            }
            if !filter.show_completed {
                clauses.push("completed = 0");
            }
            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };
            let sql = format!("SELECT {TASK_COLUMNS} FROM tasks {where_sql} {DISPLAY_ORDER}");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), task_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    pub async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        self.with_conn("get_task", move |conn| select_task(conn, id))
            .await
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn create_task(&self, input: NewTask) -> Result<i64> {
        let title = require_non_empty("title", &input.title)?;
        let id = self
            .with_conn("create_task", move |conn| {
                if let Some(list_id) = input.list_id {
                    ensure_list_exists(conn, list_id)?;
                }
                let now = Utc::now();
                conn.execute(
                    "INSERT INTO tasks (title, description, priority, due_date, list_id, \
                     is_important, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                    params![
                        title,
                        input.description,
                        input.priority,
                        input.due_date,
                        input.list_id,
                        input.is_important,
                        timestamp_value(now),
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        tracing::info!(task_id = id, "task created");
        Ok(id)
    }

    /// Applies a partial update. Returns `None` when the task does not exist.
    ///
    /// `completed_at` is stamped only on a false→true transition and cleared
    /// whenever the task is marked incomplete.
    #[tracing::instrument(level = "info", skip_all, fields(task_id = id))]
    pub async fn update_task(&self, id: i64, patch: TaskPatch) -> Result<Option<Task>> {
        if patch.is_empty() {
            return Err(StoreError::InvalidInput("no fields to update".to_string()));
        }
        let title = patch
            .title
            .as_deref()
            .map(|t| require_non_empty("title", t))
            .transpose()?;

        self.with_conn("update_task", move |conn| {
            let tx = conn.transaction()?;
            if select_task(&tx, id)?.is_none() {
                return Ok(None);
            }
            if let Some(Some(list_id)) = patch.list_id {
                ensure_list_exists(&tx, list_id)?;
            }

            let now = timestamp_value(Utc::now());
            let mut sets: Vec<&str> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            if let Some(title) = title {
                sets.push("title = ?");
                values.push(Value::Text(title));
            }
            if let Some(description) = patch.description {
                sets.push("description = ?");
                values.push(text_value(description));
            }
            if let Some(priority) = patch.priority {
                sets.push("priority = ?");
                values.push(Value::Text(priority.as_str().to_string()));
            }
            if let Some(due_date) = patch.due_date {
                sets.push("due_date = ?");
                values.push(date_value(due_date));
            }
            if let Some(list_id) = patch.list_id {
                sets.push("list_id = ?");
                values.push(id_value(list_id));
            }
            if let Some(is_important) = patch.is_important {
                sets.push("is_important = ?");
                values.push(Value::Integer(is_important.into()));
            }
            match patch.completed {
                Some(true) => {
                    // SET expressions see the pre-update row.
                    sets.push("completed_at = CASE WHEN completed = 1 THEN completed_at ELSE ? END");
                    values.push(now.clone());
                    sets.push("completed = 1");
                }
                Some(false) => {
                    sets.push("completed = 0");
                    sets.push("completed_at = NULL");
                }
                None => {}
            }
            sets.push("updated_at = ?");
            values.push(now);
            values.push(Value::Integer(id));

            let sql = format!("UPDATE tasks SET {} WHERE id = ?", sets.join(", "));
            tx.execute(&sql, params_from_iter(values))?;
            let updated = select_task(&tx, id)?;
            tx.commit()?;
            Ok(updated)
        })
        .await
    }

    /// Returns whether a row was deleted.
    #[tracing::instrument(level = "info", skip_all, fields(task_id = id))]
    pub async fn delete_task(&self, id: i64) -> Result<bool> {
        self.with_conn("delete_task", move |conn| {
            Ok(conn.execute("DELETE FROM tasks WHERE id = ?1", [id])? > 0)
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn search_tasks(&self, query: &str) -> Result<Vec<SearchHit>> {
        let query = require_non_empty("query", query)?;
        let pattern = like_pattern(&query);
        self.with_conn("search_tasks", move |conn| {
            let mut stmt = conn.prepare(
                r#"
SELECT t.id, t.title, t.description, t.completed, t.priority,
       t.due_date, t.list_id, tl.name, tl.icon
FROM tasks t
LEFT JOIN task_lists tl ON t.list_id = tl.id
WHERE t.title LIKE ?1 ESCAPE '\' OR t.description LIKE ?1 ESCAPE '\'
ORDER BY t.is_important DESC, t.due_date IS NULL, t.due_date ASC, t.id ASC
"#,
            )?;
            let rows = stmt.query_map([pattern], |row| {
                Ok(SearchHit {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    completed: row.get(3)?,
                    priority: row.get(4)?,
                    due_date: row.get(5)?,
                    list_id: row.get(6)?,
                    list_name: row.get(7)?,
                    list_icon: row.get(8)?,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    pub async fn counts(&self) -> Result<TaskCounts> {
        self.with_conn("counts", |conn| {
            Ok(TaskCounts {
                total: count(conn, "SELECT COUNT(*) FROM tasks", [])?,
                completed: count(conn, "SELECT COUNT(*) FROM tasks WHERE completed = 1", [])?,
                important_open: count(
                    conn,
                    "SELECT COUNT(*) FROM tasks WHERE is_important = 1 AND completed = 0",
                    [],
                )?,
            })
        })
        .await
    }

    /// Most recently created tasks first.
    pub async fn recent_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn("recent_tasks", move |conn| {
            let sql = format!(
                "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC, id DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([limit], task_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(today = %today))]
    pub async fn stats(&self, today: NaiveDate) -> Result<TaskStats> {
        let week_end = today.checked_add_days(Days::new(7)).unwrap_or(today);
        self.with_conn("stats", move |conn| {
            let total = count(conn, "SELECT COUNT(*) FROM tasks", [])?;
            let completed = count(conn, "SELECT COUNT(*) FROM tasks WHERE completed = 1", [])?;
            let important = count(
                conn,
                "SELECT COUNT(*) FROM tasks WHERE is_important = 1 AND completed = 0",
                [],
            )?;
            let today_due = count(
                conn,
                "SELECT COUNT(*) FROM tasks WHERE due_date = ?1 AND completed = 0",
                [date_value(Some(today))],
            )?;
            let week_due = count(
                conn,
                "SELECT COUNT(*) FROM tasks WHERE due_date BETWEEN ?1 AND ?2 AND completed = 0",
                [date_value(Some(today)), date_value(Some(week_end))],
            )?;
            Ok(TaskStats {
                total_tasks: total,
                completed_tasks: completed,
                pending_tasks: total - completed,
                important_tasks: important,
                today_due_tasks: today_due,
                week_due_tasks: week_due,
                completion_rate: completion_rate(completed, total),
            })
        })
        .await
    }
}
