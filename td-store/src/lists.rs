use crate::error::{Result, StoreError};
use crate::models::{NewTaskList, TaskList, TaskListPatch};
use crate::store::{TaskStore, require_non_empty, timestamp_value};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};

const DEFAULT_ICON: &str = "📋";
const DEFAULT_COLOR: &str = "#0078d4";

impl TaskStore {
    /// All lists in display order, with per-list task totals.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn list_task_lists(&self) -> Result<Vec<TaskList>> {
        self.with_conn("list_task_lists", |conn| {
            let mut stmt = conn.prepare(
                r#"
SELECT tl.id, tl.name, tl.icon, tl.color, tl.sort_order,
       COUNT(t.id) AS total_tasks,
       COUNT(CASE WHEN t.completed = 1 THEN 1 END) AS completed_tasks
FROM task_lists tl
LEFT JOIN tasks t ON tl.id = t.list_id
GROUP BY tl.id
ORDER BY tl.sort_order, tl.id
"#,
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(TaskList {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    icon: row.get(2)?,
                    color: row.get(3)?,
                    sort_order: row.get(4)?,
                    total_tasks: row.get(5)?,
                    completed_tasks: row.get(6)?,
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

    /// New lists are appended after the current last one.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn create_task_list(&self, input: NewTaskList) -> Result<i64> {
        let name = require_non_empty("name", &input.name)?;
        let icon = non_blank_or(input.icon, DEFAULT_ICON);
        let color = non_blank_or(input.color, DEFAULT_COLOR);
        let id = self
            .with_conn("create_task_list", move |conn| {
                let tx = conn.transaction()?;
                let max_order: Option<i64> =
                    tx.query_row("SELECT MAX(sort_order) FROM task_lists", [], |row| {
                        row.get(0)
                    })?;
                let now = timestamp_value(Utc::now());
                tx.execute(
                    "INSERT INTO task_lists (name, icon, color, sort_order, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![name, icon, color, max_order.unwrap_or(0) + 1, now],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(id)
            })
            .await?;
        tracing::info!(list_id = id, "task list created");
        Ok(id)
    }

    /// Returns whether the list exists.
    #[tracing::instrument(level = "info", skip_all, fields(list_id = id))]
    pub async fn update_task_list(&self, id: i64, patch: TaskListPatch) -> Result<bool> {
        if patch.is_empty() {
            return Err(StoreError::InvalidInput("no fields to update".to_string()));
        }
        let name = patch
            .name
            .as_deref()
            .map(|n| require_non_empty("name", n))
            .transpose()?;

        self.with_conn("update_task_list", move |conn| {
            let mut sets: Vec<&str> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            if let Some(name) = name {
                sets.push("name = ?");
                values.push(Value::Text(name));
            }
            if let Some(icon) = patch.icon {
                sets.push("icon = ?");
                values.push(Value::Text(icon));
            }
            if let Some(color) = patch.color {
                sets.push("color = ?");
                values.push(Value::Text(color));
            }
            sets.push("updated_at = ?");
            values.push(timestamp_value(Utc::now()));
            values.push(Value::Integer(id));

            let sql = format!("UPDATE task_lists SET {} WHERE id = ?", sets.join(", "));
            Ok(conn.execute(&sql, params_from_iter(values))? > 0)
        })
        .await
    }

    /// Deletes the list together with every task that references it. A
    /// preference pointing at the list is reset.
    #[tracing::instrument(level = "info", skip_all, fields(list_id = id))]
    pub async fn delete_task_list(&self, id: i64) -> Result<bool> {
        let (tasks_deleted, deleted) = self
            .with_conn("delete_task_list", move |conn| {
                let tx = conn.transaction()?;
                let tasks_deleted = tx.execute("DELETE FROM tasks WHERE list_id = ?1", [id])?;
                tx.execute(
                    "UPDATE user_preferences SET default_list_id = NULL WHERE default_list_id = ?1",
                    [id],
                )?;
                let deleted = tx.execute("DELETE FROM task_lists WHERE id = ?1", [id])? > 0;
                tx.commit()?;
                Ok((tasks_deleted, deleted))
            })
            .await?;
        tracing::info!(tasks_deleted, deleted, "task list delete finished");
        Ok(deleted)
    }
}

fn non_blank_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, PreferencesPatch, TaskFilter, TaskPatch};
    use crate::store::test_support::temp_store;

    fn named(name: &str) -> NewTaskList {
        NewTaskList {
            name: name.to_string(),
            ..NewTaskList::default()
        }
    }

    #[tokio::test]
    async fn new_lists_get_defaults_and_increasing_sort_order() {
        let (_dir, store) = temp_store().await;
        let first = store.create_task_list(named("inbox")).await.expect("create");
        let second = store
            .create_task_list(NewTaskList {
                name: "work".to_string(),
                icon: Some("💼".to_string()),
                color: Some("#ff8c00".to_string()),
            })
            .await
            .expect("create");

        let lists = store.list_task_lists().await.expect("list");
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].id, first);
        assert_eq!(lists[0].sort_order, 1);
        assert_eq!(lists[0].icon, DEFAULT_ICON);
        assert_eq!(lists[0].color, DEFAULT_COLOR);
        assert_eq!(lists[1].id, second);
        assert_eq!(lists[1].sort_order, 2);
        assert_eq!(lists[1].icon, "💼");

        assert!(matches!(
            store.create_task_list(named(" ")).await,
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn list_counts_reflect_tasks() {
        let (_dir, store) = temp_store().await;
        let list = store.create_task_list(named("home")).await.expect("create");
        for title in ["sweep", "laundry"] {
            let id = store
                .create_task(NewTask {
                    title: title.to_string(),
                    list_id: Some(list),
                    ..NewTask::default()
                })
                .await
                .expect("create task");
            if title == "sweep" {
                store
                    .update_task(id, TaskPatch { completed: Some(true), ..TaskPatch::default() })
                    .await
                    .expect("complete");
            }
        }

        let lists = store.list_task_lists().await.expect("list");
        assert_eq!(lists[0].total_tasks, 2);
        assert_eq!(lists[0].completed_tasks, 1);
    }

    #[tokio::test]
    async fn update_renames_and_reports_missing_list() {
        let (_dir, store) = temp_store().await;
        let list = store.create_task_list(named("old")).await.expect("create");

        let patch = TaskListPatch {
            name: Some("new".to_string()),
            ..TaskListPatch::default()
        };
        assert!(store.update_task_list(list, patch.clone()).await.expect("update"));
        assert!(!store.update_task_list(list + 100, patch).await.expect("update missing"));
        assert!(store.update_task_list(list, TaskListPatch::default()).await.is_err());

        let lists = store.list_task_lists().await.expect("list");
        assert_eq!(lists[0].name, "new");
    }

    #[tokio::test]
    async fn delete_cascades_to_tasks_and_default_list_preference() {
        let (_dir, store) = temp_store().await;
        let doomed = store.create_task_list(named("doomed")).await.expect("create");
        let kept = store.create_task_list(named("kept")).await.expect("create");
        for (title, list) in [("a", doomed), ("b", doomed), ("c", kept)] {
            store
                .create_task(NewTask {
                    title: title.to_string(),
                    list_id: Some(list),
                    ..NewTask::default()
                })
                .await
                .expect("create task");
        }
        store
            .update_preferences(PreferencesPatch {
                default_list_id: Some(Some(doomed)),
                ..PreferencesPatch::default()
            })
            .await
            .expect("set default list");

        assert!(store.delete_task_list(doomed).await.expect("delete"));
        assert!(!store.delete_task_list(doomed).await.expect("delete again"));

        let remaining = store
            .list_tasks(TaskFilter { list_id: None, show_completed: true })
            .await
            .expect("list tasks");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].list_id, Some(kept));

        let prefs = store.get_preferences().await.expect("prefs");
        assert_eq!(prefs.default_list_id, None);
    }
}
