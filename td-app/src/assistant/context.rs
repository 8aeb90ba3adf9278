use td_store::{Task, TaskCounts, TaskStore};

pub const CONTEXT_UNAVAILABLE: &str = "无法获取任务数据";

const RECENT_TASK_LIMIT: usize = 5;

/// Summarizes the task store for the remote model. Store failures collapse
/// into [`CONTEXT_UNAVAILABLE`].
#[tracing::instrument(level = "debug", skip_all)]
pub async fn build_task_context(store: &TaskStore) -> String {
    let loaded = async {
        let counts = store.counts().await?;
        let recent = store.recent_tasks(RECENT_TASK_LIMIT).await?;
        Ok::<_, td_store::StoreError>((counts, recent))
    }
    .await;

    match loaded {
        Ok((counts, recent)) => render_context(&counts, &recent),
        Err(e) => {
            tracing::warn!(error = %e, "task context unavailable");
            CONTEXT_UNAVAILABLE.to_string()
        }
    }
}

pub fn render_context(counts: &TaskCounts, recent: &[Task]) -> String {
    let mut out = format!(
        "总任务数: {}, 已完成: {}, 重要待办: {}\n最近任务:\n",
        counts.total, counts.completed, counts.important_open
    );
    for task in recent {
        let status = if task.completed { "✓" } else { "○" };
        out.push_str(&format!("{status} {} [{}]", task.title, task.priority));
        if let Some(due) = task.due_date {
            out.push_str(&format!(" (截止: {due})"));
        }
        out.push('\n');
    }
    out
}
