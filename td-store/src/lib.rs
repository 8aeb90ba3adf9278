//! SQLite-backed storage for tasks, task lists and user preferences.
//!
//! Every operation opens its own connection on the blocking pool, so the
//! store is cheap to clone and safe to share across request handlers.

mod error;
mod lists;
mod models;
mod preferences;
mod store;
mod tasks;

pub use error::{Result, StoreError};
pub use models::{
    NewTask, NewTaskList, PreferencesPatch, Priority, SearchHit, Task, TaskCounts, TaskFilter,
    TaskList, TaskListPatch, TaskPatch, TaskStats, UnknownPriority, UserPreferences,
};
pub use store::TaskStore;
pub use tasks::completion_rate;
