use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown priority: {0:?}")]
pub struct UnknownPriority(pub String);

impl FromStr for Priority {
    type Err = UnknownPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(UnknownPriority(other.to_string())),
        }
    }
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Self::default()),
            other => other
                .as_str()?
                .parse()
                .map_err(|e| FromSqlError::Other(Box::new(e))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub list_id: Option<i64>,
    pub is_important: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub list_id: Option<i64>,
    #[serde(default)]
    pub is_important: bool,
}

/// Field-by-field task update. Outer `None` leaves a field untouched; for
/// nullable columns `Some(None)` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub list_id: Option<Option<i64>>,
    #[serde(default)]
    pub is_important: Option<bool>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.list_id.is_none()
            && self.is_important.is_none()
            && self.completed.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub list_id: Option<i64>,
    pub show_completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskList {
    pub id: i64,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub sort_order: i64,
    pub total_tasks: i64,
    pub completed_tasks: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTaskList {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskListPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl TaskListPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.icon.is_none() && self.color.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPreferences {
    pub theme: String,
    pub language: String,
    pub accent_color: String,
    pub font_size: String,
    pub animations_enabled: bool,
    pub transparency_enabled: bool,
    pub view_mode: String,
    pub show_completed: bool,
    pub default_list_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesPatch {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub accent_color: Option<String>,
    #[serde(default)]
    pub font_size: Option<String>,
    #[serde(default)]
    pub animations_enabled: Option<bool>,
    #[serde(default)]
    pub transparency_enabled: Option<bool>,
    #[serde(default)]
    pub view_mode: Option<String>,
    #[serde(default)]
    pub show_completed: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub default_list_id: Option<Option<i64>>,
}

impl PreferencesPatch {
    pub fn is_empty(&self) -> bool {
        self.theme.is_none()
            && self.language.is_none()
            && self.accent_color.is_none()
            && self.font_size.is_none()
            && self.animations_enabled.is_none()
            && self.transparency_enabled.is_none()
            && self.view_mode.is_none()
            && self.show_completed.is_none()
            && self.default_list_id.is_none()
    }
}

/// Headline numbers the assistant reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub total: i64,
    pub completed: i64,
    pub important_open: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStats {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub pending_tasks: i64,
    pub important_tasks: i64,
    pub today_due_tasks: i64,
    pub week_due_tasks: i64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub list_id: Option<i64>,
    pub list_name: Option<String>,
    pub list_icon: Option<String>,
}

// Distinguishes an absent key (outer None) from an explicit null (Some(None)).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
