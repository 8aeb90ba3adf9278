use crate::error::{Result, StoreError};
use crate::models::{PreferencesPatch, UserPreferences};
use crate::store::{TaskStore, ensure_list_exists, id_value, timestamp_value};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params_from_iter};

fn select_preferences(conn: &Connection) -> Result<UserPreferences> {
    conn.query_row(
        "SELECT theme, language, accent_color, font_size, animations_enabled, \
         transparency_enabled, view_mode, show_completed, default_list_id \
         FROM user_preferences WHERE id = 1",
        [],
        |row| {
            Ok(UserPreferences {
                theme: row.get(0)?,
                language: row.get(1)?,
                accent_color: row.get(2)?,
                font_size: row.get(3)?,
                animations_enabled: row.get(4)?,
                transparency_enabled: row.get(5)?,
                view_mode: row.get(6)?,
                show_completed: row.get(7)?,
                default_list_id: row.get(8)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound("user preferences".to_string()))
}

impl TaskStore {
    pub async fn get_preferences(&self) -> Result<UserPreferences> {
        self.with_conn("get_preferences", |conn| select_preferences(conn))
            .await
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn update_preferences(&self, patch: PreferencesPatch) -> Result<UserPreferences> {
        if patch.is_empty() {
            return Err(StoreError::InvalidInput("no fields to update".to_string()));
        }
        self.with_conn("update_preferences", move |conn| {
            if let Some(Some(list_id)) = patch.default_list_id {
                ensure_list_exists(conn, list_id)?;
            }

            let mut sets: Vec<&str> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            let text_fields = [
                ("theme = ?", patch.theme),
                ("language = ?", patch.language),
                ("accent_color = ?", patch.accent_color),
                ("font_size = ?", patch.font_size),
                ("view_mode = ?", patch.view_mode),
            ];
            for (set, value) in text_fields {
                if let Some(value) = value {
                    sets.push(set);
                    values.push(Value::Text(value));
                }
            }
            let flag_fields = [
                ("animations_enabled = ?", patch.animations_enabled),
                ("transparency_enabled = ?", patch.transparency_enabled),
                ("show_completed = ?", patch.show_completed),
            ];
            for (set, value) in flag_fields {
                if let Some(value) = value {
                    sets.push(set);
                    values.push(Value::Integer(value.into()));
                }
            }
            if let Some(default_list_id) = patch.default_list_id {
                sets.push("default_list_id = ?");
                values.push(id_value(default_list_id));
            }
            sets.push("updated_at = ?");
            values.push(timestamp_value(Utc::now()));

            let sql = format!("UPDATE user_preferences SET {} WHERE id = 1", sets.join(", "));
            conn.execute(&sql, params_from_iter(values))?;
            select_preferences(conn)
        })
        .await
    }
}
