//! Per-user quality and duration defaults.

use crate::error::DatabaseError;
use crate::types::{PreferencesUpdate, UserId, UserPreferences};
use crate::{Error, Result};

use super::{Database, PreferencesRow};

impl Database {
    /// Stored preferences of a user, `None` if they never set any
    pub async fn get_user_preferences(&self, user_id: &UserId) -> Result<Option<UserPreferences>> {
        let row = sqlx::query_as::<_, PreferencesRow>(
            r#"
            SELECT user_id, preferred_quality, max_duration_secs, updated_at
            FROM user_preferences
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(row.map(UserPreferences::from))
    }

    /// Create or change a user's preferences
    ///
    /// Fields left `None` in `update` keep their stored value. Returns the
    /// preferences as stored afterwards.
    pub async fn update_user_preferences(
        &self,
        user_id: &UserId,
        update: &PreferencesUpdate,
    ) -> Result<UserPreferences> {
        let max_duration = update
            .max_duration_secs
            .map(|d| i64::try_from(d).unwrap_or(i64::MAX));

        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, preferred_quality, max_duration_secs, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                preferred_quality = COALESCE(excluded.preferred_quality, preferred_quality),
                max_duration_secs = COALESCE(excluded.max_duration_secs, max_duration_secs),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id.as_str())
        .bind(update.preferred_quality.map(|q| q.to_string()))
        .bind(max_duration)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        tracing::debug!(user_id = %user_id, ?update, "User preferences updated");

        self.get_user_preferences(user_id).await?.ok_or_else(|| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "preferences of user {} vanished after update",
                user_id
            )))
        })
    }
}
