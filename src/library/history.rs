//! Audit log - append-only history of field-level asset changes

use crate::domain::{HistoryAction, HistoryEvent};
use crate::library::error::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

pub struct HistoryLog {
    pool: SqlitePool,
}

impl HistoryLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one audit row. Rows are never mutated afterwards.
    pub async fn record(&self, event: &HistoryEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO history (id, asset_id, action, field, old_value, new_value, timestamp, user_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.asset_id)
        .bind(event.action.to_string())
        .bind(&event.field)
        .bind(&event.old_value)
        .bind(&event.new_value)
        .bind(event.timestamp)
        .bind(&event.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Activity for one asset, newest-first.
    pub async fn for_asset(&self, asset_id: &str, limit: i64) -> Result<Vec<HistoryEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM history WHERE asset_id = ? ORDER BY timestamp DESC, id LIMIT ?",
        )
        .bind(asset_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(history_from_row).collect())
    }

    /// Most recent activity across the whole catalog.
    pub async fn recent(&self, limit: i64) -> Result<Vec<HistoryEvent>> {
        let rows = sqlx::query("SELECT * FROM history ORDER BY timestamp DESC, id LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(history_from_row).collect())
    }
}

fn history_from_row(row: &SqliteRow) -> HistoryEvent {
    HistoryEvent {
        id: row.get("id"),
        asset_id: row.get("asset_id"),
        action: HistoryAction::from_str(row.get::<&str, _>("action"))
            .unwrap_or(HistoryAction::Updated),
        field: row.get("field"),
        old_value: row.get("old_value"),
        new_value: row.get("new_value"),
        timestamp: row.get("timestamp"),
        user_id: row.get("user_id"),
    }
}
