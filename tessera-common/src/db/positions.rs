//! Resume position queries
//!
//! Positions are keyed by the item's identity locator and stored in
//! milliseconds.

use crate::Result;
use sqlx::{Pool, Sqlite};

/// Get the saved position for a locator, if any
pub async fn get_position(db: &Pool<Sqlite>, locator: &str) -> Result<Option<i64>> {
    let position = sqlx::query_scalar::<_, i64>(
        "SELECT position_ms FROM playback_positions WHERE locator = ?",
    )
    .bind(locator)
    .fetch_optional(db)
    .await?;

    Ok(position)
}

/// Save (insert or replace) the position for a locator
pub async fn set_position(db: &Pool<Sqlite>, locator: &str, position_ms: i64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO playback_positions (locator, position_ms, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(locator) DO UPDATE SET
            position_ms = excluded.position_ms,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(locator)
    .bind(position_ms)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(db)
    .await?;

    Ok(())
}

/// Forget the saved position for a locator
pub async fn clear_position(db: &Pool<Sqlite>, locator: &str) -> Result<()> {
    sqlx::query("DELETE FROM playback_positions WHERE locator = ?")
        .bind(locator)
        .execute(db)
        .await?;

    Ok(())
}
