//! Shuffle played-history queries
//!
//! History is scoped (one scope per window) so independent windows keep
//! independent shuffle fairness.

use crate::Result;
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;

/// Get every locator recorded for a scope
pub async fn get_played(db: &Pool<Sqlite>, scope: &str) -> Result<HashSet<String>> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT locator FROM played_history WHERE scope = ?",
    )
    .bind(scope)
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Record a locator as played (no-op if already recorded)
pub async fn append_played(db: &Pool<Sqlite>, scope: &str, locator: &str) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO played_history (scope, locator, played_at) VALUES (?, ?, ?)",
    )
    .bind(scope)
    .bind(locator)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(db)
    .await?;

    Ok(())
}

/// Forget all history for a scope
pub async fn clear_played(db: &Pool<Sqlite>, scope: &str) -> Result<()> {
    sqlx::query("DELETE FROM played_history WHERE scope = ?")
        .bind(scope)
        .execute(db)
        .await?;

    Ok(())
}
