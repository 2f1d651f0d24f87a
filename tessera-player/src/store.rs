//! Persistence store implementations
//!
//! [`SqliteStore`] keeps resume positions and shuffle history across runs;
//! [`MemoryStore`] backs tests and `--ephemeral` sessions.

use crate::error::Result;
use crate::media::PersistenceStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use tessera_common::db;

/// SQLite-backed store
pub struct SqliteStore {
    db: Pool<Sqlite>,
}

impl SqliteStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// Open (creating if needed) the database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(db::init_database(path).await?))
    }

    pub async fn in_memory() -> Result<Self> {
        Ok(Self::new(db::init_memory_database().await?))
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn position(&self, locator: &str) -> Result<Option<i64>> {
        Ok(db::positions::get_position(&self.db, locator).await?)
    }

    async fn set_position(&self, locator: &str, position_ms: i64) -> Result<()> {
        Ok(db::positions::set_position(&self.db, locator, position_ms).await?)
    }

    async fn clear_position(&self, locator: &str) -> Result<()> {
        Ok(db::positions::clear_position(&self.db, locator).await?)
    }

    async fn played_history(&self, scope: &str) -> Result<Vec<String>> {
        let played = db::history::get_played(&self.db, scope).await?;
        Ok(played.into_iter().collect())
    }

    async fn append_played(&self, scope: &str, locator: &str) -> Result<()> {
        Ok(db::history::append_played(&self.db, scope, locator).await?)
    }

    async fn clear_played(&self, scope: &str) -> Result<()> {
        Ok(db::history::clear_played(&self.db, scope).await?)
    }
}

/// Volatile store
#[derive(Default)]
pub struct MemoryStore {
    positions: Mutex<HashMap<String, i64>>,
    history: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn position(&self, locator: &str) -> Result<Option<i64>> {
        Ok(self.positions.lock().get(locator).copied())
    }

    async fn set_position(&self, locator: &str, position_ms: i64) -> Result<()> {
        self.positions.lock().insert(locator.to_string(), position_ms);
        Ok(())
    }

    async fn clear_position(&self, locator: &str) -> Result<()> {
        self.positions.lock().remove(locator);
        Ok(())
    }

    async fn played_history(&self, scope: &str) -> Result<Vec<String>> {
        Ok(self.history.lock().get(scope).cloned().unwrap_or_default())
    }

    async fn append_played(&self, scope: &str, locator: &str) -> Result<()> {
        let mut history = self.history.lock();
        let played = history.entry(scope.to_string()).or_default();
        if !played.iter().any(|l| l == locator) {
            played.push(locator.to_string());
        }
        Ok(())
    }

    async fn clear_played(&self, scope: &str) -> Result<()> {
        self.history.lock().remove(scope);
        Ok(())
    }
}
