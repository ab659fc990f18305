// SPDX-License-Identifier: MPL-2.0

use crate::mirror::schema::SCHEMA;
use crate::mirror::{MirrorError, StorageTier};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Durable mirror tier for a specific user, backed by SQLite.
///
/// Holds the same string key / JSON value shape as the session tier and
/// survives restarts. Per the mirror contract, read and write failures
/// after open are logged and swallowed.
#[derive(Clone)]
pub struct DurableTier {
    conn: Arc<Mutex<Connection>>,
}

impl DurableTier {
    /// Open or create the mirror database for a user.
    /// Path: ~/.local/share/softspot/{user_id}/mirror.db
    pub fn open(user_id: &str) -> Result<Self, MirrorError> {
        let path = Self::mirror_path(user_id)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MirrorError::Path(format!("failed to create mirror dir: {}", e)))?;
        }

        let conn = Connection::open(&path)?;
        Self::migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open at an explicit path (tests and portable installs).
    pub fn open_at(dir: &Path) -> Result<Self, MirrorError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| MirrorError::Path(format!("failed to create mirror dir: {}", e)))?;

        let conn = Connection::open(dir.join("mirror.db"))?;
        Self::migrate(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run schema migrations (all CREATE IF NOT EXISTS)
    fn migrate(conn: &Connection) -> Result<(), MirrorError> {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get XDG data directory for the mirror
    fn mirror_path(user_id: &str) -> Result<PathBuf, MirrorError> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| MirrorError::Path("could not find data directory".to_string()))?;

        // Sanitize provider-issued ids for the filesystem
        let safe_id = user_id.replace([':', '/'], "_");

        Ok(data_dir.join("softspot").join(safe_id).join("mirror.db"))
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("mirror lock poisoned")
    }

    /// Get current unix timestamp
    pub fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

impl StorageTier for DurableTier {
    fn get(&self, key: &str) -> Option<String> {
        let conn = self.conn();
        match conn.query_row("SELECT value FROM kv WHERE key = ?", [key], |row| {
            row.get::<_, String>(0)
        }) {
            Ok(value) => Some(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                warn!("durable tier read failed for {}: {}", key, e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        let conn = self.conn();
        let result = conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, value, Self::now()],
        );
        if let Err(e) = result {
            warn!("durable tier write failed for {}: {}", key, e);
        }
    }

    fn remove(&self, key: &str) {
        let conn = self.conn();
        if let Err(e) = conn.execute("DELETE FROM kv WHERE key = ?", [key]) {
            warn!("durable tier delete failed for {}: {}", key, e);
        }
    }
}
