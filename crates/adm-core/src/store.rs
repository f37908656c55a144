//! Durable key-value store (SQLite via sqlx).
//!
//! One `kv` table shared by the metadata cache (durable tier) and the
//! persistence gateway (item snapshots). Values are opaque bytes; callers
//! handle serialization.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Builds a sqlite:// URI from a filesystem path, percent-encoding the
/// characters that would otherwise confuse URI parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut uri = String::with_capacity(raw.len() + 9);
    uri.push_str("sqlite://");
    for c in raw.chars() {
        match c {
            '%' => uri.push_str("%25"),
            ' ' => uri.push_str("%20"),
            '#' => uri.push_str("%23"),
            '?' => uri.push_str("%3F"),
            '&' => uri.push_str("%26"),
            c => uri.push(c),
        }
    }
    uri
}

/// Handle to the SQLite-backed key-value store.
///
/// The database file lives under the XDG state directory:
/// `~/.local/state/adm/state.db`.
#[derive(Clone)]
pub struct KvStore {
    pool: Pool<Sqlite>,
}

impl KvStore {
    /// Open (or create) the default store and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("adm")?;
        let state_dir = xdg_dirs.get_state_home();
        let db_path = state_dir.join("state.db");

        tokio::fs::create_dir_all(&state_dir).await?;

        let uri = path_to_sqlite_uri(&db_path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;

        let store = KvStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open (or create) the store at a specific path. Creates parent dirs if
    /// needed. Intended for tests so the DB can live in a temp directory.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;
        let store = KvStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an in-memory store (no disk I/O). For tests and ephemeral use.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = KvStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch the value stored under `key`, or None.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query(r#"SELECT value FROM kv WHERE key = ?1"#)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    /// Insert or replace the value under `key`.
    pub async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete the row under `key`. No-op if absent.
    pub async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM kv WHERE key = ?1"#)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete every row whose key starts with `prefix` (used by cache clear).
    /// Returns the number of rows removed.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        // Escape LIKE wildcards in the prefix so keys are matched literally.
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let r = sqlx::query(r#"DELETE FROM kv WHERE key LIKE ?1 ESCAPE '\'"#)
            .bind(format!("{}%", escaped))
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }
}

/// Current time as Unix seconds (for timestamps across the crate).
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let store = KvStore::open_memory().await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.put("k", b"v1").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"v1"[..]));

        store.put("k", b"v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"v2"[..]));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_prefix_only_touches_matching_keys() {
        let store = KvStore::open_memory().await.unwrap();
        store.put("cache/meta/a", b"1").await.unwrap();
        store.put("cache/meta/b", b"2").await.unwrap();
        store.put("downloads/items", b"3").await.unwrap();

        let removed = store.delete_prefix("cache/meta/").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get("cache/meta/a").await.unwrap(), None);
        assert!(store.get("downloads/items").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_prefix_treats_wildcards_literally() {
        let store = KvStore::open_memory().await.unwrap();
        store.put("a_b/x", b"1").await.unwrap();
        store.put("aXb/x", b"2").await.unwrap();

        // "_" must not match arbitrary characters.
        let removed = store.delete_prefix("a_b/").await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("aXb/x").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn open_at_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let store = KvStore::open_at(&path).await.unwrap();
            store.put("k", b"v").await.unwrap();
        }
        let store = KvStore::open_at(&path).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some(&b"v"[..]));
    }
}
