//! Cold tier: durable "last known position" per player.
//!
//! The cold tier is upsert-only. A record is created the first time a
//! player is written back and overwritten on every later write-back.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use lodestar_protocol::{PlayerId, Pose};
use rusqlite::{Connection, OptionalExtension, params};

use crate::StoreError;

/// A player's last persisted position.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistentRecord {
    pub id: PlayerId,
    pub pose: Pose,
    /// When the record was last written.
    pub last_seen: DateTime<Utc>,
}

/// The contract the hub needs from a durable store.
pub trait ColdTier: Send + Sync + 'static {
    /// Inserts or overwrites the record keyed by `id`, stamping
    /// `last_seen` with the current time.
    fn upsert(
        &self,
        id: &PlayerId,
        pose: Pose,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Loads the record for `id`, if one was ever written.
    fn load(
        &self,
        id: &PlayerId,
    ) -> impl Future<Output = Result<Option<PersistentRecord>, StoreError>> + Send;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS players (
    id        TEXT PRIMARY KEY,
    x         REAL NOT NULL,
    z         REAL NOT NULL,
    ry        REAL NOT NULL,
    last_seen INTEGER NOT NULL
)";

const UPSERT: &str = "INSERT INTO players (id, x, z, ry, last_seen)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT (id) DO UPDATE
    SET x = excluded.x, z = excluded.z, ry = excluded.ry, last_seen = excluded.last_seen";

const LOAD: &str = "SELECT x, z, ry, last_seen FROM players WHERE id = ?1";

/// A [`ColdTier`] backed by a SQLite database.
///
/// `rusqlite` is synchronous, so every statement runs on tokio's blocking
/// pool behind a mutex-guarded connection.
#[derive(Clone)]
pub struct SqliteColdTier {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteColdTier {
    /// Opens (or creates) the database file at `path` and ensures the
    /// `players` table exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database. Nothing survives the process.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await?
    }
}

impl ColdTier for SqliteColdTier {
    async fn upsert(&self, id: &PlayerId, pose: Pose) -> Result<(), StoreError> {
        let id = id.as_str().to_owned();
        let now = Utc::now().timestamp_millis();
        self.with_conn(move |conn| {
            conn.execute(
                UPSERT,
                params![id, f64::from(pose.x), f64::from(pose.z), f64::from(pose.ry), now],
            )?;
            Ok(())
        })
        .await
    }

    async fn load(&self, id: &PlayerId) -> Result<Option<PersistentRecord>, StoreError> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(LOAD, [id.as_str()], |row| {
                    Ok((
                        row.get::<_, f64>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })
                .optional()?;

            Ok(row.map(|(x, z, ry, last_seen)| PersistentRecord {
                id,
                pose: Pose::new(x as f32, z as f32, ry as f32),
                last_seen: DateTime::from_timestamp_millis(last_seen).unwrap_or_default(),
            }))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: &str) -> PlayerId {
        PlayerId::new(id)
    }

    #[tokio::test]
    async fn test_load_missing_record_is_none() {
        let tier = SqliteColdTier::open_in_memory().unwrap();
        assert_eq!(tier.load(&pid("nobody")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_creates_then_overwrites() {
        let tier = SqliteColdTier::open_in_memory().unwrap();

        tier.upsert(&pid("p1"), Pose::new(1.0, 2.0, 0.0)).await.unwrap();
        let first = tier.load(&pid("p1")).await.unwrap().expect("record");
        assert_eq!(first.pose, Pose::new(1.0, 2.0, 0.0));

        tier.upsert(&pid("p1"), Pose::new(-4.5, 8.25, 3.0)).await.unwrap();
        let second = tier.load(&pid("p1")).await.unwrap().expect("record");
        assert_eq!(second.id, pid("p1"));
        assert_eq!(second.pose, Pose::new(-4.5, 8.25, 3.0));
        assert!(second.last_seen >= first.last_seen);
    }

    #[tokio::test]
    async fn test_last_seen_is_recent() {
        let tier = SqliteColdTier::open_in_memory().unwrap();
        let before = Utc::now() - chrono::Duration::seconds(1);
        tier.upsert(&pid("p1"), Pose::default()).await.unwrap();
        let record = tier.load(&pid("p1")).await.unwrap().unwrap();
        assert!(record.last_seen >= before);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let path = std::env::temp_dir().join(format!(
            "lodestar-cold-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        {
            let tier = SqliteColdTier::open(&path).unwrap();
            tier.upsert(&pid("p1"), Pose::new(7.0, 7.0, 1.0)).await.unwrap();
        }

        let reopened = SqliteColdTier::open(&path).unwrap();
        let record = reopened.load(&pid("p1")).await.unwrap().expect("persisted");
        assert_eq!(record.pose, Pose::new(7.0, 7.0, 1.0));

        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_open_in_missing_directory_fails() {
        let path = std::env::temp_dir()
            .join("lodestar-does-not-exist")
            .join("nested")
            .join("cold.db");
        assert!(SqliteColdTier::open(path).is_err());
    }
}
