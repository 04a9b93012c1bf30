//! Key-value storage layer with TTL envelopes.
//!
//! Every row is an envelope `{payload, stored_at, ttl_ms}`: JSON payload
//! plus write time and time-to-live, both in milliseconds. An entry is
//! valid iff `now - stored_at <= ttl_ms`; reading an expired entry evicts
//! it and reports a miss. All operations return `Result` so callers decide
//! explicitly which failures to absorb.

use super::migrations;
use crate::Error;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio_rusqlite::rusqlite;
use tokio_rusqlite::{Connection, params};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Persistent key-value store handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct KvStore {
    pub(crate) conn: Connection,
}

impl KvStore {
    /// Open a store at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Storage(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory store.
    ///
    /// Used for testing and as the degraded fallback when no persistent
    /// storage location is available.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;",
            )?;
            Ok(())
        })
        .await
        .map_err(Error::Storage)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }

    /// Write an envelope under `key`, replacing any previous entry.
    ///
    /// A failed write triggers an expired-entry sweep (so the next attempt
    /// has room) before the error is returned.
    pub async fn set_entry<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_ms: i64) -> Result<(), Error> {
        let owned_key = key.to_string();
        let payload = serde_json::to_string(value)?;
        let stored_at = now_ms();

        let result = self
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO kv_entries (key, payload, stored_at, ttl_ms)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(key) DO UPDATE SET
                         payload = excluded.payload,
                         stored_at = excluded.stored_at,
                         ttl_ms = excluded.ttl_ms",
                    params![owned_key, payload, stored_at, ttl_ms],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from);

        if let Err(e) = &result {
            tracing::warn!("cache write for {key} failed, sweeping expired entries: {e}");
            if let Err(sweep_err) = self.sweep_expired().await {
                tracing::warn!("expired-entry sweep failed: {sweep_err}");
            }
        }

        result
    }

    /// Read and decode the entry under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent, the entry has expired
    /// (the row is deleted as a side effect), or the payload no longer
    /// decodes as `T` (also evicted).
    pub async fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.read_payload(key, false).await? {
            Some(payload) => match serde_json::from_str(&payload) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::warn!("undecodable cache payload for {key}, evicting: {e}");
                    self.remove_entry(key).await?;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Read the entry under `key` ignoring its TTL.
    ///
    /// Used by error paths that fall back to stale data; never evicts.
    pub async fn get_entry_stale<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.read_payload(key, true).await? {
            Some(payload) => Ok(serde_json::from_str(&payload).ok()),
            None => Ok(None),
        }
    }

    async fn read_payload(&self, key: &str, include_stale: bool) -> Result<Option<String>, Error> {
        let key = key.to_string();
        let now = now_ms();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row(
                    "SELECT payload, stored_at, ttl_ms FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
                    },
                );

                match result {
                    Ok((payload, stored_at, ttl_ms)) => {
                        if !include_stale && now - stored_at > ttl_ms {
                            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
                            Ok(None)
                        } else {
                            Ok(Some(payload))
                        }
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the entry under `key` if present.
    pub async fn remove_entry(&self, key: &str) -> Result<(), Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete all entries whose TTL has elapsed.
    ///
    /// Returns the number of deleted entries.
    pub async fn sweep_expired(&self) -> Result<u64, Error> {
        let now = now_ms();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM kv_entries WHERE ?1 - stored_at > ttl_ms", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Approximate serialized size of all stored payloads, in bytes.
    pub async fn total_bytes(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let bytes: i64 =
                    conn.query_row("SELECT COALESCE(SUM(LENGTH(payload)), 0) FROM kv_entries", [], |row| {
                        row.get(0)
                    })?;
                Ok(bytes as u64)
            })
            .await
            .map_err(Error::from)
    }

    #[cfg(test)]
    pub(crate) async fn raw_key_count(&self) -> u64 {
        self.conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM kv_entries", [], |row| row.get::<_, i64>(0)))
            .await
            .unwrap() as u64
    }
}
