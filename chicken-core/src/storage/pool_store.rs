use crate::error::{CoreError, Result};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// JSON snapshots of pool state, keyed by pool id.
pub struct PoolStore<'a> {
    storage: &'a Storage,
}

impl<'a> PoolStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn save_snapshot<T: Serialize>(&self, id: Uuid, snapshot: &T) -> Result<()> {
        let conn = self.storage.get_connection().await;
        write_snapshot(&conn, id, snapshot)
    }

    pub async fn load_snapshot<T: DeserializeOwned>(&self, id: Uuid) -> Result<T> {
        let conn = self.storage.get_connection().await;
        read_snapshot(&conn, id)
    }

    pub async fn list_pools(&self) -> Result<Vec<PoolRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT id, created_at, updated_at FROM pools ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut pools = Vec::new();
        for row in rows {
            let (id, created_at, updated_at) = row?;
            pools.push(PoolRecord {
                id: Uuid::parse_str(&id)
                    .map_err(|e| CoreError::internal(format!("Bad pool id {}: {}", id, e)))?,
                created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
                updated_at: DateTime::from_timestamp(updated_at, 0).unwrap_or_else(Utc::now),
            });
        }

        Ok(pools)
    }

    pub async fn pool_exists(&self, id: Uuid) -> Result<bool> {
        let conn = self.storage.get_connection().await;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pools WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }
}

pub(crate) fn write_snapshot<T: Serialize>(conn: &Connection, id: Uuid, snapshot: &T) -> Result<()> {
    let json = serde_json::to_string(snapshot)?;
    let now = Utc::now().timestamp();

    conn.execute(
        "INSERT INTO pools (id, snapshot, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(id) DO UPDATE SET snapshot = excluded.snapshot, updated_at = excluded.updated_at",
        params![id.to_string(), json, now],
    )?;

    Ok(())
}

pub(crate) fn read_snapshot<T: DeserializeOwned>(conn: &Connection, id: Uuid) -> Result<T> {
    let json: Option<String> = conn
        .query_row(
            "SELECT snapshot FROM pools WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    let json = json.ok_or_else(|| CoreError::PoolNotFound { id: id.to_string() })?;
    Ok(serde_json::from_str(&json)?)
}
