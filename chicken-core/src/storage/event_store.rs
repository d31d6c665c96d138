use crate::error::Result;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub pool_id: Uuid,
    pub seq: u64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Append-only log of pool notifications.
pub struct EventStore<'a> {
    storage: &'a Storage,
}

impl<'a> EventStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Appends `payload` and returns its sequence number within the pool.
    /// The pool must already be stored.
    pub async fn append<T: Serialize>(&self, pool_id: Uuid, kind: &str, payload: &T) -> Result<u64> {
        let conn = self.storage.get_connection().await;
        insert_event(&conn, pool_id, kind, payload)
    }

    /// Most recent `limit` events, oldest first.
    pub async fn list(&self, pool_id: Uuid, limit: usize) -> Result<Vec<EventRecord>> {
        let conn = self.storage.get_connection().await;

        let mut stmt = conn.prepare(
            "SELECT seq, kind, payload, created_at FROM events
             WHERE pool_id = ?1 ORDER BY seq DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![pool_id.to_string(), limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (seq, kind, payload, created_at) = row?;
            events.push(EventRecord {
                pool_id,
                seq: seq as u64,
                kind,
                payload: serde_json::from_str(&payload)?,
                created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
            });
        }

        events.reverse();
        Ok(events)
    }
}

pub(crate) fn insert_event<T: Serialize>(
    conn: &Connection,
    pool_id: Uuid,
    kind: &str,
    payload: &T,
) -> Result<u64> {
    let json = serde_json::to_string(payload)?;

    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE pool_id = ?1",
        params![pool_id.to_string()],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO events (pool_id, seq, kind, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![pool_id.to_string(), next, kind, json, Utc::now().timestamp()],
    )?;

    Ok(next as u64)
}
