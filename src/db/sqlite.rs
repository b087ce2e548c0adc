// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite-backed activity store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{schema, DbError};
use crate::models::Activity;
use crate::time_utils::{format_utc_rfc3339, parse_utc_rfc3339};

const ACTIVITY_COLUMNS: &str = "id, name, description, distance, moving_time, type, \
     total_elevation_gain, start_date_local, city, state, country, device_name";

/// Local activity store.
///
/// `rusqlite::Connection` is not `Sync`, so it lives behind a mutex and every
/// operation runs on the blocking pool.
#[derive(Clone)]
pub struct ActivityDb {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl std::fmt::Debug for ActivityDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityDb")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ActivityDb {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, DbError> {
        let path = path.to_path_buf();
        let open_path = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&open_path).map_err(|e| DbError::Open {
                path: open_path.clone(),
                source: e,
            })?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            schema::migrate(&conn)?;
            Ok::<_, DbError>(conn)
        })
        .await??;

        tracing::info!(path = %path.display(), "Activity database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory().map_err(|e| DbError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, DbError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| DbError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }

    // ─── Writes ──────────────────────────────────────────────────

    /// Insert every activity whose id is not already stored.
    ///
    /// Runs as one transaction: records are checked and inserted in order,
    /// and any failure rolls back every insert made by this call. Returns the
    /// number of rows added.
    pub async fn insert_new_activities(&self, batch: Vec<Activity>) -> Result<usize, DbError> {
        let keyed = batch.into_iter().map(|a| (a.id, a)).collect();
        self.insert_new_with(keyed, |_, activity| Ok(activity)).await
    }

    /// Like [`insert_new_activities`](Self::insert_new_activities), but
    /// builds each activity lazily.
    ///
    /// `build` runs only for ids absent from the store, after the existence
    /// check, so an already-stored record is skipped without being looked
    /// at. A `build` failure rolls back the whole transaction.
    pub async fn insert_new_with<T, F>(
        &self,
        batch: Vec<(i64, T)>,
        mut build: F,
    ) -> Result<usize, DbError>
    where
        T: Send + 'static,
        F: FnMut(i64, T) -> Result<Activity, String> + Send + 'static,
    {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut added = 0usize;
            {
                let mut exists = tx.prepare("SELECT 1 FROM activities WHERE id = ?1")?;
                let mut insert = tx.prepare(
                    "INSERT INTO activities (id, name, description, distance, moving_time, type, \
                     total_elevation_gain, start_date_local, city, state, country, device_name) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                )?;

                for (id, record) in batch {
                    if exists.exists(params![id])? {
                        tracing::trace!(id, "Activity already stored, skipping");
                        continue;
                    }
                    let activity =
                        build(id, record).map_err(|reason| DbError::InvalidRecord { id, reason })?;
                    if activity.id != id {
                        return Err(DbError::InvalidRecord {
                            id,
                            reason: format!("built activity has id {}", activity.id),
                        });
                    }
                    insert.execute(params![
                        activity.id,
                        activity.name,
                        activity.description,
                        activity.distance,
                        activity.moving_time,
                        activity.activity_type,
                        activity.total_elevation_gain,
                        format_utc_rfc3339(activity.start_date_local),
                        activity.city,
                        activity.state,
                        activity.country,
                        activity.device_name,
                    ])?;
                    added += 1;
                }
            }
            tx.commit()?;
            Ok(added)
        })
        .await
    }

    // ─── Reads ───────────────────────────────────────────────────

    pub async fn activity_exists(&self, id: i64) -> Result<bool, DbError> {
        self.with_conn(move |conn| {
            let found = conn
                .prepare_cached("SELECT 1 FROM activities WHERE id = ?1")?
                .exists(params![id])?;
            Ok(found)
        })
        .await
    }

    pub async fn get_activity(&self, id: i64) -> Result<Option<Activity>, DbError> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM activities WHERE id = ?1", ACTIVITY_COLUMNS);
            let raw = conn
                .query_row(&sql, params![id], RawActivity::from_row)
                .optional()?;
            raw.map(RawActivity::into_activity).transpose()
        })
        .await
    }

    /// List activities newest first.
    pub async fn list_activities(&self, limit: u32, offset: u64) -> Result<Vec<Activity>, DbError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM activities ORDER BY start_date_local DESC, id DESC \
                 LIMIT ?1 OFFSET ?2",
                ACTIVITY_COLUMNS
            );
            let offset = i64::try_from(offset).unwrap_or(i64::MAX);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit, offset], RawActivity::from_row)?;
            collect_activities(rows)
        })
        .await
    }

    /// Every stored activity, oldest first.
    pub async fn all_activities(&self) -> Result<Vec<Activity>, DbError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM activities ORDER BY start_date_local ASC, id ASC",
                ACTIVITY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], RawActivity::from_row)?;
            collect_activities(rows)
        })
        .await
    }

    pub async fn count_activities(&self) -> Result<u64, DbError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM activities", [], |row| {
                row.get(0)
            })?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

/// Row as stored, before the timestamp is decoded.
struct RawActivity {
    id: i64,
    name: String,
    description: String,
    distance: i64,
    moving_time: i64,
    activity_type: String,
    total_elevation_gain: i64,
    start_date_local: String,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
    device_name: Option<String>,
}

impl RawActivity {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            distance: row.get(3)?,
            moving_time: row.get(4)?,
            activity_type: row.get(5)?,
            total_elevation_gain: row.get(6)?,
            start_date_local: row.get(7)?,
            city: row.get(8)?,
            state: row.get(9)?,
            country: row.get(10)?,
            device_name: row.get(11)?,
        })
    }

    fn into_activity(self) -> Result<Activity, DbError> {
        let start_date_local = parse_utc_rfc3339(&self.start_date_local).ok_or_else(|| {
            DbError::Corrupt(format!(
                "activity {} has invalid start_date_local {:?}",
                self.id, self.start_date_local
            ))
        })?;
        Ok(Activity {
            id: self.id,
            name: self.name,
            description: self.description,
            distance: self.distance,
            moving_time: self.moving_time,
            activity_type: self.activity_type,
            total_elevation_gain: self.total_elevation_gain,
            start_date_local,
            city: self.city,
            state: self.state,
            country: self.country,
            device_name: self.device_name,
        })
    }
}

fn collect_activities(
    rows: impl Iterator<Item = rusqlite::Result<RawActivity>>,
) -> Result<Vec<Activity>, DbError> {
    rows.map(|row| row.map_err(DbError::from).and_then(RawActivity::into_activity))
        .collect()
}
