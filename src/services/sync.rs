// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pull-based activity sync.
//!
//! One invocation refreshes credentials, walks the remote activity pages,
//! and commits all previously unseen ids in a single transaction. Records
//! are decoded only once their id is known to be absent from the store, so
//! a stale copy of an already-stored activity never blocks a sync. Either
//! every new record from the invocation is stored or none is.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::{ActivityDb, DbError};
use crate::error::{AppError, Result};
use crate::models::Activity;
use crate::services::credentials::{CredentialManager, StravaSession};
use crate::services::strava::StravaActivitySummary;

/// Outcome of one sync invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Records inserted by this invocation (the user-visible result)
    pub added: usize,
    /// Records returned by Strava across all fetched pages
    pub fetched: usize,
    pub pages: u32,
}

/// Merges the remote activity collection into the local store.
pub struct SyncService {
    db: ActivityDb,
    credentials: Arc<CredentialManager>,
    page_size: u32,
    max_pages: u32,
    /// Serializes sync invocations.
    running: Mutex<()>,
}

impl SyncService {
    pub fn new(
        db: ActivityDb,
        credentials: Arc<CredentialManager>,
        page_size: u32,
        max_pages: u32,
    ) -> Self {
        Self {
            db,
            credentials,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
            running: Mutex::new(()),
        }
    }

    /// Fetch remote activities and insert the ones not yet stored.
    ///
    /// Fails with [`AppError::TokenRefresh`] (store untouched) if credentials
    /// cannot be refreshed, or [`AppError::Sync`] if any page, record, or the
    /// commit fails; in the latter case nothing from this invocation is kept.
    pub async fn fetch_and_merge(&self) -> Result<SyncReport> {
        let _running = self.running.lock().await;

        let session = self.credentials.configure_client().await?;
        tracing::info!(
            page_size = self.page_size,
            max_pages = self.max_pages,
            "Starting activity sync"
        );

        let (records, pages) = self.fetch_pages(&session).await?;
        let fetched = records.len();

        let keyed = key_records(records)?;

        let added = self
            .db
            .insert_new_with(keyed, decode_record)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Sync transaction rolled back");
                match e {
                    DbError::InvalidRecord { reason, .. } => AppError::Sync(reason),
                    other => AppError::Sync(format!("failed to store activities: {}", other)),
                }
            })?;

        tracing::info!(
            added,
            skipped = fetched - added,
            fetched,
            pages,
            "Activity sync complete"
        );

        Ok(SyncReport {
            added,
            fetched,
            pages,
        })
    }

    /// Walk pages until a short page or the page cap.
    async fn fetch_pages(
        &self,
        session: &StravaSession,
    ) -> Result<(Vec<serde_json::Value>, u32)> {
        let mut records = Vec::new();
        let mut pages = 0u32;

        for page in 1..=self.max_pages {
            let batch = session.list_activities(page, self.page_size).await?;
            pages += 1;

            let len = batch.len();
            tracing::debug!(page, count = len, "Fetched activity page");
            records.extend(batch);

            if len < self.page_size as usize {
                break;
            }
            if page == self.max_pages {
                tracing::warn!(
                    max_pages = self.max_pages,
                    "Stopped at page limit; older activities not fetched this run"
                );
            }
        }

        Ok((records, pages))
    }
}

/// Remote record with its position in the fetched collection.
type IndexedRecord = (usize, serde_json::Value);

/// Pair each remote record with its id, keeping its position for errors.
///
/// A record without an integer id cannot be checked against the store, so
/// it aborts the batch.
fn key_records(records: Vec<serde_json::Value>) -> Result<Vec<(i64, IndexedRecord)>> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, raw)| match raw.get("id").and_then(|v| v.as_i64()) {
            Some(id) => Ok((id, (index, raw))),
            None => {
                tracing::warn!(index, "Remote activity without an id");
                Err(AppError::Sync(format!(
                    "malformed activity at position {}: missing integer id",
                    index
                )))
            }
        })
        .collect()
}

/// Decode one unseen remote record into a stored activity.
fn decode_record(id: i64, (index, raw): IndexedRecord) -> std::result::Result<Activity, String> {
    serde_json::from_value::<StravaActivitySummary>(raw)
        .map(Activity::from)
        .map_err(|e| {
            tracing::warn!(index, id, error = %e, "Malformed remote activity");
            format!("malformed activity {} at position {}: {}", id, index, e)
        })
}
