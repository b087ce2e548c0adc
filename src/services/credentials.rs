// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth credential lifecycle.
//!
//! The token pair lives in a flat `KEY=value` file (the same file loaded as
//! dotenv at startup) and in an in-memory mirror owned by
//! [`CredentialManager`]. Every call to
//! [`CredentialManager::get_valid_access_token`] refreshes against Strava;
//! expiry is never checked locally.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::services::strava::StravaClient;

pub const ACCESS_TOKEN_KEY: &str = "STRAVA_ACCESS_TOKEN";
pub const REFRESH_TOKEN_KEY: &str = "STRAVA_REFRESH_TOKEN";

/// A lock file older than this is assumed to belong to a dead process.
const STALE_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
/// Give up waiting for the lock after this long.
const LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

// ─────────────────────────────────────────────────────────────────────────────
// CredentialStore - the KEY=value file
// ─────────────────────────────────────────────────────────────────────────────

/// Flat `KEY=value` credential file.
///
/// Rewrites are read-modify-write under an exclusive lock file and land via
/// temp file + rename, so readers never observe a partially written file.
/// Lines that are not `KEY=value` (comments, blanks) are kept verbatim.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the value stored for `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let prefix = format!("{}=", key);
        Ok(self
            .read_lines()?
            .into_iter()
            .find_map(|line| line.strip_prefix(&prefix).map(str::to_string)))
    }

    /// Replace the line for `key` in place, or append it if absent.
    pub fn update_persisted_credential(&self, key: &str, value: &str) -> Result<()> {
        self.update_persisted_credentials(&[(key, value)])
    }

    /// Apply several key updates in a single rewrite.
    ///
    /// Either every update lands or the file is left untouched.
    pub fn update_persisted_credentials(&self, updates: &[(&str, &str)]) -> Result<()> {
        for (key, value) in updates {
            validate_entry(key, value)?;
        }

        let _lock = FileLock::acquire(&self.lock_path())?;

        let mut lines = self.read_lines()?;
        for (key, value) in updates {
            apply_update(&mut lines, key, value);
        }
        self.write_atomically(&lines)?;

        tracing::debug!(
            path = %self.path.display(),
            keys = ?updates.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            "Credential file updated"
        );
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| ".env".into());
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Current lines; a missing file reads as empty.
    fn read_lines(&self) -> Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(persistence_error(&self.path, "read", e)),
        }
    }

    fn write_atomically(&self, lines: &[String]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| persistence_error(&self.path, "create temp file for", e))?;

        let mut content = lines.join("\n");
        content.push('\n');
        tmp.write_all(content.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| persistence_error(&self.path, "write", e))?;

        if let Ok(meta) = fs::metadata(&self.path) {
            fs::set_permissions(tmp.path(), meta.permissions())
                .map_err(|e| persistence_error(&self.path, "copy permissions of", e))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| persistence_error(&self.path, "replace", e.error))?;
        Ok(())
    }
}

/// Rewrite the first `key=` line, drop later duplicates, or append.
fn apply_update(lines: &mut Vec<String>, key: &str, value: &str) {
    let prefix = format!("{}=", key);
    let entry = format!("{}{}", prefix, value);

    let mut found = false;
    lines.retain_mut(|line| {
        if !line.starts_with(&prefix) {
            return true;
        }
        if found {
            return false;
        }
        found = true;
        *line = entry.clone();
        true
    });

    if !found {
        lines.push(entry);
    }
}

fn validate_entry(key: &str, value: &str) -> Result<()> {
    let bad_key = key.is_empty() || key.contains(['=', '\n', '\r']) || key.trim() != key;
    if bad_key {
        return Err(AppError::CredentialPersistence(format!(
            "invalid credential key {:?}",
            key
        )));
    }
    if value.contains(['\n', '\r']) {
        return Err(AppError::CredentialPersistence(format!(
            "value for {} contains a line break",
            key
        )));
    }
    Ok(())
}

fn persistence_error(path: &Path, action: &str, e: std::io::Error) -> AppError {
    AppError::CredentialPersistence(format!("failed to {} {}: {}", action, path.display(), e))
}

/// Exclusive lock held by the existence of a sibling `.lock` file.
struct FileLock {
    path: PathBuf,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self> {
        let started = Instant::now();
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if break_stale_lock(path) {
                        continue;
                    }
                    if started.elapsed() >= LOCK_WAIT_TIMEOUT {
                        return Err(AppError::CredentialPersistence(format!(
                            "timed out waiting for lock {}",
                            path.display()
                        )));
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(persistence_error(path, "create lock", e)),
            }
        }
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(|modified| {
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO)
                > STALE_LOCK_TIMEOUT
        })
        .unwrap_or(false)
}

/// Remove `path` if it is a stale lock. Returns true if the caller should
/// retry acquiring.
///
/// The lock is first renamed to a name unique to this attempt, so among
/// several processes breaking the same stale lock only one rename succeeds.
/// If what was renamed turns out to be fresh (another process re-created the
/// lock in between), it is linked back into place.
fn break_stale_lock(path: &Path) -> bool {
    if !is_stale(path) {
        return false;
    }

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut aside = path.as_os_str().to_os_string();
    aside.push(format!(".stale.{}.{}", std::process::id(), nanos));
    let aside = PathBuf::from(aside);

    if fs::rename(path, &aside).is_err() {
        // Someone else already broke it
        return true;
    }

    if !is_stale(&aside) {
        // Fails if the lock was re-created meanwhile, which is just as good
        let _ = fs::hard_link(&aside, path);
    } else {
        tracing::warn!(path = %path.display(), "Broke stale credential lock");
    }
    let _ = fs::remove_file(&aside);
    true
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CredentialManager - token lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct TokenPair {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Owns the OAuth token pair and hands out freshly refreshed access tokens.
///
/// The mirror mutex is held for the whole refresh (HTTP call and file
/// rewrite), so rotations never interleave within the process.
pub struct CredentialManager {
    client: StravaClient,
    store: CredentialStore,
    tokens: Mutex<TokenPair>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Result of a successful authorization-code exchange.
#[derive(Debug, Clone)]
pub struct AuthorizationResult {
    pub athlete_id: Option<u64>,
    /// Athlete's name as Strava reports it
    pub athlete_name: Option<String>,
}

impl CredentialManager {
    pub fn new(
        client: StravaClient,
        store: CredentialStore,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            client,
            store,
            tokens: Mutex::new(TokenPair {
                access_token,
                refresh_token,
            }),
        }
    }

    /// Build from startup configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            StravaClient::new(config)?,
            CredentialStore::new(&config.credentials_path),
            config.strava_access_token.clone(),
            config.strava_refresh_token.clone(),
        ))
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Provider authorization URL for the user-driven OAuth redirect.
    pub fn authorize_url(&self, redirect_uri: &str) -> String {
        self.client.authorize_url(redirect_uri)
    }

    /// Refresh token currently held in memory.
    pub async fn current_refresh_token(&self) -> Option<String> {
        self.tokens.lock().await.refresh_token.clone()
    }

    /// Refresh the token pair and return the new access token.
    ///
    /// On any failure from the token endpoint nothing is written. On success
    /// both tokens are persisted in one rewrite and mirrored in memory.
    pub async fn get_valid_access_token(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;

        let refresh_token = tokens.refresh_token.clone().ok_or_else(|| {
            AppError::TokenRefresh("no refresh token on record; authorize first".to_string())
        })?;

        tracing::info!("Refreshing Strava access token");
        let refreshed = self.client.refresh_token(&refresh_token).await?;

        // Strava has already rotated the pair; the old refresh token is dead
        // whether or not the write below succeeds.
        tokens.access_token = Some(refreshed.access_token.clone());
        tokens.refresh_token = Some(refreshed.refresh_token.clone());

        self.persist_pair(&refreshed.access_token, &refreshed.refresh_token)
            .await?;

        tracing::info!(
            expires_at = ?refreshed.expires_at,
            "Tokens refreshed and saved"
        );
        Ok(refreshed.access_token)
    }

    /// Refresh and bind the new access token into a session handle.
    ///
    /// Each call refreshes; sessions are never shared between sync runs.
    pub async fn configure_client(&self) -> Result<StravaSession> {
        let access_token = self.get_valid_access_token().await?;
        Ok(StravaSession {
            client: self.client.clone(),
            access_token,
        })
    }

    /// Exchange a one-time authorization code for the initial token pair.
    ///
    /// Nothing is persisted unless the exchange fully succeeds.
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<AuthorizationResult> {
        if code.trim().is_empty() {
            return Err(AppError::AuthorizationExchange(
                "missing authorization code".to_string(),
            ));
        }

        let mut tokens = self.tokens.lock().await;

        tracing::info!("Exchanging authorization code for tokens");
        let exchanged = self.client.exchange_code(code).await?;

        self.persist_pair(&exchanged.access_token, &exchanged.refresh_token)
            .await?;
        tokens.access_token = Some(exchanged.access_token);
        tokens.refresh_token = Some(exchanged.refresh_token);

        let athlete_id = exchanged.athlete.as_ref().map(|a| a.id);
        tracing::info!(athlete_id = ?athlete_id, "Authorization complete, tokens stored");

        Ok(AuthorizationResult {
            athlete_id,
            athlete_name: exchanged.athlete.and_then(|a| a.display_name()),
        })
    }

    /// Async wrapper around [`CredentialStore::update_persisted_credential`].
    pub async fn update_persisted_credential(&self, key: &str, value: &str) -> Result<()> {
        let store = self.store.clone();
        let (key, value) = (key.to_string(), value.to_string());
        tokio::task::spawn_blocking(move || store.update_persisted_credential(&key, &value))
            .await
            .map_err(|e| AppError::CredentialPersistence(e.to_string()))?
    }

    async fn persist_pair(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        let store = self.store.clone();
        let (access, refresh) = (access_token.to_string(), refresh_token.to_string());
        tokio::task::spawn_blocking(move || {
            store.update_persisted_credentials(&[
                (ACCESS_TOKEN_KEY, access.as_str()),
                (REFRESH_TOKEN_KEY, refresh.as_str()),
            ])
        })
        .await
        .map_err(|e| AppError::CredentialPersistence(e.to_string()))?
        .inspect_err(|e| tracing::error!(error = %e, "Failed to persist rotated tokens"))
    }
}

/// Client bound to one freshly refreshed access token.
#[derive(Clone)]
pub struct StravaSession {
    client: StravaClient,
    access_token: String,
}

impl StravaSession {
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub async fn list_activities(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<serde_json::Value>> {
        self.client
            .list_activities(&self.access_token, page, per_page)
            .await
    }
}
