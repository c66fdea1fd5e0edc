//! Token record and its file storage
//!
//! A single JSON file holds the one active `TokenRecord` for this process.
//! Loads read the whole file; saves replace it wholesale through a temp file
//! and rename, so a reader never observes a half-written record.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// The persisted credential.
///
/// `expires_on` is an absolute unix timestamp in seconds. Records are never
/// mutated in place; a refresh builds a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(deserialize_with = "epoch_seconds")]
    pub expires_on: u64,
}

impl TokenRecord {
    /// Build a record from a token endpoint response received at `now`.
    pub fn from_response(response: TokenResponse, now: u64) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_on: now.saturating_add(response.expires_in),
        }
    }

    /// Keep `previous` as the refresh token when the provider did not rotate it.
    pub fn or_refresh_token(mut self, previous: Option<String>) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous;
        }
        self
    }

    /// Strictly before expiry. A token expiring exactly now is already stale.
    pub fn is_valid_at(&self, now: u64) -> bool {
        self.expires_on > now
    }
}

/// `expires_on` as written by this crate (integer) or by other tools
/// (fractional). Integers are read exactly.
#[derive(Deserialize)]
#[serde(untagged)]
enum EpochSeconds {
    Whole(u64),
    Fractional(f64),
}

/// Accept integer or fractional seconds; fractions are truncated.
fn epoch_seconds<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match EpochSeconds::deserialize(deserializer)? {
        EpochSeconds::Whole(secs) => Ok(secs),
        EpochSeconds::Fractional(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs as u64),
        EpochSeconds::Fractional(secs) => Err(serde::de::Error::custom(format!(
            "expires_on must be a non-negative number of seconds, got {secs}"
        ))),
    }
}

/// Current wall-clock time in seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// File-backed storage for the active `TokenRecord`.
///
/// Holds no in-memory copy; callers that need check-then-write atomicity
/// (the credential cache) serialize access themselves.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted record.
    ///
    /// A missing file is `Ok(None)`. Unreadable or malformed content is a
    /// `Storage` error, never "no token".
    pub async fn load(&self) -> Result<Option<TokenRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no token file");
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::Storage(format!(
                    "reading {}: {e}",
                    self.path.display()
                )));
            }
        };

        let record: TokenRecord = serde_json::from_str(&contents)
            .map_err(|e| Error::Storage(format!("parsing {}: {e}", self.path.display())))?;
        Ok(Some(record))
    }

    /// Replace the persisted record.
    pub async fn save(&self, record: &TokenRecord) -> Result<()> {
        write_atomic(&self.path, record).await
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write the record to a sibling temp file, then rename it over the target.
/// Permissions are 0600 on unix since the file holds bearer tokens.
async fn write_atomic(path: &Path, record: &TokenRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::Storage(format!("serializing token record: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage(format!("{} has no parent directory", path.display())))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Storage(format!("{} has no file name", path.display())))?
        .to_string_lossy();

    let tmp_path = dir.join(format!(
        ".{file_name}.tmp.{}.{}",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing {}: {e}", tmp_path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = tokio::fs::set_permissions(&tmp_path, perms).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(Error::Storage(format!(
                "setting permissions on {}: {e}",
                tmp_path.display()
            )));
        }
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Storage(format!(
            "replacing {}: {e}",
            path.display()
        )));
    }

    debug!(path = %path.display(), "persisted token record");
    Ok(())
}
