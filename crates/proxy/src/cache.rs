//! Disk-backed "last known good" tool list, one file per spec URL.

use crate::error::Result;
use chrono::{DateTime, Utc};
use rmcp::model::Tool;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// On-disk cache record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub tools: Vec<Tool>,
    pub cached_at: DateTime<Utc>,
    pub open_api_url: String,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `tools_cache_<first 16 hex chars of sha256(spec_url)>.json`
    #[must_use]
    pub fn file_name(spec_url: &str) -> String {
        let digest = hex::encode(sha2::Sha256::digest(spec_url.as_bytes()));
        format!("tools_cache_{}.json", &digest[..16])
    }

    #[must_use]
    pub fn path_for(&self, spec_url: &str) -> PathBuf {
        self.dir.join(Self::file_name(spec_url))
    }

    /// Write the tools for `spec_url`, replacing any previous record.
    ///
    /// The record is written to a temporary file next to the target and renamed over it, so a
    /// reader sees either the old record or the new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub async fn save(&self, spec_url: &str, tools: &[Tool]) -> Result<PathBuf> {
        let record = CacheRecord {
            tools: tools.to_vec(),
            cached_at: Utc::now(),
            open_api_url: spec_url.to_string(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        let path = self.path_for(spec_url);
        let tmp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            Self::file_name(spec_url),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(path)
    }

    /// The cached tools for `spec_url`, or `None` when there is no usable record.
    pub async fn load(&self, spec_url: &str) -> Option<Vec<Tool>> {
        let path = self.path_for(spec_url);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no tools cache for spec");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read tools cache");
                return None;
            }
        };

        match serde_json::from_str::<CacheRecord>(&content) {
            Ok(record) => {
                tracing::info!(
                    path = %path.display(),
                    count = record.tools.len(),
                    cached_at = %record.cached_at,
                    "loaded tools from cache"
                );
                Some(record.tools)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring unreadable tools cache"
                );
                None
            }
        }
    }
}
