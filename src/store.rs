//! Dedup store: the set of posting ids already delivered to the board.
//!
//! The whole set lives in one JSON file, an array of `{ "id", "timestamp" }`
//! objects. It is read once at the start of a run and overwritten once at the
//! end. A single run owns the file; concurrent runs are not coordinated.

use crate::model::ProcessedEntry;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// In-memory view of the store. Ids are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: Vec<ProcessedEntry>,
    ids: HashSet<String>,
}

impl Snapshot {
    /// Build a snapshot, keeping the first entry for any repeated id.
    pub fn from_entries(entries: impl IntoIterator<Item = ProcessedEntry>) -> Self {
        let mut snapshot = Snapshot::default();
        for entry in entries {
            if snapshot.ids.insert(entry.id.clone()) {
                snapshot.entries.push(entry);
            }
        }
        snapshot
    }

    pub fn is_new(&self, id: &str) -> bool {
        !self.ids.contains(id)
    }

    /// Record `id` as delivered at `at`. Returns false if it was already present.
    pub fn admit(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        if !self.ids.insert(id.to_string()) {
            return false;
        }
        self.entries.push(ProcessedEntry {
            id: id.to_string(),
            timestamp: at,
        });
        true
    }

    /// Drop entries older than `retention`. Returns how many were removed.
    pub fn sweep(&mut self, retention: Duration, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ids = &mut self.ids;
        self.entries.retain(|entry| {
            let keep = now - entry.timestamp <= retention;
            if !keep {
                ids.remove(&entry.id);
            }
            keep
        });
        before - self.entries.len()
    }

    pub fn entries(&self) -> &[ProcessedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DedupStore {
    path: PathBuf,
}

impl DedupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored snapshot. A missing or unreadable file is an empty set.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Snapshot {
        match self.try_load().await {
            Ok(Some(snapshot)) => {
                debug!(entries = snapshot.len(), "loaded processed jobs");
                snapshot
            }
            Ok(None) => {
                debug!("no processed jobs file yet");
                Snapshot::default()
            }
            Err(err) => {
                warn!(?err, "processed jobs file unreadable; starting empty");
                Snapshot::default()
            }
        }
    }

    async fn try_load(&self) -> Result<Option<Snapshot>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).context("failed to read processed jobs file"),
        };
        let entries: Vec<ProcessedEntry> =
            serde_json::from_str(&raw).context("invalid processed jobs JSON")?;
        Ok(Some(Snapshot::from_entries(entries)))
    }

    /// Overwrite the file with `snapshot`. Failures are logged, not returned.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn persist(&self, snapshot: &Snapshot) -> bool {
        match self.try_persist(snapshot).await {
            Ok(()) => {
                debug!(entries = snapshot.len(), "saved processed jobs");
                true
            }
            Err(err) => {
                warn!(?err, "failed to save processed jobs");
                false
            }
        }
    }

    async fn try_persist(&self, snapshot: &Snapshot) -> Result<()> {
        let body = serde_json::to_string_pretty(snapshot.entries())
            .context("failed to encode processed jobs")?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .context("failed to replace processed jobs file")?;
        Ok(())
    }

    /// Load, drop expired entries and write the result back.
    #[instrument(skip_all)]
    pub async fn cleanup(&self, retention: Duration, now: DateTime<Utc>) -> usize {
        let mut snapshot = self.load().await;
        let removed = snapshot.sweep(retention, now);
        self.persist(&snapshot).await;
        info!(removed, remaining = snapshot.len(), "cleaned up processed jobs");
        removed
    }
}
