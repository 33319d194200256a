//! The per-machine repository registry.
//!
//! Maps stable repository identities (normalized remote URLs, or `local:`
//! paths for remoteless repos) to filesystem checkouts. The registry is the
//! durable record Scan reconciles against and Sync reads its work list from.
//!
//! Identity invariants:
//! - `upsert` keys on `repo_id`, so identities stay unique.
//! - Lookups take `(repo_id, path)` to disambiguate multi-checkout setups,
//!   falling back to `repo_id` alone for migrated paths.
//! - Entries are kept sorted by `(repo_id, path)` on save for deterministic
//!   output and diffs.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a registered checkout currently stands on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Present,
    Missing,
    /// Re-discovered at a different path than previously recorded.
    Moved,
}

/// A single registered checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub repo_id: String,
    pub path: PathBuf,
    #[serde(default)]
    pub remote_url: String,
    /// Checkout kind, e.g. `mirror`; empty for a normal working copy.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub status: EntryStatus,
}

impl RegistryEntry {
    pub fn new(repo_id: impl Into<String>, path: impl Into<PathBuf>, last_seen: DateTime<Utc>) -> Self {
        Self {
            repo_id: repo_id.into(),
            path: path.into(),
            remote_url: String::new(),
            kind: String::new(),
            branch: String::new(),
            labels: Vec::new(),
            annotations: BTreeMap::new(),
            last_seen,
            status: EntryStatus::Present,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            updated_at: now,
            entries: Vec::new(),
        }
    }

    /// Load from a JSON file; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new(Utc::now()));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        serde_json::from_str(&data).with_context(|| format!("invalid registry {}", path.display()))
    }

    /// Persist as JSON, entries sorted, written atomically (temp + rename).
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.sort();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(
            path.parent().unwrap_or_else(|| Path::new(".")),
        )
        .context("failed to create registry temp file")?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| (&a.repo_id, &a.path).cmp(&(&b.repo_id, &b.path)));
    }

    /// Find by composite `(repo_id, path)`, falling back to `repo_id` alone.
    pub fn find(&self, repo_id: &str, path: &Path) -> Option<&RegistryEntry> {
        self.entries
            .iter()
            .find(|e| e.repo_id == repo_id && e.path == path)
            .or_else(|| self.entries.iter().find(|e| e.repo_id == repo_id))
    }

    /// Index variant of [`find`](Self::find), for callers that mutate.
    pub fn find_index(&self, repo_id: &str, path: &Path) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.repo_id == repo_id && e.path == path)
            .or_else(|| self.entries.iter().position(|e| e.repo_id == repo_id))
    }

    pub fn find_by_id(&self, repo_id: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.repo_id == repo_id)
    }

    /// Insert or update the entry for `incoming.repo_id`.
    ///
    /// An existing entry keeps its `kind`/`branch`/`labels`/`annotations`
    /// when the incoming record leaves them empty. When the recorded path
    /// differs from the incoming one the entry is marked [`EntryStatus::Moved`].
    pub fn upsert(&mut self, incoming: RegistryEntry) {
        let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.repo_id == incoming.repo_id)
        else {
            self.entries.push(incoming);
            return;
        };

        let moved = existing.path != incoming.path;
        existing.remote_url = incoming.remote_url;
        existing.last_seen = incoming.last_seen;
        existing.status = if moved {
            EntryStatus::Moved
        } else {
            incoming.status
        };
        existing.path = incoming.path;
        if !incoming.kind.is_empty() {
            existing.kind = incoming.kind;
        }
        if !incoming.branch.is_empty() {
            existing.branch = incoming.branch;
        }
        if !incoming.labels.is_empty() {
            existing.labels = incoming.labels;
        }
        if !incoming.annotations.is_empty() {
            existing.annotations = incoming.annotations;
        }
    }

    /// Stat every entry's path and mark it `Present` or `Missing`.
    ///
    /// I/O errors other than file-not-found propagate: a permission problem
    /// must not silently demote entries to missing.
    pub fn validate_paths(&mut self) -> Result<()> {
        for entry in &mut self.entries {
            match std::fs::metadata(&entry.path) {
                Ok(_) => entry.status = EntryStatus::Present,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    entry.status = EntryStatus::Missing;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to stat {}", entry.path.display()));
                }
            }
        }
        Ok(())
    }

    /// Drop `Missing` entries not seen since `threshold`. Returns the number
    /// removed.
    pub fn prune_stale(&mut self, threshold: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.status == EntryStatus::Missing && e.last_seen < threshold));
        before - self.entries.len()
    }
}
