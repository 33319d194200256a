//! Report and option types for the Engine's public surface.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vcs::{ErrorClass, Head, Remote, Submodules, Tracking, WorktreeStatus};

/// Everything known about a single repository at inspection time.
///
/// Per-repo failures are carried in-band (`error`/`error_class`) rather than
/// aborting the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoStatus {
    pub repo_id: String,
    pub path: PathBuf,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub bare: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remotes: Vec<Remote>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub primary_remote: String,
    #[serde(default)]
    pub head: Head,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<WorktreeStatus>,
    #[serde(default)]
    pub tracking: Tracking,
    #[serde(default)]
    pub submodules: Submodules,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "ErrorClass::is_none")]
    pub error_class: ErrorClass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub repos: Vec<RepoStatus>,
}

/// Final state of a single per-repo sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncOutcome {
    FailedInvalid,
    FailedCheckoutMissing,
    CheckoutMissing,
    FailedFetch,
    Fetched,
    FailedStash,
    FailedRebase,
    FailedStashPop,
    FailedPush,
    Pushed,
    SkippedNoUpstream,
    SkippedMissing,
    PlannedCheckoutMissing,
    PlannedPush,
    SkippedLocalUpdate,
    PlannedFetch,
    Skipped,
    Rebased,
    StashedRebased,
    FailedInspect,
}

/// Result of syncing one registry entry.
///
/// `action` is the human-readable shell-like description of what was (or
/// would be) run; [`crate::engine::Engine::execute_sync_plan`] re-derives the
/// operation sequence from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub repo_id: String,
    pub path: PathBuf,
    pub outcome: SyncOutcome,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "ErrorClass::is_none")]
    pub error_class: ErrorClass,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,
}

impl SyncResult {
    pub(crate) fn new(repo_id: &str, path: &std::path::Path, outcome: SyncOutcome, ok: bool) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            path: path.to_path_buf(),
            outcome,
            ok,
            error: String::new(),
            error_class: ErrorClass::None,
            action: String::new(),
        }
    }

    pub(crate) fn error(mut self, error: impl Into<String>, class: ErrorClass) -> Self {
        self.error = error.into();
        self.error_class = class;
        self
    }

    pub(crate) fn action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }
}

/// Row filter shared by status and sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    Errors,
    Dirty,
    Clean,
    Gone,
    Diverged,
    Missing,
    RemoteMismatch,
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub roots: Vec<PathBuf>,
    pub exclude: Vec<String>,
    pub follow_symlinks: bool,
    /// Persist the reconciled registry after scanning.
    pub write_registry: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    pub filter: StatusFilter,
    /// Worker pool size; 0 falls back to the engine default.
    pub concurrency: usize,
    /// Per-repo deadline in seconds; 0 disables it.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub filter: StatusFilter,
    /// Worker pool size; 0 falls back to the engine default.
    pub concurrency: usize,
    /// Per-repo deadline in seconds; 0 disables it.
    pub timeout_seconds: u64,
    /// Process every entry, collecting failures, instead of stopping at the
    /// first failed result.
    pub continue_on_error: bool,
    pub dry_run: bool,
    /// Rebase the local branch onto its upstream after fetching.
    pub update_local: bool,
    /// Push branches that are strictly ahead of their upstream.
    pub push_local: bool,
    /// Stash around the rebase when the working tree is dirty.
    pub rebase_dirty: bool,
    /// Rebase even when the branch has diverged from its upstream.
    pub force: bool,
    pub protected_branches: Vec<String>,
    pub allow_protected_rebase: bool,
    /// Clone entries whose checkout is missing from disk.
    pub checkout_missing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SyncOutcome::SkippedLocalUpdate).unwrap(),
            "\"skipped_local_update\""
        );
        assert_eq!(SyncOutcome::StashedRebased.to_string(), "stashed_rebased");
    }

    #[test]
    fn sync_result_round_trips() {
        let result = SyncResult::new("host/a", std::path::Path::new("/r/a"), SyncOutcome::PlannedFetch, true)
            .error("dry-run", ErrorClass::None)
            .action("git fetch --all --prune --prune-tags --no-recurse-submodules");
        let json = serde_json::to_string(&result).unwrap();
        let back: SyncResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn empty_fields_are_skipped_in_json() {
        let status = RepoStatus {
            repo_id: "host/a".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("\"error\""));
        assert!(!json.contains("\"type\""));
        assert!(!json.contains("\"last_sync\""));
    }
}
