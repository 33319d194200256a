//! VCS backends and the adapter contract.
//!
//! The Engine never talks to a VCS binary directly; it goes through the
//! [`Adapter`] trait. `git` is the primary backend, `hg` the second, and
//! [`MultiAdapter`] multiplexes between them per path when both are enabled.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod classify;
mod git;
mod hg;
mod multi;
mod parse;
pub mod url;

pub use classify::{ClassifiedError, ErrorClass, classify_error};
pub use git::GitAdapter;
pub use hg::HgAdapter;
pub use multi::MultiAdapter;

/// Fetch action the git backend advertises for dry-run plans.
pub const DEFAULT_FETCH_ACTION: &str =
    "git fetch --all --prune --prune-tags --no-recurse-submodules";

/// A configured remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub url: String,
}

/// The checked-out head of a working copy.
///
/// When `detached` is set, `branch` may carry a short commit id instead of a
/// branch name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    pub branch: String,
    pub detached: bool,
}

/// Working-tree cleanliness counters. Absent for bare repositories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeStatus {
    pub dirty: bool,
    pub staged: u32,
    pub unstaged: u32,
    pub untracked: u32,
}

impl WorktreeStatus {
    pub fn new(staged: u32, unstaged: u32, untracked: u32) -> Self {
        Self {
            dirty: staged > 0 || unstaged > 0 || untracked > 0,
            staged,
            unstaged,
            untracked,
        }
    }
}

/// Relationship between a branch and its upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    Ahead,
    Behind,
    Diverged,
    Equal,
    /// Upstream configured but the remote ref no longer exists.
    Gone,
    #[default]
    None,
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrackingState::Ahead => "ahead",
            TrackingState::Behind => "behind",
            TrackingState::Diverged => "diverged",
            TrackingState::Equal => "equal",
            TrackingState::Gone => "gone",
            TrackingState::None => "none",
        };
        f.write_str(s)
    }
}

/// Upstream tracking information for the checked-out branch.
///
/// `ahead`/`behind` are populated only for the states where counting makes
/// sense (`Ahead`, `Behind`, `Diverged`, `Equal`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub upstream: String,
    pub status: TrackingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ahead: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behind: Option<u32>,
}

impl Tracking {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Submodule presence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submodules {
    pub has_submodules: bool,
}

/// Uniform per-repo operations over a VCS backend.
///
/// Implementations spawn the backend binary through
/// [`crate::shell_exec::Cmd`]; errors therefore carry combined
/// stdout/stderr for the classifier. Capability probes
/// ([`supports_local_update`](Adapter::supports_local_update),
/// [`fetch_action`](Adapter::fetch_action)) have defaults matching the git
/// backend so alternative backends only override what differs.
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    fn is_repo(&self, dir: &Path) -> bool;
    fn is_bare(&self, dir: &Path) -> Result<bool>;
    fn remotes(&self, dir: &Path) -> Result<Vec<Remote>>;
    fn head(&self, dir: &Path) -> Result<Head>;
    /// Working-tree counters; `None` iff the repository is bare.
    fn worktree_status(&self, dir: &Path) -> Result<Option<WorktreeStatus>>;
    fn tracking_status(&self, dir: &Path) -> Result<Tracking>;
    fn has_submodules(&self, dir: &Path) -> Result<bool>;

    fn fetch(&self, dir: &Path) -> Result<()>;
    fn pull_rebase(&self, dir: &Path) -> Result<()>;
    fn push(&self, dir: &Path) -> Result<()>;
    fn set_upstream(&self, dir: &Path, upstream: &str, branch: &str) -> Result<()>;
    fn set_remote_url(&self, dir: &Path, remote: &str, url: &str) -> Result<()>;
    /// Returns true iff a stash was actually created (there was something to
    /// stash).
    fn stash_push(&self, dir: &Path, message: &str) -> Result<bool>;
    fn stash_pop(&self, dir: &Path) -> Result<()>;
    fn clone_repo(
        &self,
        remote_url: &str,
        target_path: &Path,
        branch: Option<&str>,
        mirror: bool,
    ) -> Result<()>;

    fn normalize_url(&self, raw: &str) -> String {
        url::normalize_url(raw)
    }

    fn primary_remote(&self, names: &[String]) -> Option<String> {
        url::primary_remote(names)
    }

    /// Whether the backend can update the local branch in place, with a
    /// human-readable reason when it cannot.
    fn supports_local_update(&self, _dir: &Path) -> (bool, String) {
        (true, String::new())
    }

    /// Shell-like description of the fetch this backend performs, used
    /// verbatim in dry-run plans.
    fn fetch_action(&self, _dir: &Path) -> String {
        DEFAULT_FETCH_ACTION.to_string()
    }

    /// Base of the clone action string for dry-run plans, e.g. `git clone`.
    fn clone_action(&self) -> String {
        format!("{} clone", self.name())
    }
}
