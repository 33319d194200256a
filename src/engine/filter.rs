//! Row filtering shared by status and sync.

use crate::registry::{EntryStatus, Registry, RegistryEntry};
use crate::vcs::{TrackingState, url::normalize_url};

use super::model::{RepoStatus, StatusFilter};

/// Does `status` match `filter`?
///
/// `Missing` and `RemoteMismatch` need the registry; without one they match
/// nothing.
pub fn filter_status(filter: StatusFilter, status: &RepoStatus, registry: Option<&Registry>) -> bool {
    match filter {
        StatusFilter::All => true,
        StatusFilter::Errors => !status.error.is_empty(),
        StatusFilter::Dirty => status.worktree.is_some_and(|w| w.dirty),
        StatusFilter::Clean => status.worktree.is_some_and(|w| !w.dirty),
        StatusFilter::Gone => status.tracking.status == TrackingState::Gone,
        StatusFilter::Diverged => status.tracking.status == TrackingState::Diverged,
        StatusFilter::Missing => registry
            .and_then(|r| r.find_by_id(&status.repo_id))
            .is_some_and(|e| e.status == EntryStatus::Missing),
        StatusFilter::RemoteMismatch => registry
            .and_then(|r| r.find(&status.repo_id, &status.path))
            .is_some_and(|e| has_remote_mismatch(status, e)),
    }
}

/// The registry's idea of the remote no longer matches the live repository.
///
/// Compares the registry's normalized remote URL against the live identity;
/// both sides must be non-empty for a mismatch to be meaningful.
pub fn has_remote_mismatch(status: &RepoStatus, entry: &RegistryEntry) -> bool {
    let registered = normalize_url(entry.remote_url.trim());
    let live = status.repo_id.trim();
    !registered.is_empty() && !live.is_empty() && registered != live
}
