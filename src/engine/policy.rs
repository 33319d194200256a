//! Rebase safety policy.
//!
//! [`pull_rebase_skip_reason`] is the single decision tree that determines
//! whether a pull-with-rebase is safe for a repository. Rules are evaluated
//! in a fixed order and the first match wins, so the returned reasons are
//! stable strings operators can rely on.

use globset::Glob;

use crate::vcs::TrackingState;

use super::model::{RepoStatus, SyncOptions};

/// Why a pull-with-rebase would be skipped, or `None` when it is safe.
pub fn pull_rebase_skip_reason(status: Option<&RepoStatus>, opts: &SyncOptions) -> Option<String> {
    let Some(status) = status else {
        return Some("unknown status".to_string());
    };

    if status.bare {
        return Some("bare repository".to_string());
    }
    if status.head.detached {
        return Some("detached HEAD".to_string());
    }
    if matches_protected_branch(&status.head.branch, &opts.protected_branches)
        && !opts.allow_protected_rebase
    {
        return Some(format!("branch \"{}\" is protected", status.head.branch));
    }

    let Some(worktree) = &status.worktree else {
        return Some("dirty state unknown".to_string());
    };
    if worktree.dirty && !opts.rebase_dirty {
        return Some("dirty working tree".to_string());
    }

    if status.tracking.status == TrackingState::Gone {
        return Some("upstream no longer exists".to_string());
    }
    if status.tracking.upstream.is_empty() || status.tracking.status == TrackingState::None {
        return Some("branch is not tracking an upstream".to_string());
    }
    if status.tracking.status == TrackingState::Ahead {
        return Some("branch has local commits to push".to_string());
    }
    if status.tracking.status == TrackingState::Diverged && !opts.force {
        return Some("branch has diverged (use --force to rebase anyway)".to_string());
    }
    if status.tracking.status == TrackingState::Equal {
        return Some("already up to date".to_string());
    }

    None
}

/// Shell-glob match of a short branch name against protected patterns.
///
/// Empty branches never match; empty and invalid patterns are ignored.
pub fn matches_protected_branch(branch: &str, patterns: &[String]) -> bool {
    let branch = branch.trim();
    if branch.is_empty() {
        return false;
    }
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .filter_map(|p| Glob::new(p).ok())
        .any(|glob| glob.compile_matcher().is_match(branch))
}
