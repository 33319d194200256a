//! Single-repo state gathering.

use std::path::Path;

use anyhow::Result;
use path_slash::PathExt as _;

use crate::vcs::{Adapter, Tracking};

use super::model::RepoStatus;

/// Identity for a repository with no remotes: `local:` plus the
/// forward-slashed absolute path.
pub fn local_identity(path: &Path) -> String {
    format!("local:{}", path.to_slash_lossy())
}

/// Gather the full [`RepoStatus`] for one repository.
///
/// `is_bare` and `has_submodules` are best-effort (defaulting to false);
/// every other adapter failure propagates and becomes an in-band error row
/// at the orchestrator level.
pub fn inspect_repo(adapter: &dyn Adapter, path: &Path) -> Result<RepoStatus> {
    let bare = adapter.is_bare(path).unwrap_or(false);
    let remotes = adapter.remotes(path)?;

    let names: Vec<String> = remotes.iter().map(|r| r.name.clone()).collect();
    let primary_remote = adapter.primary_remote(&names).unwrap_or_default();
    let remote_url = remotes
        .iter()
        .find(|r| r.name == primary_remote)
        .map(|r| r.url.clone())
        .unwrap_or_default();

    let repo_id = {
        let id = adapter.normalize_url(&remote_url);
        if id.is_empty() { local_identity(path) } else { id }
    };

    let head = adapter.head(path)?;

    let (worktree, tracking) = if bare {
        (None, Tracking::none())
    } else {
        (adapter.worktree_status(path)?, adapter.tracking_status(path)?)
    };

    let has_submodules = adapter.has_submodules(path).unwrap_or(false);

    Ok(RepoStatus {
        repo_id,
        path: path.to_path_buf(),
        bare,
        remotes,
        primary_remote,
        head,
        worktree,
        tracking,
        submodules: crate::vcs::Submodules { has_submodules },
        ..Default::default()
    })
}
