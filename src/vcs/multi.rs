//! Backend multiplexing.
//!
//! When more than one backend is enabled, [`MultiAdapter`] detects which one
//! owns a given directory (first whose `is_repo` answers true) and delegates.
//! The detection result is cached per path; clones route to the first
//! configured backend; URL normalization always uses the git rules.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use dashmap::DashMap;

use super::{Adapter, Head, Remote, Tracking, WorktreeStatus};

pub struct MultiAdapter {
    adapters: Vec<Arc<dyn Adapter>>,
    // Path -> index into `adapters`, filled on first detection.
    matched: DashMap<PathBuf, usize>,
}

impl MultiAdapter {
    /// `adapters` must be non-empty; the first entry is the clone target.
    pub fn new(adapters: Vec<Arc<dyn Adapter>>) -> Self {
        assert!(!adapters.is_empty(), "MultiAdapter requires at least one backend");
        Self {
            adapters,
            matched: DashMap::new(),
        }
    }

    fn adapter_for(&self, dir: &Path) -> Result<&Arc<dyn Adapter>> {
        if let Some(index) = self.matched.get(dir) {
            return Ok(&self.adapters[*index]);
        }
        for (index, adapter) in self.adapters.iter().enumerate() {
            if adapter.is_repo(dir) {
                self.matched.insert(dir.to_path_buf(), index);
                return Ok(adapter);
            }
        }
        Err(anyhow!("no adapter matched {}", dir.display()))
    }

    fn first(&self) -> &Arc<dyn Adapter> {
        &self.adapters[0]
    }
}

impl Adapter for MultiAdapter {
    fn name(&self) -> &str {
        "multi"
    }

    fn is_repo(&self, dir: &Path) -> bool {
        self.adapter_for(dir).is_ok()
    }

    fn is_bare(&self, dir: &Path) -> Result<bool> {
        self.adapter_for(dir)?.is_bare(dir)
    }

    fn remotes(&self, dir: &Path) -> Result<Vec<Remote>> {
        self.adapter_for(dir)?.remotes(dir)
    }

    fn head(&self, dir: &Path) -> Result<Head> {
        self.adapter_for(dir)?.head(dir)
    }

    fn worktree_status(&self, dir: &Path) -> Result<Option<WorktreeStatus>> {
        self.adapter_for(dir)?.worktree_status(dir)
    }

    fn tracking_status(&self, dir: &Path) -> Result<Tracking> {
        self.adapter_for(dir)?.tracking_status(dir)
    }

    fn has_submodules(&self, dir: &Path) -> Result<bool> {
        self.adapter_for(dir)?.has_submodules(dir)
    }

    fn fetch(&self, dir: &Path) -> Result<()> {
        self.adapter_for(dir)?.fetch(dir)
    }

    fn pull_rebase(&self, dir: &Path) -> Result<()> {
        self.adapter_for(dir)?.pull_rebase(dir)
    }

    fn push(&self, dir: &Path) -> Result<()> {
        self.adapter_for(dir)?.push(dir)
    }

    fn set_upstream(&self, dir: &Path, upstream: &str, branch: &str) -> Result<()> {
        self.adapter_for(dir)?.set_upstream(dir, upstream, branch)
    }

    fn set_remote_url(&self, dir: &Path, remote: &str, url: &str) -> Result<()> {
        self.adapter_for(dir)?.set_remote_url(dir, remote, url)
    }

    fn stash_push(&self, dir: &Path, message: &str) -> Result<bool> {
        self.adapter_for(dir)?.stash_push(dir, message)
    }

    fn stash_pop(&self, dir: &Path) -> Result<()> {
        self.adapter_for(dir)?.stash_pop(dir)
    }

    fn clone_repo(
        &self,
        remote_url: &str,
        target_path: &Path,
        branch: Option<&str>,
        mirror: bool,
    ) -> Result<()> {
        self.first().clone_repo(remote_url, target_path, branch, mirror)
    }

    // URL identity rules are shared across backends: delegating to the
    // defaults keeps registry keys stable when a repo migrates backends.

    fn supports_local_update(&self, dir: &Path) -> (bool, String) {
        match self.adapter_for(dir) {
            Ok(adapter) => adapter.supports_local_update(dir),
            Err(_) => (true, String::new()),
        }
    }

    fn fetch_action(&self, dir: &Path) -> String {
        match self.adapter_for(dir) {
            Ok(adapter) => adapter.fetch_action(dir),
            Err(_) => super::DEFAULT_FETCH_ACTION.to_string(),
        }
    }

    fn clone_action(&self) -> String {
        self.first().clone_action()
    }
}
