//! Mercurial backend.
//!
//! A deliberately conservative second backend: fetch maps to `hg pull`,
//! stash to shelve/unshelve, and local-branch updates are declined via the
//! capability probe rather than guessing at rebase semantics.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::shell_exec::{Cmd, path_context};

use super::parse::{parse_hg_paths, parse_hg_status};
use super::{Adapter, Head, Remote, Tracking, TrackingState, WorktreeStatus};

#[derive(Debug, Default)]
pub struct HgAdapter;

impl HgAdapter {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<String> {
        Cmd::new("hg")
            .args(args.iter().copied())
            .current_dir(dir)
            .context(path_context(dir))
            .run_checked()
    }
}

impl Adapter for HgAdapter {
    fn name(&self) -> &str {
        "hg"
    }

    fn is_repo(&self, dir: &Path) -> bool {
        dir.join(".hg").is_dir()
    }

    fn is_bare(&self, _dir: &Path) -> Result<bool> {
        // Mercurial has no bare repositories in the git sense.
        Ok(false)
    }

    fn remotes(&self, dir: &Path) -> Result<Vec<Remote>> {
        let out = self.run(dir, &["paths"])?;
        Ok(parse_hg_paths(&out)
            .into_iter()
            .map(|(name, url)| Remote { name, url })
            .collect())
    }

    fn head(&self, dir: &Path) -> Result<Head> {
        let branch = self.run(dir, &["branch"])?;
        Ok(Head {
            branch: branch.trim().to_string(),
            detached: false,
        })
    }

    fn worktree_status(&self, dir: &Path) -> Result<Option<WorktreeStatus>> {
        let out = self.run(dir, &["status"])?;
        Ok(Some(parse_hg_status(&out)))
    }

    fn tracking_status(&self, dir: &Path) -> Result<Tracking> {
        // Ahead/behind require talking to the remote; report only whether a
        // default path is configured.
        let remotes = self.remotes(dir)?;
        let Some(default) = remotes.iter().find(|r| r.name == "default") else {
            return Ok(Tracking::none());
        };
        Ok(Tracking {
            upstream: default.name.clone(),
            status: TrackingState::None,
            ahead: None,
            behind: None,
        })
    }

    fn has_submodules(&self, dir: &Path) -> Result<bool> {
        Ok(dir.join(".hgsub").is_file())
    }

    fn fetch(&self, dir: &Path) -> Result<()> {
        self.run(dir, &["pull"])?;
        Ok(())
    }

    fn pull_rebase(&self, dir: &Path) -> Result<()> {
        self.run(dir, &["pull", "--rebase"])?;
        Ok(())
    }

    fn push(&self, dir: &Path) -> Result<()> {
        self.run(dir, &["push"])?;
        Ok(())
    }

    fn set_upstream(&self, _dir: &Path, _upstream: &str, _branch: &str) -> Result<()> {
        bail!("the mercurial backend does not support setting an upstream");
    }

    fn set_remote_url(&self, _dir: &Path, _remote: &str, _url: &str) -> Result<()> {
        bail!("the mercurial backend does not support rewriting remote paths");
    }

    fn stash_push(&self, dir: &Path, message: &str) -> Result<bool> {
        let out = self.run(dir, &["shelve", "--message", message])?;
        Ok(!out.contains("nothing changed"))
    }

    fn stash_pop(&self, dir: &Path) -> Result<()> {
        self.run(dir, &["unshelve"])?;
        Ok(())
    }

    fn clone_repo(
        &self,
        remote_url: &str,
        target_path: &Path,
        branch: Option<&str>,
        mirror: bool,
    ) -> Result<()> {
        if let Some(parent) = target_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut cmd = Cmd::new("hg").arg("clone");
        if mirror {
            // Closest analogue: clone without checking out a working copy.
            cmd = cmd.arg("--noupdate");
        } else if let Some(branch) = branch.filter(|b| !b.is_empty()) {
            cmd = cmd.args(["--branch", branch]);
        }
        cmd.arg(remote_url)
            .arg(target_path.to_string_lossy().into_owned())
            .context(path_context(target_path))
            .run_checked()?;
        Ok(())
    }

    fn supports_local_update(&self, _dir: &Path) -> (bool, String) {
        (
            false,
            "mercurial backend does not update local branches".to_string(),
        )
    }

    fn fetch_action(&self, _dir: &Path) -> String {
        "hg pull".to_string()
    }
}
