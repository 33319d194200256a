//! Git backend.
//!
//! Spawns the `git` binary for every operation. Command lines are stable:
//! dry-run action strings quote them verbatim, so argument order matters.

use std::path::Path;

use anyhow::{Context, Result};

use crate::shell_exec::{Cmd, path_context};

use super::parse::{find_ref_line, parse_ahead_behind, parse_porcelain_status};
use super::{Adapter, Head, Remote, Tracking, TrackingState, WorktreeStatus};

#[derive(Debug, Default)]
pub struct GitAdapter;

impl GitAdapter {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<String> {
        Cmd::new("git")
            .args(args.iter().copied())
            .current_dir(dir)
            .context(path_context(dir))
            .run_checked()
    }

    /// Run and return the raw output; use when non-zero exit is meaningful.
    fn run_output(&self, dir: &Path, args: &[&str]) -> Result<std::process::Output> {
        Cmd::new("git")
            .args(args.iter().copied())
            .current_dir(dir)
            .context(path_context(dir))
            .run()
    }
}

impl Adapter for GitAdapter {
    fn name(&self) -> &str {
        "git"
    }

    fn is_repo(&self, dir: &Path) -> bool {
        self.run_output(dir, &["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    fn is_bare(&self, dir: &Path) -> Result<bool> {
        let out = self.run(dir, &["rev-parse", "--is-bare-repository"])?;
        Ok(out.trim() == "true")
    }

    fn remotes(&self, dir: &Path) -> Result<Vec<Remote>> {
        let names = self.run(dir, &["remote"])?;
        let mut remotes = Vec::new();
        for name in names.lines().map(str::trim).filter(|n| !n.is_empty()) {
            let url = self.run(dir, &["remote", "get-url", name])?;
            remotes.push(Remote {
                name: name.to_string(),
                url: url.trim().to_string(),
            });
        }
        Ok(remotes)
    }

    fn head(&self, dir: &Path) -> Result<Head> {
        // Exits non-zero (quietly) on detached HEAD.
        let out = self.run_output(dir, &["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if out.status.success() {
            return Ok(Head {
                branch: String::from_utf8_lossy(&out.stdout).trim().to_string(),
                detached: false,
            });
        }
        let sha = self
            .run(dir, &["rev-parse", "--short", "HEAD"])
            .context("failed to resolve detached HEAD")?;
        Ok(Head {
            branch: sha.trim().to_string(),
            detached: true,
        })
    }

    fn worktree_status(&self, dir: &Path) -> Result<Option<WorktreeStatus>> {
        if self.is_bare(dir)? {
            return Ok(None);
        }
        let out = self.run(dir, &["status", "--porcelain=v1"])?;
        Ok(Some(parse_porcelain_status(&out)))
    }

    fn tracking_status(&self, dir: &Path) -> Result<Tracking> {
        let head = self.head(dir)?;
        if head.detached {
            return Ok(Tracking::none());
        }

        let refs = self.run(
            dir,
            &[
                "for-each-ref",
                "--format=%(refname:short)|%(upstream:short)|%(upstream:track)|%(upstream:trackshort)",
                "refs/heads",
            ],
        )?;
        let Some(line) = find_ref_line(&refs, &head.branch) else {
            return Ok(Tracking::none());
        };

        let status = line.state();
        let mut tracking = Tracking {
            upstream: line.upstream.clone(),
            status,
            ahead: None,
            behind: None,
        };

        if matches!(
            status,
            TrackingState::Ahead | TrackingState::Behind | TrackingState::Diverged | TrackingState::Equal
        ) {
            let range = format!("{}...{}", head.branch, line.upstream);
            let counts = self.run(dir, &["rev-list", "--left-right", "--count", &range])?;
            let (ahead, behind) = parse_ahead_behind(&counts);
            tracking.ahead = Some(ahead);
            tracking.behind = Some(behind);
        }

        Ok(tracking)
    }

    fn has_submodules(&self, dir: &Path) -> Result<bool> {
        // Exits 1 when .gitmodules is missing or has no entries.
        let out = self.run_output(
            dir,
            &["config", "--file", ".gitmodules", "--get-regexp", "submodule"],
        )?;
        Ok(out.status.success() && !out.stdout.is_empty())
    }

    fn fetch(&self, dir: &Path) -> Result<()> {
        self.run(
            dir,
            &[
                "-c",
                "fetch.recurseSubmodules=false",
                "fetch",
                "--all",
                "--prune",
                "--prune-tags",
                "--no-recurse-submodules",
            ],
        )?;
        Ok(())
    }

    fn pull_rebase(&self, dir: &Path) -> Result<()> {
        self.run(
            dir,
            &[
                "-c",
                "fetch.recurseSubmodules=false",
                "pull",
                "--rebase",
                "--no-recurse-submodules",
            ],
        )?;
        Ok(())
    }

    fn push(&self, dir: &Path) -> Result<()> {
        self.run(dir, &["push"])?;
        Ok(())
    }

    fn set_upstream(&self, dir: &Path, upstream: &str, branch: &str) -> Result<()> {
        self.run(dir, &["branch", "--set-upstream-to", upstream, branch])?;
        Ok(())
    }

    fn set_remote_url(&self, dir: &Path, remote: &str, url: &str) -> Result<()> {
        self.run(dir, &["remote", "set-url", remote, url])?;
        Ok(())
    }

    fn stash_push(&self, dir: &Path, message: &str) -> Result<bool> {
        let out = self.run(dir, &["stash", "push", "-u", "-m", message])?;
        // Exit 0 with this message means there was nothing to stash.
        Ok(!out.contains("No local changes to save"))
    }

    fn stash_pop(&self, dir: &Path) -> Result<()> {
        self.run(dir, &["stash", "pop"])?;
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

        let mut cmd = Cmd::new("git").arg("clone");
        if mirror {
            cmd = cmd.arg("--mirror");
        } else if let Some(branch) = branch.filter(|b| !b.is_empty()) {
            cmd = cmd.args(["--branch", branch]).arg("--single-branch");
        }
        cmd.arg(remote_url)
            .arg(target_path.to_string_lossy().into_owned())
            .context(path_context(target_path))
            .run_checked()?;
        Ok(())
    }
}
