//! Scripted adapter for engine tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::vcs::{Adapter, Head, Remote, Tracking, TrackingState, WorktreeStatus};

/// Scripted per-repo state.
#[derive(Debug, Clone)]
pub(crate) struct MockRepo {
    pub bare: bool,
    pub remotes: Vec<Remote>,
    pub head: Head,
    pub worktree: Option<WorktreeStatus>,
    pub tracking: Tracking,
    pub has_submodules: bool,
    /// True when `stash_push` actually has something to stash.
    pub stash_creates: bool,
    /// Operation name -> error message to fail with.
    pub fail: HashMap<&'static str, String>,
}

impl Default for MockRepo {
    fn default() -> Self {
        Self {
            bare: false,
            remotes: vec![Remote {
                name: "origin".into(),
                url: "git@host:owner/repo.git".into(),
            }],
            head: Head {
                branch: "main".into(),
                detached: false,
            },
            worktree: Some(WorktreeStatus::new(0, 0, 0)),
            tracking: Tracking {
                upstream: "origin/main".into(),
                status: TrackingState::Behind,
                ahead: Some(0),
                behind: Some(2),
            },
            has_submodules: false,
            stash_creates: true,
            fail: HashMap::new(),
        }
    }
}

impl MockRepo {
    pub fn tracking(mut self, status: TrackingState) -> Self {
        self.tracking.status = status;
        self
    }

    pub fn dirty(mut self) -> Self {
        self.worktree = Some(WorktreeStatus::new(0, 1, 1));
        self
    }

    pub fn failing(mut self, op: &'static str, message: &str) -> Self {
        self.fail.insert(op, message.to_string());
        self
    }
}

/// Adapter whose behavior is scripted per path, recording every call.
#[derive(Default)]
pub(crate) struct MockAdapter {
    pub repos: Mutex<HashMap<PathBuf, MockRepo>>,
    pub calls: Mutex<Vec<String>>,
    /// Artificial latency in mutating calls, for concurrency assertions.
    pub fetch_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(self, path: &str, repo: MockRepo) -> Self {
        self.repos.lock().unwrap().insert(PathBuf::from(path), repo);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls recorded for mutating operations only.
    pub fn mutating_calls(&self) -> Vec<String> {
        const MUTATING: &[&str] = &[
            "fetch",
            "pull_rebase",
            "push",
            "stash_push",
            "stash_pop",
            "clone",
            "set_upstream",
            "set_remote_url",
        ];
        self.calls()
            .into_iter()
            .filter(|c| MUTATING.iter().any(|m| c.starts_with(m)))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, op: &'static str, dir: &Path) {
        self.calls.lock().unwrap().push(format!("{op} {}", dir.display()));
    }

    fn repo(&self, dir: &Path) -> Result<MockRepo> {
        match self.repos.lock().unwrap().get(dir) {
            Some(repo) => Ok(repo.clone()),
            None => bail!("no scripted repo at {}", dir.display()),
        }
    }

    fn check(&self, op: &'static str, dir: &Path) -> Result<MockRepo> {
        self.record(op, dir);
        let repo = self.repo(dir)?;
        if let Some(message) = repo.fail.get(op) {
            bail!("{message}");
        }
        Ok(repo)
    }

    fn tracked<T>(&self, f: impl FnOnce() -> T) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            std::thread::sleep(delay);
        }
        let result = f();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        "git"
    }

    fn is_repo(&self, dir: &Path) -> bool {
        self.repos.lock().unwrap().contains_key(dir)
    }

    fn is_bare(&self, dir: &Path) -> Result<bool> {
        Ok(self.check("is_bare", dir)?.bare)
    }

    fn remotes(&self, dir: &Path) -> Result<Vec<Remote>> {
        Ok(self.check("remotes", dir)?.remotes)
    }

    fn head(&self, dir: &Path) -> Result<Head> {
        Ok(self.check("head", dir)?.head)
    }

    fn worktree_status(&self, dir: &Path) -> Result<Option<WorktreeStatus>> {
        Ok(self.check("worktree_status", dir)?.worktree)
    }

    fn tracking_status(&self, dir: &Path) -> Result<Tracking> {
        Ok(self.check("tracking_status", dir)?.tracking)
    }

    fn has_submodules(&self, dir: &Path) -> Result<bool> {
        Ok(self.check("has_submodules", dir)?.has_submodules)
    }

    fn fetch(&self, dir: &Path) -> Result<()> {
        self.tracked(|| {
            self.check("fetch", dir)?;
            Ok(())
        })
    }

    fn pull_rebase(&self, dir: &Path) -> Result<()> {
        self.check("pull_rebase", dir)?;
        Ok(())
    }

    fn push(&self, dir: &Path) -> Result<()> {
        self.check("push", dir)?;
        Ok(())
    }

    fn set_upstream(&self, dir: &Path, _upstream: &str, _branch: &str) -> Result<()> {
        self.check("set_upstream", dir)?;
        Ok(())
    }

    fn set_remote_url(&self, dir: &Path, remote: &str, url: &str) -> Result<()> {
        self.record("set_remote_url", dir);
        let mut repos = self.repos.lock().unwrap();
        let Some(repo) = repos.get_mut(dir) else {
            bail!("no scripted repo at {}", dir.display());
        };
        if let Some(message) = repo.fail.get("set_remote_url") {
            bail!("{}", message.clone());
        }
        match repo.remotes.iter_mut().find(|r| r.name == remote) {
            Some(r) => r.url = url.to_string(),
            None => bail!("no such remote '{remote}'"),
        }
        Ok(())
    }

    fn stash_push(&self, dir: &Path, _message: &str) -> Result<bool> {
        Ok(self.check("stash_push", dir)?.stash_creates)
    }

    fn stash_pop(&self, dir: &Path) -> Result<()> {
        self.check("stash_pop", dir)?;
        Ok(())
    }

    fn clone_repo(
        &self,
        _remote_url: &str,
        target_path: &Path,
        _branch: Option<&str>,
        _mirror: bool,
    ) -> Result<()> {
        self.record("clone", target_path);
        let repos = self.repos.lock().unwrap();
        if let Some(repo) = repos.get(target_path)
            && let Some(message) = repo.fail.get("clone")
        {
            bail!("{}", message.clone());
        }
        Ok(())
    }
}
