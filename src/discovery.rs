//! Repository discovery.
//!
//! Walks configured roots and detects repository roots: normal checkouts
//! (`.git` directory), linked worktrees (`.git` file pointing at the real git
//! dir via `gitdir:`), bare repositories (`HEAD` file next to `objects/`),
//! and Mercurial checkouts (`.hg` directory). Nested repositories below a
//! detected root are not reported; excludes use gitignore-style globs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;

#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub roots: Vec<PathBuf>,
    pub exclude: Vec<String>,
    pub follow_symlinks: bool,
}

/// A repository root found under one of the configured roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredRepo {
    pub path: PathBuf,
    /// Backend that owns this checkout (`git` or `hg`).
    pub vcs: String,
    pub bare: bool,
}

/// Classify a directory as a repository root, if it is one.
fn detect_repo(dir: &Path) -> Option<(&'static str, bool)> {
    let dot_git = dir.join(".git");
    if dot_git.is_dir() {
        return Some(("git", false));
    }
    if dot_git.is_file() && is_gitdir_file(&dot_git) {
        // Linked worktree: .git is a regular file pointing at the git dir.
        return Some(("git", false));
    }
    if dir.join(".hg").is_dir() {
        return Some(("hg", false));
    }
    if dir.join("HEAD").is_file() && dir.join("objects").is_dir() {
        return Some(("git", true));
    }
    None
}

fn is_gitdir_file(path: &Path) -> bool {
    std::fs::read_to_string(path)
        .map(|content| content.trim_start().starts_with("gitdir:"))
        .unwrap_or(false)
}

/// Walk `opts.roots` and return every repository root found, sorted by path.
pub fn discover(opts: &DiscoveryOptions) -> Result<Vec<DiscoveredRepo>> {
    let mut repos: Vec<DiscoveredRepo> = Vec::new();

    for root in &opts.roots {
        let root = match dunce::canonicalize(root) {
            Ok(root) => root,
            Err(e) => {
                log::warn!("skipping root {}: {e}", root.display());
                continue;
            }
        };

        let mut overrides = OverrideBuilder::new(&root);
        for pattern in &opts.exclude {
            // Leading '!' turns an override into an exclusion.
            overrides
                .add(&format!("!{pattern}"))
                .with_context(|| format!("invalid exclude pattern {pattern:?}"))?;
        }
        let overrides = overrides.build().context("failed to build excludes")?;

        let walker = WalkBuilder::new(&root)
            .standard_filters(false)
            .follow_links(opts.follow_symlinks)
            .overrides(overrides)
            // Never descend into VCS internals; repo roots are detected from
            // the parent directory.
            .filter_entry(|entry| {
                entry.file_name() != ".git" && entry.file_name() != ".hg"
            })
            .build();

        // Roots found so far under this walk, used to skip nested repos.
        // The walker yields parents before children.
        let mut found_here: Vec<PathBuf> = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("discovery: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_dir()) {
                continue;
            }
            let dir = entry.path();
            if found_here.iter().any(|r| dir.starts_with(r) && dir != r) {
                continue;
            }
            if let Some((vcs, bare)) = detect_repo(dir) {
                found_here.push(dir.to_path_buf());
                repos.push(DiscoveredRepo {
                    path: dir.to_path_buf(),
                    vcs: vcs.to_string(),
                    bare,
                });
            }
        }
    }

    repos.sort_by(|a, b| a.path.cmp(&b.path));
    repos.dedup_by(|a, b| a.path == b.path);
    Ok(repos)
}
