//! Scan orchestration: discovery plus registry reconciliation.

use anyhow::{Result, bail};
use chrono::Utc;

use crate::discovery::{DiscoveryOptions, discover};
use crate::registry::RegistryEntry;
use crate::vcs::classify_error;

use super::inspect::local_identity;
use super::model::{RepoStatus, ScanOptions};
use super::Engine;

pub(crate) fn run_scan(engine: &Engine, opts: &ScanOptions) -> Result<Vec<RepoStatus>> {
    if opts.roots.is_empty() {
        bail!("no roots configured; set `roots` in the config or pass --root");
    }

    let now = Utc::now();

    // Reconcile entry statuses against disk before discovery so repos that
    // vanished since the last scan are marked missing even when the walk
    // does not cover them.
    engine.lock_registry().validate_paths()?;

    let discovered = discover(&DiscoveryOptions {
        roots: opts.roots.clone(),
        exclude: opts.exclude.clone(),
        follow_symlinks: opts.follow_symlinks,
    })?;

    let adapter = engine.adapter();
    let mut rows = Vec::with_capacity(discovered.len());

    for repo in discovered {
        let mut row = RepoStatus {
            path: repo.path.clone(),
            bare: repo.bare,
            ..Default::default()
        };

        match adapter.remotes(&repo.path) {
            Ok(remotes) => {
                let names: Vec<String> = remotes.iter().map(|r| r.name.clone()).collect();
                row.primary_remote = adapter.primary_remote(&names).unwrap_or_default();
                row.remotes = remotes;
            }
            Err(err) => {
                row.error = format!("{err:#}");
                row.error_class = classify_error(&err);
            }
        }

        let remote_url = row
            .remotes
            .iter()
            .find(|r| r.name == row.primary_remote)
            .map(|r| r.url.clone())
            .unwrap_or_default();
        row.repo_id = {
            let id = adapter.normalize_url(&remote_url);
            if id.is_empty() { local_identity(&repo.path) } else { id }
        };

        let mut entry = RegistryEntry::new(&row.repo_id, &repo.path, now);
        entry.remote_url = remote_url;
        if repo.bare {
            entry.kind = "mirror".to_string();
        }
        engine.lock_registry().upsert(entry);

        rows.push(row);
    }

    {
        let mut registry = engine.lock_registry();
        registry.updated_at = now;
        if opts.write_registry {
            registry.sort();
            if let Some(path) = &engine.registry_path {
                registry.save(path)?;
            }
        }
    }

    rows.sort_by(|a, b| (&a.repo_id, &a.path).cmp(&(&b.repo_id, &b.path)));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{MockAdapter, MockRepo};
    use crate::registry::{EntryStatus, Registry};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    fn mkrepo(base: &Path, name: &str) -> std::path::PathBuf {
        let dir = base.join(name);
        fs::create_dir_all(dir.join(".git")).unwrap();
        dunce::canonicalize(&dir).unwrap()
    }

    fn scan_opts(root: &Path) -> ScanOptions {
        ScanOptions {
            roots: vec![root.to_path_buf()],
            ..Default::default()
        }
    }

    #[test]
    fn empty_roots_is_a_fatal_error() {
        let engine = Engine::new(Arc::new(MockAdapter::new()), Registry::new(Utc::now()));
        let err = engine.scan(&ScanOptions::default()).unwrap_err();
        assert!(err.to_string().contains("no roots"));
    }

    #[test]
    fn scan_registers_discovered_repos() {
        let tmp = tempfile::tempdir().unwrap();
        let repo_path = mkrepo(tmp.path(), "one");

        let adapter = MockAdapter::new().with_repo(
            repo_path.to_str().unwrap(),
            MockRepo::default(),
        );
        let engine = Engine::new(Arc::new(adapter), Registry::new(Utc::now()));

        let rows = engine.scan(&scan_opts(tmp.path())).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].repo_id, "host/owner/repo");
        assert_eq!(rows[0].primary_remote, "origin");

        let registry = engine.lock_registry();
        let entry = registry.find_by_id("host/owner/repo").unwrap();
        assert_eq!(entry.path, repo_path);
        assert_eq!(entry.status, EntryStatus::Present);
        assert_eq!(entry.remote_url, "git@host:owner/repo.git");
    }

    #[test]
    fn remoteless_repo_gets_local_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let repo_path = mkrepo(tmp.path(), "loner");

        let mut script = MockRepo::default();
        script.remotes = Vec::new();
        let adapter = MockAdapter::new().with_repo(repo_path.to_str().unwrap(), script);
        let engine = Engine::new(Arc::new(adapter), Registry::new(Utc::now()));

        let rows = engine.scan(&scan_opts(tmp.path())).unwrap();
        assert!(rows[0].repo_id.starts_with("local:"));
        assert!(rows[0].repo_id.ends_with("loner"));
    }

    #[test]
    fn rescan_marks_vanished_entries_missing() {
        let tmp = tempfile::tempdir().unwrap();
        mkrepo(tmp.path(), "real");
        let real = dunce::canonicalize(tmp.path().join("real")).unwrap();

        let mut registry = Registry::new(Utc::now());
        let mut gone = RegistryEntry::new("host/gone", "/no/longer/here", Utc::now());
        gone.remote_url = "git@host:gone.git".into();
        registry.entries.push(gone);

        let adapter = MockAdapter::new().with_repo(real.to_str().unwrap(), MockRepo::default());
        let engine = Engine::new(Arc::new(adapter), registry);

        engine.scan(&scan_opts(tmp.path())).unwrap();
        let registry = engine.lock_registry();
        assert_eq!(
            registry.find_by_id("host/gone").unwrap().status,
            EntryStatus::Missing
        );
    }

    #[test]
    fn moved_repo_is_marked_moved() {
        let tmp = tempfile::tempdir().unwrap();
        let new_path = mkrepo(tmp.path(), "moved-here");

        let mut registry = Registry::new(Utc::now());
        let mut old = RegistryEntry::new("host/owner/repo", "/old/location", Utc::now());
        old.remote_url = "git@host:owner/repo.git".into();
        registry.entries.push(old);

        let adapter = MockAdapter::new().with_repo(new_path.to_str().unwrap(), MockRepo::default());
        let engine = Engine::new(Arc::new(adapter), registry);

        engine.scan(&scan_opts(tmp.path())).unwrap();
        let registry = engine.lock_registry();
        let entry = registry.find_by_id("host/owner/repo").unwrap();
        assert_eq!(entry.status, EntryStatus::Moved);
        assert_eq!(entry.path, new_path);
    }

    #[test]
    fn scan_failure_on_remotes_is_in_band() {
        let tmp = tempfile::tempdir().unwrap();
        let repo_path = mkrepo(tmp.path(), "broken");

        let adapter = MockAdapter::new().with_repo(
            repo_path.to_str().unwrap(),
            MockRepo::default().failing("remotes", "fatal: not a git repository"),
        );
        let engine = Engine::new(Arc::new(adapter), Registry::new(Utc::now()));

        let rows = engine.scan(&scan_opts(tmp.path())).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].error.contains("not a git repository"));
        assert!(rows[0].repo_id.starts_with("local:"));
    }

    #[test]
    fn write_registry_persists_to_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let repo_path = mkrepo(tmp.path(), "one");
        let registry_file = tmp.path().join("state/registry.json");

        let adapter = MockAdapter::new().with_repo(repo_path.to_str().unwrap(), MockRepo::default());
        let engine = Engine::new(Arc::new(adapter), Registry::new(Utc::now()))
            .with_registry_path(&registry_file);

        let mut opts = scan_opts(tmp.path());
        opts.write_registry = true;
        engine.scan(&opts).unwrap();

        let loaded = Registry::load(&registry_file).unwrap();
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].repo_id, "host/owner/repo");
    }
}
