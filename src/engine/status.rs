//! Status orchestration: fan-out inspection across registry entries.

use anyhow::Result;
use chrono::Utc;

use crate::registry::{EntryStatus, RegistryEntry};
use crate::shell_exec;
use crate::vcs::{Adapter, ErrorClass, classify_error};

use super::filter::filter_status;
use super::inspect::inspect_repo;
use super::model::{RepoStatus, StatusOptions, StatusReport};
use super::{Engine, effective_concurrency, fan_out, timeout_duration};

pub(crate) fn run_status(engine: &Engine, opts: &StatusOptions) -> Result<StatusReport> {
    // Snapshot decouples workers from any concurrent registry mutation.
    let registry = engine.registry_snapshot();
    let entries = registry.entries.clone();

    let concurrency = effective_concurrency(opts.concurrency, engine.default_concurrency);
    let timeout = timeout_duration(opts.timeout_seconds);
    let adapter = engine.adapter();

    let rows = fan_out(
        entries,
        concurrency,
        |entry| status_row(adapter, &entry, timeout),
        |_| {},
    )?;

    let mut repos: Vec<RepoStatus> = rows
        .into_iter()
        .filter(|row| filter_status(opts.filter, row, Some(&registry)))
        .collect();
    repos.sort_by(|a, b| (&a.repo_id, &a.path).cmp(&(&b.repo_id, &b.path)));

    Ok(StatusReport {
        generated_at: Utc::now(),
        repos,
    })
}

/// Build the status row for one entry. Failures land in-band; this never
/// aborts the run.
fn status_row(
    adapter: &dyn Adapter,
    entry: &RegistryEntry,
    timeout: Option<std::time::Duration>,
) -> RepoStatus {
    if entry.status == EntryStatus::Missing {
        return missing_row(entry);
    }

    let inspected = shell_exec::with_deadline(timeout, || inspect_repo(adapter, &entry.path));
    let mut row = match inspected {
        Ok(row) => row,
        Err(err) => RepoStatus {
            path: entry.path.clone(),
            error: format!("{err:#}"),
            error_class: classify_error(&err),
            ..Default::default()
        },
    };

    if row.repo_id.is_empty() {
        row.repo_id = entry.repo_id.clone();
    }
    if !entry.kind.is_empty() {
        row.kind = entry.kind.clone();
    }
    if row.labels.is_empty() {
        row.labels = entry.labels.clone();
    }
    if row.annotations.is_empty() {
        row.annotations = entry.annotations.clone();
    }
    row
}

fn missing_row(entry: &RegistryEntry) -> RepoStatus {
    RepoStatus {
        repo_id: entry.repo_id.clone(),
        path: entry.path.clone(),
        kind: entry.kind.clone(),
        labels: entry.labels.clone(),
        annotations: entry.annotations.clone(),
        error: "path missing".to_string(),
        error_class: ErrorClass::Missing,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{MockAdapter, MockRepo};
    use crate::registry::Registry;
    use crate::vcs::TrackingState;
    use std::path::Path;
    use std::sync::Arc;

    fn entry(repo_id: &str, path: &str) -> RegistryEntry {
        let mut e = RegistryEntry::new(repo_id, path, Utc::now());
        e.remote_url = "git@host:owner/repo.git".into();
        e
    }

    fn engine_with(adapter: MockAdapter, entries: Vec<RegistryEntry>) -> Engine {
        let mut registry = Registry::new(Utc::now());
        registry.entries = entries;
        Engine::new(Arc::new(adapter), registry)
    }

    #[test]
    fn reports_inspected_entries_sorted() {
        let adapter = MockAdapter::new()
            .with_repo("/r/b", MockRepo::default())
            .with_repo("/r/a", MockRepo::default().tracking(TrackingState::Ahead));
        let engine = engine_with(
            adapter,
            vec![entry("host/owner/repo", "/r/b"), entry("host/owner/repo", "/r/a")],
        );

        let report = engine.status(&StatusOptions::default()).unwrap();
        assert_eq!(report.repos.len(), 2);
        assert_eq!(report.repos[0].path, Path::new("/r/a"));
        assert_eq!(report.repos[1].path, Path::new("/r/b"));
        assert_eq!(report.repos[0].tracking.status, TrackingState::Ahead);
    }

    #[test]
    fn missing_entry_gets_synthetic_row_without_adapter_calls() {
        let adapter = Arc::new(MockAdapter::new());
        let mut missing = entry("host/gone", "/r/gone");
        missing.status = EntryStatus::Missing;
        missing.kind = "mirror".into();
        let mut registry = Registry::new(Utc::now());
        registry.entries = vec![missing];
        let engine = Engine::new(adapter.clone(), registry);

        let report = engine.status(&StatusOptions::default()).unwrap();
        let row = &report.repos[0];
        assert_eq!(row.error, "path missing");
        assert_eq!(row.error_class, ErrorClass::Missing);
        assert_eq!(row.tracking.status, TrackingState::None);
        assert_eq!(row.kind, "mirror");
        assert!(adapter.calls().is_empty());
    }

    #[test]
    fn inspect_failure_is_reported_in_band() {
        let adapter = MockAdapter::new().with_repo(
            "/r/broken",
            MockRepo::default().failing("remotes", "fatal: bad object HEAD"),
        );
        let engine = engine_with(adapter, vec![entry("host/broken", "/r/broken")]);

        let report = engine.status(&StatusOptions::default()).unwrap();
        let row = &report.repos[0];
        assert!(row.error.contains("bad object"));
        assert_eq!(row.error_class, ErrorClass::Corrupt);
        // Identity inherited from the entry when inspection failed.
        assert_eq!(row.repo_id, "host/broken");
    }

    #[test]
    fn filter_is_applied_after_collection() {
        let adapter = MockAdapter::new()
            .with_repo("/r/clean", MockRepo::default())
            .with_repo("/r/dirty", MockRepo::default().dirty());
        let engine = engine_with(
            adapter,
            vec![entry("host/clean", "/r/clean"), entry("host/dirty", "/r/dirty")],
        );

        let report = engine
            .status(&StatusOptions {
                filter: super::super::StatusFilter::Dirty,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(report.repos.len(), 1);
        assert_eq!(report.repos[0].path, Path::new("/r/dirty"));
    }

    #[test]
    fn runs_are_deterministic() {
        let entries: Vec<RegistryEntry> = (0..6)
            .map(|i| entry(&format!("host/r{i}"), &format!("/r/{i}")))
            .collect();
        let mut adapter = MockAdapter::new();
        for i in 0..6 {
            adapter = adapter.with_repo(&format!("/r/{i}"), MockRepo::default());
        }
        let engine = engine_with(adapter, entries);

        let opts = StatusOptions {
            concurrency: 4,
            ..Default::default()
        };
        let first = engine.status(&opts).unwrap();
        let second = engine.status(&opts).unwrap();
        assert_eq!(first.repos, second.repos);
    }
}
