//! Applying previously produced dry-run plans.
//!
//! A plan item is "planned" iff its `error` is `"dry-run"`; anything else
//! passes through unchanged. The operation sequence is re-derived from the
//! lowercased `action` string by substring matching, so plans produced by
//! other callers (or saved to disk and edited) keep working.

use anyhow::Result;

use crate::shell_exec;
use crate::vcs::{ErrorClass, classify_error};

use super::model::{SyncOptions, SyncOutcome, SyncResult};
use super::sync::{STASH_MESSAGE, canonical_fetch_error, promote_entry};
use super::{Engine, effective_concurrency, fan_out, timeout_duration};

pub(crate) fn run_plan(
    engine: &Engine,
    items: Vec<SyncResult>,
    opts: &SyncOptions,
    on_start: &(dyn Fn(&SyncResult) + Sync),
    mut on_complete: impl FnMut(&SyncResult),
) -> Result<Vec<SyncResult>> {
    let concurrency = effective_concurrency(opts.concurrency, engine.default_concurrency);
    let timeout = timeout_duration(opts.timeout_seconds);

    let worker = |item: SyncResult| -> SyncResult {
        on_start(&item);
        shell_exec::with_deadline(timeout, || apply_plan_item(engine, item))
    };

    let mut results: Vec<SyncResult> = if opts.continue_on_error {
        fan_out(items, concurrency, worker, |result| on_complete(result))?
    } else {
        let mut out = Vec::new();
        for item in items {
            let result = worker(item);
            on_complete(&result);
            let failed = !result.ok;
            out.push(result);
            if failed {
                break;
            }
        }
        out
    };

    results.sort_by(|a, b| (&a.repo_id, &a.action).cmp(&(&b.repo_id, &b.action)));
    Ok(results)
}

fn apply_plan_item(engine: &Engine, item: SyncResult) -> SyncResult {
    if item.error != "dry-run" {
        return item;
    }

    let action = item.action.to_lowercase();
    if action.contains("git clone") || action.contains("hg clone") {
        return apply_planned_clone(engine, item);
    }

    let adapter = engine.adapter();
    let path = item.path.clone();

    let mut fetched = false;
    if action.contains("git fetch --all") || action.contains("hg pull") {
        if let Err(err) = adapter.fetch(&path) {
            let class = classify_error(&err);
            return finish(item, SyncOutcome::FailedFetch, false)
                .error(canonical_fetch_error(class), class);
        }
        fetched = true;
    }

    let mut stashed = false;
    if action.contains("stash push") {
        match adapter.stash_push(&path, STASH_MESSAGE) {
            Err(err) => {
                let class = classify_error(&err);
                return finish(item, SyncOutcome::FailedStash, false)
                    .error(format!("{err:#}"), class);
            }
            Ok(created) => stashed = created,
        }
    }

    let mut rebased = false;
    if action.contains("pull --rebase") {
        if let Err(err) = adapter.pull_rebase(&path) {
            let class = classify_error(&err);
            return finish(item, SyncOutcome::FailedRebase, false)
                .error(format!("{err:#}"), class);
        }
        rebased = true;
    }

    if stashed && action.contains("stash pop") {
        if let Err(err) = adapter.stash_pop(&path) {
            let class = classify_error(&err);
            return finish(item, SyncOutcome::FailedStashPop, false)
                .error(format!("{err:#}"), class);
        }
    }

    let mut pushed = false;
    if action.contains("git push") {
        if let Err(err) = adapter.push(&path) {
            let class = classify_error(&err);
            return finish(item, SyncOutcome::FailedPush, false).error(format!("{err:#}"), class);
        }
        pushed = true;
    }

    // Outcome follows the last step that actually ran.
    let outcome = if pushed {
        SyncOutcome::Pushed
    } else if rebased {
        if stashed {
            SyncOutcome::StashedRebased
        } else {
            SyncOutcome::Rebased
        }
    } else if fetched {
        SyncOutcome::Fetched
    } else {
        item.outcome
    };
    finish(item, outcome, true)
}

fn apply_planned_clone(engine: &Engine, item: SyncResult) -> SyncResult {
    // Resolve against the live registry; the plan may be older than the
    // current registry state.
    let entry = {
        let registry = engine.lock_registry();
        registry
            .find(&item.repo_id, &item.path)
            .cloned()
    };
    let Some(entry) = entry else {
        return finish(item, SyncOutcome::FailedInvalid, false).error(
            "no registry entry for planned checkout",
            ErrorClass::Invalid,
        );
    };
    if entry.remote_url.trim().is_empty() {
        return finish(item, SyncOutcome::FailedInvalid, false)
            .error("missing remote_url for checkout", ErrorClass::Invalid);
    }

    let branch = (!entry.branch.is_empty()).then_some(entry.branch.as_str());
    let mirror = entry.kind == "mirror";
    match engine
        .adapter()
        .clone_repo(&entry.remote_url, &entry.path, branch, mirror)
    {
        Err(err) => {
            let class = classify_error(&err);
            finish(item, SyncOutcome::FailedCheckoutMissing, false)
                .error(format!("{err:#}"), class)
        }
        Ok(()) => {
            promote_entry(engine, &entry.repo_id, &entry.path);
            finish(item, SyncOutcome::CheckoutMissing, true)
        }
    }
}

/// Rewrite a plan item with its executed outcome, clearing the dry-run
/// marker but keeping the action string for display.
fn finish(mut item: SyncResult, outcome: SyncOutcome, ok: bool) -> SyncResult {
    item.outcome = outcome;
    item.ok = ok;
    item.error = String::new();
    item.error_class = ErrorClass::None;
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{MockAdapter, MockRepo};
    use crate::registry::{EntryStatus, Registry, RegistryEntry};
    use crate::vcs::DEFAULT_FETCH_ACTION;
    use chrono::Utc;
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine(adapter: Arc<MockAdapter>, entries: Vec<RegistryEntry>) -> Engine {
        let mut registry = Registry::new(Utc::now());
        registry.entries = entries;
        Engine::new(adapter, registry)
    }

    fn planned(repo_id: &str, path: &str, outcome: SyncOutcome, action: &str) -> SyncResult {
        SyncResult::new(repo_id, Path::new(path), outcome, true)
            .error("dry-run", ErrorClass::None)
            .action(action)
    }

    fn apply(engine: &Engine, items: Vec<SyncResult>) -> Vec<SyncResult> {
        engine
            .execute_sync_plan(items, &SyncOptions::default(), |_| {}, |_| {})
            .unwrap()
    }

    #[test]
    fn non_planned_items_pass_through() {
        let eng = engine(Arc::new(MockAdapter::new()), vec![]);
        let item = SyncResult::new("o/a", Path::new("/r/a"), SyncOutcome::Fetched, true);
        let results = apply(&eng, vec![item.clone()]);
        assert_eq!(results, vec![item]);
    }

    #[test]
    fn planned_fetch_runs_fetch_only() {
        let adapter = Arc::new(MockAdapter::new().with_repo("/r/a", MockRepo::default()));
        let eng = engine(adapter.clone(), vec![]);

        let results = apply(
            &eng,
            vec![planned("o/a", "/r/a", SyncOutcome::PlannedFetch, DEFAULT_FETCH_ACTION)],
        );
        assert_eq!(results[0].outcome, SyncOutcome::Fetched);
        assert!(results[0].ok);
        assert_eq!(results[0].error, "");
        assert_eq!(adapter.mutating_calls(), vec!["fetch /r/a"]);
    }

    #[test]
    fn planned_rebase_runs_fetch_then_rebase() {
        let adapter = Arc::new(MockAdapter::new().with_repo("/r/a", MockRepo::default()));
        let eng = engine(adapter.clone(), vec![]);

        let action = format!(
            "{DEFAULT_FETCH_ACTION} && git pull --rebase --no-recurse-submodules"
        );
        let results = apply(
            &eng,
            vec![planned("o/a", "/r/a", SyncOutcome::PlannedFetch, &action)],
        );
        assert_eq!(results[0].outcome, SyncOutcome::Rebased);
        assert_eq!(
            adapter.mutating_calls(),
            vec!["fetch /r/a", "pull_rebase /r/a"]
        );
        // Action survives for display.
        assert_eq!(results[0].action, action);
    }

    #[test]
    fn planned_stash_rebase_runs_full_sequence() {
        let adapter = Arc::new(MockAdapter::new().with_repo("/r/a", MockRepo::default().dirty()));
        let eng = engine(adapter.clone(), vec![]);

        let action = format!(
            "{DEFAULT_FETCH_ACTION} && git stash push -u -m \"{STASH_MESSAGE}\" && git pull --rebase --no-recurse-submodules && git stash pop"
        );
        let results = apply(
            &eng,
            vec![planned("o/a", "/r/a", SyncOutcome::PlannedFetch, &action)],
        );
        assert_eq!(results[0].outcome, SyncOutcome::StashedRebased);
        assert_eq!(
            adapter.mutating_calls(),
            vec![
                "fetch /r/a",
                "stash_push /r/a",
                "pull_rebase /r/a",
                "stash_pop /r/a"
            ]
        );
    }

    #[test]
    fn stash_pop_is_skipped_when_no_stash_was_created() {
        let mut repo = MockRepo::default();
        repo.stash_creates = false;
        let adapter = Arc::new(MockAdapter::new().with_repo("/r/a", repo));
        let eng = engine(adapter.clone(), vec![]);

        let action = format!(
            "{DEFAULT_FETCH_ACTION} && git stash push -u -m \"{STASH_MESSAGE}\" && git pull --rebase --no-recurse-submodules && git stash pop"
        );
        let results = apply(
            &eng,
            vec![planned("o/a", "/r/a", SyncOutcome::PlannedFetch, &action)],
        );
        assert_eq!(results[0].outcome, SyncOutcome::Rebased);
        assert!(
            !adapter
                .mutating_calls()
                .iter()
                .any(|c| c.starts_with("stash_pop"))
        );
    }

    #[test]
    fn planned_push_runs_fetch_then_push() {
        let adapter = Arc::new(MockAdapter::new().with_repo("/r/a", MockRepo::default()));
        let eng = engine(adapter.clone(), vec![]);

        let action = format!("{DEFAULT_FETCH_ACTION} && git push");
        let results = apply(
            &eng,
            vec![planned("o/a", "/r/a", SyncOutcome::PlannedPush, &action)],
        );
        assert_eq!(results[0].outcome, SyncOutcome::Pushed);
        assert_eq!(adapter.mutating_calls(), vec!["fetch /r/a", "push /r/a"]);
    }

    #[test]
    fn planned_clone_resolves_registry_entry() {
        let adapter = Arc::new(MockAdapter::new());
        let mut e = RegistryEntry::new("m", "/m", Utc::now());
        e.remote_url = "git@host:o/m.git".into();
        e.branch = "main".into();
        e.status = EntryStatus::Missing;
        let eng = engine(adapter.clone(), vec![e]);

        let results = apply(
            &eng,
            vec![planned(
                "m",
                "/m",
                SyncOutcome::PlannedCheckoutMissing,
                "git clone --branch main --single-branch git@host:o/m.git /m",
            )],
        );
        assert_eq!(results[0].outcome, SyncOutcome::CheckoutMissing);
        assert_eq!(adapter.calls(), vec!["clone /m"]);
        assert_eq!(eng.lock_registry().entries[0].status, EntryStatus::Present);
    }

    #[test]
    fn planned_clone_without_entry_is_invalid() {
        let eng = engine(Arc::new(MockAdapter::new()), vec![]);
        let results = apply(
            &eng,
            vec![planned(
                "ghost",
                "/g",
                SyncOutcome::PlannedCheckoutMissing,
                "git clone git@host:g.git /g",
            )],
        );
        assert_eq!(results[0].outcome, SyncOutcome::FailedInvalid);
        assert!(!results[0].ok);
    }

    #[test]
    fn fetch_failure_stops_the_sequence() {
        let adapter = Arc::new(
            MockAdapter::new()
                .with_repo("/r/a", MockRepo::default().failing("fetch", "could not resolve host")),
        );
        let eng = engine(adapter.clone(), vec![]);

        let action = format!(
            "{DEFAULT_FETCH_ACTION} && git pull --rebase --no-recurse-submodules"
        );
        let results = apply(
            &eng,
            vec![planned("o/a", "/r/a", SyncOutcome::PlannedFetch, &action)],
        );
        assert_eq!(results[0].outcome, SyncOutcome::FailedFetch);
        assert_eq!(results[0].error, "sync-fetch-network");
        // The rebase never ran.
        assert_eq!(adapter.mutating_calls(), vec!["fetch /r/a"]);
    }

    #[test]
    fn callbacks_fire_per_item() {
        let adapter = Arc::new(MockAdapter::new().with_repo("/r/a", MockRepo::default()));
        let eng = engine(adapter, vec![]);

        let started = AtomicUsize::new(0);
        let mut completed = 0usize;
        eng.execute_sync_plan(
            vec![
                planned("o/a", "/r/a", SyncOutcome::PlannedFetch, DEFAULT_FETCH_ACTION),
                SyncResult::new("o/b", Path::new("/r/b"), SyncOutcome::Skipped, true),
            ],
            &SyncOptions::default(),
            |_| {
                started.fetch_add(1, Ordering::SeqCst);
            },
            |_| {
                completed += 1;
            },
        )
        .unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(completed, 2);
    }
}
