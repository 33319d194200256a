//! Sync orchestration: per-entry decision, dry-run planning, and apply.
//!
//! Every entry resolves to exactly one of: a silent skip (filter mismatch),
//! an immediate result (missing checkout, no upstream), or the fetch/update
//! pipeline. Failures never abort a `continue_on_error` run; without it the
//! sequence stops after the first failed result.

use anyhow::Result;
use chrono::Utc;

use crate::registry::{EntryStatus, Registry, RegistryEntry};
use crate::shell_exec;
use crate::vcs::{Adapter, ErrorClass, TrackingState, classify_error};

use super::filter::filter_status;
use super::inspect::inspect_repo;
use super::model::{RepoStatus, StatusFilter, SyncOptions, SyncOutcome, SyncResult};
use super::policy::pull_rebase_skip_reason;
use super::{Engine, effective_concurrency, fan_out, timeout_duration};

pub(crate) const STASH_MESSAGE: &str = "repokeeper: pre-rebase stash";
pub(crate) const REBASE_ACTION: &str = "git pull --rebase --no-recurse-submodules";

pub(crate) fn run_sync(engine: &Engine, opts: &SyncOptions) -> Result<Vec<SyncResult>> {
    let registry = engine.registry_snapshot();
    let entries = registry.entries.clone();

    let concurrency = effective_concurrency(opts.concurrency, engine.default_concurrency);
    let timeout = timeout_duration(opts.timeout_seconds);

    let worker = |entry: RegistryEntry| -> Option<SyncResult> {
        shell_exec::with_deadline(timeout, || sync_entry(engine, &registry, &entry, opts))
    };

    let mut results: Vec<SyncResult> = if opts.continue_on_error {
        fan_out(entries, concurrency, worker, |_| {})?
            .into_iter()
            .flatten()
            .collect()
    } else {
        let mut out = Vec::new();
        for entry in entries {
            if let Some(result) = worker(entry) {
                let failed = !result.ok;
                out.push(result);
                if failed {
                    break;
                }
            }
        }
        out
    };

    results.sort_by(|a, b| (&a.repo_id, &a.action).cmp(&(&b.repo_id, &b.action)));
    Ok(results)
}

/// Decide and execute for one entry. `None` means a silent filter skip.
fn sync_entry(
    engine: &Engine,
    registry: &Registry,
    entry: &RegistryEntry,
    opts: &SyncOptions,
) -> Option<SyncResult> {
    let adapter = engine.adapter();

    if opts.filter == StatusFilter::Missing && entry.status != EntryStatus::Missing {
        return None;
    }
    if entry.status == EntryStatus::Missing {
        return Some(handle_missing(engine, entry, opts));
    }
    if opts.filter == StatusFilter::Gone && entry.status != EntryStatus::Present {
        return None;
    }

    if matches!(
        opts.filter,
        StatusFilter::Dirty
            | StatusFilter::Clean
            | StatusFilter::Gone
            | StatusFilter::Diverged
            | StatusFilter::RemoteMismatch
    ) {
        let status = match inspect_repo(adapter, &entry.path) {
            Ok(status) => status,
            Err(err) => return Some(failed_inspect(entry, &err)),
        };
        if !filter_status(opts.filter, &status, Some(registry)) {
            return None;
        }
    }

    if entry.remote_url.trim().is_empty() {
        return Some(
            SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::SkippedNoUpstream, true)
                .error("skipped-no-upstream", ErrorClass::Skipped),
        );
    }

    Some(if opts.dry_run {
        plan_entry(adapter, entry, opts)
    } else {
        apply_entry(adapter, entry, opts)
    })
}

/// Missing-checkout handling; the result is always immediate.
fn handle_missing(engine: &Engine, entry: &RegistryEntry, opts: &SyncOptions) -> SyncResult {
    if !opts.checkout_missing {
        return SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::SkippedMissing, false)
            .error("missing", ErrorClass::Missing);
    }
    if entry.remote_url.trim().is_empty() {
        return SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::FailedInvalid, false)
            .error("missing remote_url for checkout", ErrorClass::Invalid);
    }

    let adapter = engine.adapter();
    let mirror = entry.kind == "mirror";
    let mut action = adapter.clone_action();
    if mirror {
        action.push_str(" --mirror");
    } else if !entry.branch.is_empty() {
        action.push_str(&format!(" --branch {} --single-branch", entry.branch));
    }
    action.push_str(&format!(" {} {}", entry.remote_url, entry.path.display()));

    if opts.dry_run {
        return SyncResult::new(
            &entry.repo_id,
            &entry.path,
            SyncOutcome::PlannedCheckoutMissing,
            true,
        )
        .error("dry-run", ErrorClass::None)
        .action(action);
    }

    let branch = (!entry.branch.is_empty()).then_some(entry.branch.as_str());
    match adapter.clone_repo(&entry.remote_url, &entry.path, branch, mirror) {
        Err(err) => SyncResult::new(
            &entry.repo_id,
            &entry.path,
            SyncOutcome::FailedCheckoutMissing,
            false,
        )
        .error(format!("{err:#}"), classify_error(&err))
        .action(action),
        Ok(()) => {
            promote_entry(engine, &entry.repo_id, &entry.path);
            SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::CheckoutMissing, true)
                .action(action)
        }
    }
}

/// After a successful clone the entry is live again. The registry mutex
/// serializes this against other workers.
pub(crate) fn promote_entry(engine: &Engine, repo_id: &str, path: &std::path::Path) {
    let now = Utc::now();
    let mut registry = engine.lock_registry();
    if let Some(index) = registry.find_index(repo_id, path) {
        registry.entries[index].status = EntryStatus::Present;
        registry.entries[index].last_seen = now;
    }
    registry.updated_at = now;
    engine.persist_registry(&mut registry);
}

/// Dry-run planning for a queued entry. Only inspection calls and
/// capability probes are allowed here.
fn plan_entry(adapter: &dyn Adapter, entry: &RegistryEntry, opts: &SyncOptions) -> SyncResult {
    let base = adapter.fetch_action(&entry.path);
    let mut action = base.clone();

    if opts.update_local {
        let (supported, reason) = adapter.supports_local_update(&entry.path);
        if !supported {
            return SyncResult::new(
                &entry.repo_id,
                &entry.path,
                SyncOutcome::SkippedLocalUpdate,
                true,
            )
            .error(format!("skipped-local-update: {reason}"), ErrorClass::Skipped)
            .action(base);
        }

        let status = match inspect_repo(adapter, &entry.path) {
            Ok(status) => status,
            Err(err) => return failed_inspect(entry, &err),
        };

        if opts.push_local && status.tracking.status == TrackingState::Ahead {
            action.push_str(" && git push");
            return SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::PlannedPush, true)
                .error("dry-run", ErrorClass::None)
                .action(action);
        }

        if let Some(reason) = pull_rebase_skip_reason(Some(&status), opts) {
            return SyncResult::new(
                &entry.repo_id,
                &entry.path,
                SyncOutcome::SkippedLocalUpdate,
                true,
            )
            .error(format!("skipped-local-update: {reason}"), ErrorClass::Skipped)
            .action(base);
        }

        action.push_str(&format!(" && {REBASE_ACTION}"));
    }

    SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::PlannedFetch, true)
        .error("dry-run", ErrorClass::None)
        .action(action)
}

/// Apply for a queued entry: fetch, then optionally push or rebase.
fn apply_entry(adapter: &dyn Adapter, entry: &RegistryEntry, opts: &SyncOptions) -> SyncResult {
    if opts.filter == StatusFilter::Gone {
        // Re-check right before acting; the earlier filter inspection may be
        // stale by the time this worker runs.
        let status = match inspect_repo(adapter, &entry.path) {
            Ok(status) => status,
            Err(err) => return failed_inspect(entry, &err),
        };
        if status.tracking.status != TrackingState::Gone {
            return SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::Skipped, true)
                .error("skipped", ErrorClass::Skipped);
        }
    }

    if let Err(err) = adapter.fetch(&entry.path) {
        let class = classify_error(&err);
        return SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::FailedFetch, false)
            .error(canonical_fetch_error(class), class);
    }

    if !opts.update_local {
        return SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::Fetched, true);
    }

    let (supported, reason) = adapter.supports_local_update(&entry.path);
    if !supported {
        return SyncResult::new(
            &entry.repo_id,
            &entry.path,
            SyncOutcome::SkippedLocalUpdate,
            true,
        )
        .error(format!("skipped-local-update: {reason}"), ErrorClass::Skipped);
    }

    let status = match inspect_repo(adapter, &entry.path) {
        Ok(status) => status,
        Err(err) => return failed_inspect(entry, &err),
    };

    if opts.push_local && status.tracking.status == TrackingState::Ahead {
        return match adapter.push(&entry.path) {
            Err(err) => SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::FailedPush, false)
                .error(format!("{err:#}"), classify_error(&err)),
            Ok(()) => SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::Pushed, true)
                .action("git push"),
        };
    }

    if let Some(reason) = pull_rebase_skip_reason(Some(&status), opts) {
        return SyncResult::new(
            &entry.repo_id,
            &entry.path,
            SyncOutcome::SkippedLocalUpdate,
            true,
        )
        .error(format!("skipped-local-update: {reason}"), ErrorClass::Skipped);
    }

    rebase_apply(adapter, entry, &status, opts)
}

/// Pull-with-rebase, stashing around it when allowed and needed.
fn rebase_apply(
    adapter: &dyn Adapter,
    entry: &RegistryEntry,
    status: &RepoStatus,
    opts: &SyncOptions,
) -> SyncResult {
    let mut stashed = false;
    let mut action = REBASE_ACTION.to_string();

    let dirty = status.worktree.is_some_and(|w| w.dirty);
    if opts.rebase_dirty && dirty {
        match adapter.stash_push(&entry.path, STASH_MESSAGE) {
            Err(err) => {
                return SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::FailedStash, false)
                    .error(format!("{err:#}"), classify_error(&err));
            }
            Ok(created) => {
                stashed = created;
                if stashed {
                    action = format!("git stash push -u -m \"{STASH_MESSAGE}\" && {action}");
                }
            }
        }
    }

    if let Err(err) = adapter.pull_rebase(&entry.path) {
        return SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::FailedRebase, false)
            .error(format!("{err:#}"), classify_error(&err))
            .action(action);
    }

    if stashed {
        if let Err(err) = adapter.stash_pop(&entry.path) {
            return SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::FailedStashPop, false)
                .error(format!("{err:#}"), classify_error(&err))
                .action(format!("{action} && git stash pop"));
        }
        action.push_str(" && git stash pop");
    }

    let outcome = if stashed {
        SyncOutcome::StashedRebased
    } else {
        SyncOutcome::Rebased
    };
    SyncResult::new(&entry.repo_id, &entry.path, outcome, true).action(action)
}

fn failed_inspect(entry: &RegistryEntry, err: &anyhow::Error) -> SyncResult {
    SyncResult::new(&entry.repo_id, &entry.path, SyncOutcome::FailedInspect, false)
        .error(format!("{err:#}"), classify_error(err))
}

/// Canonical, locale-independent fetch failure strings.
pub(crate) fn canonical_fetch_error(class: ErrorClass) -> &'static str {
    match class {
        ErrorClass::Auth => "sync-fetch-auth",
        ErrorClass::Network => "sync-fetch-network",
        ErrorClass::Timeout => "sync-fetch-timeout",
        ErrorClass::Corrupt => "sync-fetch-corrupt",
        ErrorClass::MissingRemote => "sync-fetch-missing-remote",
        _ => "sync-fetch-failed",
    }
}
