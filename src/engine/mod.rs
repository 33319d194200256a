//! The Engine — scan/status/sync orchestration.
//!
//! Public entry points mirror the CLI verbs:
//!
//! - [`Engine::scan`] — discover repositories and reconcile the registry
//! - [`Engine::status`] — fan out inspection across registered entries
//! - [`Engine::sync`] — fetch/rebase/push/clone with safety guards and
//!   dry-run planning
//! - [`Engine::execute_sync_plan`] — apply a previously produced dry-run plan
//! - [`Engine::build_remote_plans`] / [`Engine::apply_remote_plans`] —
//!   registry-vs-live remote reconciliation
//!
//! ## Concurrency model
//!
//! Fan-out runs one task per registry entry on a dedicated rayon pool whose
//! thread count is the concurrency bound; results flow back over a bounded
//! crossbeam channel (capacity `min(entries, 100)`) drained by the
//! coordinator, which owns sorting and any registry persistence. Workers
//! never touch the registry except on the missing-checkout success path,
//! which goes through the engine's mutex. Per-repo deadlines are installed
//! around each worker via [`crate::shell_exec::with_deadline`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::config::DEFAULT_CONCURRENCY;
use crate::registry::Registry;
use crate::vcs::Adapter;

mod filter;
mod inspect;
mod mismatch;
mod model;
mod plan;
mod policy;
mod scan;
mod status;
mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use filter::{filter_status, has_remote_mismatch};
pub use inspect::{inspect_repo, local_identity};
pub use mismatch::{ReconcileMode, RemotePlan, RemotePlanResult};
pub use model::{
    RepoStatus, ScanOptions, StatusFilter, StatusOptions, StatusReport, SyncOptions, SyncOutcome,
    SyncResult,
};
pub use policy::{matches_protected_branch, pull_rebase_skip_reason};

pub struct Engine {
    adapter: Arc<dyn Adapter>,
    registry: Mutex<Registry>,
    registry_path: Option<PathBuf>,
    default_concurrency: usize,
}

impl Engine {
    pub fn new(adapter: Arc<dyn Adapter>, registry: Registry) -> Self {
        Self {
            adapter,
            registry: Mutex::new(registry),
            registry_path: None,
            default_concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Persist registry changes (scan, checkout-missing) to this path.
    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    /// Pool size used when an options struct leaves `concurrency` at 0.
    pub fn with_default_concurrency(mut self, concurrency: usize) -> Self {
        if concurrency > 0 {
            self.default_concurrency = concurrency;
        }
        self
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    pub fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap()
    }

    /// Snapshot the registry so workers are decoupled from later mutation.
    pub(crate) fn registry_snapshot(&self) -> Registry {
        self.lock_registry().clone()
    }

    /// Persist the registry under the lock. Call sites that run inside
    /// workers treat failures as warnings; the sync result already carries
    /// the per-repo outcome.
    pub(crate) fn persist_registry(&self, registry: &mut Registry) {
        if let Some(path) = &self.registry_path
            && let Err(e) = registry.save(path)
        {
            log::warn!("failed to persist registry: {e:#}");
        }
    }

    /// Discover repositories under the configured roots and reconcile the
    /// registry, returning one skeleton status row per discovered repo.
    pub fn scan(&self, opts: &ScanOptions) -> Result<Vec<RepoStatus>> {
        scan::run_scan(self, opts)
    }

    /// Inspect every registered entry and return a filtered, sorted report.
    pub fn status(&self, opts: &StatusOptions) -> Result<StatusReport> {
        status::run_status(self, opts)
    }

    /// Synchronize registered entries; see [`SyncOptions`] for the knobs.
    pub fn sync(&self, opts: &SyncOptions) -> Result<Vec<SyncResult>> {
        sync::run_sync(self, opts)
    }

    /// Apply a previously produced dry-run plan.
    ///
    /// Items whose `error` is not `"dry-run"` pass through unchanged.
    /// `on_start` runs on the worker as an item begins; `on_complete` runs on
    /// the coordinator (single consumer), so it is safe for stdout writes.
    pub fn execute_sync_plan<F, G>(
        &self,
        items: Vec<SyncResult>,
        opts: &SyncOptions,
        on_start: F,
        on_complete: G,
    ) -> Result<Vec<SyncResult>>
    where
        F: Fn(&SyncResult) + Sync,
        G: FnMut(&SyncResult),
    {
        plan::run_plan(self, items, opts, &on_start, on_complete)
    }

    /// Plan registry-vs-live remote reconciliation for mismatched repos.
    pub fn build_remote_plans(&self, statuses: &[RepoStatus], mode: ReconcileMode) -> Vec<RemotePlan> {
        let registry = self.registry_snapshot();
        mismatch::build_plans(statuses, &registry, mode)
    }

    /// Apply remote reconciliation plans. `now` is injected for deterministic
    /// timestamps.
    pub fn apply_remote_plans(
        &self,
        plans: &[RemotePlan],
        mode: ReconcileMode,
        now: DateTime<Utc>,
    ) -> Vec<RemotePlanResult> {
        mismatch::apply_plans(self, plans, mode, now)
    }

    /// Drop `Missing` entries not seen since `threshold`; persists when a
    /// registry path is configured. Returns the number removed.
    pub fn prune_stale(&self, threshold: DateTime<Utc>) -> usize {
        let mut registry = self.lock_registry();
        let removed = registry.prune_stale(threshold);
        if removed > 0 {
            registry.updated_at = Utc::now();
            self.persist_registry(&mut registry);
        }
        removed
    }
}

pub(crate) fn effective_concurrency(requested: usize, default: usize) -> usize {
    if requested > 0 { requested } else { default.max(1) }
}

pub(crate) fn timeout_duration(timeout_seconds: u64) -> Option<Duration> {
    (timeout_seconds > 0).then(|| Duration::from_secs(timeout_seconds))
}

/// Fan `items` out over a bounded worker pool of size `concurrency`.
///
/// Results are delivered over a bounded channel (capacity
/// `min(items, 100)`) and drained by the calling thread, which invokes
/// `on_result` for each as it arrives. Completion order is arbitrary; the
/// caller sorts.
pub(crate) fn fan_out<T, R, F>(
    items: Vec<T>,
    concurrency: usize,
    f: F,
    mut on_result: impl FnMut(&R),
) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.max(1))
        .build()
        .context("failed to build worker pool")?;
    let capacity = items.len().min(100);
    let (tx, rx) = crossbeam_channel::bounded::<R>(capacity);

    let f = &f;
    let mut results = Vec::with_capacity(items.len());
    std::thread::scope(|scope| {
        scope.spawn(move || {
            pool.scope(|ps| {
                for item in items {
                    let tx = tx.clone();
                    ps.spawn(move |_| {
                        let _ = tx.send(f(item));
                    });
                }
            });
            // `tx` drops here; the drain below ends once all workers finish.
            drop(tx);
        });

        for result in rx.iter() {
            on_result(&result);
            results.push(result);
        }
    });

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_concurrency_falls_back_to_default() {
        assert_eq!(effective_concurrency(0, 4), 4);
        assert_eq!(effective_concurrency(2, 4), 2);
        assert_eq!(effective_concurrency(0, 0), 1);
    }

    #[test]
    fn timeout_zero_means_no_deadline() {
        assert_eq!(timeout_duration(0), None);
        assert_eq!(timeout_duration(30), Some(Duration::from_secs(30)));
    }

    #[test]
    fn fan_out_returns_one_result_per_item() {
        let items: Vec<u32> = (0..250).collect();
        let results = fan_out(items, 8, |n| n * 2, |_| {}).unwrap();
        assert_eq!(results.len(), 250);
        let sum: u32 = results.iter().sum();
        assert_eq!(sum, (0..250u32).map(|n| n * 2).sum::<u32>());
    }

    #[test]
    fn fan_out_bounds_parallelism() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let in_flight = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);

        let _ = fan_out(
            (0..20).collect::<Vec<_>>(),
            2,
            |_| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                in_flight.fetch_sub(1, Ordering::SeqCst);
            },
            |_| {},
        )
        .unwrap();

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn fan_out_empty_is_empty() {
        let results = fan_out(Vec::<u8>::new(), 4, |n| n, |_| {}).unwrap();
        assert!(results.is_empty());
    }
}
