//! Registry-vs-live remote reconciliation.
//!
//! When the registry's recorded remote and the repository's live remote
//! disagree, one of them is wrong. The operator picks the source of truth
//! (`registry` adopts the live remote; `git` rewrites the repo's remote from
//! the registry) and gets an explicit plan before anything is mutated.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::Registry;
use crate::vcs::url::normalize_url;

use super::model::RepoStatus;
use super::Engine;

/// Which side wins a remote mismatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReconcileMode {
    /// Plan only; apply nothing.
    #[default]
    None,
    /// Registry adopts the repository's live remote URL.
    Registry,
    /// The repository's remote is rewritten from the registry.
    Git,
}

/// One planned reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemotePlan {
    pub repo_id: String,
    pub path: std::path::PathBuf,
    /// Index into the registry's entries at planning time.
    pub entry_index: usize,
    /// Remote name to rewrite in `git` mode.
    pub remote_name: String,
    pub registry_url: String,
    pub live_url: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemotePlanResult {
    pub repo_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Build one plan per mismatched repository.
pub(crate) fn build_plans(
    statuses: &[RepoStatus],
    registry: &Registry,
    mode: ReconcileMode,
) -> Vec<RemotePlan> {
    if mode == ReconcileMode::None {
        return Vec::new();
    }

    let mut plans = Vec::new();
    for status in statuses {
        let Some(entry_index) = registry.find_index(&status.repo_id, &status.path) else {
            continue;
        };
        let entry = &registry.entries[entry_index];

        let registered = normalize_url(entry.remote_url.trim());
        let live = status.repo_id.trim();
        if registered.is_empty() || live.is_empty() || registered == live {
            continue;
        }

        let live_url = status
            .remotes
            .iter()
            .find(|r| r.name == status.primary_remote)
            .map(|r| r.url.clone())
            .unwrap_or_default();

        let action = match mode {
            ReconcileMode::Registry => {
                if live_url.is_empty() {
                    continue;
                }
                format!("set registry remote_url to {live_url}")
            }
            ReconcileMode::Git => {
                if status.primary_remote.is_empty() {
                    continue;
                }
                format!(
                    "set git remote {} URL to {}",
                    status.primary_remote, entry.remote_url
                )
            }
            ReconcileMode::None => unreachable!(),
        };

        plans.push(RemotePlan {
            repo_id: status.repo_id.clone(),
            path: status.path.clone(),
            entry_index,
            remote_name: status.primary_remote.clone(),
            registry_url: entry.remote_url.clone(),
            live_url,
            action,
        });
    }
    plans
}

/// Apply plans; registry mutations share the injected `now` so a batch gets
/// one consistent timestamp.
pub(crate) fn apply_plans(
    engine: &Engine,
    plans: &[RemotePlan],
    mode: ReconcileMode,
    now: DateTime<Utc>,
) -> Vec<RemotePlanResult> {
    let mut results = Vec::with_capacity(plans.len());
    for plan in plans {
        let outcome = apply_plan(engine, plan, mode, now);
        results.push(RemotePlanResult {
            repo_id: plan.repo_id.clone(),
            ok: outcome.is_ok(),
            error: outcome.err().map(|e| format!("{e:#}")).unwrap_or_default(),
        });
    }

    if mode == ReconcileMode::Registry && results.iter().any(|r| r.ok) {
        let mut registry = engine.lock_registry();
        registry.updated_at = now;
        engine.persist_registry(&mut registry);
    }
    results
}

fn apply_plan(
    engine: &Engine,
    plan: &RemotePlan,
    mode: ReconcileMode,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    match mode {
        ReconcileMode::None => Ok(()),
        ReconcileMode::Registry => {
            let mut registry = engine.lock_registry();
            // The registry may have shifted since planning.
            let index = match registry.entries.get(plan.entry_index) {
                Some(entry) if entry.repo_id == plan.repo_id => plan.entry_index,
                _ => registry
                    .find_index(&plan.repo_id, &plan.path)
                    .ok_or_else(|| anyhow::anyhow!("registry entry vanished: {}", plan.repo_id))?,
            };
            registry.entries[index].remote_url = plan.live_url.clone();
            registry.entries[index].last_seen = now;
            Ok(())
        }
        ReconcileMode::Git => {
            engine
                .adapter()
                .set_remote_url(&plan.path, &plan.remote_name, &plan.registry_url)
        }
    }
}
