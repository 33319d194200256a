use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{TimeDelta, Utc};
use clap::Parser;

use repokeeper::config::KeeperConfig;
use repokeeper::engine::{
    Engine, ReconcileMode, RepoStatus, ScanOptions, StatusOptions, SyncOptions, SyncResult,
};
use repokeeper::registry::Registry;
use repokeeper::vcs::{Adapter, GitAdapter, HgAdapter, MultiAdapter, Tracking, TrackingState};

mod cli;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .format_timestamp(None)
    .init();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = KeeperConfig::load(cli.config.as_deref())?;
    let registry_path = cli
        .registry
        .clone()
        .unwrap_or_else(|| config.registry_path());
    let registry = Registry::load(&registry_path)?;

    let adapter = build_adapter(&config.backends)?;
    let engine = Engine::new(adapter, registry)
        .with_registry_path(&registry_path)
        .with_default_concurrency(config.concurrency);

    match cli.command {
        Commands::Scan {
            roots,
            exclude,
            follow_symlinks,
            no_write,
            json,
        } => {
            let roots = if roots.is_empty() {
                config.expanded_roots()
            } else {
                roots
            };
            let mut all_excludes = config.exclude.clone();
            all_excludes.extend(exclude);
            let rows = engine.scan(&ScanOptions {
                roots,
                exclude: all_excludes,
                follow_symlinks: follow_symlinks || config.follow_symlinks,
                write_registry: !no_write,
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                render_scan(&rows);
            }
            Ok(exit_for(rows.iter().any(|r| !r.error.is_empty())))
        }

        Commands::Status {
            filter,
            concurrency,
            timeout,
            json,
        } => {
            let report = engine.status(&StatusOptions {
                filter,
                concurrency: concurrency.unwrap_or(0),
                timeout_seconds: timeout.unwrap_or(config.timeout_seconds),
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render_status(&report.repos);
            }
            Ok(exit_for(report.repos.iter().any(|r| !r.error.is_empty())))
        }

        Commands::Sync {
            filter,
            concurrency,
            timeout,
            dry_run,
            update_local,
            push_local,
            rebase_dirty,
            force,
            checkout_missing,
            continue_on_error,
            allow_protected_rebase,
            json,
        } => {
            let results = engine.sync(&SyncOptions {
                filter,
                concurrency: concurrency.unwrap_or(0),
                timeout_seconds: timeout.unwrap_or(config.timeout_seconds),
                continue_on_error,
                dry_run,
                update_local,
                push_local,
                rebase_dirty,
                force,
                protected_branches: config.protected_branches.clone(),
                allow_protected_rebase,
                checkout_missing,
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                render_sync(&results);
            }
            Ok(exit_for(results.iter().any(|r| !r.ok)))
        }

        Commands::Apply {
            plan,
            concurrency,
            timeout,
            continue_on_error,
            json,
        } => {
            let items = read_plan(&plan)?;
            let opts = SyncOptions {
                concurrency: concurrency.unwrap_or(0),
                timeout_seconds: timeout.unwrap_or(config.timeout_seconds),
                continue_on_error,
                ..Default::default()
            };
            let results = engine.execute_sync_plan(
                items,
                &opts,
                |_| {},
                |result| {
                    if !json {
                        println!("{}", sync_line(result));
                    }
                },
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
            Ok(exit_for(results.iter().any(|r| !r.ok)))
        }

        Commands::Reconcile { mode, apply, json } => {
            if mode == ReconcileMode::None {
                bail!("pick a source of truth with --mode registry|git");
            }
            let report = engine.status(&StatusOptions::default())?;
            let plans = engine.build_remote_plans(&report.repos, mode);
            if plans.is_empty() {
                if !json {
                    println!("no remote mismatches");
                }
                return Ok(ExitCode::SUCCESS);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else {
                for plan in &plans {
                    println!("{}  {}", plan.repo_id, plan.action);
                }
            }
            if apply {
                let results = engine.apply_remote_plans(&plans, mode, Utc::now());
                for result in &results {
                    if !result.ok {
                        eprintln!("{}: {}", result.repo_id, result.error);
                    }
                }
                return Ok(exit_for(results.iter().any(|r| !r.ok)));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Prune { days } => {
            let threshold = Utc::now() - TimeDelta::days(i64::from(days));
            let removed = engine.prune_stale(threshold);
            println!("pruned {removed} stale entries");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_adapter(backends: &[String]) -> Result<Arc<dyn Adapter>> {
    let mut adapters: Vec<Arc<dyn Adapter>> = Vec::new();
    for backend in backends {
        match backend.as_str() {
            "git" => adapters.push(Arc::new(GitAdapter::new())),
            "hg" | "mercurial" => adapters.push(Arc::new(HgAdapter::new())),
            other => bail!("unknown backend {other:?} (expected git or hg)"),
        }
    }
    // A missing backend binary is fatal up front, not one error row per repo.
    for adapter in &adapters {
        repokeeper::shell_exec::Cmd::new(adapter.name())
            .arg("--version")
            .run()
            .with_context(|| format!("backend `{}` is not runnable", adapter.name()))?;
    }
    Ok(match adapters.len() {
        0 => bail!("no backends configured"),
        1 => adapters.remove(0),
        _ => Arc::new(MultiAdapter::new(adapters)),
    })
}

fn read_plan(path: &PathBuf) -> Result<Vec<SyncResult>> {
    let data = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read plan from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan {}", path.display()))?
    };
    serde_json::from_str(&data).context("invalid sync plan")
}

fn exit_for(any_failed: bool) -> ExitCode {
    if any_failed { ExitCode::from(2) } else { ExitCode::SUCCESS }
}

fn render_scan(rows: &[RepoStatus]) {
    let width = rows.iter().map(|r| r.repo_id.len()).max().unwrap_or(0);
    for row in rows {
        let note = if row.error.is_empty() { "" } else { "  !" };
        println!(
            "{:width$}  {}{}",
            row.repo_id,
            row.path.display(),
            note,
            width = width
        );
    }
    eprintln!("{} repositories", rows.len());
}

fn render_status(rows: &[RepoStatus]) {
    let width = rows.iter().map(|r| r.repo_id.len()).max().unwrap_or(0);
    for row in rows {
        let branch = if row.head.detached {
            format!("({})", row.head.branch)
        } else {
            row.head.branch.clone()
        };
        let state = if row.bare {
            "bare".to_string()
        } else {
            match &row.worktree {
                Some(w) if w.dirty => format!(
                    "dirty +{}~{}?{}",
                    w.staged, w.unstaged, w.untracked
                ),
                Some(_) => "clean".to_string(),
                None => "-".to_string(),
            }
        };
        let line = format!(
            "{:width$}  {:20}  {:14}  {}",
            row.repo_id,
            branch,
            tracking_cell(&row.tracking),
            state,
            width = width
        );
        if row.error.is_empty() {
            println!("{line}");
        } else {
            println!("{line}  [{}] {}", row.error_class, row.error);
        }
    }
}

fn tracking_cell(tracking: &Tracking) -> String {
    match tracking.status {
        TrackingState::Ahead => format!("ahead {}", tracking.ahead.unwrap_or(0)),
        TrackingState::Behind => format!("behind {}", tracking.behind.unwrap_or(0)),
        TrackingState::Diverged => format!(
            "diverged +{}/-{}",
            tracking.ahead.unwrap_or(0),
            tracking.behind.unwrap_or(0)
        ),
        TrackingState::Equal => "up to date".to_string(),
        TrackingState::Gone => "gone".to_string(),
        TrackingState::None => "-".to_string(),
    }
}

fn render_sync(results: &[SyncResult]) {
    for result in results {
        println!("{}", sync_line(result));
    }
    let failed = results.iter().filter(|r| !r.ok).count();
    eprintln!("{} synced, {} failed", results.len() - failed, failed);
}

fn sync_line(result: &SyncResult) -> String {
    let mut line = format!("{:24}  {}", result.outcome.to_string(), result.repo_id);
    if !result.action.is_empty() {
        line.push_str(&format!("  $ {}", result.action));
    }
    if !result.error.is_empty() && result.error != "dry-run" {
        line.push_str(&format!("  ({})", result.error));
    }
    line
}
