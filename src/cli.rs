//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use repokeeper::engine::{ReconcileMode, StatusFilter};

#[derive(Debug, Parser)]
#[command(
    name = "rk",
    version,
    about = "Keep a fleet of version-controlled working copies in a known, safe state"
)]
pub struct Cli {
    /// Config file (default: ~/.config/repokeeper/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Registry file (default: from config)
    #[arg(long, global = true, value_name = "PATH")]
    pub registry: Option<PathBuf>,

    /// Enable debug logging (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Discover repositories under the configured roots and update the registry
    Scan {
        /// Scan this root instead of the configured ones (repeatable)
        #[arg(long = "root", value_name = "DIR")]
        roots: Vec<PathBuf>,

        /// Prune paths matching this glob (repeatable, adds to config)
        #[arg(long = "exclude", value_name = "GLOB")]
        exclude: Vec<String>,

        /// Follow symlinks while walking
        #[arg(long)]
        follow_symlinks: bool,

        /// Report only; leave the registry file untouched
        #[arg(long)]
        no_write: bool,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Inspect every registered repository
    Status {
        /// Only show repos matching this filter
        #[arg(long, value_enum, default_value = "all")]
        filter: StatusFilter,

        /// Worker pool size (default: from config)
        #[arg(short = 'j', long, value_name = "N")]
        concurrency: Option<usize>,

        /// Per-repo deadline in seconds (default: from config; 0 disables)
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Fetch registered repositories, optionally updating local branches
    Sync {
        /// Only sync repos matching this filter
        #[arg(long, value_enum, default_value = "all")]
        filter: StatusFilter,

        /// Worker pool size (default: from config)
        #[arg(short = 'j', long, value_name = "N")]
        concurrency: Option<usize>,

        /// Per-repo deadline in seconds (default: from config; 0 disables)
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Plan only; run no mutating VCS commands
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Rebase local branches onto their upstream after fetching
        #[arg(long)]
        update_local: bool,

        /// Push branches that are strictly ahead (implies --update-local checks)
        #[arg(long)]
        push_local: bool,

        /// Stash around the rebase when the working tree is dirty
        #[arg(long)]
        rebase_dirty: bool,

        /// Rebase even when the branch has diverged from its upstream
        #[arg(long)]
        force: bool,

        /// Clone entries whose checkout is missing from disk
        #[arg(long)]
        checkout_missing: bool,

        /// Keep going after per-repo failures (parallel mode)
        #[arg(long)]
        continue_on_error: bool,

        /// Rebase protected branches too
        #[arg(long)]
        allow_protected_rebase: bool,

        /// Emit JSON (a dry-run plan in this form feeds `rk apply`)
        #[arg(long)]
        json: bool,
    },

    /// Apply a plan produced by `rk sync --dry-run --json`
    Apply {
        /// Plan file, or `-` for stdin
        #[arg(value_name = "PLAN")]
        plan: PathBuf,

        /// Worker pool size (default: from config)
        #[arg(short = 'j', long, value_name = "N")]
        concurrency: Option<usize>,

        /// Per-repo deadline in seconds (default: from config; 0 disables)
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Keep going after per-repo failures (parallel mode)
        #[arg(long)]
        continue_on_error: bool,

        /// Emit JSON instead of progress lines
        #[arg(long)]
        json: bool,
    },

    /// Reconcile registry-vs-live remote URL mismatches
    Reconcile {
        /// Source of truth: registry adopts live remotes, git rewrites them
        #[arg(long, value_enum, default_value = "none")]
        mode: ReconcileMode,

        /// Apply the plans instead of only printing them
        #[arg(long)]
        apply: bool,

        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop registry entries that have been missing for too long
    Prune {
        /// Age threshold in days
        #[arg(long, default_value_t = 30, value_name = "DAYS")]
        days: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sync_flags() {
        let cli = Cli::parse_from([
            "rk",
            "sync",
            "--dry-run",
            "--update-local",
            "--filter",
            "diverged",
            "-j",
            "8",
        ]);
        match cli.command {
            Commands::Sync {
                dry_run,
                update_local,
                filter,
                concurrency,
                ..
            } => {
                assert!(dry_run);
                assert!(update_local);
                assert_eq!(filter, StatusFilter::Diverged);
                assert_eq!(concurrency, Some(8));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
