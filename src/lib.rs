//! Host-local orchestration for fleets of version-controlled working copies.
//!
//! RepoKeeper is a CLI tool (`rk`); see the README for an overview. The
//! library surface exists for the binary and for integration tooling and is
//! not stable.
//!
//! The interesting entry point is [`engine::Engine`], which owns discovery,
//! registry reconciliation, parallel inspection, and the sync plan/apply
//! pipeline. VCS access goes through the [`vcs::Adapter`] trait; `git` is
//! the primary backend with `hg` as a second one.

pub mod config;
pub mod discovery;
pub mod engine;
pub mod registry;
pub mod shell_exec;
pub mod vcs;
