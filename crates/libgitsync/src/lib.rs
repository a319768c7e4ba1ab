#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
//! Core library for keeping a directory atomically in sync with a remote Git
//! repository.
//!
//! The remote is cloned once into a root directory. Every revision that should
//! be served gets its own fully checked-out worktree under that root, and a
//! single symlink (the publication pointer) is switched between worktrees with
//! an atomic rename. Readers that follow the symlink never see a partial tree.
//!
//! All git and shell work goes through an injected [`CommandRunner`], and all
//! progress reporting through an injected [`Output`]. The CLI binary in
//! `crates/gitsync` builds on top of this library.

/// Layered settings and their validation.
mod config;
/// The poll loop around the engine.
mod driver;
/// The per-cycle state machine.
mod engine;
/// Error type shared by every stage.
mod error;
/// Process execution abstraction.
mod exec;
/// Helper routines for interacting with Git repositories.
mod git;
/// Advisory lock that keeps a second writer out of a root.
mod lock;
/// Output channel abstractions and implementations.
mod output;
/// Atomic switching of the publication pointer.
mod publish;
/// Local and remote revision resolution.
mod resolver;
/// Shared test fixtures.
#[cfg(test)]
mod testutil;
/// Plain data types.
mod types;
/// Per-revision worktree construction.
mod worktree;

/// Configuration layering and resolution.
pub use config::{Auth, DEFAULT_SSH_KEY_FILE, Settings, SyncConfig, default_dest, parse_mode};
/// Poll loop types.
pub use driver::{Decision, DriverOptions, PollDriver};
/// The sync engine and the local states it distinguishes.
pub use engine::{LocalState, SyncEngine};
/// Error and result types.
pub use error::{Result, SyncError};
/// Command execution abstraction and the process-backed implementation.
pub use exec::{CommandError, CommandRunner, SystemRunner, command_for_log};
/// The writer lock.
pub use lock::{LOCK_FILE_NAME, WriterLock};
/// Re-exports for output abstraction and concrete implementations.
pub use output::{Capture, Level, Output, OutputError, Quiet, Terminal};
/// Publication pointer management.
pub use publish::{PublishReport, Publisher};
/// Revision lookups.
pub use resolver::{Resolver, Staleness};
/// Core data types.
pub use types::{HEAD, Revision, SyncOutcome, SyncTarget, WORKTREE_PREFIX, Worktree};
/// Worktree construction.
pub use worktree::WorktreeBuilder;
