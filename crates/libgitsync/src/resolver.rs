use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    error::{Result, SyncError},
    exec::CommandRunner,
    git,
    types::Revision,
};

/// Local and remote views of the tracked revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staleness {
    /// What the revision specifier resolves to in the published worktree.
    pub local: Revision,
    /// What the tracking ref resolves to on the remote.
    pub remote: Revision,
}

impl Staleness {
    /// Whether a new worktree must be built.
    pub fn is_stale(&self) -> bool {
        self.local != self.remote
    }
}

/// Answers "which commit does this revision name", locally and on the remote.
pub struct Resolver {
    /// Command channel for git.
    runner: Arc<dyn CommandRunner>,
    /// Root holding the shared repository metadata; remote queries run here.
    root: PathBuf,
}

impl Resolver {
    /// Create a resolver for the repository under `root`.
    pub fn new(root: &Path, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            root: root.to_path_buf(),
        }
    }

    /// Resolve `rev` to a commit as seen from the local copy at `dir`.
    pub fn resolve(&self, dir: &Path, rev: &str) -> Result<Revision> {
        git::rev_list(self.runner.as_ref(), dir, rev).map_err(|e| SyncError::Resolution {
            rev: rev.to_string(),
            dir: dir.to_path_buf(),
            message: format!("{e:#}"),
        })
    }

    /// Resolve `reference` on the `origin` remote.
    pub fn remote_head(&self, reference: &str) -> Result<Revision> {
        let found = git::ls_remote(self.runner.as_ref(), &self.root, reference).map_err(|e| {
            SyncError::Remote {
                reference: reference.to_string(),
                message: format!("{e:#}"),
            }
        })?;

        found.ok_or_else(|| SyncError::Remote {
            reference: reference.to_string(),
            message: "ref not found on remote".to_string(),
        })
    }

    /// Compare `rev` in the published worktree against `tracking_ref` on the remote.
    pub fn staleness(&self, published: &Path, rev: &str, tracking_ref: &str) -> Result<Staleness> {
        let local = self.resolve(published, rev)?;
        let remote = self.remote_head(tracking_ref)?;
        Ok(Staleness { local, remote })
    }

    /// Whether `rev` is itself a (possibly abbreviated) commit hash.
    ///
    /// True exactly when resolving `rev` in `dir` yields a hash that starts
    /// with `rev`. A user could name a tag "abc" while a hash starts with
    /// "abc"; that ambiguity is accepted.
    pub fn is_immutable(&self, dir: &Path, rev: &str) -> Result<bool> {
        let resolved = self.resolve(dir, rev)?;
        Ok(resolved.is_named_by(rev))
    }
}
