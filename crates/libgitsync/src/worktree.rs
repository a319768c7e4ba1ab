use std::{fs, io, path::Path, sync::Arc};

use crate::{
    error::{Result, SyncError},
    exec::CommandRunner,
    git,
    output::Output,
    types::{Revision, SyncTarget, Worktree},
};

/// Materializes one isolated, fully checked-out worktree per revision.
pub struct WorktreeBuilder {
    /// What to clone and how to check it out.
    target: SyncTarget,
    /// Command channel for git and chmod.
    runner: Arc<dyn CommandRunner>,
    /// Progress reporting.
    output: Arc<dyn Output>,
}

impl WorktreeBuilder {
    /// Create a builder for `target`.
    pub fn new(target: SyncTarget, runner: Arc<dyn CommandRunner>, output: Arc<dyn Output>) -> Self {
        Self {
            target,
            runner,
            output,
        }
    }

    /// Clone the remote into the root without checking anything out.
    pub fn clone_repo(&self) -> Result<()> {
        let t = &self.target;
        git::clone(self.runner.as_ref(), &t.repo, &t.branch, t.depth, &t.root).map_err(|e| {
            SyncError::Clone {
                repo: t.repo.clone(),
                root: t.root.clone(),
                message: format!("{e:#}"),
            }
        })?;
        #[allow(clippy::let_underscore_must_use)]
        let _ = self.output.message(&format!("cloned {}", t.repo));
        Ok(())
    }

    /// Update the branch and tags in the shared repository from the remote.
    pub fn fetch(&self) -> Result<()> {
        git::fetch(self.runner.as_ref(), &self.target.root, &self.target.branch).map_err(|e| {
            SyncError::Remote {
                reference: self.target.branch.clone(),
                message: format!("{e:#}"),
            }
        })
    }

    /// Bring an existing worktree back to its own revision in place.
    ///
    /// Used when a published worktree no longer matches the revision in its
    /// name. The directory stays where it is, so readers keep a valid path.
    pub fn repair(&self, worktree: &Worktree) -> Result<()> {
        self.fetch()?;
        self.finish(worktree)?;
        #[allow(clippy::let_underscore_must_use)]
        let _ = self
            .output
            .warn(&format!("repaired worktree {}", worktree.path.display()));
        Ok(())
    }

    /// Build the worktree for `revision`.
    ///
    /// `published` is the worktree readers currently see; it is never touched.
    /// If that already is the worktree for `revision` it is returned as is.
    pub fn build(&self, revision: &Revision, published: Option<&Worktree>) -> Result<Worktree> {
        let worktree = Worktree::for_revision(&self.target.root, revision);
        if published == Some(&worktree) {
            return Ok(worktree);
        }

        let root = &self.target.root;
        let runner = self.runner.as_ref();
        let fail = |step: &'static str, e: anyhow::Error| SyncError::Build {
            path: worktree.path.clone(),
            step,
            message: format!("{e:#}"),
        };

        git::fetch(runner, root, &self.target.branch).map_err(|e| fail("fetching", e))?;

        // An interrupted run may have left the directory, or only git's record of it.
        self.discard(&worktree)
            .map_err(|e| fail("removing leftover worktree", e))?;

        let upstream = self.target.upstream();
        git::worktree_add(runner, root, &worktree.path, &upstream)
            .map_err(|e| fail("adding worktree", e))?;
        #[allow(clippy::let_underscore_must_use)]
        let _ = self.output.message(&format!(
            "added worktree {} for {upstream}",
            worktree.path.display()
        ));

        if let Err(err) = self.finish(&worktree) {
            // Leave nothing half-built behind; the cycle already failed.
            if let Err(e) = self.discard(&worktree) {
                #[allow(clippy::let_underscore_must_use)]
                let _ = self.output.warn(&format!(
                    "could not discard partial worktree {}: {e:#}",
                    worktree.path.display()
                ));
            }
            return Err(err);
        }

        Ok(worktree)
    }

    /// Steps after `git worktree add`: relative gitdir, hard reset, permissions.
    fn finish(&self, worktree: &Worktree) -> Result<()> {
        let runner = self.runner.as_ref();
        let fail = |step: &'static str, e: anyhow::Error| SyncError::Build {
            path: worktree.path.clone(),
            step,
            message: format!("{e:#}"),
        };

        git::write_relative_gitdir(&worktree.path, &worktree.name())
            .map_err(|e| fail("rewriting gitdir reference", e))?;

        git::reset_hard(runner, &worktree.path, &worktree.revision)
            .map_err(|e| fail("resetting", e))?;
        #[allow(clippy::let_underscore_must_use)]
        let _ = self.output.message(&format!(
            "reset worktree {} to {}",
            worktree.path.display(),
            worktree.revision
        ));

        if let Some(mode) = self.target.chmod {
            git::chmod_recursive(runner, &worktree.path, mode)
                .map_err(|e| fail("changing permissions", e))?;
            #[allow(clippy::let_underscore_must_use)]
            let _ = self
                .output
                .detail(&format!("applied mode {mode:o} to {}", worktree.path.display()));
        }

        Ok(())
    }

    /// Remove a worktree directory and git's record of it.
    fn discard(&self, worktree: &Worktree) -> anyhow::Result<()> {
        remove_dir_if_present(&worktree.path)?;
        git::worktree_prune(self.runner.as_ref(), &self.target.root)
    }
}

/// Recursively delete `path`, treating an already-missing directory as success.
pub fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
