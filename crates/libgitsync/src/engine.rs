use std::{path::PathBuf, sync::Arc};

use crate::{
    error::Result,
    exec::CommandRunner,
    lock::WriterLock,
    output::Output,
    publish::Publisher,
    resolver::Resolver,
    types::{HEAD, Revision, SyncOutcome, SyncTarget, Worktree},
    worktree::WorktreeBuilder,
};

/// What the engine finds on disk at the start of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalState {
    /// No repository metadata under the root.
    Uninitialized,
    /// Metadata exists but nothing is published, e.g. after an interrupted first run.
    Unpublished,
    /// The pointer references this worktree.
    Synced(Worktree),
}

/// Drives one root from whatever is on disk to the latest wanted revision.
///
/// Each [`SyncEngine::sync`] call re-detects its starting point from the
/// filesystem, so a failed call leaves nothing to reset.
pub struct SyncEngine {
    /// What to sync.
    target: SyncTarget,
    /// Progress reporting.
    output: Arc<dyn Output>,
    /// Local and remote revision lookups.
    resolver: Resolver,
    /// Worktree construction.
    builder: WorktreeBuilder,
    /// Pointer ownership.
    publisher: Publisher,
    /// Set once the published revision is known to be an immutable hash.
    pinned: bool,
}

impl SyncEngine {
    /// Create an engine for `target`. Nothing touches the disk until [`Self::sync`].
    pub fn new(target: SyncTarget, runner: Arc<dyn CommandRunner>, output: Arc<dyn Output>) -> Self {
        let resolver = Resolver::new(&target.root, runner.clone());
        let publisher = Publisher::new(&target.root, &target.dest, runner.clone(), output.clone());
        let builder = WorktreeBuilder::new(target.clone(), runner, output.clone());
        Self {
            target,
            output,
            resolver,
            builder,
            publisher,
            pinned: false,
        }
    }

    /// The target this engine syncs.
    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    /// Whether the engine has stopped talking to git for good.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Inspect the root and report where a sync would start from.
    pub fn local_state(&self) -> Result<LocalState> {
        if !self.target.git_dir().exists() {
            return Ok(LocalState::Uninitialized);
        }
        match self.publisher.current()? {
            Some(wt) if wt.path.is_dir() => Ok(LocalState::Synced(wt)),
            Some(wt) => {
                self.warn(&format!(
                    "{} points at missing {}",
                    self.target.dest,
                    wt.path.display()
                ));
                Ok(LocalState::Unpublished)
            }
            None => Ok(LocalState::Unpublished),
        }
    }

    /// Whether the revision specifier names a commit hash rather than a moving ref.
    pub fn is_immutable(&self) -> Result<bool> {
        if self.pinned {
            return Ok(true);
        }
        let dir = match self.local_state()? {
            LocalState::Uninitialized => return Ok(false),
            LocalState::Unpublished => self.target.root.clone(),
            LocalState::Synced(wt) => wt.path,
        };
        self.resolver.is_immutable(&dir, &self.target.rev)
    }

    /// Run one sync cycle.
    ///
    /// Returns [`SyncOutcome::Updated`] with the newly published revision, or
    /// [`SyncOutcome::NoUpdate`] when readers already see the wanted revision.
    pub fn sync(&mut self) -> Result<SyncOutcome> {
        if self.pinned {
            self.detail(&format!(
                "{} is an immutable revision; not checking for updates",
                self.target.rev
            ));
            return Ok(SyncOutcome::NoUpdate);
        }

        let outcome = self.sync_cycle()?;

        match self.is_immutable() {
            Ok(true) => {
                self.pinned = true;
                self.detail(&format!("pinned to {}", self.target.rev));
            }
            Ok(false) => {}
            Err(e) => self.warn(&format!(
                "could not check whether {} is immutable: {e}",
                self.target.rev
            )),
        }

        Ok(outcome)
    }

    /// One pass from the detected local state, holding the writer lock.
    fn sync_cycle(&self) -> Result<SyncOutcome> {
        match self.local_state()? {
            LocalState::Uninitialized => {
                self.builder.clone_repo()?;
                let _lock = WriterLock::acquire(&self.target.git_dir())?;
                let revision = self.resolver.resolve(&self.target.root, &self.target.rev)?;
                self.update(&revision, None)
            }
            LocalState::Unpublished => {
                let _lock = WriterLock::acquire(&self.target.git_dir())?;
                self.builder.fetch()?;
                let revision = self
                    .resolver
                    .resolve(&self.target.root, &self.initial_spec())?;
                self.update(&revision, None)
            }
            LocalState::Synced(published) => {
                let _lock = WriterLock::acquire(&self.target.git_dir())?;
                match self.local_pin(&published) {
                    Some(revision) => self.settle_pin(&revision, published),
                    None => self.refresh(published),
                }
            }
        }
    }

    /// `rev` resolved in the published worktree, when it names a commit hash.
    ///
    /// A hash never moves, so once it resolves locally the remote is not consulted.
    fn local_pin(&self, published: &Worktree) -> Option<Revision> {
        self.resolver
            .resolve(&published.path, &self.target.rev)
            .ok()
            .filter(|revision| revision.is_named_by(&self.target.rev))
    }

    /// Bring the publication to a pinned `revision` without asking the remote for it.
    fn settle_pin(&self, revision: &Revision, published: Worktree) -> Result<SyncOutcome> {
        if *revision != published.revision {
            return self.update(revision, Some(&published));
        }
        if self.is_intact(&published)? {
            self.detail(&format!("{revision} is already published"));
            return Ok(SyncOutcome::NoUpdate);
        }
        self.builder.repair(&published)?;
        Ok(SyncOutcome::Updated(published.revision))
    }

    /// Compare the published worktree against the remote and act on any difference.
    fn refresh(&self, published: Worktree) -> Result<SyncOutcome> {
        let intact = self.is_intact(&published)?;
        let staleness =
            self.resolver
                .staleness(&published.path, &self.target.rev, &self.target.tracking_ref())?;
        self.detail(&format!("local hash:  {}", staleness.local));
        self.detail(&format!("remote hash: {}", staleness.remote));

        if intact && !staleness.is_stale() {
            self.detail("no update required");
            return Ok(SyncOutcome::NoUpdate);
        }

        if staleness.remote == published.revision {
            self.builder.repair(&published)?;
            return Ok(SyncOutcome::Updated(published.revision));
        }

        self.update(&staleness.remote, Some(&published))
    }

    /// Build `revision` and publish it in place of `published`.
    fn update(&self, revision: &Revision, published: Option<&Worktree>) -> Result<SyncOutcome> {
        #[allow(clippy::let_underscore_must_use)]
        let _ = self
            .output
            .message(&format!("syncing to {} ({revision})", self.target.rev));

        let worktree = self.builder.build(revision, published)?;
        let report = self.publisher.publish(&worktree)?;

        #[allow(clippy::let_underscore_must_use)]
        let _ = self.output.success(&format!(
            "{} now at {}",
            self.publisher.link().display(),
            report.published.revision
        ));
        Ok(SyncOutcome::Updated(revision.clone()))
    }

    /// Whether the published worktree is still checked out at the revision in its name.
    fn is_intact(&self, published: &Worktree) -> Result<bool> {
        let head = self.resolver.resolve(&published.path, HEAD)?;
        if head == published.revision {
            return Ok(true);
        }
        self.warn(&format!(
            "{} is at {head}, expected {}",
            published.path.display(),
            published.revision
        ));
        Ok(false)
    }

    /// What to resolve in the root when nothing is published yet.
    ///
    /// The root's own `HEAD` only moves at clone time, so a recovery run
    /// follows the remote-tracking branch instead.
    fn initial_spec(&self) -> String {
        if self.target.tracks_head() {
            self.target.upstream()
        } else {
            self.target.rev.clone()
        }
    }

    /// Path of the publication pointer.
    pub fn link_path(&self) -> PathBuf {
        self.target.link_path()
    }

    /// Emit a warning, ignoring terminal failures.
    fn warn(&self, msg: &str) {
        #[allow(clippy::let_underscore_must_use)]
        let _ = self.output.warn(msg);
    }

    /// Emit a verbose diagnostic, ignoring terminal failures.
    fn detail(&self, msg: &str) {
        #[allow(clippy::let_underscore_must_use)]
        let _ = self.output.detail(msg);
    }
}
