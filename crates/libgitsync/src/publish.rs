use std::{
    fs, io,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
    process,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    error::{Result, SyncError},
    exec::CommandRunner,
    git,
    output::Output,
    types::Worktree,
    worktree::remove_dir_if_present,
};

/// Prefix for the temporary links created during a swap.
const TEMP_LINK_PREFIX: &str = ".gitsync-link-";

/// Suffix source for temporary link names, unique within this process.
static TEMP_LINK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// What a successful publish did.
#[derive(Debug)]
pub struct PublishReport {
    /// The worktree readers now see.
    pub published: Worktree,
    /// The worktree readers saw before, if any.
    pub previous: Option<Worktree>,
    /// Set when retiring `previous` failed. The swap itself succeeded.
    pub cleanup_error: Option<SyncError>,
}

/// Owns the publication symlink and the retirement of old worktrees.
pub struct Publisher {
    /// Root under which both the link and the worktrees live.
    root: PathBuf,
    /// Absolute path of the publication symlink.
    link: PathBuf,
    /// Command channel for `git worktree prune`.
    runner: Arc<dyn CommandRunner>,
    /// Progress reporting.
    output: Arc<dyn Output>,
}

impl Publisher {
    /// Create a publisher for the link `dest` under `root`.
    pub fn new(root: &Path, dest: &str, runner: Arc<dyn CommandRunner>, output: Arc<dyn Output>) -> Self {
        Self {
            root: root.to_path_buf(),
            link: root.join(dest),
            runner,
            output,
        }
    }

    /// Path of the publication symlink.
    pub fn link(&self) -> &Path {
        &self.link
    }

    /// The worktree the link currently references, if any.
    ///
    /// A missing link is a valid state. A link whose target is not one of our
    /// worktrees is reported as `None`; it will be replaced but never deleted.
    pub fn current(&self) -> Result<Option<Worktree>> {
        let target = match fs::read_link(&self.link) {
            Ok(target) => target,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SyncError::Publish {
                    link: self.link.clone(),
                    message: format!("error accessing symlink: {e}"),
                });
            }
        };

        let worktree = target
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| Worktree::from_dir_name(&self.root, name));
        if worktree.is_none() {
            #[allow(clippy::let_underscore_must_use)]
            let _ = self.output.warn(&format!(
                "{} points at {}, which is not a managed worktree",
                self.link.display(),
                target.display()
            ));
        }
        Ok(worktree)
    }

    /// Atomically point the link at `worktree`, then retire the previous one.
    pub fn publish(&self, worktree: &Worktree) -> Result<PublishReport> {
        let previous = self.current()?;

        self.swap(worktree)?;
        #[allow(clippy::let_underscore_must_use)]
        let _ = self.output.detail(&format!(
            "{} -> {}",
            self.link.display(),
            worktree.name()
        ));

        let cleanup_error = match &previous {
            Some(old) if old != worktree => self.retire(old).err(),
            _ => None,
        };
        if let Some(err) = &cleanup_error {
            #[allow(clippy::let_underscore_must_use)]
            let _ = self.output.warn(&format!("{err}"));
        }

        Ok(PublishReport {
            published: worktree.clone(),
            previous,
            cleanup_error,
        })
    }

    /// A fresh temporary link path in root, never handed out twice.
    fn temp_link_path(&self) -> PathBuf {
        let n = TEMP_LINK_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!("{TEMP_LINK_PREFIX}{}-{n}", process::id()))
    }

    /// Create a uniquely named temporary link and rename it over the real one.
    fn swap(&self, worktree: &Worktree) -> Result<()> {
        let publish_err = |message: String| SyncError::Publish {
            link: self.link.clone(),
            message,
        };

        // Readers may mount the root elsewhere, so the link must be relative.
        let relative = worktree.path.strip_prefix(&self.root).map_err(|_| {
            publish_err(format!(
                "{} is not under {}",
                worktree.path.display(),
                self.root.display()
            ))
        })?;

        let temp_link = self.temp_link_path();

        symlink(relative, &temp_link)
            .map_err(|e| publish_err(format!("error creating symlink: {e}")))?;

        if let Err(e) = fs::rename(&temp_link, &self.link) {
            #[allow(clippy::let_underscore_must_use)]
            let _ = fs::remove_file(&temp_link);
            return Err(publish_err(format!("error replacing symlink: {e}")));
        }

        Ok(())
    }

    /// Delete a worktree that is no longer referenced and prune git's record of it.
    fn retire(&self, old: &Worktree) -> Result<()> {
        let cleanup_err = |message: String| SyncError::Cleanup {
            path: old.path.clone(),
            message,
        };

        remove_dir_if_present(&old.path)
            .map_err(|e| cleanup_err(format!("error removing directory: {e}")))?;
        #[allow(clippy::let_underscore_must_use)]
        let _ = self.output.detail(&format!("removed {}", old.path.display()));

        git::worktree_prune(self.runner.as_ref(), &self.root)
            .map_err(|e| cleanup_err(format!("{e:#}")))?;
        #[allow(clippy::let_underscore_must_use)]
        let _ = self.output.detail("pruned old worktrees");
        Ok(())
    }
}
