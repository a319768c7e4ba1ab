use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::error::{Result, SyncError};

/// Revision specifier that tracks the head of the configured branch.
pub const HEAD: &str = "HEAD";

/// Directory-name prefix for worktrees under the root.
pub const WORKTREE_PREFIX: &str = "rev-";

/// Immutable description of what to sync and where to publish it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    /// Remote repository locator passed to `git clone`.
    pub repo: String,
    /// Branch to clone and track.
    pub branch: String,
    /// Revision specifier: `HEAD`, a tag name, or a (partial) commit hash.
    pub rev: String,
    /// Shallow clone depth; 0 clones the full history.
    pub depth: u32,
    /// Root directory holding the repository metadata and all worktrees.
    pub root: PathBuf,
    /// Name of the publication symlink under `root`.
    pub dest: String,
    /// Mode applied recursively to each new worktree, if any.
    pub chmod: Option<u32>,
}

impl SyncTarget {
    /// Path of the publication pointer.
    pub fn link_path(&self) -> PathBuf {
        self.root.join(&self.dest)
    }

    /// Path of the shared repository metadata.
    pub fn git_dir(&self) -> PathBuf {
        self.root.join(".git")
    }

    /// Whether the revision specifier follows the branch head.
    pub fn tracks_head(&self) -> bool {
        self.rev == HEAD
    }

    /// The remote ref whose value decides staleness.
    ///
    /// Branch head for `HEAD`, otherwise the tag of the same name.
    pub fn tracking_ref(&self) -> String {
        if self.tracks_head() {
            format!("refs/heads/{}", self.branch)
        } else {
            format!("refs/tags/{}", self.rev)
        }
    }

    /// The remote-tracking ref that new worktrees are created from.
    pub fn upstream(&self) -> String {
        format!("origin/{}", self.branch)
    }
}

/// A concrete commit hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    /// Wrap a hash as printed by git, trimming surrounding whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        let hash = raw.trim();
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SyncError::Config(format!("'{hash}' is not a commit hash")));
        }
        Ok(Self(hash.to_ascii_lowercase()))
    }

    /// The full hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `spec` literally names this revision (full or abbreviated hash).
    pub fn is_named_by(&self, spec: &str) -> bool {
        !spec.is_empty() && self.0.starts_with(&spec.to_ascii_lowercase())
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A checkout of one revision under the sync root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    /// Absolute path of the worktree directory.
    pub path: PathBuf,
    /// Revision encoded in the directory name.
    pub revision: Revision,
}

impl Worktree {
    /// The worktree that holds `revision` under `root`.
    pub fn for_revision(root: &Path, revision: &Revision) -> Self {
        Self {
            path: root.join(Self::dir_name_for(revision)),
            revision: revision.clone(),
        }
    }

    /// Interpret a directory name relative to `root` as a worktree, if it is one.
    pub fn from_dir_name(root: &Path, name: &str) -> Option<Self> {
        let hash = name.strip_prefix(WORKTREE_PREFIX)?;
        let revision = Revision::parse(hash).ok()?;
        Some(Self {
            path: root.join(name),
            revision,
        })
    }

    /// Directory name for `revision`.
    pub fn dir_name_for(revision: &Revision) -> String {
        format!("{WORKTREE_PREFIX}{revision}")
    }

    /// The worktree's directory name, which is also git's internal worktree id.
    pub fn name(&self) -> String {
        Self::dir_name_for(&self.revision)
    }
}

/// Result of one successful sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The published tree already matches the remote.
    NoUpdate,
    /// A new worktree for this revision was built and published.
    Updated(Revision),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(rev: &str) -> SyncTarget {
        SyncTarget {
            repo: "https://example.com/org/app.git".to_string(),
            branch: "main".to_string(),
            rev: rev.to_string(),
            depth: 0,
            root: PathBuf::from("/git"),
            dest: "app".to_string(),
            chmod: None,
        }
    }

    #[test]
    fn test_tracking_ref() {
        assert_eq!(target("HEAD").tracking_ref(), "refs/heads/main");
        assert_eq!(target("v1.2.0").tracking_ref(), "refs/tags/v1.2.0");
        assert_eq!(target("HEAD").upstream(), "origin/main");
    }

    #[test]
    fn test_target_paths() {
        let t = target("HEAD");
        assert_eq!(t.link_path(), PathBuf::from("/git/app"));
        assert_eq!(t.git_dir(), PathBuf::from("/git/.git"));
    }

    #[test]
    fn test_revision_parse() {
        let rev = Revision::parse("  ABCdef0123\n").unwrap();
        assert_eq!(rev.as_str(), "abcdef0123");
        assert!(Revision::parse("").is_err());
        assert!(Revision::parse("   ").is_err());
        assert!(Revision::parse("main").is_err());
    }

    #[test]
    fn test_revision_is_named_by() {
        let rev = Revision::parse("abcdef0123456789").unwrap();
        assert!(rev.is_named_by("abc"));
        assert!(rev.is_named_by("abcdef0123456789"));
        assert!(!rev.is_named_by("HEAD"));
        assert!(!rev.is_named_by("v1"));
        assert!(!rev.is_named_by(""));
    }

    #[test]
    fn test_worktree_names() {
        let rev = Revision::parse("0123abcd").unwrap();
        let wt = Worktree::for_revision(Path::new("/git"), &rev);
        assert_eq!(wt.path, PathBuf::from("/git/rev-0123abcd"));
        assert_eq!(wt.name(), "rev-0123abcd");

        assert_eq!(Worktree::from_dir_name(Path::new("/git"), "rev-0123abcd"), Some(wt));
        assert_eq!(Worktree::from_dir_name(Path::new("/git"), "app"), None);
        assert_eq!(Worktree::from_dir_name(Path::new("/git"), "rev-xyz"), None);
    }
}
