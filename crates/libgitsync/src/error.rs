use std::{io, path::PathBuf, result::Result as StdResult};
use thiserror::Error;

/// Custom Result type for gitsync operations.
pub type Result<T> = StdResult<T, SyncError>;

/// Errors produced by a sync pass or by the glue around it.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The initial clone of the remote repository failed.
    #[error("Clone of {repo} into {root} failed: {message}")]
    Clone {
        /// Remote repository locator.
        repo: String,
        /// Directory the clone was targeting.
        root: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// A revision specifier could not be mapped to a commit in a local copy.
    #[error("Cannot resolve '{rev}' in {dir}: {message}")]
    Resolution {
        /// The revision specifier being resolved.
        rev: String,
        /// Directory the resolution ran in.
        dir: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// The remote was unreachable or does not carry the requested ref.
    #[error("Remote lookup of '{reference}' failed: {message}")]
    Remote {
        /// The ref queried on the remote.
        reference: String,
        /// Underlying failure.
        message: String,
    },

    /// Materializing a worktree failed at the named step.
    #[error("Building worktree {path} failed while {step}: {message}")]
    Build {
        /// Worktree directory being built.
        path: PathBuf,
        /// Human-readable build step.
        step: &'static str,
        /// Underlying failure.
        message: String,
    },

    /// Swapping the publication pointer failed; the previous state is untouched.
    #[error("Publishing {link} failed: {message}")]
    Publish {
        /// The publication pointer path.
        link: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// Reclaiming a retired worktree failed. The published state is still correct.
    #[error("Cleanup of {path} failed: {message}")]
    Cleanup {
        /// The retired worktree path.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// Another writer holds the lock on the shared repository metadata.
    #[error("Another gitsync instance is writing to {path}")]
    Locked {
        /// The lock file path.
        path: PathBuf,
    },

    /// The supplied configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An underlying I/O operation failed.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl SyncError {
    /// Return the recommended process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Clone { .. } => 3,
            Self::Resolution { .. } | Self::Remote { .. } => 4,
            Self::Build { .. } | Self::Publish { .. } => 5,
            Self::Locked { .. } => 6,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_stages() {
        let clone = SyncError::Clone {
            repo: "r".to_string(),
            root: PathBuf::from("/git"),
            message: "boom".to_string(),
        };
        let remote = SyncError::Remote {
            reference: "refs/heads/main".to_string(),
            message: "unreachable".to_string(),
        };
        assert_eq!(clone.exit_code(), 3);
        assert_eq!(remote.exit_code(), 4);
        assert_eq!(SyncError::Config("bad".to_string()).exit_code(), 2);
    }

    #[test]
    fn cleanup_message_names_path() {
        let cleanup = SyncError::Cleanup {
            path: PathBuf::from("/git/rev-abc"),
            message: "busy".to_string(),
        };
        assert!(
            cleanup
                .to_string()
                .contains("Cleanup of /git/rev-abc failed")
        );
    }
}
