use std::{
    fs,
    path::{self, Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    driver::DriverOptions,
    error::{Result, SyncError},
    types::{HEAD, SyncTarget},
};

/// Branch cloned when none is configured.
pub const DEFAULT_BRANCH: &str = "master";
/// Root directory used when none is configured.
pub const DEFAULT_ROOT: &str = "/git";
/// Key used for `--ssh` when none is configured.
pub const DEFAULT_SSH_KEY_FILE: &str = "/etc/git-secret/ssh";

/// Partially specified settings from one source: flags, environment or a TOML file.
///
/// Every field is optional so sources can be layered with [`Settings::merge`]
/// before [`Settings::resolve`] applies defaults and validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Settings {
    /// Remote repository locator.
    pub repo: Option<String>,
    /// Branch to clone and track.
    pub branch: Option<String>,
    /// Revision specifier.
    pub rev: Option<String>,
    /// Shallow clone depth.
    pub depth: Option<u32>,
    /// Root directory for metadata and worktrees.
    pub root: Option<PathBuf>,
    /// Name of the publication symlink.
    pub dest: Option<String>,
    /// Seconds between cycles.
    pub wait: Option<f64>,
    /// Exit after the first successful sync.
    pub one_time: Option<bool>,
    /// Consecutive failures tolerated; -1 for unlimited.
    pub max_sync_failures: Option<i64>,
    /// Octal mode applied to new worktrees.
    pub change_permissions: Option<String>,
    /// Username for HTTP(S) credentials.
    pub username: Option<String>,
    /// Password for HTTP(S) credentials.
    pub password: Option<String>,
    /// Use SSH with a key file.
    pub ssh: Option<bool>,
    /// Key file used with `ssh`.
    pub ssh_key_file: Option<PathBuf>,
}

/// How git should authenticate against the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// Rely on whatever git is already configured with.
    None,
    /// Seed git's credential cache with a username and password.
    Password {
        /// Account name.
        username: String,
        /// Account password or token.
        password: String,
    },
    /// Use this private key for every SSH connection.
    Ssh {
        /// Path to the private key.
        key_file: PathBuf,
    },
}

/// Fully resolved configuration for one gitsync process.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// What to sync and where.
    pub target: SyncTarget,
    /// Loop pacing.
    pub driver: DriverOptions,
    /// Remote authentication.
    pub auth: Auth,
}

impl Settings {
    /// Load settings from a TOML file using the same keys as the command-line flags.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            SyncError::Config(msg) => {
                SyncError::Config(format!("Failed to parse config file {}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Fill every unset field from `fallback`.
    #[must_use]
    pub fn merge(self, fallback: Self) -> Self {
        Self {
            repo: self.repo.or(fallback.repo),
            branch: self.branch.or(fallback.branch),
            rev: self.rev.or(fallback.rev),
            depth: self.depth.or(fallback.depth),
            root: self.root.or(fallback.root),
            dest: self.dest.or(fallback.dest),
            wait: self.wait.or(fallback.wait),
            one_time: self.one_time.or(fallback.one_time),
            max_sync_failures: self.max_sync_failures.or(fallback.max_sync_failures),
            change_permissions: self.change_permissions.or(fallback.change_permissions),
            username: self.username.or(fallback.username),
            password: self.password.or(fallback.password),
            ssh: self.ssh.or(fallback.ssh),
            ssh_key_file: self.ssh_key_file.or(fallback.ssh_key_file),
        }
    }

    /// Apply defaults and validate.
    pub fn resolve(self) -> Result<SyncConfig> {
        let repo = self
            .repo
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| SyncError::Config("repo must be specified".to_string()))?;

        let dest = match self.dest {
            Some(dest) => dest,
            None => default_dest(&repo),
        };
        validate_dest(&dest)?;

        let root = self.root.unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));
        // Worktree paths are handed to git running inside the root.
        let root = path::absolute(&root).map_err(|e| {
            SyncError::Config(format!("Invalid root {}: {e}", root.display()))
        })?;

        let chmod = match self.change_permissions.as_deref() {
            Some(mode) => parse_mode(mode)?,
            None => None,
        };

        let target = SyncTarget {
            repo,
            branch: self.branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            rev: self.rev.unwrap_or_else(|| HEAD.to_string()),
            depth: self.depth.unwrap_or(0),
            root,
            dest,
            chmod,
        };

        let driver = DriverOptions {
            wait: parse_wait(self.wait.unwrap_or(0.0))?,
            one_time: self.one_time.unwrap_or(false),
            max_sync_failures: parse_budget(self.max_sync_failures.unwrap_or(0))?,
        };

        let auth = match (self.username, self.password, self.ssh.unwrap_or(false)) {
            (Some(_), Some(_), true) => {
                return Err(SyncError::Config(
                    "username/password and ssh are mutually exclusive".to_string(),
                ));
            }
            (Some(username), Some(password), false) => Auth::Password { username, password },
            (Some(_), None, _) | (None, Some(_), _) => {
                return Err(SyncError::Config(
                    "username and password must be given together".to_string(),
                ));
            }
            (None, None, true) => Auth::Ssh {
                key_file: self
                    .ssh_key_file
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SSH_KEY_FILE)),
            },
            (None, None, false) => Auth::None,
        };

        Ok(SyncConfig {
            target,
            driver,
            auth,
        })
    }
}

/// The last path segment of a repository locator, used as the default link name.
///
/// `https://host/org/app.git` gives `app.git`; trailing slashes are ignored.
pub fn default_dest(repo: &str) -> String {
    let trimmed = repo.trim_end_matches('/');
    let tail = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    tail.to_string()
}

/// Check that `dest` names a single entry directly under the root.
fn validate_dest(dest: &str) -> Result<()> {
    if dest.is_empty() {
        return Err(SyncError::Config("dest must not be empty".to_string()));
    }
    if dest.contains('/') {
        return Err(SyncError::Config(format!(
            "dest must be a single name, not a path: {dest}"
        )));
    }
    if matches!(dest, "." | ".." | ".git") {
        return Err(SyncError::Config(format!("dest cannot be {dest}")));
    }
    Ok(())
}

/// Parse an octal permission string such as `0755`. Zero disables the change.
pub fn parse_mode(mode: &str) -> Result<Option<u32>> {
    let digits = mode.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    let value = u32::from_str_radix(digits, 8)
        .map_err(|_| SyncError::Config(format!("Invalid octal permissions: {mode}")))?;
    if value > 0o7777 {
        return Err(SyncError::Config(format!("Permissions out of range: {mode}")));
    }
    Ok((value != 0).then_some(value))
}

/// Convert a wait in (fractional) seconds into a duration.
fn parse_wait(seconds: f64) -> Result<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(SyncError::Config(format!(
            "wait must be a non-negative number of seconds, got {seconds}"
        )));
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Map the failure budget; -1 means unlimited.
fn parse_budget(max: i64) -> Result<Option<u32>> {
    if max == -1 {
        return Ok(None);
    }
    u32::try_from(max).map(Some).map_err(|_| {
        SyncError::Config(format!(
            "max-sync-failures must be -1 or a non-negative count, got {max}"
        ))
    })
}
