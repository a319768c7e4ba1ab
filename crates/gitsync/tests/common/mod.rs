use anyhow::{Context, Result, ensure};
use std::{env, fs};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Return the path to the compiled `gitsync` binary for integration-style tests.
pub fn gitsync_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gitsync"))
}

/// Run a git command inside `dir`, ensuring it succeeds.
pub fn git(dir: &Path, args: &[&str]) -> Result<Output> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .with_context(|| format!("failed to run git {}", args.join(" ")))?;

    ensure!(
        output.status.success(),
        "git command failed: git {}\nstdout: {}\nstderr: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    Ok(output)
}

/// A bare remote with a working clone that can push to it.
pub struct Remote {
    /// Owns every directory used by the test.
    pub temp: TempDir,
    /// The bare repository gitsync clones from.
    pub bare: PathBuf,
    /// Clone used to push new commits.
    pub work: PathBuf,
}

impl Remote {
    /// Create a remote whose `main` branch holds a README commit.
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let bare = temp.path().join("site.git");
        let work = temp.path().join("work");
        fs::create_dir_all(&bare)?;
        fs::create_dir_all(&work)?;

        git(&bare, &["init", "--bare", "-b", "main"])?;
        git(&work, &["init", "-b", "main"])?;
        git(&work, &["config", "user.email", "test@example.com"])?;
        git(&work, &["config", "user.name", "Test User"])?;
        git(&work, &["remote", "add", "origin", &bare.display().to_string()])?;

        let remote = Self { temp, bare, work };
        remote.commit("# Test Project")?;
        Ok(remote)
    }

    /// Replace the README with `content`, commit and push.
    pub fn commit(&self, content: &str) -> Result<String> {
        fs::write(self.work.join("README.md"), content)?;
        git(&self.work, &["add", "README.md"])?;
        git(&self.work, &["commit", "-m", "Update README"])?;
        git(&self.work, &["push", "origin", "main"])?;
        let head = git(&self.work, &["rev-parse", "HEAD"])?;
        Ok(String::from_utf8_lossy(&head.stdout).trim().to_string())
    }

    /// Root directory to sync into.
    pub fn root(&self) -> PathBuf {
        self.temp.path().join("root")
    }
}

/// Prepare a `Command` for `gitsync` that ignores any ambient configuration.
pub fn gitsync_command() -> Command {
    let mut cmd = Command::new(gitsync_binary());
    for (key, _) in env::vars() {
        if key.starts_with("GIT_SYNC_") || key == "GIT_SSH_KEY_FILE" {
            cmd.env_remove(key);
        }
    }
    cmd
}

/// Run `gitsync` with the provided arguments, returning the command output.
pub fn run_gitsync(args: &[&str]) -> Result<Output> {
    gitsync_command()
        .args(args)
        .output()
        .with_context(|| format!("failed to run gitsync {}", args.join(" ")))
}
