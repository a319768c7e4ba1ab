//! Shared fixtures for unit tests: a real bare "origin" repository, a scratch
//! clone to push commits from, and a runner that records or fails commands.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::Result;
use tempfile::TempDir;

use crate::exec::{CommandError, CommandRunner, SystemRunner, command_for_log};
use crate::output::Quiet;
use crate::types::{Revision, SyncTarget};

/// A bare origin plus a working clone used to advance it.
pub struct Origin {
    /// Keeps every directory alive for the duration of the test.
    pub temp: TempDir,
    /// Path of the bare repository.
    pub bare: PathBuf,
    /// Working clone that pushes to `bare`.
    pub work: PathBuf,
}

/// Run git in `dir`, panicking with the combined output on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    SystemRunner::new(Arc::new(Quiet))
        .run(Some(dir), "git", args)
        .unwrap_or_else(|e| panic!("{e}"))
}

impl Origin {
    /// Create an origin whose `main` branch holds one commit with `README.md`.
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let bare = temp.path().join("origin.git");
        let work = temp.path().join("work");
        fs::create_dir_all(&bare)?;
        fs::create_dir_all(&work)?;

        git(&bare, &["init", "--bare", "-b", "main"]);
        git(&work, &["init", "-b", "main"]);
        git(&work, &["config", "user.email", "test@example.com"]);
        git(&work, &["config", "user.name", "Test User"]);
        git(&work, &["remote", "add", "origin", &bare.display().to_string()]);

        let origin = Self { temp, bare, work };
        origin.commit("README.md", "v1")?;
        Ok(origin)
    }

    /// Commit `content` to `file` and push it, returning the new head.
    pub fn commit(&self, file: &str, content: &str) -> Result<Revision> {
        fs::write(self.work.join(file), content)?;
        git(&self.work, &["add", file]);
        git(&self.work, &["commit", "-m", &format!("update {file}")]);
        git(&self.work, &["push", "origin", "main"]);
        self.head()
    }

    /// Create an annotated tag at the current head and push it.
    pub fn tag(&self, name: &str) {
        git(&self.work, &["tag", "-f", "-a", name, "-m", name]);
        git(&self.work, &["push", "--force", "origin", name]);
    }

    /// Current head of the working clone.
    pub fn head(&self) -> Result<Revision> {
        Ok(Revision::parse(&git(&self.work, &["rev-parse", "HEAD"]))?)
    }

    /// Root directory for a sync target inside this fixture.
    pub fn root(&self) -> PathBuf {
        self.temp.path().join("root")
    }

    /// A sync target tracking `rev` on `main`, published as `app`.
    pub fn target(&self, rev: &str) -> SyncTarget {
        SyncTarget {
            repo: self.bare.display().to_string(),
            branch: "main".to_string(),
            rev: rev.to_string(),
            depth: 0,
            root: self.root(),
            dest: "app".to_string(),
            chmod: None,
        }
    }
}

/// Runner that records every command and can be told to fail some of them.
#[derive(Default)]
pub struct Recorder {
    /// Rendered command lines in invocation order.
    calls: Mutex<Vec<String>>,
    /// Commands containing any of these substrings fail without running.
    failing: Mutex<Vec<String>>,
}

impl Recorder {
    /// Create a recorder that runs everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any later command whose rendered line contains `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.failing.lock().unwrap().push(pattern.to_string());
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Every command run so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Forget recorded calls.
    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl CommandRunner for Recorder {
    fn run(&self, cwd: Option<&Path>, program: &str, args: &[&str]) -> Result<String, CommandError> {
        let command = command_for_log(program, args);
        self.calls.lock().unwrap().push(command.clone());

        let injected = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|p| command.contains(p.as_str()));
        if injected {
            return Err(CommandError::Failed {
                command,
                status: "injected".to_string(),
                output: "injected failure".to_string(),
            });
        }

        SystemRunner::new(Arc::new(Quiet)).run(cwd, program, args)
    }
}
