use std::{
    ffi::OsString,
    io,
    path::Path,
    process::Command,
    sync::Arc,
};

use thiserror::Error;

use crate::output::Output;

/// Failure to run an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started at all.
    #[error("Failed to execute {command}: {source}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying spawn error.
        source: io::Error,
    },

    /// The program ran and reported failure.
    #[error("Command failed: {command} ({status}): {output}")]
    Failed {
        /// Rendered command line.
        command: String,
        /// Exit status description.
        status: String,
        /// Combined stdout and stderr.
        output: String,
    },
}

/// The only channel through which the engine invokes external programs.
///
/// Implementations return the combined output of the command on success.
/// `cwd` overrides the working directory for this invocation only.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, optionally inside `cwd`.
    fn run(&self, cwd: Option<&Path>, program: &str, args: &[&str]) -> Result<String, CommandError>;
}

/// Runs commands as child processes of the current process.
pub struct SystemRunner {
    /// Receives a trace line for every command.
    output: Arc<dyn Output>,
    /// Extra environment variables applied to every child.
    env: Vec<(OsString, OsString)>,
}

impl SystemRunner {
    /// Create a runner that traces commands to `output`.
    pub fn new(output: Arc<dyn Output>) -> Self {
        Self {
            output,
            env: Vec::new(),
        }
    }

    /// Set an environment variable for every command this runner starts.
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, cwd: Option<&Path>, program: &str, args: &[&str]) -> Result<String, CommandError> {
        let command = command_for_log(program, args);
        let location = cwd.map_or_else(|| ".".to_string(), |dir| dir.display().to_string());
        #[allow(clippy::let_underscore_must_use)]
        let _ = self.output.detail(&format!("run({location}): {command}"));

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let output = cmd.output().map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(CommandError::Failed {
                command,
                status: output.status.to_string(),
                output: combined.trim().to_string(),
            });
        }

        Ok(combined)
    }
}

/// Render a command line for logs, quoting arguments that contain whitespace.
pub fn command_for_log(program: &str, args: &[&str]) -> String {
    let quote = |s: &str| {
        if s.contains([' ', '\t', '\n']) {
            format!("{s:?}")
        } else {
            s.to_string()
        }
    };
    let mut parts = vec![quote(program)];
    parts.extend(args.iter().map(|a| quote(a)));
    parts.join(" ")
}
