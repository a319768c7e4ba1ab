//! Preparing git to authenticate against the remote before the first sync.

use std::{
    fs,
    io::Write,
    os::unix::fs::PermissionsExt,
    path::Path,
    process::{Command, Stdio},
};

use anyhow::{Context, Result, bail};
use libgitsync::SyncError;

/// The only mode accepted for an SSH private key.
const SSH_KEY_MODE: u32 = 0o400;

/// Run git with `args`, feeding `input` on stdin when given.
fn git_with_input(args: &[&str], input: Option<&str>) -> Result<()> {
    let mut child = Command::new("git")
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn git {}", args.join(" ")))?;

    if let Some(input) = input
        && let Some(mut stdin) = child.stdin.take()
    {
        stdin
            .write_all(input.as_bytes())
            .with_context(|| format!("Failed to write to git {}", args.join(" ")))?;
    }

    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Store `username`/`password` for `repo` in git's credential cache.
pub fn store_password(repo: &str, username: &str, password: &str) -> Result<()> {
    git_with_input(&["config", "--global", "credential.helper", "cache"], None)?;
    let input = format!("url={repo}\nusername={username}\npassword={password}\n");
    git_with_input(&["credential", "approve"], Some(&input))
}

/// Build the `GIT_SSH_COMMAND` value that uses `key_file`.
///
/// The key must be readable only by its owner (mode 0400), as ssh itself
/// would otherwise refuse it.
pub fn ssh_command(key_file: &Path) -> Result<String> {
    let metadata = fs::metadata(key_file).map_err(|e| {
        SyncError::Config(format!("SSH key {} is not usable: {e}", key_file.display()))
    })?;
    let mode = metadata.permissions().mode() & 0o777;
    if mode != SSH_KEY_MODE {
        return Err(SyncError::Config(format!(
            "SSH key {} must have mode {SSH_KEY_MODE:o}, found {mode:o}",
            key_file.display()
        ))
        .into());
    }
    Ok(format!(
        "ssh -q -o UserKnownHostsFile=/dev/null -o StrictHostKeyChecking=no -i {}",
        key_file.display()
    ))
}
