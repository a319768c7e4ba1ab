use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::exec::CommandRunner;
use crate::types::Revision;

/// Run a git command with the given arguments in the specified directory.
/// Returns the combined output if successful.
fn run_git(runner: &dyn CommandRunner, dir: &Path, args: &[&str]) -> Result<String> {
    runner
        .run(Some(dir), "git", args)
        .with_context(|| format!("git {} in {}", args.join(" "), dir.display()))
}

/// Convert a path into a `&str` argument for git.
fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid path: {}", path.display()))
}

/// Clone `repo` into `root` without checking out a working tree.
pub fn clone(
    runner: &dyn CommandRunner,
    repo: &str,
    branch: &str,
    depth: u32,
    root: &Path,
) -> Result<()> {
    let depth_arg = depth.to_string();
    let mut args = vec!["clone", "--no-checkout", "-b", branch];
    if depth > 0 {
        args.push("--depth");
        args.push(&depth_arg);
    }
    args.push(repo);
    args.push(path_arg(root)?);

    runner
        .run(None, "git", &args)
        .with_context(|| format!("git {}", args.join(" ")))?;
    Ok(())
}

/// Resolve `rev` to the commit it names, as seen from `dir`.
pub fn rev_list(runner: &dyn CommandRunner, dir: &Path, rev: &str) -> Result<Revision> {
    let output = run_git(runner, dir, &["rev-list", "-n1", rev, "--"])?;
    let hash = output.lines().next().unwrap_or_default();
    Revision::parse(hash).with_context(|| format!("rev-list printed no commit for '{rev}'"))
}

/// Ask the `origin` remote which commit `reference` points to.
///
/// Returns `None` when the remote does not carry the ref.
pub fn ls_remote(
    runner: &dyn CommandRunner,
    root: &Path,
    reference: &str,
) -> Result<Option<Revision>> {
    let peeled = format!("{reference}^{{}}");
    let output = run_git(runner, root, &["ls-remote", "-q", "origin", reference, &peeled])?;
    Ok(parse_ls_remote(&output, reference))
}

/// Pick the hash for `reference` out of `git ls-remote` output.
///
/// Annotated tags are listed twice when the peeled name is queried too, once
/// as the tag object and once peeled (`<ref>^{}`); the peeled commit wins.
pub fn parse_ls_remote(output: &str, reference: &str) -> Option<Revision> {
    let peeled = format!("{reference}^{{}}");
    let mut plain = None;

    for line in output.lines() {
        let Some((hash, name)) = line.split_once('\t') else {
            continue;
        };
        let name = name.trim();
        if name == peeled {
            return Revision::parse(hash).ok();
        }
        if name == reference && plain.is_none() {
            plain = Revision::parse(hash).ok();
        }
    }

    plain
}

/// Refresh the branch and all tags from `origin`.
pub fn fetch(runner: &dyn CommandRunner, root: &Path, branch: &str) -> Result<()> {
    run_git(runner, root, &["fetch", "--tags", "--force", "origin", branch])?;
    Ok(())
}

/// Add a detached worktree at `worktree_path` starting from `start`.
pub fn worktree_add(
    runner: &dyn CommandRunner,
    root: &Path,
    worktree_path: &Path,
    start: &str,
) -> Result<()> {
    run_git(
        runner,
        root,
        &[
            "worktree",
            "add",
            "--detach",
            "--no-checkout",
            path_arg(worktree_path)?,
            start,
        ],
    )?;
    Ok(())
}

/// Drop git's bookkeeping for worktrees whose directories are gone.
pub fn worktree_prune(runner: &dyn CommandRunner, root: &Path) -> Result<()> {
    run_git(runner, root, &["worktree", "prune"])?;
    Ok(())
}

/// Force the worktree's index and files to exactly match `revision`.
pub fn reset_hard(runner: &dyn CommandRunner, worktree_path: &Path, revision: &Revision) -> Result<()> {
    run_git(runner, worktree_path, &["reset", "--hard", revision.as_str()])?;
    Ok(())
}

/// Point the worktree's `.git` file at the shared metadata using a path relative to it.
///
/// The worktree lives directly under the root, so its metadata is always
/// `../.git/worktrees/<name>`.
pub fn write_relative_gitdir(worktree_path: &Path, name: &str) -> Result<()> {
    let git_file = worktree_path.join(".git");
    fs::write(&git_file, format!("gitdir: ../.git/worktrees/{name}\n"))
        .with_context(|| format!("Failed to write {}", git_file.display()))?;
    Ok(())
}

/// Apply `mode` (octal) recursively to everything under `path`.
pub fn chmod_recursive(runner: &dyn CommandRunner, path: &Path, mode: u32) -> Result<()> {
    let mode = format!("{mode:o}");
    let args = ["-R", mode.as_str(), path_arg(path)?];
    runner
        .run(None, "chmod", &args)
        .with_context(|| format!("chmod {}", args.join(" ")))?;
    Ok(())
}
