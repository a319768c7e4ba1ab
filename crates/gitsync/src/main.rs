#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
//! Command-line interface that keeps a directory in sync with a remote Git
//! repository via the libgitsync crate.

mod credentials;

use std::{
    io::{self, IsTerminal},
    path::PathBuf,
    process::{self, Command},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{ArgAction, ArgGroup, Parser};
use libgitsync::{
    Auth, Output, PollDriver, Quiet, Settings, SyncEngine, SyncError, SystemRunner, Terminal,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("color_mode")
        .args(["color", "no_color"])
))]
/// Top-level CLI options for gitsync.
struct Cli {
    /// Git repository to clone
    #[arg(long, env = "GIT_SYNC_REPO", value_name = "URL")]
    repo: Option<String>,

    /// Branch to clone and track [default: master]
    #[arg(long, env = "GIT_SYNC_BRANCH")]
    branch: Option<String>,

    /// Revision to check out: HEAD, a tag or a commit hash [default: HEAD]
    #[arg(long, env = "GIT_SYNC_REV")]
    rev: Option<String>,

    /// Shallow clone with this many commits; 0 clones everything
    #[arg(long, env = "GIT_SYNC_DEPTH")]
    depth: Option<u32>,

    /// Root directory holding the clone and all worktrees [default: /git]
    #[arg(long, env = "GIT_SYNC_ROOT", value_name = "DIR")]
    root: Option<PathBuf>,

    /// Name of the symlink under the root [default: last segment of the repo]
    #[arg(long, env = "GIT_SYNC_DEST", value_name = "NAME")]
    dest: Option<String>,

    /// Seconds to wait between syncs
    #[arg(long, env = "GIT_SYNC_WAIT", value_name = "SECONDS")]
    wait: Option<f64>,

    /// Exit after the first successful sync (a commit hash idles instead)
    #[arg(long, env = "GIT_SYNC_ONE_TIME")]
    one_time: bool,

    /// Consecutive failures tolerated after the first sync; -1 for unlimited
    #[arg(
        long,
        env = "GIT_SYNC_MAX_SYNC_FAILURES",
        allow_negative_numbers = true,
        value_name = "N"
    )]
    max_sync_failures: Option<i64>,

    /// Octal mode applied recursively to each new worktree
    #[arg(long, env = "GIT_SYNC_PERMISSIONS", value_name = "MODE")]
    change_permissions: Option<String>,

    /// Username for HTTP(S) authentication
    #[arg(long, env = "GIT_SYNC_USERNAME")]
    username: Option<String>,

    /// Password for HTTP(S) authentication
    #[arg(long, env = "GIT_SYNC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Authenticate over SSH with a private key
    #[arg(long, env = "GIT_SYNC_SSH")]
    ssh: bool,

    /// Private key used with --ssh [default: /etc/git-secret/ssh]
    #[arg(long, env = "GIT_SSH_KEY_FILE", value_name = "FILE")]
    ssh_key_file: Option<PathBuf>,

    /// TOML file providing any of the options above
    #[arg(long, env = "GIT_SYNC_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable colored output
    #[arg(long)]
    color: bool,

    /// Disable colored output
    #[arg(long = "no-color")]
    no_color: bool,

    /// Suppress all output
    #[arg(long)]
    quiet: bool,

    /// Show every command run and the hashes compared (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Settings given on the command line or through the environment.
    fn settings(&self) -> Settings {
        Settings {
            repo: self.repo.clone(),
            branch: self.branch.clone(),
            rev: self.rev.clone(),
            depth: self.depth,
            root: self.root.clone(),
            dest: self.dest.clone(),
            wait: self.wait,
            one_time: self.one_time.then_some(true),
            max_sync_failures: self.max_sync_failures,
            change_permissions: self.change_permissions.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            ssh: self.ssh.then_some(true),
            ssh_key_file: self.ssh_key_file.clone(),
        }
    }
}

/// Fail early with a clear message when git cannot be run at all.
fn ensure_git() -> Result<()> {
    let found = Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success());
    if !found {
        return Err(SyncError::Config("git executable not found on PATH".to_string()).into());
    }
    Ok(())
}

/// Resolve configuration, prepare credentials, and run the poll loop.
fn run(cli: &Cli, output: &Arc<dyn Output>) -> Result<i32> {
    ensure_git()?;

    let mut settings = cli.settings();
    if let Some(path) = &cli.config {
        settings = settings.merge(Settings::from_toml_file(path)?);
    }
    let config = settings.resolve()?;

    let mut runner = SystemRunner::new(output.clone());
    match &config.auth {
        Auth::None => {}
        Auth::Password { username, password } => {
            credentials::store_password(&config.target.repo, username, password)
                .context("Failed to configure git credentials")?;
        }
        Auth::Ssh { key_file } => {
            runner = runner.with_env("GIT_SSH_COMMAND", credentials::ssh_command(key_file)?);
        }
    }

    #[allow(clippy::let_underscore_must_use)]
    let _ = output.detail(&format!(
        "syncing {} ({} @ {}) into {}",
        config.target.repo,
        config.target.branch,
        config.target.rev,
        config.target.link_path().display()
    ));

    let mut engine = SyncEngine::new(config.target, Arc::new(runner), output.clone());
    let mut driver = PollDriver::new(config.driver);
    let code = driver
        .run(&mut engine, output.as_ref())
        .context("Failed to install signal handlers")?;
    output.finish()?;
    Ok(code)
}

fn main() {
    let cli = Cli::parse();

    // Determine color output preference early for error handling
    let color = if cli.color {
        true
    } else if cli.no_color {
        false
    } else {
        io::stderr().is_terminal()
    };

    let output: Arc<dyn Output> = if cli.quiet {
        Arc::new(Quiet)
    } else {
        Arc::new(Terminal::new(color, cli.verbose))
    };

    match run(&cli, &output) {
        Ok(code) => process::exit(code),
        Err(e) => {
            if let Err(display_err) = output.fail(&format!("{e:#}")) {
                eprintln!("Failed to report error via output handler: {display_err:#}");
            }
            if let Err(finish_err) = output.finish() {
                eprintln!("Failed to flush output handler: {finish_err:#}");
            }
            let exit_code = e.downcast_ref::<SyncError>().map_or(1, SyncError::exit_code);
            process::exit(exit_code);
        }
    }
}
