use std::{
    io::{self, Write},
    sync::Mutex,
};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use thiserror::Error;

/// Errors produced by [`Output`] implementations when writing to the terminal.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Underlying I/O error while writing to the terminal.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type returned by [`Output`] methods.
pub type Result<T> = std::result::Result<T, OutputError>;

/// Abstraction over how progress and diagnostic messages are produced.
///
/// The sync engine and the command runner receive an `Output` at construction
/// time; nothing in the library writes to the terminal directly.
pub trait Output: Send + Sync {
    /// Print an informational message.
    fn message(&self, msg: &str) -> Result<()>;
    /// Print a success message.
    fn success(&self, msg: &str) -> Result<()>;
    /// Print a warning message.
    fn warn(&self, msg: &str) -> Result<()>;
    /// Print an error/failure message.
    fn fail(&self, msg: &str) -> Result<()>;
    /// Print a diagnostic message that is only shown in verbose mode.
    fn detail(&self, msg: &str) -> Result<()>;
    /// Flush any buffered output.
    fn finish(&self) -> Result<()>;
}

/// Output implementation that suppresses all messages.
pub struct Quiet;

impl Output for Quiet {
    fn message(&self, _msg: &str) -> Result<()> {
        Ok(())
    }

    fn success(&self, _msg: &str) -> Result<()> {
        Ok(())
    }

    fn warn(&self, _msg: &str) -> Result<()> {
        Ok(())
    }

    fn fail(&self, _msg: &str) -> Result<()> {
        Ok(())
    }

    fn detail(&self, _msg: &str) -> Result<()> {
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Color-capable renderer writing to standard error.
pub struct Terminal {
    /// Whether ANSI colors are emitted.
    color_choice: ColorChoice,
    /// Verbosity level; `detail` is shown when non-zero.
    verbose: u8,
}

impl Terminal {
    /// Create a new terminal output.
    ///
    /// - `color`: when `true`, always render colored output; when `false`,
    ///   disable ANSI colors.
    /// - `verbose`: detail messages are printed when this is non-zero.
    pub fn new(color: bool, verbose: u8) -> Self {
        let color_choice = if color {
            ColorChoice::Always
        } else {
            ColorChoice::Never
        };
        Self {
            color_choice,
            verbose,
        }
    }

    fn write_colored(&self, msg: &str, color: Color) -> Result<()> {
        let mut stderr = StandardStream::stderr(self.color_choice);
        stderr.set_color(ColorSpec::new().set_fg(Some(color)))?;
        writeln!(stderr, "{msg}")?;
        stderr.reset()?;
        stderr.flush()?;
        Ok(())
    }
}

impl Output for Terminal {
    fn message(&self, msg: &str) -> Result<()> {
        self.write_colored(msg, Color::Cyan)
    }

    fn success(&self, msg: &str) -> Result<()> {
        self.write_colored(msg, Color::Green)
    }

    fn warn(&self, msg: &str) -> Result<()> {
        self.write_colored(msg, Color::Rgb(255, 165, 0)) // Orange
    }

    fn fail(&self, msg: &str) -> Result<()> {
        self.write_colored(msg, Color::Red)
    }

    fn detail(&self, msg: &str) -> Result<()> {
        if self.verbose == 0 {
            return Ok(());
        }
        self.write_colored(msg, Color::White)
    }

    fn finish(&self) -> Result<()> {
        io::stderr().flush()?;
        Ok(())
    }
}

/// Severity attached to a captured message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Informational message.
    Message,
    /// Success message.
    Success,
    /// Warning message.
    Warn,
    /// Failure message.
    Fail,
    /// Verbose diagnostic.
    Detail,
}

/// Output implementation that records every message in memory.
///
/// Useful for embedding the engine in another program, and for tests that
/// assert on what was reported.
#[derive(Default)]
pub struct Capture {
    /// Recorded messages in emission order.
    lines: Mutex<Vec<(Level, String)>>,
}

impl Capture {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of every recorded message.
    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Return the recorded messages at `level`.
    pub fn at(&self, level: Level) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, msg)| msg)
            .collect()
    }

    fn push(&self, level: Level, msg: &str) -> Result<()> {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, msg.to_string()));
        }
        Ok(())
    }
}

impl Output for Capture {
    fn message(&self, msg: &str) -> Result<()> {
        self.push(Level::Message, msg)
    }

    fn success(&self, msg: &str) -> Result<()> {
        self.push(Level::Success, msg)
    }

    fn warn(&self, msg: &str) -> Result<()> {
        self.push(Level::Warn, msg)
    }

    fn fail(&self, msg: &str) -> Result<()> {
        self.push(Level::Fail, msg)
    }

    fn detail(&self, msg: &str) -> Result<()> {
        self.push(Level::Detail, msg)
    }

    fn finish(&self) -> Result<()> {
        Ok(())
    }
}
