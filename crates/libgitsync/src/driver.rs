use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::{
    engine::SyncEngine,
    error::Result,
    output::Output,
    types::SyncOutcome,
};

/// Granularity at which sleeps notice a termination request.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// How the poll loop is paced and when it gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    /// Pause between cycles.
    pub wait: Duration,
    /// Exit after the first successful cycle, unless the revision is pinned.
    pub one_time: bool,
    /// Consecutive failures tolerated after the first success; `None` is unlimited.
    pub max_sync_failures: Option<u32>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            wait: Duration::ZERO,
            one_time: false,
            max_sync_failures: Some(0),
        }
    }
}

/// What the loop does after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Wait, then run another cycle.
    Sleep(Duration),
    /// Stop with this process exit code.
    Exit(i32),
    /// Nothing can change any more; idle until terminated.
    Park,
}

/// Repeats sync cycles, counting failures against a budget.
#[derive(Debug)]
pub struct PollDriver {
    /// Pacing and budget.
    options: DriverOptions,
    /// Failures since the last success.
    failures: u32,
    /// Whether any cycle has succeeded yet.
    synced_once: bool,
}

impl PollDriver {
    /// Create a driver that has not run any cycle.
    pub fn new(options: DriverOptions) -> Self {
        Self {
            options,
            failures: 0,
            synced_once: false,
        }
    }

    /// Failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Fold the result of one cycle into the driver state and decide what comes next.
    ///
    /// A failure before the first success always exits.
    pub fn record(&mut self, result: &Result<SyncOutcome>, pinned: bool) -> Decision {
        match result {
            Err(err) => {
                let exhausted = self
                    .options
                    .max_sync_failures
                    .is_some_and(|budget| self.failures >= budget);
                if !self.synced_once || exhausted {
                    return Decision::Exit(err.exit_code());
                }
                self.failures += 1;
                Decision::Sleep(self.options.wait)
            }
            Ok(_) => {
                let first = !self.synced_once;
                self.synced_once = true;
                self.failures = 0;
                if pinned {
                    Decision::Park
                } else if first && self.options.one_time {
                    Decision::Exit(0)
                } else {
                    Decision::Sleep(self.options.wait)
                }
            }
        }
    }

    /// Run cycles until a decision says exit, or SIGINT/SIGTERM arrives.
    ///
    /// Returns the process exit code.
    pub fn run(&mut self, engine: &mut SyncEngine, output: &dyn Output) -> io::Result<i32> {
        let shutdown = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
        Ok(self.run_until(engine, output, &shutdown))
    }

    /// [`Self::run`] with an externally owned termination flag.
    pub fn run_until(
        &mut self,
        engine: &mut SyncEngine,
        output: &dyn Output,
        shutdown: &AtomicBool,
    ) -> i32 {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return 0;
            }

            let result = engine.sync();
            if let Err(err) = &result {
                #[allow(clippy::let_underscore_must_use)]
                let _ = output.fail(&format!("{err}"));
            }

            match self.record(&result, engine.is_pinned()) {
                Decision::Exit(code) => {
                    if code != 0 && self.synced_once {
                        #[allow(clippy::let_underscore_must_use)]
                        let _ = output.fail(&format!(
                            "giving up after {} consecutive failures",
                            self.failures + 1
                        ));
                    }
                    return code;
                }
                Decision::Sleep(wait) => {
                    if self.failures > 0 {
                        #[allow(clippy::let_underscore_must_use)]
                        let _ = output.detail(&format!(
                            "{} consecutive failures, retrying in {:.1}s",
                            self.failures,
                            wait.as_secs_f64()
                        ));
                    }
                    if !sleep_unless(shutdown, Some(wait)) {
                        return 0;
                    }
                }
                Decision::Park => {
                    #[allow(clippy::let_underscore_must_use)]
                    let _ = output.message(&format!(
                        "{} is immutable; waiting for termination",
                        engine.target().rev
                    ));
                    sleep_unless(shutdown, None);
                    return 0;
                }
            }
        }
    }
}

/// Sleep for `duration` (forever if `None`) in short slices.
///
/// Returns `false` if `shutdown` was raised before the time was up.
fn sleep_unless(shutdown: &AtomicBool, duration: Option<Duration>) -> bool {
    let deadline = duration.map(|d| Instant::now() + d);
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let slice = match deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return true;
                }
                left.min(SLEEP_SLICE)
            }
            None => SLEEP_SLICE,
        };
        thread::sleep(slice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::output::{Capture, Level, Quiet};
    use crate::testutil::{Origin, Recorder};
    use crate::types::{HEAD, Revision};

    fn options(one_time: bool, max_sync_failures: Option<u32>) -> DriverOptions {
        DriverOptions {
            wait: Duration::from_secs(5),
            one_time,
            max_sync_failures,
        }
    }

    fn updated() -> Result<SyncOutcome> {
        Ok(SyncOutcome::Updated(Revision::parse("abc123").unwrap()))
    }

    fn failed() -> Result<SyncOutcome> {
        Err(SyncError::Remote {
            reference: "refs/heads/main".to_string(),
            message: "unreachable".to_string(),
        })
    }

    #[test]
    fn test_failure_before_first_success_exits() {
        let mut driver = PollDriver::new(options(false, None));
        assert_eq!(driver.record(&failed(), false), Decision::Exit(4));
    }

    #[test]
    fn test_failures_within_budget_sleep() {
        let mut driver = PollDriver::new(options(false, Some(2)));
        assert_eq!(driver.record(&updated(), false), Decision::Sleep(Duration::from_secs(5)));
        assert_eq!(driver.record(&failed(), false), Decision::Sleep(Duration::from_secs(5)));
        assert_eq!(driver.record(&failed(), false), Decision::Sleep(Duration::from_secs(5)));
        assert_eq!(driver.consecutive_failures(), 2);
        assert_eq!(driver.record(&failed(), false), Decision::Exit(4));
    }

    #[test]
    fn test_zero_budget_exits_on_first_failure() {
        let mut driver = PollDriver::new(options(false, Some(0)));
        driver.record(&updated(), false);
        assert_eq!(driver.record(&failed(), false), Decision::Exit(4));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut driver = PollDriver::new(options(false, Some(1)));
        driver.record(&updated(), false);
        driver.record(&failed(), false);
        assert_eq!(driver.consecutive_failures(), 1);
        driver.record(&Ok(SyncOutcome::NoUpdate), false);
        assert_eq!(driver.consecutive_failures(), 0);
        assert_eq!(driver.record(&failed(), false), Decision::Sleep(Duration::from_secs(5)));
    }

    #[test]
    fn test_unlimited_budget_never_exits() {
        let mut driver = PollDriver::new(options(false, None));
        driver.record(&updated(), false);
        for _ in 0..100 {
            assert!(matches!(driver.record(&failed(), false), Decision::Sleep(_)));
        }
    }

    #[test]
    fn test_one_time_exits_after_first_success() {
        let mut driver = PollDriver::new(options(true, Some(0)));
        assert_eq!(driver.record(&updated(), false), Decision::Exit(0));
    }

    #[test]
    fn test_pinned_parks_even_with_one_time() {
        let mut driver = PollDriver::new(options(true, Some(0)));
        assert_eq!(driver.record(&updated(), true), Decision::Park);
    }

    #[test]
    fn test_pinned_success_parks() {
        let mut driver = PollDriver::new(options(false, Some(0)));
        assert_eq!(driver.record(&updated(), true), Decision::Park);
    }

    #[test]
    fn test_run_one_time_publishes_and_exits() -> anyhow::Result<()> {
        let origin = Origin::new()?;
        let target = origin.target(HEAD);
        let link = target.link_path();
        let mut engine = SyncEngine::new(target, Arc::new(Recorder::new()), Arc::new(Quiet));
        let mut driver = PollDriver::new(options(true, Some(0)));

        let code = driver.run_until(&mut engine, &Quiet, &AtomicBool::new(false));
        assert_eq!(code, 0);
        assert_eq!(std::fs::read_to_string(link.join("README.md"))?, "v1");
        Ok(())
    }

    #[test]
    fn test_run_reports_initial_failure() -> anyhow::Result<()> {
        let origin = Origin::new()?;
        let mut target = origin.target(HEAD);
        target.repo = origin.temp.path().join("missing.git").display().to_string();
        let mut engine = SyncEngine::new(target, Arc::new(Recorder::new()), Arc::new(Quiet));
        let output = Capture::new();
        let mut driver = PollDriver::new(options(false, None));

        let code = driver.run_until(&mut engine, &output, &AtomicBool::new(false));
        assert_eq!(code, 3);
        assert!(!output.at(Level::Fail).is_empty());
        Ok(())
    }

    #[test]
    fn test_run_parks_until_shutdown() -> anyhow::Result<()> {
        let origin = Origin::new()?;
        let head = origin.head()?;
        let mut engine = SyncEngine::new(
            origin.target(head.as_str()),
            Arc::new(Recorder::new()),
            Arc::new(Quiet),
        );
        let mut driver = PollDriver::new(options(false, Some(0)));
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&shutdown);
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            flag.store(true, Ordering::Relaxed);
        });
        let code = driver.run_until(&mut engine, &Quiet, &shutdown);
        stopper.join().unwrap();

        assert_eq!(code, 0);
        assert!(engine.is_pinned());
        Ok(())
    }

    #[test]
    fn test_shutdown_interrupts_sleep() {
        let shutdown = AtomicBool::new(true);
        assert!(!sleep_unless(&shutdown, Some(Duration::from_secs(60))));
        let idle = AtomicBool::new(false);
        assert!(sleep_unless(&idle, Some(Duration::from_millis(10))));
    }
}
