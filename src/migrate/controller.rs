//! Migration bisection
//!
//! Finds out which incompatible flags break a command. Trials run strictly
//! one after another because they share Bazel's server and output base:
//!
//! 1. all flags at once: success means nothing to migrate
//! 2. no flags: failure means the command is broken on its own
//! 3. each flag alone, classified as passing or failing
//!
//! `BAZELISK_SHUTDOWN` and `BAZELISK_CLEAN` run `bazel shutdown` and
//! `bazel clean --expunge` before every trial.

use crate::error::{BazeliskError, BazeliskResult};
use crate::launch::CommandRunner;
use crate::migrate::flags::FlagSet;
use std::ffi::OsString;
use std::io::Write;
use tracing::debug;

/// Insert `new_args` before the first `--`, or append them
pub fn insert_args(base_args: &[OsString], new_args: &[String]) -> Vec<OsString> {
    let split = base_args
        .iter()
        .position(|arg| arg == "--")
        .unwrap_or(base_args.len());

    let mut args = Vec::with_capacity(base_args.len() + new_args.len());
    args.extend_from_slice(&base_args[..split]);
    args.extend(new_args.iter().map(OsString::from));
    args.extend_from_slice(&base_args[split..]);
    args
}

/// One Bazel run of the bisection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTrial {
    pub args: Vec<OsString>,
    pub exit_code: i32,
}

impl MigrationTrial {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// How the bisection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The command passed with every flag enabled
    NoMigrationNeeded,

    /// The command failed even without flags
    CommandBroken,

    /// Some flags still need migration work
    MigrationNeeded,

    /// A `shutdown` or `clean` step failed
    PreparationFailed,
}

/// Result of a bisection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub outcome: MigrationOutcome,

    /// Every trial, in execution order
    pub trials: Vec<MigrationTrial>,

    /// Flags the command passes with, by name
    pub passed: Vec<String>,

    /// Flags the command fails with, by name
    pub failed: Vec<String>,

    /// Exit status for the launcher
    pub exit_code: i32,
}

impl MigrationReport {
    fn finish(outcome: MigrationOutcome, trials: Vec<MigrationTrial>, exit_code: i32) -> Self {
        Self {
            outcome,
            trials,
            passed: Vec::new(),
            failed: Vec::new(),
            exit_code,
        }
    }
}

/// Drives the three-phase bisection
pub struct MigrationController<'a> {
    runner: &'a dyn CommandRunner,
    shutdown: bool,
    clean: bool,
}

impl<'a> MigrationController<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            shutdown: false,
            clean: false,
        }
    }

    /// Run `bazel shutdown` before every trial
    pub fn with_shutdown(mut self, enabled: bool) -> Self {
        self.shutdown = enabled;
        self
    }

    /// Run `bazel clean --expunge` before every trial
    pub fn with_clean(mut self, enabled: bool) -> Self {
        self.clean = enabled;
        self
    }

    /// Bisect `flags` against `base_args`, writing progress and the final
    /// report to `out`
    pub async fn run(
        &self,
        base_args: &[OsString],
        flags: &FlagSet,
        out: &mut dyn Write,
    ) -> BazeliskResult<MigrationReport> {
        let names: Vec<String> = flags.keys().cloned().collect();
        let mut trials = Vec::new();

        // 1. All flags
        emit(out, "\n\n--- Running Bazel with all incompatible flags\n")?;
        if let Some(code) = self.prepare(out).await? {
            return Ok(MigrationReport::finish(MigrationOutcome::PreparationFailed, trials, code));
        }
        let trial = self.trial(insert_args(base_args, &names), out).await?;
        let passed = trial.passed();
        trials.push(trial);
        if passed {
            emit(out, "Success: No migration needed.")?;
            return Ok(MigrationReport::finish(MigrationOutcome::NoMigrationNeeded, trials, 0));
        }

        // 2. No flags
        emit(out, "\n\n--- Running Bazel with no incompatible flags\n")?;
        if let Some(code) = self.prepare(out).await? {
            return Ok(MigrationReport::finish(MigrationOutcome::PreparationFailed, trials, code));
        }
        let trial = self.trial(base_args.to_vec(), out).await?;
        let exit_code = trial.exit_code;
        trials.push(trial);
        if exit_code != 0 {
            emit(out, "Failure: Command failed, even without incompatible flags.")?;
            return Ok(MigrationReport::finish(MigrationOutcome::CommandBroken, trials, exit_code));
        }

        // 3. One flag at a time
        let mut passed = Vec::new();
        let mut failed = Vec::new();
        for name in &names {
            emit(out, &format!("\n\n--- Running Bazel with {}\n", name))?;
            if let Some(code) = self.prepare(out).await? {
                return Ok(MigrationReport::finish(MigrationOutcome::PreparationFailed, trials, code));
            }
            let trial = self
                .trial(insert_args(base_args, std::slice::from_ref(name)), out)
                .await?;
            if trial.passed() {
                passed.push(name.clone());
            } else {
                failed.push(name.clone());
            }
            trials.push(trial);
        }

        // 4. Report
        emit(out, "\n\n+++ Result\n")?;
        emit(out, "Command was successful with the following flags:")?;
        print_flags(out, flags, &passed)?;
        emit(out, "")?;
        emit(out, "Migration is needed for the following flags:")?;
        print_flags(out, flags, &failed)?;

        // The all-flags trial failed, so work remains even if every flag
        // passes on its own
        Ok(MigrationReport {
            outcome: MigrationOutcome::MigrationNeeded,
            trials,
            passed,
            failed,
            exit_code: 1,
        })
    }

    async fn trial(&self, args: Vec<OsString>, out: &mut dyn Write) -> BazeliskResult<MigrationTrial> {
        emit(out, &command_line(&args))?;
        let exit_code = self.runner.run(&args).await?;
        debug!("Trial {:?} exited with {}", args, exit_code);
        Ok(MigrationTrial { args, exit_code })
    }

    /// Run the optional shutdown and clean steps. Returns the exit code of
    /// the first one that fails.
    async fn prepare(&self, out: &mut dyn Write) -> BazeliskResult<Option<i32>> {
        let steps: [(bool, &[&str], &str); 2] = [
            (self.shutdown, &["shutdown"], "shutdown"),
            (self.clean, &["clean", "--expunge"], "clean"),
        ];

        for (enabled, args, name) in steps {
            if !enabled {
                continue;
            }

            let args: Vec<OsString> = args.iter().map(OsString::from).collect();
            emit(out, &command_line(&args))?;
            let exit_code = self.runner.run(&args).await?;
            emit(out, "")?;
            if exit_code != 0 {
                emit(out, &format!("Failure: {} command failed.", name))?;
                return Ok(Some(exit_code));
            }
        }

        Ok(None)
    }
}

fn print_flags(out: &mut dyn Write, flags: &FlagSet, names: &[String]) -> BazeliskResult<()> {
    for name in names {
        if let Some(flag) = flags.get(name) {
            emit(out, &format!("  {}", flag))?;
        }
    }
    Ok(())
}

fn command_line(args: &[OsString]) -> String {
    let args: Vec<_> = args.iter().map(|arg| arg.to_string_lossy()).collect();
    format!("bazel {}", args.join(" "))
}

fn emit(out: &mut dyn Write, line: &str) -> BazeliskResult<()> {
    writeln!(out, "{}", line).map_err(|e| BazeliskError::io("writing migration report", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::flags::MigrationFlag;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every invocation and fails whenever `fails` says so
    struct FakeBazel<F> {
        calls: Mutex<Vec<Vec<OsString>>>,
        fails: F,
    }

    impl<F: Fn(&[OsString]) -> i32 + Send + Sync> FakeBazel<F> {
        fn new(fails: F) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fails,
            }
        }

        fn calls(&self) -> Vec<Vec<OsString>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl<F: Fn(&[OsString]) -> i32 + Send + Sync> CommandRunner for FakeBazel<F> {
        async fn run(&self, args: &[OsString]) -> BazeliskResult<i32> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok((self.fails)(args))
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn os_args(values: &[&str]) -> Vec<OsString> {
        values.iter().map(OsString::from).collect()
    }

    fn flags(names: &[&str]) -> FlagSet {
        names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    MigrationFlag {
                        name: name.to_string(),
                        release_to_flip: "8.0".to_string(),
                        issue_url: format!("https://github.com/bazelbuild/bazel/issues/{}", name.len()),
                    },
                )
            })
            .collect()
    }

    fn has(args: &[OsString], flag: &str) -> bool {
        args.iter().any(|a| a == flag)
    }

    #[test]
    fn inserts_before_double_dash() {
        assert_eq!(
            insert_args(&os_args(&["run", "//:t", "--", "x"]), &strings(&["--a", "--b"])),
            os_args(&["run", "//:t", "--a", "--b", "--", "x"])
        );
        assert_eq!(
            insert_args(&os_args(&["build", "//:t"]), &strings(&["--a"])),
            os_args(&["build", "//:t", "--a"])
        );
    }

    #[tokio::test]
    async fn all_flags_pass_runs_once() {
        let bazel = FakeBazel::new(|_| 0);
        let mut out = Vec::new();

        let report = MigrationController::new(&bazel)
            .run(&os_args(&["build", "//:t"]), &flags(&["--B", "--A"]), &mut out)
            .await
            .unwrap();

        assert_eq!(report.outcome, MigrationOutcome::NoMigrationNeeded);
        assert_eq!(report.exit_code, 0);
        assert_eq!(bazel.calls(), vec![os_args(&["build", "//:t", "--A", "--B"])]);
        assert!(String::from_utf8(out).unwrap().contains("No migration needed"));
    }

    #[tokio::test]
    async fn broken_command_stops_after_two_trials() {
        let bazel = FakeBazel::new(|_| 7);
        let mut out = Vec::new();

        let report = MigrationController::new(&bazel)
            .run(&os_args(&["build", "//:t"]), &flags(&["--A", "--B"]), &mut out)
            .await
            .unwrap();

        assert_eq!(report.outcome, MigrationOutcome::CommandBroken);
        assert_eq!(report.exit_code, 7);
        assert_eq!(report.trials.len(), 2);
        assert_eq!(bazel.calls()[1], os_args(&["build", "//:t"]));
    }

    #[tokio::test]
    async fn each_flag_is_tried_alone() {
        let bazel = FakeBazel::new(|args| i32::from(has(args, "--A")));
        let mut out = Vec::new();

        let report = MigrationController::new(&bazel)
            .run(&os_args(&["build", "//:t"]), &flags(&["--B", "--A"]), &mut out)
            .await
            .unwrap();

        assert_eq!(report.outcome, MigrationOutcome::MigrationNeeded);
        assert_eq!(report.exit_code, 1);
        assert_eq!(report.trials.len(), 4);
        assert_eq!(report.passed, strings(&["--B"]));
        assert_eq!(report.failed, strings(&["--A"]));

        let output = String::from_utf8(out).unwrap();
        let migration = output
            .split("Migration is needed for the following flags:")
            .nth(1)
            .unwrap();
        assert!(migration.contains("--A (Bazel 8.0: "));
        assert!(!migration.contains("--B"));
    }

    #[tokio::test]
    async fn shutdown_and_clean_precede_every_trial() {
        let bazel = FakeBazel::new(|args| i32::from(has(args, "--A")));
        let mut out = Vec::new();

        MigrationController::new(&bazel)
            .with_shutdown(true)
            .with_clean(true)
            .run(&os_args(&["build"]), &flags(&["--A"]), &mut out)
            .await
            .unwrap();

        let calls = bazel.calls();
        assert_eq!(calls.len(), 9);
        for chunk in calls.chunks(3) {
            assert_eq!(chunk[0], os_args(&["shutdown"]));
            assert_eq!(chunk[1], os_args(&["clean", "--expunge"]));
        }
    }

    #[tokio::test]
    async fn failed_shutdown_stops_migration() {
        let bazel = FakeBazel::new(|args| if args[0] == "shutdown" { 37 } else { 1 });
        let mut out = Vec::new();

        let report = MigrationController::new(&bazel)
            .with_shutdown(true)
            .run(&os_args(&["build"]), &flags(&["--A"]), &mut out)
            .await
            .unwrap();

        assert_eq!(report.outcome, MigrationOutcome::PreparationFailed);
        assert_eq!(report.exit_code, 37);
        assert!(report.trials.is_empty());
        assert_eq!(bazel.calls().len(), 1);
    }
}
