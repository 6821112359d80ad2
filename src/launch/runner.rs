//! Child process execution with signal relay
//!
//! The child inherits stdio. While waiting for it, SIGINT and SIGTERM sent
//! to the launcher are forwarded to the child, so Ctrl-C reaches Bazel
//! instead of killing the launcher first. Waiting is the only authority on
//! liveness: once `wait` returns, the relay loop is gone and later signals
//! go nowhere.

use crate::error::{BazeliskError, BazeliskResult};
use crate::launch::plan::LaunchPlan;
use async_trait::async_trait;
use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Exit code reported when the child did not exit normally
pub const ABNORMAL_EXIT_CODE: i32 = 1;

/// Something that runs Bazel with a given argument list
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and return the exit code.
    ///
    /// `Err` means the program could not be started at all; every failure
    /// after the start is reported through the exit code.
    async fn run(&self, args: &[OsString]) -> BazeliskResult<i32>;
}

/// Runs the program of a launch plan
pub struct ProcessRunner {
    plan: LaunchPlan,
}

impl ProcessRunner {
    pub fn new(plan: LaunchPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &LaunchPlan {
        &self.plan
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, args: &[OsString]) -> BazeliskResult<i32> {
        debug!("Running {} {:?}", self.plan.program.display(), args);

        let mut cmd = Command::new(&self.plan.program);
        cmd.args(args)
            .envs(&self.plan.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Listen before spawning so an early Ctrl-C cannot kill the launcher
        // while the child is already running
        let mut relay = SignalRelay::install();

        let mut child = cmd.spawn().map_err(|e| BazeliskError::Launch {
            program: self.plan.program.clone(),
            source: e,
        })?;

        match relay.wait(&mut child).await {
            Ok(status) => Ok(exit_code(status)),
            Err(e) => {
                warn!("Could not wait for {}: {}", self.plan.program.display(), e);
                Ok(ABNORMAL_EXIT_CODE)
            }
        }
    }
}

/// Forwards SIGINT and SIGTERM to the child while it runs
#[cfg(unix)]
struct SignalRelay {
    interrupt: Option<tokio::signal::unix::Signal>,
    terminate: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl SignalRelay {
    fn install() -> Self {
        use tokio::signal::unix::SignalKind;

        Self {
            interrupt: listen(SignalKind::interrupt()),
            terminate: listen(SignalKind::terminate()),
        }
    }

    async fn wait(&mut self, child: &mut Child) -> std::io::Result<ExitStatus> {
        loop {
            tokio::select! {
                status = child.wait() => return status,
                Some(()) = next_signal(&mut self.interrupt) => forward(child, libc::SIGINT),
                Some(()) = next_signal(&mut self.terminate) => forward(child, libc::SIGTERM),
            }
        }
    }
}

/// A relay without a handler still runs the child, it just cannot forward
#[cfg(unix)]
fn listen(kind: tokio::signal::unix::SignalKind) -> Option<tokio::signal::unix::Signal> {
    tokio::signal::unix::signal(kind)
        .map_err(|e| warn!("Could not install signal handler: {}", e))
        .ok()
}

#[cfg(unix)]
async fn next_signal(signal: &mut Option<tokio::signal::unix::Signal>) -> Option<()> {
    match signal {
        Some(signal) => signal.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
fn forward(child: &Child, signal: libc::c_int) {
    // `id` is None once the child has been reaped
    let Some(pid) = child.id() else {
        return;
    };

    debug!("Forwarding signal {} to {}", signal, pid);
    // SAFETY: kill has no memory-safety preconditions
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result != 0 {
        debug!(
            "Could not signal {}: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

/// Terminates the child on Ctrl-C where signals cannot be forwarded
#[cfg(not(unix))]
struct SignalRelay;

#[cfg(not(unix))]
impl SignalRelay {
    fn install() -> Self {
        Self
    }

    async fn wait(&mut self, child: &mut Child) -> std::io::Result<ExitStatus> {
        loop {
            tokio::select! {
                status = child.wait() => return status,
                Ok(()) = tokio::signal::ctrl_c() => {
                    debug!("Interrupted, terminating Bazel");
                    let _ = child.start_kill();
                }
            }
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            debug!("Bazel was terminated by signal {}", signal);
        }
    }

    ABNORMAL_EXIT_CODE
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::BTreeMap;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("bazel");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn runner(program: PathBuf) -> ProcessRunner {
        ProcessRunner::new(LaunchPlan {
            real_binary: program.clone(),
            program,
            env: BTreeMap::new(),
        })
    }

    #[tokio::test]
    #[serial]
    async fn propagates_exit_code() {
        let temp = TempDir::new().unwrap();
        let runner = runner(script(temp.path(), "exit 3"));

        assert_eq!(runner.run(&[]).await.unwrap(), 3);
    }

    #[tokio::test]
    #[serial]
    async fn passes_args_and_env() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let program = script(
            temp.path(),
            &format!("echo \"$1 $GREETING\" > {}", out.display()),
        );

        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), OsString::from("hello"));
        let runner = ProcessRunner::new(LaunchPlan {
            real_binary: program.clone(),
            program,
            env,
        });

        assert_eq!(runner.run(&[OsString::from("build")]).await.unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "build hello\n");
    }

    #[tokio::test]
    #[serial]
    async fn missing_program_is_launch_error() {
        let runner = runner(PathBuf::from("/nonexistent/bazel"));

        let err = runner.run(&[]).await.unwrap_err();
        assert!(matches!(err, BazeliskError::Launch { .. }));
    }

    /// Start `runner`, send `signal` to this process once the child is up,
    /// and return the child's exit code
    async fn run_and_signal(runner: ProcessRunner, signal: libc::c_int) -> i32 {
        let run = tokio::spawn(async move { runner.run(&[]).await });
        tokio::time::sleep(Duration::from_millis(500)).await;
        unsafe {
            libc::kill(libc::getpid(), signal);
        }

        tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn forwards_interrupt_to_child() {
        let temp = TempDir::new().unwrap();
        let program = script(
            temp.path(),
            "trap 'exit 42' INT\nwhile true; do sleep 0.1; done",
        );

        assert_eq!(run_and_signal(runner(program), libc::SIGINT).await, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn forwards_terminate_to_child() {
        let temp = TempDir::new().unwrap();
        let program = script(
            temp.path(),
            "trap 'exit 43' TERM\nwhile true; do sleep 0.1; done",
        );

        assert_eq!(run_and_signal(runner(program), libc::SIGTERM).await, 43);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[serial]
    async fn signal_after_exit_reaches_nobody() {
        let temp = TempDir::new().unwrap();
        let first = runner(script(temp.path(), "exit 0"));
        assert_eq!(first.run(&[]).await.unwrap(), 0);

        // The child is gone: the launcher survives and nothing is forwarded
        unsafe {
            libc::kill(libc::getpid(), libc::SIGINT);
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        let later = TempDir::new().unwrap();
        let second = runner(script(
            later.path(),
            "trap 'exit 42' INT\nsleep 1\nexit 5",
        ));
        assert_eq!(second.run(&[]).await.unwrap(), 5);
    }

    #[tokio::test]
    #[serial]
    async fn passes_non_utf8_arguments() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let program = script(temp.path(), &format!("printf '%s' \"$1\" > {}", out.display()));
        let arg = OsStr::from_bytes(b"//pkg:caf\xe9").to_os_string();

        assert_eq!(runner(program).run(&[arg]).await.unwrap(), 0);
        assert_eq!(std::fs::read(&out).unwrap(), b"//pkg:caf\xe9");
    }

    #[tokio::test]
    #[serial]
    async fn killed_child_reports_generic_failure() {
        let temp = TempDir::new().unwrap();
        let runner = runner(script(temp.path(), "kill -9 $$"));

        assert_eq!(runner.run(&[]).await.unwrap(), ABNORMAL_EXIT_CODE);
    }
}
