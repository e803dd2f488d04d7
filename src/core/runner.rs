//! Process execution abstraction for the enforcement backend
//!
//! [`ProcessRunner`] is the seam between the gateway and the operating
//! system. [`TokioRunner`] spawns real processes; [`RecordingRunner`]
//! records invocations and replays scripted results so the rule manager can
//! be exercised without a privileged backend.

use crate::core::error::{Error, Result};
use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one backend process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Standard output followed by standard error, trimmed
    pub output: String,
    /// Exit code, `None` if terminated by a signal
    pub code: Option<i32>,
    pub success: bool,
}

impl ProcessOutput {
    pub fn from_code(code: i32, output: impl Into<String>) -> Self {
        Self {
            output: output.into().trim().to_string(),
            code: Some(code),
            success: code == 0,
        }
    }
}

/// Runs a backend program to completion.
///
/// Implementations return `BackendUnavailable` when the program cannot be
/// started and `BackendTimeout` when `timeout` elapses first. A process that
/// runs and exits non-zero is *not* an error at this level.
pub trait ProcessRunner: Send + Sync {
    fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<ProcessOutput>> + Send;
}

/// Real implementation spawning processes with `tokio::process`
///
/// Arguments are passed directly, without a shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

impl ProcessRunner for TokioRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        debug!("Spawning {} {:?}", program.display(), args);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future (timeout, caller cancelled) kills the child
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::BackendUnavailable {
                program: program.to_path_buf(),
                source,
            })?;

        let waited = match timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| Error::BackendTimeout {
                    program: program.to_path_buf(),
                    limit,
                })?,
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|source| Error::BackendUnavailable {
            program: program.to_path_buf(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = match (stdout.trim(), stderr.trim()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        };

        Ok(ProcessOutput {
            output: combined,
            code: output.status.code(),
            success: output.status.success(),
        })
    }
}

/// One recorded call to a [`RecordingRunner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug)]
enum Scripted {
    Exit(ProcessOutput),
    SpawnFailure(std::io::ErrorKind),
}

/// Test double: records invocations and replays queued results
///
/// With nothing queued, every call succeeds with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<Invocation>>,
    queue: Mutex<VecDeque<Scripted>>,
    delay: Option<Duration>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call take `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues an exit code and output for the next unanswered call
    pub fn respond(&self, code: i32, output: &str) -> &Self {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Scripted::Exit(ProcessOutput::from_code(code, output)));
        self
    }

    /// Queues a failure to start the process
    pub fn fail_to_spawn(&self, kind: std::io::ErrorKind) -> &Self {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Scripted::SpawnFailure(kind));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ProcessRunner for RecordingRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Invocation {
                program: program.to_path_buf(),
                args: args.to_vec(),
            });

        let scripted = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        if let Some(delay) = self.delay {
            match timeout {
                Some(limit) if limit < delay => {
                    tokio::time::sleep(limit).await;
                    return Err(Error::BackendTimeout {
                        program: program.to_path_buf(),
                        limit,
                    });
                }
                _ => tokio::time::sleep(delay).await,
            }
        }

        match scripted {
            Some(Scripted::Exit(output)) => Ok(output),
            Some(Scripted::SpawnFailure(kind)) => Err(Error::BackendUnavailable {
                program: program.to_path_buf(),
                source: std::io::Error::from(kind),
            }),
            None => Ok(ProcessOutput::from_code(0, "")),
        }
    }
}
