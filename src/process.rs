//! Centralized command execution with consistent error handling.
//!
//! Every external tool (gpart, zpool, zfs, makefs, ...) is started through this
//! module so that stderr is always captured and surfaced in error messages.
//! [`Pipeline`] connects two processes with an OS pipe, which is how multi-gigabyte
//! ZFS streams move without being staged in memory or on disk.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Get stdout, trimmed of whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }

    /// Stdout followed by stderr, the way a terminal would have shown them.
    pub fn combined(&self) -> String {
        match (self.stdout_trimmed(), self.stderr_trimmed()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }
}

/// Builder for configuring command execution.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
    /// Custom error message prefix.
    error_prefix: Option<String>,
    current_dir: Option<PathBuf>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            allow_fail: false,
            error_prefix: None,
            current_dir: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// Program name as given to [`Cmd::new`].
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments in the order they were added.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if one was set.
    pub fn get_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Whether a non-zero exit is tolerated.
    pub fn allows_failure(&self) -> bool {
        self.allow_fail
    }

    /// The command line as it would be typed, for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn failure_prefix(&self) -> String {
        self.error_prefix
            .clone()
            .unwrap_or_else(|| format!("'{}' failed", self.display()))
    }

    /// Run the command and capture output.
    pub fn run(self) -> Result<CommandResult> {
        tracing::debug!("running: {}", self.display());
        let output = self.command().output().with_context(|| {
            format!("Failed to execute '{}'. Is it installed?", self.program)
        })?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            let prefix = self.failure_prefix();

            // gpart and friends sometimes report on stdout only
            let detail = result.combined();
            if detail.is_empty() {
                bail!("{} (exit code {})", prefix, result.code());
            } else {
                bail!("{} (exit code {}):\n{}", prefix, result.code(), detail);
            }
        }

        Ok(result)
    }

    /// Run with inherited stdio, for tools that talk to the operator directly.
    pub fn run_interactive(self) -> Result<ExitStatus> {
        tracing::debug!("running (interactive): {}", self.display());
        let mut cmd = self.command();
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let status = cmd.status().with_context(|| {
            format!("Failed to execute '{}'. Is it installed?", self.program)
        })?;

        if !self.allow_fail && !status.success() {
            bail!("{} (exit code {})", self.failure_prefix(), status.code().unwrap_or(-1));
        }

        Ok(status)
    }
}

/// Run a command and capture its output.
pub fn run<I, S>(program: &str, args: I) -> Result<CommandResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Cmd::new(program).args(args).run()
}

/// Run a command in a specific working directory.
///
/// # Example
/// ```no_run
/// use pgsdbuild::process::run_in;
/// use std::path::Path;
///
/// run_in("sha256", ["-q", "base.txz"], Path::new("/var/cache/pgsd"))?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn run_in<I, S>(program: &str, args: I, dir: &Path) -> Result<CommandResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Cmd::new(program).args(args).dir(dir).run()
}

// =============================================================================
// Pipelines
// =============================================================================

/// Which side of a two-process pipeline an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeSide {
    /// The process writing into the pipe.
    Producer,
    /// The process reading from the pipe.
    Consumer,
}

impl std::fmt::Display for PipeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipeSide::Producer => write!(f, "producer"),
            PipeSide::Consumer => write!(f, "consumer"),
        }
    }
}

/// Failure of a [`Pipeline`], attributed to one side.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to start {side} '{program}': {source}")]
    Spawn {
        side: PipeSide,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for {side} '{program}': {source}")]
    Wait {
        side: PipeSide,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' exited with {status}{}{}", stderr_suffix(.stderr), peer_suffix(.peer_stderr))]
    Failed {
        side: PipeSide,
        program: String,
        status: ExitStatus,
        stderr: String,
        /// Diagnostics from the other process, kept because a truncated
        /// stream usually makes the peer fail as well.
        peer_stderr: Option<String>,
    },

    #[error("failed to open pipeline output {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{}", stderr)
    }
}

fn peer_suffix(peer: &Option<String>) -> String {
    match peer.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => format!("\n(other side of the pipe reported: {})", p),
        _ => String::new(),
    }
}

impl PipelineError {
    /// The side this failure is attributed to, if any.
    pub fn side(&self) -> Option<PipeSide> {
        match self {
            PipelineError::Spawn { side, .. }
            | PipelineError::Wait { side, .. }
            | PipelineError::Failed { side, .. } => Some(*side),
            PipelineError::Output { .. } => None,
        }
    }
}

/// Two commands connected stdout-to-stdin.
///
/// Neither stream passes through this process: the producer's stdout pipe is
/// handed directly to the consumer as its stdin.
#[derive(Debug, Clone)]
pub struct Pipeline {
    producer: Cmd,
    consumer: Cmd,
    output: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(producer: Cmd, consumer: Cmd) -> Self {
        Self {
            producer,
            consumer,
            output: None,
        }
    }

    /// Redirect the consumer's stdout into a file (created or truncated).
    pub fn output(mut self, path: &Path) -> Self {
        self.output = Some(path.to_path_buf());
        self
    }

    pub fn producer(&self) -> &Cmd {
        &self.producer
    }

    pub fn consumer(&self) -> &Cmd {
        &self.consumer
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Start both processes, wait for both, and attribute any failure.
    pub fn run(self) -> Result<(), PipelineError> {
        tracing::debug!(
            "running: {} | {}{}",
            self.producer.display(),
            self.consumer.display(),
            self.output
                .as_ref()
                .map(|p| format!(" > {}", p.display()))
                .unwrap_or_default()
        );

        let consumer_stdout = match &self.output {
            Some(path) => Stdio::from(File::create(path).map_err(|source| {
                PipelineError::Output {
                    path: path.clone(),
                    source,
                }
            })?),
            None => Stdio::null(),
        };

        let mut producer = self
            .producer
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                side: PipeSide::Producer,
                program: self.producer.program.clone(),
                source,
            })?;

        let pipe = match producer.stdout.take() {
            Some(pipe) => pipe,
            None => {
                reap(&mut producer);
                return Err(PipelineError::Spawn {
                    side: PipeSide::Producer,
                    program: self.producer.program.clone(),
                    source: io::Error::other("stdout was not captured"),
                });
            }
        };

        let mut consumer = match self
            .consumer
            .command()
            .stdin(Stdio::from(pipe))
            .stdout(consumer_stdout)
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                reap(&mut producer);
                return Err(PipelineError::Spawn {
                    side: PipeSide::Consumer,
                    program: self.consumer.program.clone(),
                    source,
                });
            }
        };

        // Both stderr pipes must be drained while we wait, otherwise a chatty
        // process can block on a full pipe.
        let producer_err = drain(producer.stderr.take());
        let consumer_err = drain(consumer.stderr.take());

        let producer_status = producer.wait();
        let consumer_status = consumer.wait();
        let producer_stderr = join_drain(producer_err);
        let consumer_stderr = join_drain(consumer_err);

        let producer_status = producer_status.map_err(|source| PipelineError::Wait {
            side: PipeSide::Producer,
            program: self.producer.program.clone(),
            source,
        })?;
        let consumer_status = consumer_status.map_err(|source| PipelineError::Wait {
            side: PipeSide::Consumer,
            program: self.consumer.program.clone(),
            source,
        })?;

        match attribute(producer_status, consumer_status) {
            None => Ok(()),
            Some(PipeSide::Producer) => Err(PipelineError::Failed {
                side: PipeSide::Producer,
                program: self.producer.program,
                status: producer_status,
                stderr: producer_stderr,
                peer_stderr: (!consumer_status.success()).then_some(consumer_stderr),
            }),
            Some(PipeSide::Consumer) => Err(PipelineError::Failed {
                side: PipeSide::Consumer,
                program: self.consumer.program,
                status: consumer_status,
                stderr: consumer_stderr,
                peer_stderr: (!producer_status.success()).then_some(producer_stderr),
            }),
        }
    }
}

/// Decide which side of a finished pipeline is to blame.
///
/// A producer failure wins, except when the producer died of SIGPIPE while the
/// consumer failed: then the consumer exited first and broke the pipe.
pub fn attribute(producer: ExitStatus, consumer: ExitStatus) -> Option<PipeSide> {
    match (producer.success(), consumer.success()) {
        (true, true) => None,
        (true, false) => Some(PipeSide::Consumer),
        (false, false) if producer.signal() == Some(libc::SIGPIPE) => Some(PipeSide::Consumer),
        (false, _) => Some(PipeSide::Producer),
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<String>> {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

// =============================================================================
// Convenience functions
// =============================================================================

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<PathBuf> {
    which::which(program).ok()
}

/// Check if a program exists in PATH (bool version).
pub fn exists(program: &str) -> bool {
    which(program).is_some()
}

// =============================================================================
// Tests
// =============================================================================
