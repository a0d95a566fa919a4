//! Shared test utilities for pgsdbuild tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::{bail, Result};
use pgsdbuild::host::Host;
use pgsdbuild::process::{attribute, Cmd, CommandResult, PipeSide, Pipeline, PipelineError};
use tempfile::TempDir;

type Effect = Box<dyn Fn(&[String])>;

struct Failure {
    pattern: String,
    status: ExitStatus,
    stderr: String,
}

/// A [`Host`] that runs nothing.
///
/// Every command line is recorded (pipelines as `a | b`). Commands whose line
/// starts with a scripted pattern fail, answer with canned stdout, or run a
/// side effect on their arguments.
#[derive(Default)]
pub struct FakeHost {
    calls: RefCell<Vec<String>>,
    failures: Vec<Failure>,
    responses: Vec<(String, String)>,
    effects: Vec<(String, Effect)>,
    missing: HashSet<String>,
    unprivileged: bool,
}

impl FakeHost {
    /// All tools present, running as root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands starting with `pattern` exit 1 with `stderr`.
    pub fn failing(self, pattern: &str, stderr: &str) -> Self {
        self.exiting(pattern, ExitStatus::from_raw(1 << 8), stderr)
    }

    /// Commands starting with `pattern` are killed by SIGPIPE.
    pub fn killed_by_sigpipe(self, pattern: &str) -> Self {
        self.exiting(pattern, ExitStatus::from_raw(libc::SIGPIPE), "")
    }

    fn exiting(mut self, pattern: &str, status: ExitStatus, stderr: &str) -> Self {
        self.failures.push(Failure {
            pattern: pattern.to_string(),
            status,
            stderr: stderr.to_string(),
        });
        self
    }

    pub fn responding(mut self, pattern: &str, stdout: &str) -> Self {
        self.responses.push((pattern.to_string(), stdout.to_string()));
        self
    }

    /// Run `effect` with the arguments of every successful matching command.
    pub fn with_effect(mut self, pattern: &str, effect: impl Fn(&[String]) + 'static) -> Self {
        self.effects.push((pattern.to_string(), Box::new(effect)));
        self
    }

    pub fn without_tools(mut self, tools: &[&str]) -> Self {
        self.missing.extend(tools.iter().map(|t| t.to_string()));
        self
    }

    pub fn unprivileged(mut self) -> Self {
        self.unprivileged = true;
        self
    }

    /// Every recorded command line, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Recorded command lines starting with `prefix`.
    pub fn calls_starting(&self, prefix: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Index of the first recorded line starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls.borrow().iter().position(|c| c.starts_with(prefix))
    }

    fn failure_for(&self, line: &str) -> Option<&Failure> {
        self.failures.iter().find(|f| line.starts_with(&f.pattern))
    }

    fn status_of(&self, line: &str) -> (ExitStatus, String) {
        match self.failure_for(line) {
            Some(f) => (f.status, f.stderr.clone()),
            None => (ExitStatus::from_raw(0), String::new()),
        }
    }

    fn apply_effects(&self, cmd: &Cmd) {
        let line = cmd.display();
        for (pattern, effect) in &self.effects {
            if line.starts_with(pattern.as_str()) {
                effect(cmd.get_args());
            }
        }
    }
}

impl Host for FakeHost {
    fn run(&self, cmd: Cmd) -> Result<CommandResult> {
        let line = cmd.display();
        match cmd.get_dir() {
            Some(dir) => self.calls.borrow_mut().push(format!("{} (in {})", line, dir.display())),
            None => self.calls.borrow_mut().push(line.clone()),
        }

        let (status, stderr) = self.status_of(&line);
        if !status.success() && !cmd.allows_failure() {
            bail!("'{}' failed (exit code {}):\n{}", line, status.code().unwrap_or(-1), stderr);
        }
        if status.success() {
            self.apply_effects(&cmd);
        }

        let stdout = self
            .responses
            .iter()
            .find(|(pattern, _)| line.starts_with(pattern.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        Ok(CommandResult {
            status,
            stdout,
            stderr,
        })
    }

    fn run_pipeline(&self, pipeline: Pipeline) -> Result<(), PipelineError> {
        let producer = pipeline.producer().display();
        let consumer = pipeline.consumer().display();
        let mut line = format!("{} | {}", producer, consumer);
        if let Some(path) = pipeline.output_path() {
            line.push_str(&format!(" > {}", path.display()));
        }
        self.calls.borrow_mut().push(line);

        let (p_status, p_err) = self.status_of(&producer);
        let (c_status, c_err) = self.status_of(&consumer);

        let failed = |side, cmd: &Cmd, status, stderr, peer: (ExitStatus, String)| {
            PipelineError::Failed {
                side,
                program: cmd.program().to_string(),
                status,
                stderr,
                peer_stderr: (!peer.0.success()).then_some(peer.1),
            }
        };

        match attribute(p_status, c_status) {
            None => {
                if let Some(path) = pipeline.output_path() {
                    fs::write(path, b"stream").map_err(|source| PipelineError::Output {
                        path: path.to_path_buf(),
                        source,
                    })?;
                }
                Ok(())
            }
            Some(PipeSide::Producer) => Err(failed(
                PipeSide::Producer,
                pipeline.producer(),
                p_status,
                p_err,
                (c_status, c_err),
            )),
            Some(PipeSide::Consumer) => Err(failed(
                PipeSide::Consumer,
                pipeline.consumer(),
                c_status,
                c_err,
                (p_status, p_err),
            )),
        }
    }

    fn has_tool(&self, tool: &str) -> bool {
        !self.missing.contains(tool)
    }

    fn is_privileged(&self) -> bool {
        !self.unprivileged
    }
}

/// A temp directory holding a complete image (`root.zfs.xz`, `efi.img`, `manifest.toml`).
pub struct ImageDir {
    pub _temp_dir: TempDir,
    pub path: PathBuf,
}

impl ImageDir {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("a");
        fs::create_dir_all(&path).expect("Failed to create image dir");
        fs::write(path.join("root.zfs.xz"), b"\xfd7zXZ\x00stream").expect("write stream");
        fs::write(path.join("efi.img"), vec![0u8; 4096]).expect("write efi.img");
        fs::write(path.join("manifest.toml"), "id = \"a\"\n").expect("write manifest");
        Self {
            _temp_dir: temp_dir,
            path,
        }
    }

    /// Same image without one of its files.
    pub fn without(name: &str) -> Self {
        let dir = Self::new();
        fs::remove_file(dir.path.join(name)).expect("remove artifact");
        dir
    }
}

/// Write `len` bytes of a repeating pattern, for checking what was overwritten.
pub fn write_patterned(path: &Path, len: usize) {
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    fs::write(path, data).expect("Failed to write patterned file");
}

/// A file that passes the distribution archive checks.
pub fn write_fake_archive(path: &Path) {
    let mut data = vec![0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
    data.resize(2048, 0);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create archive dir");
    }
    fs::write(path, data).expect("Failed to write archive");
}
