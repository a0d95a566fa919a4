//! The machine the pipelines act on.
//!
//! Installation and image builds never call [`std::process::Command`] directly;
//! they go through a [`Host`], so tests can record every invocation and script
//! failures without touching a real disk.

use anyhow::Result;

use crate::process::{CommandResult, Cmd, Pipeline, PipelineError};

pub trait Host {
    /// Run a single command, failing on non-zero exit unless the command allows it.
    fn run(&self, cmd: Cmd) -> Result<CommandResult>;

    /// Run a two-process pipeline.
    fn run_pipeline(&self, pipeline: Pipeline) -> Result<(), PipelineError>;

    /// Whether `tool` can be found in PATH.
    fn has_tool(&self, tool: &str) -> bool;

    /// Whether the effective user is root.
    fn is_privileged(&self) -> bool;

    /// `producer | consumer` with the consumer's stdout discarded.
    fn run_piped(&self, producer: Cmd, consumer: Cmd) -> Result<(), PipelineError> {
        self.run_pipeline(Pipeline::new(producer, consumer))
    }

    /// All of `tools` that cannot be found, in the order given.
    fn missing_tools(&self, tools: &[&str]) -> Vec<String> {
        tools
            .iter()
            .filter(|tool| !self.has_tool(tool))
            .map(|tool| tool.to_string())
            .collect()
    }
}

/// The real host: spawns processes and inspects the running user.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl Host for SystemHost {
    fn run(&self, cmd: Cmd) -> Result<CommandResult> {
        cmd.run()
    }

    fn run_pipeline(&self, pipeline: Pipeline) -> Result<(), PipelineError> {
        pipeline.run()
    }

    fn has_tool(&self, tool: &str) -> bool {
        crate::process::exists(tool)
    }

    #[allow(unsafe_code)]
    fn is_privileged(&self) -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tools_keeps_order() {
        let missing = SystemHost.missing_tools(&["nonexistent_b_123", "sh", "nonexistent_a_123"]);
        assert_eq!(missing, vec!["nonexistent_b_123", "nonexistent_a_123"]);
    }

    #[test]
    fn test_system_host_runs_commands() {
        let result = SystemHost.run(Cmd::new("echo").arg("hi")).unwrap();
        assert_eq!(result.stdout_trimmed(), "hi");
    }
}
