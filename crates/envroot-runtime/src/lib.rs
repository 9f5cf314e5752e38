//! Everything envroot needs from the outside world besides the filesystem.
//!
//! This crate talks to the donor interpreter (discovery, the JSON probes the
//! builder and relocator depend on), runs child processes with their output
//! routed through the `ProgressLogger`, provides the auxiliary package
//! installer collaborator, and checks the host environment for conditions
//! that make a build unsafe.

pub mod installer;
pub mod interpreter;
pub mod prereq;
pub mod process;

pub use installer::{
    filter_installer_line, InstallOptions, NoopInstaller, PackageInstaller, SetuptoolsInstaller,
};
pub use interpreter::{probe_prefix, probe_search_path, resolve_interpreter, DonorInstallation};
pub use prereq::{check_host_environment, check_host_environment_with, format_issues, HostIssue, Severity};
pub use process::{describe_command, run_logged, RunOutput};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Fs(#[from] envroot_fs::FsError),
    #[error("interpreter not found: {0}")]
    InterpreterNotFound(String),
    #[error("failed to start {command}: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("probe {command} exited with {}: {stderr}", exit_label(*.code))]
    ProbeFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("probe {command} produced unreadable output: {source}")]
    BadProbeOutput {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("command {command} failed with error code {}", exit_label(*.code))]
    InstallerFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_owned(), |c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installer_failure_carries_code() {
        let e = RuntimeError::InstallerFailed {
            command: "python -c ...".to_owned(),
            code: Some(7),
            output: String::new(),
        };
        assert_eq!(e.to_string(), "command python -c ... failed with error code 7");
    }

    #[test]
    fn signal_termination_is_named() {
        let e = RuntimeError::ProbeFailed {
            command: "python".to_owned(),
            code: None,
            stderr: "killed".to_owned(),
        };
        assert!(e.to_string().contains("a signal"));
    }
}
