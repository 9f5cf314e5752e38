//! Build and relocation engine for envroot environments.
//!
//! `EnvironmentBuilder` walks a fixed sequence of `BuildStage`s to turn a donor
//! interpreter installation into an isolated environment root; every step is
//! idempotent, so re-running a build is also how an interrupted one is
//! completed. `Relocator` rewrites the absolute self-references of a built
//! environment so the whole tree can be moved.

pub mod builder;
pub mod inspect;
pub mod lifecycle;
pub mod relocate;
pub mod skeleton;

pub use builder::{BuildHooks, BuildOptions, BuildReport, EnvironmentBuilder};
pub use inspect::{inspect_environment, EnvironmentInfo};
pub use lifecycle::{validate_transition, BuildStage};
pub use relocate::{relocate_environment, RelocationReport, Relocator};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Fs(#[from] envroot_fs::FsError),
    #[error("config error: {0}")]
    Config(#[from] envroot_config::ConfigError),
    #[error("runtime error: {0}")]
    Runtime(#[from] envroot_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "the executable {} is not functioning: it thinks sys.prefix is {reported:?} (should be {expected:?})",
        executable.display()
    )]
    NonFunctionalExecutable {
        executable: PathBuf,
        reported: String,
        expected: String,
    },
    #[error(
        "{} is missing: not a valid environment, or built by an incompatible version",
        missing.display()
    )]
    InvalidEnvironment { missing: PathBuf },
    #[error("cannot build while {0} is set")]
    ConflictingEnvironment(String),
    #[error("the donor interpreter {} lives inside the target environment; use the system interpreter", .0.display())]
    DonorInsideEnvironment(PathBuf),
    #[error("invalid build stage transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("build hook failed: {0}")]
    Hook(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_functional_executable_display() {
        let e = CoreError::NonFunctionalExecutable {
            executable: PathBuf::from("/srv/env/bin/python"),
            reported: "/usr".to_owned(),
            expected: "/srv/env".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("/srv/env/bin/python"));
        assert!(msg.contains("\"/usr\""));
    }

    #[test]
    fn invalid_environment_names_missing_file() {
        let e = CoreError::InvalidEnvironment {
            missing: PathBuf::from("/srv/env/bin/activate_this.py"),
        };
        assert!(e.to_string().contains("activate_this.py"));
    }

    #[test]
    fn runtime_errors_convert() {
        let e: CoreError = envroot_runtime::RuntimeError::InterpreterNotFound("python9".to_owned()).into();
        assert!(matches!(e, CoreError::Runtime(_)));
    }
}
