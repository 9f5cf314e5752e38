use crate::process::{describe_command, run_logged};
use crate::RuntimeError;
use envroot_fs::{Level, ProgressLogger};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Version of the bundled setuptools egg looked up next to the installer.
pub const SETUPTOOLS_EGG_VERSION: &str = "0.6c11";

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Install packages unzipped rather than as zipped eggs.
    pub unzip: bool,
    /// `X.Y` version of the environment's interpreter.
    pub python_version: String,
    /// Child working directory; `None` keeps the current one.
    pub working_dir: Option<PathBuf>,
    pub extra_env: BTreeMap<String, OsString>,
}

/// Installs the package-manager component into a freshly built environment.
pub trait PackageInstaller {
    fn name(&self) -> &str;

    fn install(
        &self,
        launcher: &Path,
        options: &InstallOptions,
        log: &ProgressLogger,
    ) -> Result<(), RuntimeError>;
}

/// Runs the setuptools bootstrap with the environment's own interpreter.
///
/// A bundled egg found in one of the search directories is installed offline;
/// otherwise the bootstrap downloads setuptools.
#[derive(Debug, Clone)]
pub struct SetuptoolsInstaller {
    bootstrap: String,
    search_dirs: Vec<PathBuf>,
}

impl SetuptoolsInstaller {
    pub fn new(bootstrap: impl Into<String>, search_dirs: Vec<PathBuf>) -> Self {
        Self {
            bootstrap: bootstrap.into(),
            search_dirs,
        }
    }

    pub fn egg_name(python_version: &str) -> String {
        format!("setuptools-{SETUPTOOLS_EGG_VERSION}-py{python_version}.egg")
    }

    /// First search directory that holds the bundled egg for `python_version`.
    pub fn find_egg(&self, python_version: &str) -> Option<PathBuf> {
        let name = Self::egg_name(python_version);
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&name))
            .find(|candidate| candidate.exists())
    }

    /// Assemble the child command without running it.
    pub fn command(
        &self,
        launcher: &Path,
        options: &InstallOptions,
        verbose: bool,
    ) -> Result<Command, RuntimeError> {
        let mut command = Command::new(launcher);
        command.arg("-c").arg(&self.bootstrap);
        if options.unzip {
            command.arg("--always-unzip");
        }
        if verbose {
            command.arg("-v");
        }

        let mut env = options.extra_env.clone();
        if let Some(egg) = self.find_egg(&options.python_version) {
            debug!("using bundled egg {}", egg.display());
            let mut entries = vec![egg.clone()];
            if let Some(existing) = std::env::var_os("PYTHONPATH") {
                entries.extend(std::env::split_paths(&existing));
            }
            let joined = std::env::join_paths(entries)
                .map_err(|e| RuntimeError::Io(std::io::Error::other(e)))?;
            env.insert("PYTHONPATH".to_owned(), joined);
            command.arg(egg);
        } else {
            command.args(["--always-copy", "-U", "setuptools"]);
        }

        command.envs(env);
        if let Some(dir) = &options.working_dir {
            command.current_dir(dir);
        }
        Ok(command)
    }
}

impl PackageInstaller for SetuptoolsInstaller {
    fn name(&self) -> &str {
        "setuptools"
    }

    fn install(
        &self,
        launcher: &Path,
        options: &InstallOptions,
        log: &ProgressLogger,
    ) -> Result<(), RuntimeError> {
        let mut command = self.command(launcher, options, log.console_accepts(Level::Debug))?;
        let description = describe_command(&command);

        log.start_progress("Installing setuptools...")?;
        let result = {
            let _indent = log.indent(2);
            run_logged(log, &mut command, filter_installer_line)
        };
        let output = match result {
            Ok(output) => output,
            Err(e) => {
                log.end_progress(Some("error"))?;
                return Err(e);
            }
        };

        if output.success() {
            log.end_progress(None)?;
            return Ok(());
        }
        log.end_progress(Some("error"))?;
        log.notify(format!(
            "Complete output from command {description}:\n{}\n----------------------------------------",
            output.output.trim_end()
        ));
        Err(RuntimeError::InstallerFailed {
            command: description,
            code: output.code,
            output: output.output,
        })
    }
}

/// Installer that does nothing, for builds without a package manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstaller;

impl PackageInstaller for NoopInstaller {
    fn name(&self) -> &str {
        "none"
    }

    fn install(
        &self,
        launcher: &Path,
        _options: &InstallOptions,
        log: &ProgressLogger,
    ) -> Result<(), RuntimeError> {
        log.info(format!(
            "Not installing a package manager into {}",
            launcher.display()
        ));
        Ok(())
    }
}

/// Level for one line of installer output: routine chatter is Debug.
pub fn filter_installer_line(line: &str) -> Level {
    const CHATTER: [&str; 7] = [
        "Reading ",
        "Best match",
        "Processing setuptools",
        "Copying setuptools",
        "Adding setuptools",
        "Installing ",
        "Installed ",
    ];
    if line.trim().is_empty() || CHATTER.iter().any(|p| line.starts_with(p)) {
        Level::Debug
    } else {
        Level::Info
    }
}
