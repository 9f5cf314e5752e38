use crate::process::describe_command;
use crate::RuntimeError;
use envroot_fs::PlatformFamily;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Program run by [`DonorInstallation::probe`]; prints one JSON object.
pub const DONOR_INFO_PROGRAM: &str = r#"# envroot donor-info
import json, os, sys
cvars = {}
try:
    import sysconfig
    cvars = sysconfig.get_config_vars()
except ImportError:
    try:
        from distutils import sysconfig
        cvars = sysconfig.get_config_vars()
    except ImportError:
        pass
impl = getattr(sys, "implementation", None)
print(json.dumps({
    "executable": sys.executable,
    "prefix": sys.prefix,
    "exec_prefix": sys.exec_prefix,
    "real_prefix": getattr(sys, "real_prefix", None),
    "version": "%d.%d" % tuple(sys.version_info[:2]),
    "platform": sys.platform,
    "implementation": getattr(impl, "name", "cpython"),
    "stdlib_dir": os.path.dirname(os.path.abspath(os.__file__)),
    "uses_lib64": any("lib64" in str(v) for v in cvars.values()),
    "framework": bool(cvars.get("PYTHONFRAMEWORK")),
}))
"#;

/// Prints the effective installation root of the interpreter running it.
pub const PREFIX_PROGRAM: &str = "import sys; print(sys.prefix)";

/// Prints the interpreter's module search path as a JSON list.
pub const SEARCH_PATH_PROGRAM: &str = "import json, sys; print(json.dumps(sys.path))";

/// What the donor interpreter reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorInstallation {
    /// The binary that was probed, as resolved by envroot.
    #[serde(default)]
    pub interpreter: PathBuf,
    /// The binary the interpreter believes it is.
    pub executable: PathBuf,
    pub prefix: PathBuf,
    pub exec_prefix: PathBuf,
    /// Set when the donor is itself running inside an environment.
    #[serde(default)]
    pub real_prefix: Option<PathBuf>,
    pub version: String,
    pub platform: String,
    #[serde(default)]
    pub implementation: String,
    pub stdlib_dir: PathBuf,
    #[serde(default)]
    pub uses_lib64: bool,
    #[serde(default)]
    pub framework: bool,
}

impl DonorInstallation {
    /// Run the donor once and collect everything the builder needs from it.
    pub fn probe(interpreter: &Path) -> Result<Self, RuntimeError> {
        let stdout = run_probe(interpreter, DONOR_INFO_PROGRAM)?;
        let mut donor: Self = parse_json(interpreter, &stdout)?;
        donor.interpreter = interpreter.to_path_buf();
        if donor.executable.as_os_str().is_empty() {
            donor.executable = interpreter.to_path_buf();
        }
        debug!(
            "donor {} version {} platform {} prefix {}",
            donor.interpreter.display(),
            donor.version,
            donor.platform,
            donor.prefix.display()
        );
        Ok(donor)
    }

    /// Installation root the skeleton is taken from.
    pub fn effective_prefix(&self) -> &Path {
        self.real_prefix.as_deref().unwrap_or(&self.prefix)
    }

    /// Cygwin donors get the POSIX layout; only their launcher naming differs.
    pub fn family(&self) -> PlatformFamily {
        PlatformFamily::from_platform(&self.platform)
    }

    pub fn is_darwin(&self) -> bool {
        self.platform == "darwin"
    }

    pub fn is_cygwin(&self) -> bool {
        self.platform == "cygwin"
    }

    /// Version string as it appears in `pythonX.Y`.
    pub fn py_version(&self) -> String {
        format!("python{}", self.version)
    }

    /// Parsed `(major, minor)`; unparsable parts read as zero.
    pub fn version_tuple(&self) -> (u32, u32) {
        let mut parts = self.version.split('.').map(|p| p.parse().unwrap_or(0));
        (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
    }
}

/// Find the donor interpreter: paths are taken as-is, bare names are looked
/// up on `PATH`.
pub fn resolve_interpreter(name: &str) -> Result<PathBuf, RuntimeError> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return if candidate.is_file() {
            Ok(candidate.to_path_buf())
        } else {
            Err(RuntimeError::InterpreterNotFound(name.to_owned()))
        };
    }
    which::which(name).map_err(|e| {
        debug!("which {name}: {e}");
        RuntimeError::InterpreterNotFound(name.to_owned())
    })
}

/// Ask `launcher` for its effective installation root.
pub fn probe_prefix(launcher: &Path) -> Result<String, RuntimeError> {
    Ok(run_probe(launcher, PREFIX_PROGRAM)?.trim().to_owned())
}

/// Ask `launcher` for its module search path. Empty entries become `.`.
pub fn probe_search_path(launcher: &Path) -> Result<Vec<PathBuf>, RuntimeError> {
    let stdout = run_probe(launcher, SEARCH_PATH_PROGRAM)?;
    let entries: Vec<String> = parse_json(launcher, &stdout)?;
    Ok(entries
        .into_iter()
        .map(|e| if e.is_empty() { PathBuf::from(".") } else { PathBuf::from(e) })
        .collect())
}

fn run_probe(interpreter: &Path, program: &str) -> Result<String, RuntimeError> {
    let mut command = Command::new(interpreter);
    command.arg("-c").arg(program);
    let description = describe_command(&command);
    let output = command.output().map_err(|source| RuntimeError::SpawnFailed {
        command: description.clone(),
        source,
    })?;
    if !output.status.success() {
        return Err(RuntimeError::ProbeFailed {
            command: description,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn parse_json<T: serde::de::DeserializeOwned>(
    interpreter: &Path,
    stdout: &str,
) -> Result<T, RuntimeError> {
    // Site hooks may print before the probe does; the payload is the last line.
    let payload = stdout.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
    serde_json::from_str(payload).map_err(|source| RuntimeError::BadProbeOutput {
        command: interpreter.display().to_string(),
        source,
    })
}
