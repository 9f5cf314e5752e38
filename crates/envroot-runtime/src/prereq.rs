use std::ffi::OsString;
use std::fmt;

/// How bad a host condition is for building an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Fatal,
}

/// A host environment variable that interferes with environment creation.
#[derive(Debug)]
pub struct HostIssue {
    pub variable: &'static str,
    pub severity: Severity,
    pub hint: &'static str,
}

impl fmt::Display for HostIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  - {} is set: {}", self.variable, self.hint)
    }
}

/// Check the current process environment.
pub fn check_host_environment() -> Vec<HostIssue> {
    check_host_environment_with(|name| std::env::var_os(name))
}

/// Check an environment described by `lookup`. Empty list means nothing to report.
pub fn check_host_environment_with(lookup: impl Fn(&str) -> Option<OsString>) -> Vec<HostIssue> {
    let mut issues = Vec::new();

    if lookup("WORKING_ENV").is_some() {
        issues.push(HostIssue {
            variable: "WORKING_ENV",
            severity: Severity::Fatal,
            hint: "a workingenv is active; deactivate it and run envroot again",
        });
    }

    if lookup("PYTHONHOME").is_some() {
        issues.push(HostIssue {
            variable: "PYTHONHOME",
            severity: Severity::Warning,
            hint: "this can cause problems creating environments; activate the environment before using it",
        });
    }

    issues
}

pub fn format_issues(issues: &[HostIssue]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("host environment problems:\n");
    for issue in issues {
        let _ = writeln!(msg, "{issue}");
    }
    msg
}
