pub mod build;
pub mod completions;
pub mod inspect;
pub mod man_pages;
pub mod relocate;

use envroot_core::CoreError;
use envroot_runtime::RuntimeError;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_USAGE: u8 = 2;
pub const EXIT_ENVIRONMENT: u8 = 3;
pub const EXIT_NON_FUNCTIONAL: u8 = 100;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_flag(enabled: bool) -> String {
    use console::Style;
    if enabled {
        Style::new().green().apply_to("yes").to_string()
    } else {
        Style::new().yellow().apply_to("no").to_string()
    }
}

/// Process exit status for a failed build or relocation.
///
/// Installer failures pass the installer's own status through; a status that
/// does not fit or would read as success becomes a generic failure.
pub fn exit_code(err: &CoreError) -> u8 {
    match err {
        CoreError::NonFunctionalExecutable { .. } => EXIT_NON_FUNCTIONAL,
        CoreError::ConflictingEnvironment(_)
        | CoreError::DonorInsideEnvironment(_)
        | CoreError::Runtime(RuntimeError::InterpreterNotFound(_)) => EXIT_ENVIRONMENT,
        CoreError::Runtime(RuntimeError::InstallerFailed { code, .. }) => code
            .and_then(|c| u8::try_from(c).ok())
            .filter(|c| *c != EXIT_SUCCESS)
            .unwrap_or(EXIT_FAILURE),
        _ => EXIT_FAILURE,
    }
}

pub fn fail(err: &CoreError) -> u8 {
    eprintln!("error: {err}");
    exit_code(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn installer_failure(code: Option<i32>) -> CoreError {
        CoreError::Runtime(RuntimeError::InstallerFailed {
            command: "python -c ...".to_owned(),
            code,
            output: String::new(),
        })
    }

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"root": "/srv/env"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"root\""));
        assert!(result.contains("\"/srv/env\""));
    }

    #[test]
    fn colorize_flag_keeps_text() {
        assert!(colorize_flag(true).contains("yes"));
        assert!(colorize_flag(false).contains("no"));
    }

    #[test]
    fn non_functional_executable_has_its_own_code() {
        let err = CoreError::NonFunctionalExecutable {
            executable: PathBuf::from("/srv/env/bin/python"),
            reported: "/usr".to_owned(),
            expected: "/srv/env".to_owned(),
        };
        assert_eq!(exit_code(&err), EXIT_NON_FUNCTIONAL);
    }

    #[test]
    fn environment_problems_map_to_environment_code() {
        assert_eq!(
            exit_code(&CoreError::ConflictingEnvironment("WORKING_ENV".to_owned())),
            EXIT_ENVIRONMENT
        );
        assert_eq!(
            exit_code(&RuntimeError::InterpreterNotFound("python9".to_owned()).into()),
            EXIT_ENVIRONMENT
        );
    }

    #[test]
    fn installer_status_passes_through() {
        assert_eq!(exit_code(&installer_failure(Some(7))), 7);
        assert_eq!(exit_code(&installer_failure(Some(300))), EXIT_FAILURE);
        assert_eq!(exit_code(&installer_failure(Some(0))), EXIT_FAILURE);
        assert_eq!(exit_code(&installer_failure(None)), EXIT_FAILURE);
    }

    #[test]
    fn other_errors_are_generic() {
        let err = CoreError::Hook("nope".to_owned());
        assert_eq!(exit_code(&err), EXIT_FAILURE);
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [EXIT_SUCCESS, EXIT_FAILURE, EXIT_USAGE, EXIT_ENVIRONMENT, EXIT_NON_FUNCTIONAL];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("probing...");
        spin_ok(&pb, "done");
        let pb = spinner("probing...");
        spin_fail(&pb, "failed");
    }
}
