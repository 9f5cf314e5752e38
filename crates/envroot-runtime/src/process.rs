use crate::RuntimeError;
use envroot_fs::{Level, ProgressLogger};
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use tracing::debug;

/// Captured result of [`run_logged`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    /// Everything the child wrote, stdout lines first, then stderr.
    pub output: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Render a command for log messages, shortening long arguments and quoting
/// ones that contain whitespace or quotes.
pub fn describe_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(describe_part)
        .collect::<Vec<_>>()
        .join(" ")
}

fn describe_part(part: &OsStr) -> String {
    let part = part.to_string_lossy();
    let chars: Vec<char> = part.chars().collect();
    let mut shown = if chars.len() > 40 {
        let head: String = chars[..30].iter().collect();
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("{head}...{tail}")
    } else {
        part.into_owned()
    };
    if shown.contains([' ', '\n', '"', '\'']) {
        shown = format!("\"{}\"", shown.replace('"', "\\\""));
    }
    shown
}

/// Run `command` to completion, routing each output line through `log`.
///
/// `filter` picks the level of every line. Lines the console would hide tick
/// the progress indicator instead, so long runs still show signs of life.
pub fn run_logged(
    log: &ProgressLogger,
    command: &mut Command,
    filter: impl Fn(&str) -> Level,
) -> Result<RunOutput, RuntimeError> {
    let description = describe_command(command);
    log.debug(format!("Running command {description}"));

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| RuntimeError::SpawnFailed {
            command: description.clone(),
            source,
        })?;

    let stderr = child.stderr.take();
    let stderr_reader = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            if let Err(e) = stderr.read_to_end(&mut buf) {
                debug!("reading child stderr failed: {e}");
            }
        }
        buf
    });

    let mut output = String::new();
    let mut route = |line: &str| {
        output.push_str(line);
        output.push('\n');
        let level = filter(line);
        if log.console_accepts(level) {
            log.log(level, line);
        } else {
            log.show_progress();
        }
    };

    // Output is decoded lossily; the child is always reaped, even when reading fails.
    let mut read_error = None;
    if let Some(stdout) = child.stdout.take() {
        let mut reader = BufReader::new(stdout);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) => break,
                Ok(_) => route(String::from_utf8_lossy(&raw).trim_end_matches(['\r', '\n'])),
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            }
        }
    }
    let status = child.wait()?;
    let stderr_bytes = stderr_reader.join().unwrap_or_default();
    for line in String::from_utf8_lossy(&stderr_bytes).lines() {
        route(line);
    }
    if let Some(e) = read_error {
        return Err(e.into());
    }

    debug!("{description} exited with {status}");
    Ok(RunOutput {
        code: status.code(),
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use envroot_fs::SharedBuffer;

    #[test]
    fn describe_quotes_and_truncates() {
        let mut cmd = Command::new("/usr/bin/python");
        cmd.arg("-c").arg("import sys; print(sys.prefix)");
        assert_eq!(
            describe_command(&cmd),
            "/usr/bin/python -c \"import sys; print(sys.prefix)\""
        );

        let long = "x".repeat(50);
        let mut cmd = Command::new("tool");
        cmd.arg(&long);
        assert_eq!(describe_command(&cmd), format!("tool {}...xxxxx", "x".repeat(30)));
    }

    #[test]
    fn describe_escapes_double_quotes() {
        let mut cmd = Command::new("echo");
        cmd.arg("say \"hi\"");
        assert_eq!(describe_command(&cmd), "echo \"say \\\"hi\\\"\"");
    }

    #[cfg(unix)]
    #[test]
    fn run_logged_routes_lines_by_level() {
        let buf = SharedBuffer::new();
        let log = ProgressLogger::new(Level::Info, buf.clone());
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo visible; echo noise; echo oops >&2; exit 3"]);

        let out = run_logged(&log, &mut cmd, |line| {
            if line == "noise" {
                Level::Debug
            } else {
                Level::Info
            }
        })
        .unwrap();

        assert_eq!(out.code, Some(3));
        assert!(!out.success());
        assert_eq!(out.output, "visible\nnoise\noops\n");
        let shown = buf.contents();
        assert!(shown.contains("visible"));
        assert!(shown.contains("oops"));
        assert!(!shown.contains("noise"));
    }

    #[cfg(unix)]
    #[test]
    fn undecodable_output_is_replaced_not_fatal() {
        let log = ProgressLogger::silent();
        let mut cmd = Command::new("sh");
        cmd.args([
            "-c",
            "printf 'Installing /home/caf\\351/x\\n'; printf 'bad \\351\\n' >&2; exit 0",
        ]);
        let out = run_logged(&log, &mut cmd, |_| Level::Info).unwrap();
        assert!(out.success());
        assert_eq!(out.output, "Installing /home/caf\u{FFFD}/x\nbad \u{FFFD}\n");
    }

    #[test]
    fn spawn_failure_is_reported() {
        let log = ProgressLogger::silent();
        let mut cmd = Command::new("/nonexistent/envroot-test-binary");
        let err = run_logged(&log, &mut cmd, |_| Level::Info).unwrap_err();
        assert!(matches!(err, RuntimeError::SpawnFailed { .. }));
    }
}
