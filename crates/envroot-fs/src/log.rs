use crate::FsError;
use console::Style;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Console verbosity levels, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Notify,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Debug,
        Level::Info,
        Level::Notify,
        Level::Warn,
        Level::Error,
        Level::Fatal,
    ];

    /// Map a numeric verbosity onto a level, clamping out-of-range values.
    ///
    /// `0` is the most verbose level. The CLI feeds `2 - (verbose - quiet)`,
    /// so the default console shows Notify and above.
    pub fn for_verbosity(verbosity: i32) -> Self {
        let max = Self::ALL.len() as i32 - 1;
        Self::ALL[verbosity.clamp(0, max) as usize]
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notify => "notify",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

struct Consumer {
    level: Level,
    sink: Box<dyn Write + Send>,
    colored: bool,
}

struct LoggerState {
    console: Consumer,
    extra: Vec<Consumer>,
    indent: usize,
    in_progress: Option<String>,
    hanging: bool,
}

/// Leveled, indented console reporter with a single-line progress mode.
///
/// The console consumer decides what the user sees; extra consumers (a log
/// file, say) receive every message at or above their own level. Write errors
/// on any sink are ignored.
pub struct ProgressLogger {
    state: Mutex<LoggerState>,
}

impl ProgressLogger {
    pub fn new(level: Level, sink: impl Write + Send + 'static) -> Self {
        Self {
            state: Mutex::new(LoggerState {
                console: Consumer {
                    level,
                    sink: Box::new(sink),
                    colored: false,
                },
                extra: Vec::new(),
                indent: 0,
                in_progress: None,
                hanging: false,
            }),
        }
    }

    pub fn stdout(level: Level) -> Self {
        let logger = Self::new(level, io::stdout());
        logger.lock().console.colored = console::colors_enabled();
        logger
    }

    pub fn stderr(level: Level) -> Self {
        let logger = Self::new(level, io::stderr());
        logger.lock().console.colored = console::colors_enabled_stderr();
        logger
    }

    /// A logger whose console only accepts fatal messages, into a sink that discards them.
    pub fn silent() -> Self {
        Self::new(Level::Fatal, io::sink())
    }

    #[must_use]
    pub fn with_consumer(self, level: Level, sink: impl Write + Send + 'static) -> Self {
        self.lock().extra.push(Consumer {
            level,
            sink: Box::new(sink),
            colored: false,
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, LoggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn console_level(&self) -> Level {
        self.lock().console.level
    }

    /// Whether a message at `level` would reach the console.
    pub fn console_accepts(&self, level: Level) -> bool {
        level >= self.console_level()
    }

    pub fn debug(&self, msg: impl AsRef<str>) {
        self.log(Level::Debug, msg.as_ref());
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.log(Level::Info, msg.as_ref());
    }

    pub fn notify(&self, msg: impl AsRef<str>) {
        self.log(Level::Notify, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.log(Level::Warn, msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.log(Level::Error, msg.as_ref());
    }

    pub fn fatal(&self, msg: impl AsRef<str>) {
        self.log(Level::Fatal, msg.as_ref());
    }

    pub fn log(&self, level: Level, msg: &str) {
        let mut state = self.lock();
        let rendered = format!("{}{msg}", " ".repeat(state.indent));

        if level >= state.console.level {
            if state.hanging {
                state.hanging = false;
                let _ = state.console.sink.write_all(b"\n");
            }
            let line = if state.console.colored {
                paint(level, &rendered)
            } else {
                rendered.clone()
            };
            let _ = writeln!(state.console.sink, "{line}");
            let _ = state.console.sink.flush();
        }
        for consumer in &mut state.extra {
            if level >= consumer.level {
                let _ = writeln!(consumer.sink, "{rendered}");
            }
        }
    }

    /// Enter progress mode. The label stays on the current console line until
    /// another message or [`end_progress`](Self::end_progress) terminates it.
    pub fn start_progress(&self, label: &str) -> Result<(), FsError> {
        let mut state = self.lock();
        if let Some(current) = &state.in_progress {
            return Err(FsError::Progress(format!(
                "tried to start progress {label:?} while {current:?} is in progress"
            )));
        }
        if Level::Notify >= state.console.level {
            let _ = state.console.sink.write_all(label.as_bytes());
            let _ = state.console.sink.flush();
            state.hanging = true;
        } else {
            state.hanging = false;
        }
        state.in_progress = Some(label.to_owned());
        Ok(())
    }

    /// Leave progress mode, printing `msg` (default `done.`).
    pub fn end_progress(&self, msg: Option<&str>) -> Result<(), FsError> {
        let mut state = self.lock();
        let Some(label) = state.in_progress.take() else {
            return Err(FsError::Progress(
                "tried to end progress without starting it".to_owned(),
            ));
        };
        let msg = msg.unwrap_or("done.");
        if Level::Notify >= state.console.level {
            let line = if state.hanging {
                format!("{msg}\n")
            } else {
                format!("...{label}{msg}\n")
            };
            let _ = state.console.sink.write_all(line.as_bytes());
            let _ = state.console.sink.flush();
        }
        state.hanging = false;
        Ok(())
    }

    /// Tick: append a `.` to a progress line nothing else has interrupted.
    pub fn show_progress(&self) {
        let mut state = self.lock();
        if state.hanging {
            let _ = state.console.sink.write_all(b".");
            let _ = state.console.sink.flush();
        }
    }

    pub fn in_progress(&self) -> bool {
        self.lock().in_progress.is_some()
    }

    /// Indent every message by `by` more spaces until the guard drops.
    pub fn indent(&self, by: usize) -> IndentGuard<'_> {
        self.lock().indent += by;
        IndentGuard { logger: self, by }
    }
}

impl fmt::Debug for ProgressLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ProgressLogger")
            .field("console_level", &state.console.level)
            .field("indent", &state.indent)
            .field("in_progress", &state.in_progress)
            .finish_non_exhaustive()
    }
}

fn paint(level: Level, line: &str) -> String {
    match level {
        Level::Warn => Style::new().yellow().apply_to(line).to_string(),
        Level::Error | Level::Fatal => Style::new().red().bold().apply_to(line).to_string(),
        _ => line.to_owned(),
    }
}

#[must_use = "the indent is removed when the guard is dropped"]
pub struct IndentGuard<'a> {
    logger: &'a ProgressLogger,
    by: usize,
}

impl Drop for IndentGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.logger.lock();
        state.indent = state.indent.saturating_sub(self.by);
    }
}

/// Cloneable in-memory sink, for capturing logger output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(level: Level) -> (ProgressLogger, SharedBuffer) {
        let buf = SharedBuffer::new();
        (ProgressLogger::new(level, buf.clone()), buf)
    }

    #[test]
    fn verbosity_maps_and_clamps() {
        assert_eq!(Level::for_verbosity(-3), Level::Debug);
        assert_eq!(Level::for_verbosity(0), Level::Debug);
        assert_eq!(Level::for_verbosity(2), Level::Notify);
        assert_eq!(Level::for_verbosity(5), Level::Fatal);
        assert_eq!(Level::for_verbosity(40), Level::Fatal);
    }

    #[test]
    fn levels_are_ordered() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Notify);
        assert!(Level::Notify < Level::Warn);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn filters_below_console_level() {
        let (log, buf) = capture(Level::Notify);
        log.info("hidden");
        log.notify("shown");
        log.warn("also shown");
        assert_eq!(buf.contents(), "shown\nalso shown\n");
    }

    #[test]
    fn indent_applies_until_guard_drops() {
        let (log, buf) = capture(Level::Debug);
        {
            let _g = log.indent(2);
            log.info("nested");
        }
        log.info("flat");
        assert_eq!(buf.contents(), "  nested\nflat\n");
    }

    #[test]
    fn progress_ticks_on_a_hanging_line() {
        let (log, buf) = capture(Level::Notify);
        log.start_progress("Installing...").unwrap();
        log.show_progress();
        log.show_progress();
        log.end_progress(None).unwrap();
        assert_eq!(buf.contents(), "Installing.....done.\n");
    }

    #[test]
    fn progress_interrupted_by_message_repeats_label() {
        let (log, buf) = capture(Level::Notify);
        log.start_progress("Installing...").unwrap();
        log.notify("something happened");
        log.show_progress();
        log.end_progress(Some("ok")).unwrap();
        assert_eq!(
            buf.contents(),
            "Installing...\nsomething happened\n...Installing...ok\n"
        );
    }

    #[test]
    fn progress_is_silent_when_console_is_quiet() {
        let (log, buf) = capture(Level::Warn);
        log.start_progress("Installing...").unwrap();
        log.show_progress();
        log.end_progress(None).unwrap();
        assert!(buf.contents().is_empty());
    }

    #[test]
    fn progress_misuse_is_reported() {
        let (log, _buf) = capture(Level::Notify);
        assert!(log.end_progress(None).is_err());
        log.start_progress("a").unwrap();
        assert!(log.start_progress("b").is_err());
        assert!(log.in_progress());
    }

    #[test]
    fn extra_consumers_get_their_own_level() {
        let file = SharedBuffer::new();
        let (log, console) = capture(Level::Warn);
        let log = log.with_consumer(Level::Debug, file.clone());
        log.debug("detail");
        log.warn("careful");
        assert_eq!(console.contents(), "careful\n");
        assert_eq!(file.contents(), "detail\ncareful\n");
    }

    #[test]
    fn silent_logger_accepts_only_fatal() {
        let log = ProgressLogger::silent();
        assert!(!log.console_accepts(Level::Error));
        assert!(log.console_accepts(Level::Fatal));
    }
}
