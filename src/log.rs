//! The application logger handlers write through.
//!
//! Every request carries its own [`Logger`] handle (see
//! [`Request::logger`](crate::Request::logger)). Handles share one output
//! sink, but each has its own *header*: a template rendered in front of
//! every record. Middleware such as [`AppLogger`](crate::middleware::AppLogger)
//! replaces the header per request, so request metadata ends up on every
//! line the handler logs.
//!
//! The logger resolves a small set of tags itself:
//!
//! | Tag | Value |
//! |---|---|
//! | `time_rfc3339` | local time, second precision |
//! | `time_rfc3339_nano` | local time, nanosecond precision |
//! | `level` | `DEBUG`, `INFO`, `WARN`, `ERROR` |
//! | `prefix` | the logger prefix |
//! | `long_file` / `short_file` | source file of the log call |
//! | `line` | source line of the log call |
//!
//! Any other tag is written back unchanged.
//!
//! When the rendered header starts with `{` and ends in `}` it is treated as
//! a JSON object and the message is added as a `"message"` field. Otherwise
//! the message follows the header after a space.

use std::fmt;
use std::io::{self, Write};
use std::panic::Location;
use std::path::Path;
use std::sync::Arc;

use chrono::{Local, SecondsFormat};
use parking_lot::Mutex;
use tracing::warn;

use crate::tag::write_passthrough;
use crate::template::{CLOSE, OPEN, Template};

pub const DEFAULT_HEADER: &str = r#"{"time":"${time_rfc3339_nano}","level":"${level}","prefix":"${prefix}","file":"${short_file}","line":"${line}"}"#;

pub const DEFAULT_PREFIX: &str = "tagline";

/// Record severity. Records below the logger's level are discarded.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    /// Discards everything.
    Off,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info  => "INFO",
            Self::Warn  => "WARN",
            Self::Error => "ERROR",
            Self::Off   => "OFF",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

#[derive(Clone, Debug)]
enum Header {
    Template(Arc<Template>),
    /// A header that failed to compile; written as-is.
    Literal(Arc<str>),
}

impl Header {
    fn parse(source: &str) -> Self {
        match Template::new(source, OPEN, CLOSE) {
            Ok(t) => Self::Template(Arc::new(t)),
            Err(_) => Self::Literal(source.into()),
        }
    }
}

/// A handle to the application log.
///
/// Cloning is cheap and yields an independent handle writing to the same
/// sink; changing the header or level on one handle leaves the others alone.
#[derive(Clone)]
pub struct Logger {
    sink: Sink,
    level: Level,
    prefix: Arc<str>,
    header: Header,
}

impl Logger {
    /// A logger writing newline-terminated records to `writer`.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
            level: Level::Info,
            prefix: DEFAULT_PREFIX.into(),
            header: Header::parse(DEFAULT_HEADER),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_header(mut self, header: &str) -> Self {
        self.set_header(header);
        self
    }

    /// Replaces the header rendered in front of every record.
    ///
    /// Tags the logger does not know survive verbatim. A header with an
    /// unterminated tag is written literally rather than rejected.
    ///
    /// The message is merged into the header as a JSON field only when the
    /// rendered header looks like an object, first byte `{` and last byte
    /// `}`. `GET ${unknown}` stays text: `GET ${unknown} message`.
    ///
    /// `header` is compiled as a template, so it must not contain values
    /// taken from a request. Use [`set_header_template`](Self::set_header_template)
    /// for those.
    pub fn set_header(&mut self, header: &str) {
        self.header = Header::parse(header);
    }

    /// Replaces the header with an already compiled template.
    ///
    /// Only its tag segments are resolved; text segments are written as they
    /// are, even when they look like `${tag}`.
    pub fn set_header_template(&mut self, header: Template) {
        self.header = Header::Template(Arc::new(header));
    }

    pub fn header(&self) -> &str {
        match &self.header {
            Header::Template(t) => t.source(),
            Header::Literal(s) => s,
        }
    }

    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    pub fn level(&self) -> Level { self.level }
    pub fn prefix(&self) -> &str { &self.prefix }

    #[track_caller]
    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, &message, Location::caller());
    }

    #[track_caller]
    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, &message, Location::caller());
    }

    #[track_caller]
    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::Warn, &message, Location::caller());
    }

    #[track_caller]
    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, &message, Location::caller());
    }

    fn log(&self, level: Level, message: &dyn fmt::Display, caller: &Location<'_>) {
        if level < self.level {
            return;
        }

        let mut line = Vec::with_capacity(256);
        if let Err(e) = self.format(&mut line, level, message, caller) {
            warn!("failed to format log record: {e}");
            return;
        }

        // One lock per record keeps concurrent lines from interleaving.
        let mut sink = self.sink.lock();
        if let Err(e) = sink.write_all(&line).and_then(|()| sink.flush()) {
            warn!("failed to write log record: {e}");
        }
    }

    fn format(
        &self,
        out: &mut Vec<u8>,
        level: Level,
        message: &dyn fmt::Display,
        caller: &Location<'_>,
    ) -> io::Result<()> {
        match &self.header {
            Header::Template(t) => {
                t.execute(out, |w, tag| self.resolve(w, tag, level, caller))?;
            }
            Header::Literal(s) => out.extend_from_slice(s.as_bytes()),
        }

        if out.first() == Some(&b'{') && out.last() == Some(&b'}') {
            out.pop();
            if out.last() != Some(&b'{') {
                out.push(b',');
            }
            out.extend_from_slice(br#""message":"#);
            serde_json::to_writer(&mut *out, &message.to_string())?;
            out.push(b'}');
        } else {
            if !out.is_empty() {
                out.push(b' ');
            }
            write!(out, "{message}")?;
        }
        out.push(b'\n');
        Ok(())
    }

    fn resolve(
        &self,
        w: &mut Vec<u8>,
        tag: &str,
        level: Level,
        caller: &Location<'_>,
    ) -> io::Result<usize> {
        let start = w.len();
        match tag {
            "time_rfc3339" => {
                let now = Local::now().to_rfc3339_opts(SecondsFormat::Secs, true);
                w.extend_from_slice(now.as_bytes());
            }
            "time_rfc3339_nano" => {
                let now = Local::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
                w.extend_from_slice(now.as_bytes());
            }
            "level" => w.extend_from_slice(level.as_str().as_bytes()),
            "prefix" => w.extend_from_slice(self.prefix.as_bytes()),
            "long_file" => w.extend_from_slice(caller.file().as_bytes()),
            "short_file" => {
                let file = Path::new(caller.file())
                    .file_name()
                    .and_then(|f| f.to_str())
                    .unwrap_or(caller.file());
                w.extend_from_slice(file.as_bytes());
            }
            "line" => write!(w, "{}", caller.line())?,
            _ => {
                write_passthrough(w, tag)?;
            }
        }
        Ok(w.len() - start)
    }
}

impl Default for Logger {
    fn default() -> Self { Self::stdout() }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("prefix", &self.prefix)
            .field("header", &self.header())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Segment;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    impl Capture {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect()
        }
    }

    #[test]
    fn default_header_is_json_with_message() {
        let out = Capture::default();
        let logger = Logger::new(out.clone());
        logger.info("hello \"world\"");

        let lines = out.lines();
        assert_eq!(lines.len(), 1);
        let v: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(v["level"], "INFO");
        assert_eq!(v["prefix"], DEFAULT_PREFIX);
        assert_eq!(v["file"], "log.rs");
        assert_eq!(v["message"], "hello \"world\"");
        assert!(v["line"].as_str().unwrap().parse::<u32>().unwrap() > 0);
        assert!(chrono::DateTime::parse_from_rfc3339(v["time"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn text_header_gets_message_after_space() {
        let out = Capture::default();
        let logger = Logger::new(out.clone()).with_header("[${level}] ${prefix}").with_prefix("app");
        logger.warn("disk almost full");
        assert_eq!(out.lines(), ["[WARN] app disk almost full"]);
    }

    #[test]
    fn empty_header_is_just_the_message() {
        let out = Capture::default();
        Logger::new(out.clone()).with_header("").error("plain");
        assert_eq!(out.lines(), ["plain"]);
    }

    #[test]
    fn empty_object_header() {
        let out = Capture::default();
        Logger::new(out.clone()).with_header("{}").info("x");
        assert_eq!(out.lines(), [r#"{"message":"x"}"#]);
    }

    #[test]
    fn records_below_level_are_dropped() {
        let out = Capture::default();
        let logger = Logger::new(out.clone()).with_header("${level}");
        logger.debug("hidden");
        logger.info("shown");

        let mut quiet = logger.clone();
        quiet.set_level(Level::Off);
        quiet.error("also hidden");

        assert_eq!(out.lines(), ["INFO shown"]);
    }

    #[test]
    fn unknown_tags_pass_through() {
        let out = Capture::default();
        Logger::new(out.clone()).with_header("${status} ${level}").info("m");
        assert_eq!(out.lines(), ["${status} INFO m"]);
    }

    #[test]
    fn malformed_header_is_written_literally() {
        let out = Capture::default();
        let logger = Logger::new(out.clone()).with_header("id=${broken");
        assert_eq!(logger.header(), "id=${broken");
        logger.info("m");
        assert_eq!(out.lines(), ["id=${broken m"]);
    }

    #[test]
    fn text_header_ending_in_a_brace_stays_text() {
        let out = Capture::default();
        Logger::new(out.clone()).with_header("GET ${unknown}").info("m");
        assert_eq!(out.lines(), ["GET ${unknown} m"]);
    }

    #[test]
    fn template_header_text_is_not_resolved() {
        let out = Capture::default();
        let mut logger = Logger::new(out.clone());
        logger.set_header_template(Template::from_segments(
            [
                Segment::Text(r#"{"ua":"${prefix}","#.into()),
                Segment::Text(r#""raw":"a${b","level":""#.into()),
                Segment::Tag("level".into()),
                Segment::Text(r#""}"#.into()),
            ],
            OPEN,
            CLOSE,
        ));
        logger.warn("m");
        assert_eq!(
            out.lines(),
            [r#"{"ua":"${prefix}","raw":"a${b","level":"WARN","message":"m"}"#]
        );
    }

    #[test]
    fn clones_keep_their_own_header() {
        let out = Capture::default();
        let base = Logger::new(out.clone()).with_header("base");
        let mut scoped = base.clone();
        scoped.set_header("scoped");

        base.info("1");
        scoped.info("2");
        assert_eq!(out.lines(), ["base 1", "scoped 2"]);
    }

    #[test]
    fn caller_location_is_reported() {
        let out = Capture::default();
        let logger = Logger::new(out.clone()).with_header("${long_file}:${line}");
        let line = line!() + 1;
        logger.info("here");
        assert_eq!(out.lines(), [format!("{}:{line} here", file!())]);
    }
}
