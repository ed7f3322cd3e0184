//! Placeholder templates.
//!
//! A format string such as `{"id":"${id}","uri":"${uri}"}` is compiled once
//! into an ordered list of literal and tag segments. Executing the template
//! writes the literals straight into the sink and hands every tag name to a
//! caller-supplied closure, which writes whatever the tag stands for.
//!
//! The template knows nothing about what tags mean. Meaning lives in
//! [`tag`](crate::tag) (request tags) and [`log`](crate::log) (logger tags).

use std::io::{self, Write};

use thiserror::Error;

/// Opening delimiter used by every template tagline compiles.
pub const OPEN: &str = "${";
/// Closing delimiter used by every template tagline compiles.
pub const CLOSE: &str = "}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// An opening delimiter with no closing delimiter after it.
    #[error("unterminated tag starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("tag delimiters must not be empty")]
    EmptyDelimiter,
}

/// One piece of a compiled template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Written as-is.
    Text(String),
    /// Handed to the resolver by name.
    Tag(String),
}

/// A compiled format string.
///
/// Immutable once built and `Send + Sync`, so a single instance can be shared
/// by every request a server handles.
#[derive(Clone, Debug)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Compiles `source`, splitting it on `open` … `close` pairs.
    ///
    /// Everything between the delimiters is the tag name, taken verbatim
    /// (no trimming, no escaping). Fails only when an `open` is never closed.
    pub fn new(source: &str, open: &str, close: &str) -> Result<Self, TemplateError> {
        if open.is_empty() || close.is_empty() {
            return Err(TemplateError::EmptyDelimiter);
        }

        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find(open) {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_owned()));
            }
            let after_open = &rest[start + open.len()..];
            let Some(end) = after_open.find(close) else {
                return Err(TemplateError::Unterminated { offset: offset + start });
            };
            segments.push(Segment::Tag(after_open[..end].to_owned()));

            let consumed = start + open.len() + end + close.len();
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_owned()));
        }

        Ok(Self { source: source.to_owned(), segments })
    }

    /// Assembles a template from segments that are already split.
    ///
    /// Text segments are never scanned for delimiters, so they may hold
    /// anything, `${` included. Adjacent text is merged and empty text
    /// dropped. The source is rebuilt with `open` and `close` around each tag.
    pub fn from_segments(
        segments: impl IntoIterator<Item = Segment>,
        open: &str,
        close: &str,
    ) -> Self {
        let mut source = String::new();
        let mut merged: Vec<Segment> = Vec::new();

        for segment in segments {
            match segment {
                Segment::Text(text) if text.is_empty() => {}
                Segment::Text(text) => {
                    source.push_str(&text);
                    match merged.last_mut() {
                        Some(Segment::Text(prev)) => prev.push_str(&text),
                        _ => merged.push(Segment::Text(text)),
                    }
                }
                Segment::Tag(name) => {
                    source.push_str(open);
                    source.push_str(&name);
                    source.push_str(close);
                    merged.push(Segment::Tag(name));
                }
            }
        }

        Self { source, segments: merged }
    }

    /// The format string this template was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Writes the template into `w`, calling `resolve` once per tag.
    ///
    /// `resolve` receives the same sink and must return how many bytes it
    /// wrote. Returns the total number of bytes written. The first error
    /// from either the sink or `resolve` aborts the render.
    pub fn execute<W, F>(&self, w: &mut W, mut resolve: F) -> io::Result<usize>
    where
        W: Write + ?Sized,
        F: FnMut(&mut W, &str) -> io::Result<usize>,
    {
        let mut written = 0;
        for segment in &self.segments {
            written += match segment {
                Segment::Text(text) => {
                    w.write_all(text.as_bytes())?;
                    text.len()
                }
                Segment::Tag(tag) => resolve(w, tag)?,
            };
        }
        Ok(written)
    }
}
