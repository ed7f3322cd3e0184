//! Unified error type.

use thiserror::Error;

use crate::template::TemplateError;

/// The error type returned by tagline's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: a bad configuration, a malformed log template,
/// binding to a port, or a write into a log buffer failing mid-request.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("template: {0}")]
    Template(#[from] TemplateError),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
