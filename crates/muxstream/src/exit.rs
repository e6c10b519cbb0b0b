use std::fmt;
use std::io;

use muxstream_client::{ConfigError, StreamError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const CONNECTION_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => USAGE,
        io::ErrorKind::TimedOut => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn stream_error(context: &str, err: StreamError) -> CliError {
    let code = match &err {
        StreamError::ConnectionTimeout(_) | StreamError::RequestTimeout(_) => TIMEOUT,
        StreamError::Connection(_) => CONNECTION_ERROR,
        // Encoding failures carry their frame error; server rejections do not.
        StreamError::Generic { cause: Some(_), .. } => DATA_INVALID,
        StreamError::Generic { cause: None, .. } => FAILURE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn config_error(err: ConfigError) -> CliError {
    match err {
        ConfigError::Read { source, path } => io_error(&format!("failed to read {path}"), source),
        ConfigError::Json(_) => CliError::new(DATA_INVALID, err.to_string()),
        ConfigError::Unsupported(_) => CliError::usage(err.to_string()),
    }
}
