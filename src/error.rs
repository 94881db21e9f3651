use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error type covering the failure cases of a ledger run.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails outside of a named file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file is absent.
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but is not a JSON object of the expected shape.
    #[error("malformed config file {path}: {source}")]
    ConfigMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A key needed by the requested command is not set.
    #[error("missing required config key `{0}`")]
    MissingConfigKey(&'static str),

    /// The price cache exists but could not be parsed.
    #[error("invalid price file {path}: {source}")]
    PriceFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Transport-level HTTP failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A remote API answered with a non-success status or an unexpected body.
    #[error("{api} request failed: {message}")]
    Api { api: &'static str, message: String },

    /// The steamcmd license dump did not have the expected shape.
    #[error("license dump line {line}: {message}")]
    LicenseParse { line: usize, message: String },

    /// A built-in pattern failed to compile.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// The external license tool could not be run.
    #[error("failed to run {program}: {message}")]
    Process { program: String, message: String },

    /// A reconciled record lacks a field needed to build its row.
    #[error("record `{name}` is missing {field}")]
    Record { name: String, field: &'static str },

    /// The prompt input stream ended while a price was still required.
    #[error("input closed while waiting for the price of `{0}`")]
    PromptClosed(String),

    /// Service-account credentials could not be loaded or exchanged.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// JWT signing failure while building the service-account assertion.
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Errors bubbled up from the CSV writer.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
