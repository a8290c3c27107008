//! Error types for every stage of the digest pipeline.
//!
//! The pipeline distinguishes these failure classes:
//!
//! | Class | Type | Effect |
//! |-------|------|--------|
//! | Configuration | [`ConfigError`] | Fatal, raised before any side effect |
//! | Persistence | [`StoreError`] | Fatal for the run |
//! | Source index | [`SourceError`] | Logged, the source yields no new items |
//! | Backend transport | [`BackendError`] | Fatal for the run |
//! | Per-item decode | [`DecodeError`] | Logged, the item is skipped |
//!
//! [`PipelineError`] is the envelope returned by the orchestrating stages.

use thiserror::Error;

/// Invalid or incomplete run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(&'static str),

    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Failures of the persistent state layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not initialized; call Store::init first")]
    NotInitialized,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Failures retrieving or parsing a source's sitemap.
///
/// Always recovered: the source contributes no new items for this run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("index returned status {0}")]
    Status(u16),

    #[error("index is not a valid sitemap: {0}")]
    Parse(#[from] quick_xml::DeError),
}

/// Transport-level failures talking to a text-generation backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend response had no completion choices")]
    EmptyResponse,
}

/// Reasons a generated answer could not be turned into a summary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("response JSON is truncated")]
    Truncated,

    #[error("response is not a JSON object: {0}")]
    Malformed(String),

    #[error("response is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("backend declared an error: {0}")]
    Declared(String),
}

/// Failure of a single extraction call.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Fatal errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}
