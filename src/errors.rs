//! Error types for the feed generator.
//!
//! Each boundary gets its own enum. Only [`PipelineError::ListingUnavailable`]
//! and [`PipelineError::NoRecords`] abort a run; everything else is absorbed
//! at record granularity by the pipeline.

use thiserror::Error;

/// Errors raised by the fetch collaborator.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    /// Every attempt failed.
    #[error("failed to fetch {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: usize,
        last: String,
    },
}

/// Errors raised by the translation collaborator.
///
/// These never leave the translation stage; they only drive its retry loop.
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("translation backend responded with HTTP {0}")]
    Status(u16),

    #[error("unexpected translation response: {0}")]
    Malformed(String),
}

/// Errors raised while writing the cache file.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while turning command-line arguments into a [`crate::config::Config`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid base URL {url}: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Run-level and record-level pipeline failures.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The listing page could not be fetched. Aborts the run.
    #[error("listing unavailable: {0}")]
    ListingUnavailable(#[source] FetchError),

    /// The listing contained no usable records. Aborts the run.
    #[error("no papers found in listing")]
    NoRecords,

    /// A detail page could not be fetched. Degrades a single record.
    #[error("{0}")]
    Detail(#[from] FetchError),
}
