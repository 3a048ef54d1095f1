use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single HTTP request.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// The album page did not have the structure we expect.
///
/// Usually means the site layout changed or the URL is not an album page.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ParseError {
    #[error("album title not found")]
    MissingTitle,

    #[error("no track links found")]
    NoTracks,

    #[error("unusable link '{0}'")]
    BadLink(String),
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ResolutionError {
    #[error("could not fetch track page: {0}")]
    Fetch(#[from] FetchError),

    #[error("no download link found on track page")]
    NoLinkFound,
}

/// Writing into an output container failed.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("archive error: {0}")]
    Archive(String),
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Io(err.to_string())
    }
}

/// Why one track ended up without output. Recorded, never escalated.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TrackFailure {
    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("write failed: {0}")]
    Sink(#[from] SinkError),
}

impl TrackFailure {
    /// Short reason category for the final report.
    pub fn category(&self) -> &'static str {
        match self {
            TrackFailure::Resolution(ResolutionError::NoLinkFound) => "no-link",
            TrackFailure::Resolution(ResolutionError::Fetch(e)) | TrackFailure::Fetch(e) => {
                e.category()
            }
            TrackFailure::Sink(_) => "sink",
        }
    }
}

impl FetchError {
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Timeout(_) => "timeout",
            FetchError::HttpStatus { .. } => "http-status",
        }
    }
}

/// Failure that aborts a whole album (but never its siblings).
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AlbumError {
    #[error("could not fetch album page: {0}")]
    Fetch(#[from] FetchError),

    #[error("could not parse album page: {0}")]
    Parse(#[from] ParseError),

    #[error("could not write album output: {0}")]
    Sink(#[from] SinkError),
}
