use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How an album's tracks are packaged on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// `<output>/<album>/<track>`
    #[default]
    Directory,
    /// `<output>/<album>.tar`
    Tar,
    /// `<output>/<album>.zip`
    Zip,
}

impl OutputFormat {
    /// File extension of the archive, `None` for plain directories.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            OutputFormat::Directory => None,
            OutputFormat::Tar => Some("tar"),
            OutputFormat::Zip => Some("zip"),
        }
    }
}

/// Settings for one batch run.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Pick the FLAC link over the MP3 link when a track offers both.
    pub prefer_lossless: bool,
    pub output_directory: PathBuf,
    pub output_format: OutputFormat,
    /// Albums processed at the same time.
    pub album_concurrency: usize,
    /// Track pages resolved / files downloaded at the same time, per album.
    pub track_concurrency: usize,
    /// Upper bound on simultaneous HTTP requests across all albums.
    pub max_connections: usize,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            prefer_lossless: false,
            output_directory: PathBuf::from("."),
            output_format: OutputFormat::Directory,
            album_concurrency: 2,
            track_concurrency: 4,
            max_connections: 8,
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("soundtrack/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
