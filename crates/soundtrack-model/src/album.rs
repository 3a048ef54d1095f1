use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TrackFailure;

/// An album as listed on its source page.
///
/// Built once by the album parser and never mutated afterwards; resolution
/// fills in each track's file link on a copy owned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub source_url: Url,
    /// Display name, already normalized for use as a file name.
    pub name: String,
    /// Tracks in the order the source page lists them.
    pub tracks: Vec<Track>,
    /// Track count announced by the page's info paragraph, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listed_count: Option<usize>,
}

/// One track of an album.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    /// 1-based position on the source page.
    pub ordinal: usize,
    pub title: String,
    /// The per-track page that carries the actual download links.
    pub detail_url: Url,
    /// Direct file link, present once resolution succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<Url>,
    /// Whether `file_url` points at the lossless encoding.
    #[serde(default)]
    pub lossless: bool,
}

impl Track {
    pub fn new(ordinal: usize, title: impl Into<String>, detail_url: Url) -> Self {
        Self {
            ordinal,
            title: title.into(),
            detail_url,
            file_url: None,
            lossless: false,
        }
    }

    /// Record the outcome of resolution. Called once per track.
    pub fn resolved(mut self, link: ResolvedLink) -> Self {
        self.file_url = Some(link.url);
        self.lossless = link.lossless;
        self
    }
}

/// A direct file link chosen from a track's detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub url: Url,
    pub lossless: bool,
}

/// Outcome of downloading a single track.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub ordinal: usize,
    pub title: String,
    pub outcome: DownloadOutcome,
}

#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    Success { bytes: u64, file_name: String },
    Failed(TrackFailure),
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DownloadOutcome::Success { .. })
    }
}
