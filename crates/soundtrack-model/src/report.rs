use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::album::{DownloadOutcome, DownloadResult, Track};
use crate::error::{AlbumError, ResolutionError, TrackFailure};

/// Final state of one track within an album run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackReport {
    pub ordinal: usize,
    pub title: String,
    pub status: TrackStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackStatus {
    Downloaded {
        bytes: u64,
        file_name: String,
        lossless: bool,
    },
    ResolutionFailed { reason: TrackFailure },
    DownloadFailed { reason: TrackFailure },
}

impl TrackReport {
    pub fn resolution_failed(track: &Track, err: ResolutionError) -> Self {
        Self {
            ordinal: track.ordinal,
            title: track.title.clone(),
            status: TrackStatus::ResolutionFailed { reason: err.into() },
        }
    }

    pub fn from_download(track: &Track, result: DownloadResult) -> Self {
        let status = match result.outcome {
            DownloadOutcome::Success { bytes, file_name } => TrackStatus::Downloaded {
                bytes,
                file_name,
                lossless: track.lossless,
            },
            DownloadOutcome::Failed(reason) => TrackStatus::DownloadFailed { reason },
        };
        Self {
            ordinal: result.ordinal,
            title: result.title,
            status,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self.status, TrackStatus::Downloaded { .. })
    }

    /// The failure behind this track, if it has one.
    pub fn failure(&self) -> Option<&TrackFailure> {
        match &self.status {
            TrackStatus::Downloaded { .. } => None,
            TrackStatus::ResolutionFailed { reason } | TrackStatus::DownloadFailed { reason } => {
                Some(reason)
            }
        }
    }
}

/// Everything that happened to one album.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumSummary {
    pub url: String,
    /// Album name, known once the album page was parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Directory or archive the album was written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Per-track outcomes in source page order.
    pub tracks: Vec<TrackReport>,
    /// Set when the album as a whole could not be processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AlbumError>,
}

impl AlbumSummary {
    pub fn failed(url: impl Into<String>, name: Option<String>, error: AlbumError) -> Self {
        Self {
            url: url.into(),
            name,
            output: None,
            tracks: Vec::new(),
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_downloaded()).count()
    }

    pub fn resolution_failed(&self) -> usize {
        self.tracks
            .iter()
            .filter(|t| matches!(t.status, TrackStatus::ResolutionFailed { .. }))
            .count()
    }

    pub fn download_failed(&self) -> usize {
        self.tracks
            .iter()
            .filter(|t| matches!(t.status, TrackStatus::DownloadFailed { .. }))
            .count()
    }

    /// True when the album page was processed and every track was written.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.tracks.iter().all(TrackReport::is_downloaded)
    }

    /// Name for display: the album name if known, else its URL.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

/// Aggregated outcome of a batch of albums, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub albums: Vec<AlbumSummary>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.albums.iter().all(AlbumSummary::is_complete)
    }

    pub fn failed_albums(&self) -> impl Iterator<Item = &AlbumSummary> {
        self.albums.iter().filter(|a| !a.is_complete())
    }
}
