use futures::stream::{self, StreamExt};
use soundtrack_model::{
    Album, AlbumError, AlbumSummary, DownloadConfig, ParseError, ResolutionError, Track, TrackReport,
    TrackStatus,
};
use url::Url;

use crate::fetch::PageFetcher;
use crate::output::ContainerSpec;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::worker;

/// Download one album end to end.
///
/// Only a failure to fetch or parse the album page (or to write its output
/// container) fails the album; every track failure is recorded in its
/// [`TrackReport`] and the remaining tracks carry on. Track reports come back
/// in page order whatever order the downloads finish in.
pub async fn download_album(
    fetcher: &PageFetcher,
    config: &DownloadConfig,
    url: &str,
    progress: &dyn ProgressSink,
) -> AlbumSummary {
    match fetch_album(fetcher, url).await {
        Ok(album) => {
            let output_name = album.name.clone();
            download_tracks(fetcher, config, url, album, &output_name, progress).await
        }
        Err(summary) => summary,
    }
}

/// Fetch and parse an album page. A failure comes back as the album's
/// final summary.
pub(crate) async fn fetch_album(fetcher: &PageFetcher, url: &str) -> Result<Album, AlbumSummary> {
    let Ok(source_url) = Url::parse(url) else {
        tracing::error!(url, "Not a valid album URL");
        return Err(AlbumSummary::failed(url, None, ParseError::BadLink(url.to_string()).into()));
    };

    tracing::info!(url = %source_url, "Fetching album page");
    let html = match fetcher.fetch(&source_url).await {
        Ok(html) => html,
        Err(e) => {
            tracing::error!(url, error = %e, "Could not fetch album page");
            return Err(AlbumSummary::failed(url, None, e.into()));
        }
    };
    match soundtrack_parse::album_from_html(&html, &source_url) {
        Ok(album) => {
            tracing::info!(album = %album.name, tracks = album.tracks.len(), "Parsed album page");
            Ok(album)
        }
        Err(e) => {
            tracing::error!(url, error = %e, "Could not parse album page");
            Err(AlbumSummary::failed(url, None, e.into()))
        }
    }
}

/// Resolve and download every track of a parsed album into the output
/// called `name`, which may differ from the album's own name.
pub(crate) async fn download_tracks(
    fetcher: &PageFetcher,
    config: &DownloadConfig,
    url: &str,
    album: Album,
    name: &str,
    progress: &dyn ProgressSink,
) -> AlbumSummary {
    let jobs = config.track_concurrency.max(1);
    progress.emit(ProgressEvent::AlbumStarted {
        album: name.to_string(),
        tracks: album.tracks.len(),
    });

    let resolved: Vec<Result<Track, (Track, ResolutionError)>> = stream::iter(album.tracks.iter().cloned())
        .map(|track| resolve(fetcher, track, config.prefer_lossless))
        .buffered(jobs)
        .collect()
        .await;

    let spec = ContainerSpec::new(config.output_format, &config.output_directory, name);
    let container = match spec.open() {
        Ok(container) => container,
        Err(e) => {
            tracing::error!(album = name, error = %e, "Could not open output");
            progress.emit(ProgressEvent::AlbumFinished { album: name.to_string() });
            return AlbumSummary::failed(url, Some(album.name.clone()), AlbumError::Sink(e));
        }
    };

    let container_ref = &container;
    let mut tracks: Vec<TrackReport> = stream::iter(resolved)
        .map(|resolution| async move {
            match resolution {
                Ok(track) => {
                    let result =
                        worker::download_track(fetcher, name, &track, container_ref, progress).await;
                    TrackReport::from_download(&track, result)
                }
                Err((track, err)) => {
                    progress.emit(ProgressEvent::TrackFinished {
                        album: name.to_string(),
                        ordinal: track.ordinal,
                        success: false,
                    });
                    TrackReport::resolution_failed(&track, err)
                }
            }
        })
        .buffered(jobs)
        .collect()
        .await;

    let (output, error) = match container.close().await {
        Ok(closed) => {
            tracing::info!(album = name, path = %closed.path.display(), "Album output complete");
            for report in &mut tracks {
                if let (TrackStatus::Downloaded { file_name, .. }, Some(settled)) =
                    (&mut report.status, closed.names.get(&report.ordinal))
                {
                    file_name.clone_from(settled);
                }
            }
            (Some(closed.path), None)
        }
        Err(e) => {
            tracing::error!(album = name, error = %e, "Could not finalize album output");
            (None, Some(AlbumError::Sink(e)))
        }
    };
    progress.emit(ProgressEvent::AlbumFinished { album: name.to_string() });

    let summary = AlbumSummary {
        url: url.to_string(),
        name: Some(album.name.clone()),
        output,
        tracks,
        error,
    };
    tracing::info!(
        album = name,
        succeeded = summary.succeeded(),
        resolution_failed = summary.resolution_failed(),
        download_failed = summary.download_failed(),
        "Album finished"
    );
    summary
}

/// Fetch a track's page and pick its file link.
async fn resolve(
    fetcher: &PageFetcher,
    track: Track,
    prefer_lossless: bool,
) -> Result<Track, (Track, ResolutionError)> {
    let html = match fetcher.fetch(&track.detail_url).await {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!(track = %track.title, error = %e, "Could not fetch track page");
            return Err((track, e.into()));
        }
    };
    match soundtrack_parse::link_from_html(&html, &track.detail_url, prefer_lossless) {
        Ok(link) => {
            tracing::debug!(track = %track.title, url = %link.url, lossless = link.lossless, "Resolved track");
            Ok(track.resolved(link))
        }
        Err(e) => {
            tracing::warn!(track = %track.title, error = %e, "Could not resolve track");
            Err((track, e))
        }
    }
}
