use reqwest::header::CONTENT_DISPOSITION;
use soundtrack_model::{
    DownloadOutcome, DownloadResult, ResolutionError, Track, TrackFailure,
};
use soundtrack_parse::normalize;
use url::Url;

use crate::fetch::PageFetcher;
use crate::output::OutputContainer;
use crate::progress::{ProgressEvent, ProgressSink};

/// Download one resolved track into `container`.
///
/// Never fails as a whole: network, status and write errors all end up as
/// [`DownloadOutcome::Failed`] and leave no entry behind.
pub async fn download_track(
    fetcher: &PageFetcher,
    album: &str,
    track: &Track,
    container: &OutputContainer,
    progress: &dyn ProgressSink,
) -> DownloadResult {
    let outcome = match transfer(fetcher, album, track, container, progress).await {
        Ok((bytes, file_name)) => {
            tracing::info!(album, track = %track.title, file = %file_name, bytes, "Downloaded track");
            DownloadOutcome::Success { bytes, file_name }
        }
        Err(failure) => {
            tracing::warn!(album, track = %track.title, error = %failure, "Track download failed");
            DownloadOutcome::Failed(failure)
        }
    };

    progress.emit(ProgressEvent::TrackFinished {
        album: album.to_string(),
        ordinal: track.ordinal,
        success: matches!(outcome, DownloadOutcome::Success { .. }),
    });

    DownloadResult {
        ordinal: track.ordinal,
        title: track.title.clone(),
        outcome,
    }
}

async fn transfer(
    fetcher: &PageFetcher,
    album: &str,
    track: &Track,
    container: &OutputContainer,
    progress: &dyn ProgressSink,
) -> Result<(u64, String), TrackFailure> {
    let url = track
        .file_url
        .as_ref()
        .ok_or(ResolutionError::NoLinkFound)?;

    let mut download = fetcher.open_stream(url).await?;
    let file_name = entry_name(download.header(CONTENT_DISPOSITION), url, track.ordinal);

    let mut entry = container.begin_entry(track.ordinal, &file_name).await?;
    progress.emit(ProgressEvent::TrackStarted {
        album: album.to_string(),
        ordinal: track.ordinal,
        file_name: entry.name().to_string(),
        total_bytes: download.content_length(),
    });

    loop {
        let chunk = match download.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                entry.abort().await;
                return Err(e.into());
            }
        };
        if let Err(e) = entry.write(&chunk).await {
            entry.abort().await;
            return Err(e.into());
        }
        progress.emit(ProgressEvent::TrackProgress {
            album: album.to_string(),
            ordinal: track.ordinal,
            bytes: chunk.len() as u64,
        });
    }

    let name = entry.name().to_string();
    let bytes = entry.commit().await?;
    Ok((bytes, name))
}

/// File name for a downloaded track: the server's suggestion if it made one,
/// else the last segment of the file URL, else the zero-padded ordinal.
fn entry_name(disposition: Option<&str>, url: &Url, ordinal: usize) -> String {
    let from_url = normalize::last_segment(url);
    let fallback = match from_url.as_deref().and_then(normalize::extension) {
        Some(ext) => format!("{ordinal:02}.{ext}"),
        None => format!("{ordinal:02}"),
    };

    disposition
        .and_then(disposition_filename)
        .or(from_url)
        .map(|name| normalize::file_name(&name, &fallback))
        .unwrap_or(fallback)
}

/// `filename` (or RFC 5987 `filename*`) parameter of a Content-Disposition header.
fn disposition_filename(header: &str) -> Option<String> {
    header.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        let value = value.trim().trim_matches('"');
        let encoded = match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => value.split_once("''").map(|(_, v)| v)?,
            "filename" => value,
            _ => return None,
        };
        urlencoding::decode(encoded).ok().map(|name| name.into_owned())
    })
}
