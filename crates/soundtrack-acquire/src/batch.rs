use chrono::Utc;
use futures::stream::{self, StreamExt};
use soundtrack_model::{BatchReport, DownloadConfig};
use std::collections::HashSet;

use crate::album::{download_tracks, fetch_album};
use crate::fetch::PageFetcher;
use crate::progress::ProgressSink;

/// Download every album in `urls`, up to `album_concurrency` at a time.
///
/// Albums are independent: one failing, even entirely, has no effect on the
/// others. All album pages are parsed first so that every album gets its own
/// output before any track is written; albums whose names would share an
/// output get a ` (2)`, ` (3)`, ... suffix in input order. The report lists
/// albums in the order of `urls`.
pub async fn download_albums(
    fetcher: &PageFetcher,
    config: &DownloadConfig,
    urls: &[String],
    progress: &dyn ProgressSink,
) -> BatchReport {
    let started_at = Utc::now();
    let jobs = config.album_concurrency.max(1);
    tracing::info!(
        albums = urls.len(),
        format = ?config.output_format,
        output = %config.output_directory.display(),
        "Starting batch"
    );

    let pages: Vec<_> = stream::iter(urls)
        .map(|url| fetch_album(fetcher, url))
        .buffered(jobs)
        .collect()
        .await;

    let mut claimed = HashSet::new();
    let planned: Vec<_> = urls
        .iter()
        .zip(pages)
        .map(|(url, page)| {
            page.map(|album| {
                let output_name = claim_output_name(&mut claimed, &album.name);
                (url, album, output_name)
            })
        })
        .collect();

    let albums = stream::iter(planned)
        .map(|plan| async move {
            match plan {
                Ok((url, album, output_name)) => {
                    download_tracks(fetcher, config, url, album, &output_name, progress).await
                }
                Err(summary) => summary,
            }
        })
        .buffered(jobs)
        .collect()
        .await;

    let report = BatchReport {
        started_at,
        finished_at: Utc::now(),
        albums,
    };
    tracing::info!(
        albums = report.albums.len(),
        failed = report.failed_albums().count(),
        "Batch finished"
    );
    report
}

/// Reserve an output name for `name` that no earlier album of the batch
/// uses. Names are compared ignoring case.
fn claim_output_name(claimed: &mut HashSet<String>, name: &str) -> String {
    let mut candidate = name.to_string();
    let mut n = 2;
    while !claimed.insert(candidate.to_lowercase()) {
        candidate = format!("{name} ({n})");
        n += 1;
    }
    if candidate != name {
        tracing::warn!(album = name, output = %candidate, "Album output name already used in this batch");
    }
    candidate
}
