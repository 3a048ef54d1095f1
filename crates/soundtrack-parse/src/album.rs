use regex::Regex;
use soundtrack_model::{Album, ParseError, Track};
use url::Url;

use crate::markup::Markup;
use crate::normalize;

/// Album title.
const TITLE: &str = "h2";
/// Cell holding the link to one track's download page.
const TRACK_CELL: &str = ".playlistDownloadSong";
/// Free-form album info ("Platforms: ...", "Number of Files: 12", ...).
const INFO_PARAGRAPH: &str = "p[align=left]";

/// Parse an album page into its name and ordered track list.
///
/// Track ordinals follow the order in which the page lists the tracks.
/// Fails when the title or the track listing is missing, which usually
/// means the site layout changed or `source_url` is not an album page.
pub fn parse_album(page: &impl Markup, source_url: &Url) -> Result<Album, ParseError> {
    let title = page.extract_text(TITLE).ok_or(ParseError::MissingTitle)?;
    let name = normalize::file_name(&title, "album");

    let tracks = page
        .extract_links(TRACK_CELL)
        .iter()
        .enumerate()
        .map(|(index, href)| {
            let detail_url = source_url
                .join(href)
                .map_err(|_| ParseError::BadLink(href.clone()))?;
            let ordinal = index + 1;
            Ok(Track::new(ordinal, track_title(&detail_url, ordinal), detail_url))
        })
        .collect::<Result<Vec<_>, ParseError>>()?;

    if tracks.is_empty() {
        return Err(ParseError::NoTracks);
    }

    let listed_count = listed_count(page);
    match listed_count {
        Some(listed) if listed != tracks.len() => {
            tracing::warn!(
                album = %name,
                listed,
                found = tracks.len(),
                "Track count differs from album info"
            );
        }
        Some(_) => {}
        None => tracing::debug!(album = %name, "No track count in album info"),
    }

    Ok(Album {
        source_url: source_url.clone(),
        name,
        tracks,
        listed_count,
    })
}

/// Title for a track, taken from its detail-page URL.
fn track_title(detail_url: &Url, ordinal: usize) -> String {
    let fallback = format!("Track {ordinal:02}");
    match normalize::last_segment(detail_url) {
        Some(segment) => normalize::file_name(normalize::strip_extension(&segment), &fallback),
        None => fallback,
    }
}

/// "Number of Files: N" from the album info paragraph.
fn listed_count(page: &impl Markup) -> Option<usize> {
    let re = Regex::new(r"Number of Files:\s*(\d+)").expect("valid regex");
    page.extract_by_marker(INFO_PARAGRAPH)
        .iter()
        .find_map(|text| re.captures(text))
        .and_then(|caps| caps[1].parse().ok())
}
