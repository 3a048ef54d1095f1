use soundtrack_model::{ResolutionError, ResolvedLink};
use url::Url;

use crate::markup::Markup;
use crate::normalize;

/// Marker inside each direct download link on a track page.
const DOWNLOAD_LINK: &str = ".songDownloadLink";

const LOSSLESS: &[&str] = &["flac"];
const LOSSY: &[&str] = &["mp3", "m4a", "ogg", "opus", "aac"];

/// Pick the direct file link from a track's download page.
///
/// With `prefer_lossless` a FLAC link wins when there is one. Otherwise the
/// first lossy link is used, falling back to the lossless one when it is the
/// only link on the page.
pub fn resolve_track(
    page: &impl Markup,
    page_url: &Url,
    prefer_lossless: bool,
) -> Result<ResolvedLink, ResolutionError> {
    let mut lossless = None;
    let mut lossy = None;

    for href in page.extract_links(DOWNLOAD_LINK) {
        let Ok(url) = page_url.join(&href) else {
            tracing::debug!(href = %href, "Skipping unusable download link");
            continue;
        };
        let ext = normalize::last_segment(&url)
            .and_then(|name| normalize::extension(&name))
            .unwrap_or_default();
        if LOSSLESS.contains(&ext.as_str()) {
            lossless.get_or_insert(url);
        } else if LOSSY.contains(&ext.as_str()) {
            lossy.get_or_insert(url);
        } else {
            tracing::debug!(url = %url, "Ignoring link with unknown audio format");
        }
    }

    let pick = |url: Url, lossless: bool| ResolvedLink { url, lossless };
    match (lossless, lossy) {
        (Some(url), _) if prefer_lossless => Ok(pick(url, true)),
        (_, Some(url)) => Ok(pick(url, false)),
        (Some(url), None) => Ok(pick(url, true)),
        (None, None) => Err(ResolutionError::NoLinkFound),
    }
}
