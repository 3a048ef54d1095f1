//! Pure extraction of album and track data from archive pages.
//!
//! Nothing here touches the network: callers fetch the HTML and hand it in.

use soundtrack_model::{Album, ParseError, ResolutionError, ResolvedLink};
use url::Url;

pub mod album;
pub mod markup;
pub mod normalize;
pub mod resolve;

pub use album::parse_album;
pub use markup::{HtmlPage, Markup};
pub use resolve::resolve_track;

/// Parse raw album page HTML. See [`parse_album`].
pub fn album_from_html(html: &str, source_url: &Url) -> Result<Album, ParseError> {
    parse_album(&HtmlPage::parse(html), source_url)
}

/// Resolve the file link from raw track page HTML. See [`resolve_track`].
pub fn link_from_html(
    html: &str,
    page_url: &Url,
    prefer_lossless: bool,
) -> Result<ResolvedLink, ResolutionError> {
    resolve_track(&HtmlPage::parse(html), page_url, prefer_lossless)
}
