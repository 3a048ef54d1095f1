use scraper::{ElementRef, Html, Selector};

/// What the album and track parsers need from a parsed page.
///
/// A `marker` is a CSS selector naming the structural element of interest
/// (`h2`, `.playlistDownloadSong`, ...). Parsers only ever talk to this
/// trait, never to the HTML tree itself.
pub trait Markup {
    /// Whitespace-collapsed text of the first element matching `marker`.
    fn extract_text(&self, marker: &str) -> Option<String>;

    /// `href` values of the links associated with each element matching
    /// `marker`, in document order.
    ///
    /// A marked element inside a link contributes that link; otherwise every
    /// link nested inside the marked element is returned.
    fn extract_links(&self, marker: &str) -> Vec<String>;

    /// Trimmed text of every element matching `marker`, in document order.
    fn extract_by_marker(&self, marker: &str) -> Vec<String>;
}

/// A page parsed with `scraper`.
///
/// Not `Send`: build it, extract what you need, and drop it before the
/// next `.await`.
pub struct HtmlPage {
    document: Html,
}

impl HtmlPage {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }
}

fn selector(marker: &str) -> Option<Selector> {
    match Selector::parse(marker) {
        Ok(sel) => Some(sel),
        Err(e) => {
            tracing::warn!(marker, error = ?e, "Invalid marker selector");
            None
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The `href` of `element` itself or of its closest enclosing `<a>`.
fn enclosing_href<'a>(element: ElementRef<'a>) -> Option<&'a str> {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find(|e| e.value().name() == "a")
        .and_then(|a| a.value().attr("href"))
}

impl Markup for HtmlPage {
    fn extract_text(&self, marker: &str) -> Option<String> {
        let sel = selector(marker)?;
        let element = self.document.select(&sel).next()?;
        let text = collapse_whitespace(&element.text().collect::<String>());
        (!text.is_empty()).then_some(text)
    }

    fn extract_links(&self, marker: &str) -> Vec<String> {
        let Some(sel) = selector(marker) else {
            return Vec::new();
        };
        let anchor = Selector::parse("a[href]").expect("valid selector");

        let mut links = Vec::new();
        for element in self.document.select(&sel) {
            if let Some(href) = enclosing_href(element) {
                links.push(href.to_string());
                continue;
            }
            links.extend(
                element
                    .select(&anchor)
                    .filter_map(|a| a.value().attr("href"))
                    .map(str::to_string),
            );
        }
        links
    }

    fn extract_by_marker(&self, marker: &str) -> Vec<String> {
        let Some(sel) = selector(marker) else {
            return Vec::new();
        };
        self.document
            .select(&sel)
            .map(|e| e.text().collect::<String>().trim().to_string())
            .collect()
    }
}
