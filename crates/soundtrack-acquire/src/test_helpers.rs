//! Fake archive site served by wiremock.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// How a fake track behaves when the pipeline asks for it.
#[derive(Clone, Copy)]
pub(crate) enum FakeTrack {
    /// Track page offers an MP3 link serving `body`.
    Mp3(&'static [u8]),
    /// Track page offers MP3 and FLAC links; the FLAC file serves the second body.
    Both(&'static [u8], &'static [u8]),
    /// Track page has no download links.
    NoLink,
    /// Track page links an MP3 that answers 404.
    MissingFile,
    /// Track page itself answers 500.
    BrokenPage,
}

fn encode(name: &str) -> String {
    name.replace(' ', "%20")
}

async fn mount(server: &MockServer, at: String, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(response)
        .mount(server)
        .await;
}

pub(crate) fn album_html(title: &str, track_hrefs: &[String]) -> String {
    let rows: String = track_hrefs
        .iter()
        .map(|href| {
            format!(
                r#"<tr><td class="clickable-row"><a href="{href}">x</a></td>
                <td class="playlistDownloadSong"><a href="{href}"><i class="material-icons">get_app</i></a></td></tr>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><div id="pageContent"><h2>{title}</h2>
        <p align="left">Number of Files: <b>{}</b><br></p>
        <table id="songlist">{rows}</table></div></body></html>"#,
        track_hrefs.len()
    )
}

pub(crate) fn track_html(file_hrefs: &[String]) -> String {
    let links: String = file_hrefs
        .iter()
        .map(|href| {
            format!(r#"<p><a href="{href}"><span class="songDownloadLink">Download</span></a></p>"#)
        })
        .collect();
    format!(r#"<html><body><div id="pageContent">{links}</div></body></html>"#)
}

/// Serve an album `slug` titled `title` with the given tracks and return its URL.
///
/// Track pages live under `/album/<slug>/` with double-encoded names, files
/// under `/files/<slug>/`, mirroring the real site.
pub(crate) async fn mount_album(
    server: &MockServer,
    slug: &str,
    title: &str,
    tracks: &[(&str, FakeTrack)],
) -> String {
    let mut hrefs = Vec::new();
    for (name, behaviour) in tracks {
        let page_path = format!("/album/{slug}/{}.mp3", name.replace(' ', "%2520"));
        let mp3_path = format!("/files/{slug}/{}.mp3", encode(name));
        let flac_path = format!("/files/{slug}/{}.flac", encode(name));
        hrefs.push(page_path.clone());

        match *behaviour {
            FakeTrack::Mp3(body) => {
                mount(server, page_path, ResponseTemplate::new(200).set_body_string(track_html(&[mp3_path.clone()]))).await;
                mount(server, mp3_path, ResponseTemplate::new(200).set_body_bytes(body)).await;
            }
            FakeTrack::Both(mp3, flac) => {
                let page = track_html(&[mp3_path.clone(), flac_path.clone()]);
                mount(server, page_path, ResponseTemplate::new(200).set_body_string(page)).await;
                mount(server, mp3_path, ResponseTemplate::new(200).set_body_bytes(mp3)).await;
                mount(server, flac_path, ResponseTemplate::new(200).set_body_bytes(flac)).await;
            }
            FakeTrack::NoLink => {
                mount(server, page_path, ResponseTemplate::new(200).set_body_string(track_html(&[]))).await;
            }
            FakeTrack::MissingFile => {
                mount(server, page_path, ResponseTemplate::new(200).set_body_string(track_html(&[mp3_path.clone()]))).await;
                mount(server, mp3_path, ResponseTemplate::new(404)).await;
            }
            FakeTrack::BrokenPage => {
                mount(server, page_path, ResponseTemplate::new(500)).await;
            }
        }
    }

    let album_path = format!("/album/{slug}");
    mount(server, album_path.clone(), ResponseTemplate::new(200).set_body_string(album_html(title, &hrefs))).await;
    format!("{}{album_path}", server.uri())
}
