use unicode_normalization::UnicodeNormalization;
use url::Url;

/// Characters that are path separators or illegal in file names on at
/// least one common filesystem.
const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Turn page text into a name usable as a single path component.
///
/// Normalizes to NFC so the same album title always produces the same bytes
/// on disk, collapses whitespace, and replaces forbidden characters with `_`.
/// Returns `fallback` when nothing usable is left.
pub fn file_name(input: &str, fallback: &str) -> String {
    let nfc: String = input.nfc().collect();
    let cleaned: String = nfc
        .chars()
        .map(|c| {
            if FORBIDDEN.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// The last path segment of `url`, percent-decoded.
///
/// The archive double-encodes track paths (`%2520` for a space), so decoding
/// is repeated until the text stops changing.
pub fn last_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let mut decoded = segment.to_string();
    for _ in 0..2 {
        match urlencoding::decode(&decoded) {
            Ok(next) if next != decoded => decoded = next.into_owned(),
            _ => break,
        }
    }
    Some(decoded)
}

/// Lowercased extension of `name`, if it has a short alphanumeric one.
pub fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}

/// `name` without its extension.
pub fn strip_extension(name: &str) -> &str {
    match (extension(name), name.rsplit_once('.')) {
        (Some(_), Some((stem, _))) if !stem.is_empty() => stem,
        _ => name,
    }
}
