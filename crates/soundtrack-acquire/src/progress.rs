/// Progress notifications emitted while albums download.
///
/// The pipeline only reports; rendering is up to whoever implements
/// [`ProgressSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    AlbumStarted {
        album: String,
        tracks: usize,
    },
    TrackStarted {
        album: String,
        ordinal: usize,
        file_name: String,
        total_bytes: Option<u64>,
    },
    /// `bytes` more bytes of the track were written.
    TrackProgress {
        album: String,
        ordinal: usize,
        bytes: u64,
    },
    TrackFinished {
        album: String,
        ordinal: usize,
        success: bool,
    },
    AlbumFinished {
        album: String,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}
