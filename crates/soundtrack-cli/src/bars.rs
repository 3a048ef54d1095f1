use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use soundtrack_acquire::{ProgressEvent, ProgressSink};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

/// Renders pipeline progress as one bar per album plus one per active track.
pub struct ProgressBars {
    multi: MultiProgress,
    albums: Mutex<HashMap<String, ProgressBar>>,
    tracks: Mutex<HashMap<(String, usize), ProgressBar>>,
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProgressBars {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            albums: Mutex::new(HashMap::new()),
            tracks: Mutex::new(HashMap::new()),
        }
    }

    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

/// Log output on stderr. With bars on screen each line is printed while the
/// bars are hidden, so the two never interleave.
#[derive(Clone, Default)]
pub struct LogWriter {
    bars: Option<MultiProgress>,
}

impl LogWriter {
    pub fn new(bars: Option<MultiProgress>) -> Self {
        Self { bars }
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &self.bars {
            Some(multi) => multi.suspend(|| std::io::stderr().write_all(buf))?,
            None => std::io::stderr().write_all(buf)?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()
    }
}

impl ProgressSink for ProgressBars {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::AlbumStarted { album, tracks } => {
                let bar = self.multi.add(ProgressBar::new(tracks as u64));
                bar.set_style(style("{msg:30!} [{bar:30.cyan/blue}] {pos}/{len} tracks"));
                bar.set_message(album.clone());
                lock(&self.albums).insert(album, bar);
            }
            ProgressEvent::TrackStarted {
                album,
                ordinal,
                file_name,
                total_bytes,
            } => {
                let bar = match total_bytes {
                    Some(total) => {
                        let bar = self.multi.add(ProgressBar::new(total));
                        bar.set_style(style(
                            "  {msg:28!} [{bar:30.green/white}] {bytes}/{total_bytes} {bytes_per_sec}",
                        ));
                        bar
                    }
                    None => {
                        let bar = self.multi.add(ProgressBar::new_spinner());
                        bar.set_style(style("  {spinner} {msg:28!} {bytes} {bytes_per_sec}"));
                        bar
                    }
                };
                bar.set_message(file_name);
                lock(&self.tracks).insert((album, ordinal), bar);
            }
            ProgressEvent::TrackProgress {
                album,
                ordinal,
                bytes,
            } => {
                if let Some(bar) = lock(&self.tracks).get(&(album, ordinal)) {
                    bar.inc(bytes);
                }
            }
            ProgressEvent::TrackFinished { album, ordinal, .. } => {
                if let Some(bar) = lock(&self.tracks).remove(&(album.clone(), ordinal)) {
                    bar.finish_and_clear();
                }
                if let Some(bar) = lock(&self.albums).get(&album) {
                    bar.inc(1);
                }
            }
            ProgressEvent::AlbumFinished { album } => {
                if let Some(bar) = lock(&self.albums).remove(&album) {
                    bar.finish();
                }
            }
        }
    }
}
