use soundtrack_model::{OutputFormat, SinkError};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

/// Where an album will be written, before anything has been opened.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub format: OutputFormat,
    pub root: PathBuf,
    pub album_name: String,
}

/// An open per-album output, shared by all of the album's downloads.
///
/// Entries may be written concurrently; all shared state sits behind one
/// mutex. Final entry names are settled in [`OutputContainer::close`], in
/// track order, so they never depend on which download finished first.
/// `close` consumes the container, so nothing can be written after it.
pub enum OutputContainer {
    Directory(DirectoryOutput),
    Tar(ArchiveOutput),
    Zip(ArchiveOutput),
}

/// `<root>/<album>/<entry>`, created on the first entry.
pub struct DirectoryOutput {
    dir: PathBuf,
    created: OnceCell<()>,
    committed: Mutex<Vec<Staged>>,
}

/// `<root>/<album>.<ext>`, assembled on close from spooled entries.
pub struct ArchiveOutput {
    root: PathBuf,
    album_name: String,
    committed: Mutex<Vec<Spooled>>,
}

/// A finished file in the album directory, still under its part name.
struct Staged {
    ordinal: usize,
    name: String,
    part: PathBuf,
}

/// A finished track waiting to be appended to the archive.
struct Spooled {
    ordinal: usize,
    name: String,
    len: u64,
    file: File,
}

/// What a closed container produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedOutput {
    pub path: PathBuf,
    /// Final entry name of every committed track, by ordinal.
    pub names: BTreeMap<usize, String>,
}

/// One track being written into a container.
pub struct Entry<'c> {
    ordinal: usize,
    name: String,
    file: tokio::fs::File,
    written: u64,
    target: Target<'c>,
}

enum Target<'c> {
    Directory { part: PathBuf, out: &'c DirectoryOutput },
    Spool(&'c ArchiveOutput),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Final names for committed entries given in track order.
///
/// The first track asking for a name gets it. Later duplicates are prefixed
/// with their ordinal, with a counter added if even that name is taken.
fn final_names(requested: &[(usize, &str)]) -> Vec<String> {
    let mut taken = HashSet::new();
    let first: Vec<bool> = requested
        .iter()
        .map(|(_, name)| taken.insert(name.to_string()))
        .collect();

    requested
        .iter()
        .zip(first)
        .map(|(&(ordinal, name), first)| {
            if first {
                return name.to_string();
            }
            let mut renamed = format!("{ordinal:02} {name}");
            let mut n = 2;
            while !taken.insert(renamed.clone()) {
                renamed = format!("{ordinal:02}-{n} {name}");
                n += 1;
            }
            tracing::warn!(file_name = name, renamed = %renamed, "Duplicate entry name");
            renamed
        })
        .collect()
}

fn archive_error(err: impl std::fmt::Display) -> SinkError {
    SinkError::Archive(err.to_string())
}

impl ContainerSpec {
    pub fn new(format: OutputFormat, root: impl Into<PathBuf>, album_name: impl Into<String>) -> Self {
        Self {
            format,
            root: root.into(),
            album_name: album_name.into(),
        }
    }

    /// Path of the finished output.
    pub fn location(&self) -> PathBuf {
        match self.format.extension() {
            None => self.root.join(&self.album_name),
            Some(ext) => self.root.join(format!("{}.{ext}", self.album_name)),
        }
    }

    pub fn open(self) -> Result<OutputContainer, SinkError> {
        if !self.root.is_dir() {
            return Err(SinkError::Io(format!(
                "output directory {} does not exist",
                self.root.display()
            )));
        }

        tracing::debug!(format = ?self.format, album = %self.album_name, "Opening output container");
        let container = match self.format {
            OutputFormat::Directory => OutputContainer::Directory(DirectoryOutput {
                dir: self.location(),
                created: OnceCell::new(),
                committed: Mutex::new(Vec::new()),
            }),
            OutputFormat::Tar => OutputContainer::Tar(ArchiveOutput::new(self.root, self.album_name)),
            OutputFormat::Zip => OutputContainer::Zip(ArchiveOutput::new(self.root, self.album_name)),
        };
        Ok(container)
    }
}

impl ArchiveOutput {
    fn new(root: PathBuf, album_name: String) -> Self {
        Self {
            root,
            album_name,
            committed: Mutex::new(Vec::new()),
        }
    }
}

impl OutputContainer {
    /// Start writing the entry for track `ordinal`, asking for `file_name`.
    pub async fn begin_entry(&self, ordinal: usize, file_name: &str) -> Result<Entry<'_>, SinkError> {
        match self {
            OutputContainer::Directory(out) => {
                out.created
                    .get_or_try_init(|| async {
                        tokio::fs::create_dir_all(&out.dir).await?;
                        tracing::info!(path = %out.dir.display(), "Created album directory");
                        Ok::<_, std::io::Error>(())
                    })
                    .await?;

                // Unique per track, so concurrent entries asking for the same
                // name never share a part file.
                let part = out.dir.join(format!("{ordinal:02} {file_name}.part"));
                let file = tokio::fs::File::create(&part).await?;
                Ok(Entry {
                    ordinal,
                    name: file_name.to_string(),
                    file,
                    written: 0,
                    target: Target::Directory { part, out },
                })
            }
            OutputContainer::Tar(out) | OutputContainer::Zip(out) => {
                let spool = tempfile::tempfile()?;
                Ok(Entry {
                    ordinal,
                    name: file_name.to_string(),
                    file: tokio::fs::File::from_std(spool),
                    written: 0,
                    target: Target::Spool(out),
                })
            }
        }
    }

    /// Finalize the container.
    ///
    /// Committed entries get their final names in track order. Directory
    /// entries are renamed from their part files. Archives are written to
    /// `<name>.part` and renamed once complete, with fixed metadata so that
    /// the same input always yields the same bytes.
    pub async fn close(self) -> Result<ClosedOutput, SinkError> {
        match self {
            OutputContainer::Directory(out) => finish_directory(out).await,
            OutputContainer::Tar(out) => finish_archive(out, OutputFormat::Tar).await,
            OutputContainer::Zip(out) => finish_archive(out, OutputFormat::Zip).await,
        }
    }
}

async fn finish_directory(out: DirectoryOutput) -> Result<ClosedOutput, SinkError> {
    let mut staged = out.committed.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    staged.sort_by_key(|s| s.ordinal);
    let requested: Vec<(usize, &str)> = staged.iter().map(|s| (s.ordinal, s.name.as_str())).collect();
    let names = final_names(&requested);

    let mut finished = BTreeMap::new();
    for (entry, name) in staged.iter().zip(names) {
        let path = out.dir.join(&name);
        tokio::fs::rename(&entry.part, &path).await?;
        tracing::debug!(path = %path.display(), "Committed file");
        finished.insert(entry.ordinal, name);
    }
    Ok(ClosedOutput {
        path: out.dir,
        names: finished,
    })
}

async fn finish_archive(out: ArchiveOutput, format: OutputFormat) -> Result<ClosedOutput, SinkError> {
    let mut entries = out.committed.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    entries.sort_by_key(|e| e.ordinal);
    let requested: Vec<(usize, &str)> = entries.iter().map(|e| (e.ordinal, e.name.as_str())).collect();
    let names = final_names(&requested);
    for (entry, name) in entries.iter_mut().zip(names) {
        entry.name = name;
    }
    let finished: BTreeMap<usize, String> = entries.iter().map(|e| (e.ordinal, e.name.clone())).collect();

    let spec = ContainerSpec::new(format, out.root, out.album_name);
    let path = spec.location();
    let mut part = path.clone().into_os_string();
    part.push(".part");
    let part = PathBuf::from(part);
    let album = spec.album_name;
    let count = entries.len();

    let (written, part) = tokio::task::spawn_blocking(move || {
        let result = match format {
            OutputFormat::Zip => write_zip(&part, &album, entries),
            _ => write_tar(&part, &album, entries),
        };
        (result, part)
    })
    .await
    .map_err(archive_error)?;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e);
    }
    tokio::fs::rename(&part, &path).await?;
    tracing::info!(path = %path.display(), entries = count, "Wrote archive");
    Ok(ClosedOutput {
        path,
        names: finished,
    })
}

fn write_tar(part: &Path, album: &str, entries: Vec<Spooled>) -> Result<(), SinkError> {
    let mut builder = tar::Builder::new(BufWriter::new(File::create(part)?));
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(entry.len);
        header.set_mode(0o644);
        header.set_mtime(0);
        builder.append_data(&mut header, format!("{album}/{}", entry.name), entry.file)?;
    }
    let file = builder
        .into_inner()?
        .into_inner()
        .map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

fn write_zip(part: &Path, album: &str, entries: Vec<Spooled>) -> Result<(), SinkError> {
    let mut zip = zip::ZipWriter::new(File::create(part)?);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);
    for mut entry in entries {
        zip.start_file(format!("{album}/{}", entry.name), options)
            .map_err(archive_error)?;
        std::io::copy(&mut entry.file, &mut zip)?;
    }
    let file = zip.finish().map_err(archive_error)?;
    file.sync_all()?;
    Ok(())
}

impl Entry<'_> {
    /// The name this entry asked for. Its final name may gain an ordinal
    /// prefix on close if an earlier track asked for the same one.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Make the entry part of the container. Returns the bytes written.
    pub async fn commit(self) -> Result<u64, SinkError> {
        let Entry {
            ordinal,
            name,
            mut file,
            written,
            target,
        } = self;

        match target {
            Target::Directory { part, out } => {
                let synced = async {
                    file.flush().await?;
                    file.sync_all().await
                }
                .await;
                drop(file);
                if let Err(e) = synced {
                    let _ = tokio::fs::remove_file(&part).await;
                    return Err(e.into());
                }
                lock(&out.committed).push(Staged { ordinal, name, part });
            }
            Target::Spool(out) => {
                file.flush().await?;
                let mut file = file.into_std().await;
                file.seek(SeekFrom::Start(0))?;
                lock(&out.committed).push(Spooled {
                    ordinal,
                    name,
                    len: written,
                    file,
                });
            }
        }
        Ok(written)
    }

    /// Drop the entry; nothing of it remains in the container.
    pub async fn abort(self) {
        if let Target::Directory { part, .. } = &self.target {
            drop(self.file);
            if let Err(e) = tokio::fs::remove_file(part).await {
                tracing::warn!(path = %part.display(), error = %e, "Could not remove partial file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    async fn write_entry(container: &OutputContainer, ordinal: usize, name: &str, body: &[u8]) -> u64 {
        let mut entry = container.begin_entry(ordinal, name).await.unwrap();
        entry.write(body).await.unwrap();
        entry.commit().await.unwrap()
    }

    fn tar_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                let mut body = Vec::new();
                e.read_to_end(&mut body).unwrap();
                (name, body)
            })
            .collect()
    }

    fn zip_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut body = Vec::new();
                file.read_to_end(&mut body).unwrap();
                (file.name().to_string(), body)
            })
            .collect()
    }

    #[test]
    fn test_final_names() {
        assert_eq!(
            final_names(&[(1, "Theme.mp3"), (2, "Theme.mp3"), (3, "End.mp3")]),
            vec!["Theme.mp3", "02 Theme.mp3", "End.mp3"]
        );
        // A real track already called "02 Theme.mp3" keeps its name.
        assert_eq!(
            final_names(&[(1, "Theme.mp3"), (2, "Theme.mp3"), (3, "02 Theme.mp3")]),
            vec!["Theme.mp3", "02-2 Theme.mp3", "02 Theme.mp3"]
        );
    }

    #[tokio::test]
    async fn test_directory_created_lazily() {
        let tmp = tempfile::tempdir().unwrap();
        let container = ContainerSpec::new(OutputFormat::Directory, tmp.path(), "Album")
            .open()
            .unwrap();
        assert!(!tmp.path().join("Album").exists());

        assert_eq!(write_entry(&container, 1, "01 Intro.mp3", b"intro").await, 5);
        let closed = container.close().await.unwrap();

        let dir = closed.path;
        assert_eq!(dir, tmp.path().join("Album"));
        assert_eq!(std::fs::read(dir.join("01 Intro.mp3")).unwrap(), b"intro");
        assert_eq!(closed.names.get(&1).map(String::as_str), Some("01 Intro.mp3"));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_directory_entry_is_partial_until_close() {
        let tmp = tempfile::tempdir().unwrap();
        let container = ContainerSpec::new(OutputFormat::Directory, tmp.path(), "Album")
            .open()
            .unwrap();
        let dir = tmp.path().join("Album");

        let mut entry = container.begin_entry(1, "Intro.mp3").await.unwrap();
        entry.write(b"intro").await.unwrap();
        assert!(dir.join("01 Intro.mp3.part").exists());
        entry.commit().await.unwrap();
        assert!(!dir.join("Intro.mp3").exists());

        let mut failed = container.begin_entry(2, "Theme.mp3").await.unwrap();
        failed.write(b"half").await.unwrap();
        failed.abort().await;

        container.close().await.unwrap();
        let mut names: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Intro.mp3"]);
    }

    #[tokio::test]
    async fn test_duplicate_names_follow_track_order_not_commit_order() {
        let tmp = tempfile::tempdir().unwrap();
        let container = ContainerSpec::new(OutputFormat::Directory, tmp.path(), "Album")
            .open()
            .unwrap();

        // Track 2 finishes first, yet track 1 keeps the plain name.
        write_entry(&container, 2, "Theme.mp3", b"two").await;
        write_entry(&container, 1, "Theme.mp3", b"one").await;
        let closed = container.close().await.unwrap();

        assert_eq!(std::fs::read(closed.path.join("Theme.mp3")).unwrap(), b"one");
        assert_eq!(std::fs::read(closed.path.join("02 Theme.mp3")).unwrap(), b"two");
        assert_eq!(closed.names.get(&2).map(String::as_str), Some("02 Theme.mp3"));
    }

    #[tokio::test]
    async fn test_archive_duplicates_follow_track_order() {
        let tmp = tempfile::tempdir().unwrap();
        let container = ContainerSpec::new(OutputFormat::Tar, tmp.path(), "Album")
            .open()
            .unwrap();

        write_entry(&container, 3, "02 Theme.mp3", b"three").await;
        write_entry(&container, 2, "Theme.mp3", b"two").await;
        write_entry(&container, 1, "Theme.mp3", b"one").await;
        let closed = container.close().await.unwrap();

        assert_eq!(
            tar_entries(&closed.path),
            vec![
                ("Album/Theme.mp3".to_string(), b"one".to_vec()),
                ("Album/02-2 Theme.mp3".to_string(), b"two".to_vec()),
                ("Album/02 Theme.mp3".to_string(), b"three".to_vec()),
            ]
        );
    }

    #[test]
    fn test_missing_root_fails_to_open() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = ContainerSpec::new(OutputFormat::Zip, tmp.path().join("nope"), "Album");
        assert!(matches!(spec.open(), Err(SinkError::Io(_))));
    }

    #[tokio::test]
    async fn test_tar_entries_in_track_order_without_aborted() {
        let tmp = tempfile::tempdir().unwrap();
        let container = ContainerSpec::new(OutputFormat::Tar, tmp.path(), "Album")
            .open()
            .unwrap();

        // Commit out of order; abort track 2.
        write_entry(&container, 3, "03 End.mp3", b"end").await;
        let mut failed = container.begin_entry(2, "02 Theme.mp3").await.unwrap();
        failed.write(b"partial").await.unwrap();
        failed.abort().await;
        write_entry(&container, 1, "01 Intro.mp3", b"intro").await;

        let path = container.close().await.unwrap().path;
        assert_eq!(path, tmp.path().join("Album.tar"));
        assert!(!tmp.path().join("Album.tar.part").exists());
        assert_eq!(
            tar_entries(&path),
            vec![
                ("Album/01 Intro.mp3".to_string(), b"intro".to_vec()),
                ("Album/03 End.mp3".to_string(), b"end".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_zip_entries_in_track_order() {
        let tmp = tempfile::tempdir().unwrap();
        let container = ContainerSpec::new(OutputFormat::Zip, tmp.path(), "Album")
            .open()
            .unwrap();

        write_entry(&container, 2, "02 Theme.flac", b"theme").await;
        write_entry(&container, 1, "01 Intro.flac", b"intro").await;

        let path = container.close().await.unwrap().path;
        assert_eq!(path, tmp.path().join("Album.zip"));
        assert_eq!(
            zip_entries(&path),
            vec![
                ("Album/01 Intro.flac".to_string(), b"intro".to_vec()),
                ("Album/02 Theme.flac".to_string(), b"theme".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_archives_are_well_formed() {
        let tmp = tempfile::tempdir().unwrap();
        for format in [OutputFormat::Tar, OutputFormat::Zip] {
            let container = ContainerSpec::new(format, tmp.path(), "Empty").open().unwrap();
            let closed = container.close().await.unwrap();
            assert!(closed.names.is_empty());
            match format {
                OutputFormat::Tar => assert!(tar_entries(&closed.path).is_empty()),
                _ => assert!(zip_entries(&closed.path).is_empty()),
            }
        }
    }

    #[tokio::test]
    async fn test_archive_bytes_are_reproducible() {
        let mut outputs = Vec::new();
        for _ in 0..2 {
            let tmp = tempfile::tempdir().unwrap();
            let container = ContainerSpec::new(OutputFormat::Zip, tmp.path(), "Album")
                .open()
                .unwrap();
            write_entry(&container, 1, "01 Intro.mp3", b"intro").await;
            let path = container.close().await.unwrap().path;
            outputs.push(std::fs::read(path).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
    }
}
