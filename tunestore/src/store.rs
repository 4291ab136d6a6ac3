//! Content Store: the directory of source audio files
//!
//! File names are the keys used everywhere else (metadata, covers, HLS), so
//! they must be a single, visible path component.

use crate::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    time::SystemTime,
};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Stream of file bytes handed to the HTTP layer
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Extensions accepted as audio sources
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "flac", "aac", "webm"];

/// Size and modification time of a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime: SystemTime,
}

/// A stored file as returned by [`ContentStore::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
    pub mtime: SystemTime,
}

/// Access to the source audio files
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn exists(&self, name: &str) -> bool;

    async fn stat(&self, name: &str) -> Result<FileStat, StoreError>;

    /// Opens the inclusive byte range `start..=end` of `name`
    async fn open_range(&self, name: &str, start: u64, end: u64) -> Result<ByteStream, StoreError>;

    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Audio files of the store, unordered
    async fn list(&self) -> Result<Vec<StoredFile>, StoreError>;

    /// Writes `data` to a hidden staging file; nothing is visible under
    /// `name` until [`ContentStore::commit`]
    async fn stage(&self, name: &str, data: ByteStream) -> Result<StagedFile, StoreError>;

    /// Moves a staged file to its name, replacing any previous file
    async fn commit(&self, staged: StagedFile) -> Result<FileStat, StoreError>;

    /// Drops a staged file
    async fn discard(&self, staged: StagedFile);

    /// Stores `data` under `name`, replacing any previous file
    async fn save(&self, name: &str, data: ByteStream) -> Result<FileStat, StoreError> {
        let staged = self.stage(name, data).await?;
        self.commit(staged).await
    }

    /// Path usable by external tools (metadata parser, encoder)
    fn local_path(&self, name: &str) -> Result<PathBuf, StoreError>;
}

/// Checks that `name` is a single visible path component
///
/// A leading dot covers `.` and `..`; inner dots (`Live... Again.mp3`) are fine.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name.len() > 255
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// On-disk identifier derived from a file name: hex of the first 16 bytes
/// of its SHA-256
pub fn cache_key(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    hex::encode(&digest[..16])
}

/// Lower-cased extension of a file name
pub fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_audio_file(name: &str) -> bool {
    extension(name).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

/// Content type served for an audio file
pub fn mime_for(name: &str) -> &'static str {
    match extension(name).as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("aac") => "audio/aac",
        Some("flac") => "audio/flac",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

/// Upload written aside, waiting for [`ContentStore::commit`] or
/// [`ContentStore::discard`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    name: String,
    staging: String,
}

impl StagedFile {
    pub fn new(name: impl Into<String>, staging: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            staging: staging.into(),
        }
    }

    /// Final name of the file
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store-specific identifier of the staging area
    pub fn staging(&self) -> &str {
        &self.staging
    }
}

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// [`ContentStore`] over a local directory
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Creates the store, creating `root` if needed
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "Content store ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

fn map_not_found(err: io::Error, name: &str) -> StoreError {
    if err.kind() == io::ErrorKind::NotFound {
        StoreError::NotFound(name.to_string())
    } else {
        StoreError::Io(err)
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn exists(&self, name: &str) -> bool {
        match self.path(name) {
            Ok(path) => fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn stat(&self, name: &str) -> Result<FileStat, StoreError> {
        let path = self.path(name)?;
        let meta = fs::metadata(&path).await.map_err(|e| map_not_found(e, name))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(FileStat {
            size: meta.len(),
            mtime: meta.modified()?,
        })
    }

    async fn open_range(&self, name: &str, start: u64, end: u64) -> Result<ByteStream, StoreError> {
        let path = self.path(name)?;
        let mut file = fs::File::open(&path).await.map_err(|e| map_not_found(e, name))?;
        if start > 0 {
            file.seek(io::SeekFrom::Start(start)).await?;
        }
        let len = end.saturating_sub(start) + 1;
        debug!(name, start, end, "Opening byte range");
        Ok(Box::pin(ReaderStream::new(file.take(len))))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.path(name)?;
        fs::remove_file(&path).await.map_err(|e| map_not_found(e, name))?;
        info!(name, "Deleted source file");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredFile>, StoreError> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_name(&name).is_err() || !is_audio_file(&name) {
                continue;
            }
            // Removed since read_dir, or unreadable
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    warn!(name, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let mtime = match meta.modified() {
                Ok(mtime) => mtime,
                Err(e) => {
                    warn!(name, error = %e, "Skipping entry without mtime");
                    continue;
                }
            };
            files.push(StoredFile {
                name,
                size: meta.len(),
                mtime,
            });
        }

        Ok(files)
    }

    async fn stage(&self, name: &str, mut data: ByteStream) -> Result<StagedFile, StoreError> {
        validate_name(name)?;
        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        let staging = format!(".{}.{}.upload", cache_key(name), seq);
        let tmp = self.root.join(&staging);

        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            while let Some(chunk) = data.next().await {
                file.write_all(&chunk?).await?;
            }
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::Io(e));
        }

        debug!(name, staging = %staging, "Upload staged");
        Ok(StagedFile::new(name, staging))
    }

    async fn commit(&self, staged: StagedFile) -> Result<FileStat, StoreError> {
        let path = self.path(staged.name())?;
        let tmp = self.root.join(staged.staging());
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::Io(e));
        }
        info!(name = staged.name(), "Stored source file");
        self.stat(staged.name()).await
    }

    async fn discard(&self, staged: StagedFile) {
        if let Err(e) = fs::remove_file(self.root.join(staged.staging())).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(name = staged.name(), error = %e, "Cannot remove staged upload");
            }
        }
    }

    fn local_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        self.path(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, TryStreamExt};
    use tempfile::TempDir;

    async fn store_with(files: &[(&str, &[u8])]) -> (TempDir, FsContentStore) {
        let dir = TempDir::new().unwrap();
        for (name, data) in files {
            std::fs::write(dir.path().join(name), data).unwrap();
        }
        let store = FsContentStore::new(dir.path()).await.unwrap();
        (dir, store)
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[test]
    fn names_must_be_single_components() {
        assert!(validate_name("song.mp3").is_ok());
        assert!(validate_name("Artist - Title (live).flac").is_ok());
        assert!(validate_name("Live... Again.mp3").is_ok());
        assert!(validate_name("Mr..mp3").is_ok());
        for bad in ["", "../x.mp3", "a/b.mp3", "a\\b.mp3", ".hidden.mp3", "..", "."] {
            assert!(validate_name(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn cache_keys_are_stable_and_safe() {
        let key = cache_key("../../etc/passwd");
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, cache_key("../../etc/passwd"));
        assert_ne!(key, cache_key("a.mp3"));
    }

    #[test]
    fn mime_table() {
        assert_eq!(mime_for("a.MP3"), "audio/mpeg");
        assert_eq!(mime_for("a.m4a"), "audio/mp4");
        assert_eq!(mime_for("a.flac"), "audio/flac");
        assert_eq!(mime_for("a.txt"), "application/octet-stream");
    }

    #[tokio::test]
    async fn stat_and_range() {
        let (_dir, store) = store_with(&[("a.mp3", b"0123456789")]).await;

        assert!(store.exists("a.mp3").await);
        assert!(!store.exists("b.mp3").await);
        assert_eq!(store.stat("a.mp3").await.unwrap().size, 10);

        let bytes = collect(store.open_range("a.mp3", 2, 5).await.unwrap()).await;
        assert_eq!(bytes, b"2345");

        let err = store.stat("missing.mp3").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_keeps_audio_files_only() {
        let (_dir, store) = store_with(&[
            ("a.mp3", b"x"),
            ("b.FLAC", b"x"),
            ("notes.txt", b"x"),
            (".c.mp3.upload", b"x"),
        ])
        .await;

        let mut names: Vec<_> = store.list().await.unwrap().into_iter().map(|f| f.name).collect();
        names.sort();
        assert_eq!(names, vec!["a.mp3", "b.FLAC"]);
    }

    #[tokio::test]
    async fn save_then_delete() {
        let (dir, store) = store_with(&[]).await;
        let data: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ]));

        let stat = store.save("new.ogg", data).await.unwrap();
        assert_eq!(stat.size, 6);
        assert_eq!(std::fs::read(dir.path().join("new.ogg")).unwrap(), b"abcdef");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        store.delete("new.ogg").await.unwrap();
        assert!(!store.exists("new.ogg").await);
        assert!(store.delete("new.ogg").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn names_with_inner_dots_are_listed() {
        let (_dir, store) = store_with(&[("Live... Again.mp3", b"x")]).await;

        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Live... Again.mp3"]);
        assert!(store.exists("Live... Again.mp3").await);
    }

    #[tokio::test]
    async fn staged_file_stays_hidden_until_commit() {
        let (dir, store) = store_with(&[("a.mp3", b"old")]).await;
        let data = |bytes: &'static [u8]| -> ByteStream {
            Box::pin(stream::iter(vec![Ok(Bytes::from_static(bytes))]))
        };

        let staged = store.stage("a.mp3", data(b"new")).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.mp3")).unwrap(), b"old");
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.discard(staged).await;
        assert_eq!(std::fs::read(dir.path().join("a.mp3")).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let staged = store.stage("a.mp3", data(b"newer")).await.unwrap();
        assert_eq!(store.commit(staged).await.unwrap().size, 5);
        assert_eq!(std::fs::read(dir.path().join("a.mp3")).unwrap(), b"newer");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn failed_save_leaves_nothing_behind() {
        let (dir, store) = store_with(&[]).await;
        let data: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::other("connection reset")),
        ]));

        assert!(store.save("broken.mp3", data).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
