//! # tunestore - Source audio file storage
//!
//! The "low level" collaborators of TuneBox:
//!
//! - [`ContentStore`] / [`FsContentStore`]: the directory of audio files
//!   (existence, stat, byte-range reads, deletion, staged uploads)
//! - [`parse_range`]: resolution of a single `Range` header
//! - [`PlaylistOrderStore`]: the play order saved by the client
//!
//! The caches (`tunecache`, `tunecovers`, `tunehls`) key their entries by
//! file name; [`validate_name`] guarantees it is a single path component.
//!
//! ```rust,no_run
//! use tunestore::{ContentStore, FsContentStore, parse_range};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let store = FsContentStore::new("./music").await?;
//! let stat = store.stat("song.mp3").await?;
//! let range = parse_range("bytes=0-", stat.size, 1024 * 1024)?;
//! let _body = store.open_range("song.mp3", range.start, range.end).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod playlist;
pub mod range;
pub mod store;

pub use error::{RangeError, StoreError};
pub use playlist::{order_tracks, PlaylistOrderStore};
pub use range::{parse_range, unsatisfiable_content_range, ByteRange};
pub use store::{
    cache_key, extension, is_audio_file, mime_for, validate_name, ByteStream, ContentStore, FileStat,
    FsContentStore, StagedFile, StoredFile, AUDIO_EXTENSIONS,
};
