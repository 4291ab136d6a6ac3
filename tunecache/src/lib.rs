//! # tunecache - Cache des métadonnées audio
//!
//! Cette crate évite de relire les tags des fichiers audio à chaque listing :
//!
//! - [`MetadataCache`] : enregistrements [`TrackRecord`] par nom de fichier,
//!   invalidés par comparaison du mtime
//! - [`MetadataExtractor`] / [`LoftyExtractor`] : extraction des tags, des
//!   propriétés techniques et de la pochette
//! - [`RecordStore`] / [`DB`] : persistance SQLite des enregistrements
//! - [`KeyedLocks`] : exclusion mutuelle par clé, partagée avec `tunecovers`
//!
//! ## Architecture
//!
//! ```text
//! tunestore (fichiers sources)
//!     └── tunecache
//!             ├── metadata.rs  - extraction (lofty)
//!             ├── track.rs     - TrackRecord
//!             ├── db.rs        - RecordStore SQLite
//!             ├── locks.rs     - verrous par clé
//!             └── cache.rs     - MetadataCache
//! ```
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tunecache::{DB, LoftyExtractor, MetadataCache};
//! use tunestore::FsContentStore;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let store = Arc::new(FsContentStore::new("./music").await?);
//! let db = Arc::new(DB::init(std::path::Path::new("./meta.db"), "track_records")?);
//! let cache = MetadataCache::new(store, Arc::new(LoftyExtractor), db)?;
//! let record = cache.get("song.mp3").await?;
//! println!("{} - {}", record.artist, record.title);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod db;
pub mod error;
pub mod locks;
pub mod metadata;
pub mod track;

pub use cache::MetadataCache;
pub use db::{MemoryRecordStore, RecordStore, DB};
pub use error::MetadataError;
pub use locks::KeyedLocks;
pub use metadata::{AudioMetadata, LoftyExtractor, MetadataExtractor, Picture};
pub use track::{mtime_millis, TrackRecord};
