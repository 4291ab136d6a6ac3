//! # tunelibrary - Bibliothèque musicale de TuneBox
//!
//! Point d'entrée HTTP des clients : listing, streaming avec plages
//! d'octets, informations détaillées, upload et suppression protégés par
//! mot de passe, ordre de lecture.
//!
//! [`Library`] coordonne les collaborateurs des autres crates. Supprimer ou
//! remplacer un fichier invalide, dans cet ordre, l'artefact HLS, les
//! métadonnées et la pochette. Un upload n'est publié qu'après vérification
//! du mot de passe.
//!
//! ```rust,ignore
//! use tunelibrary::{Library, LibraryExt, PasswordVerifier};
//!
//! let library = Arc::new(
//!     Library::new(store, metadata, covers, hls, playlist, PasswordVerifier::from_config())
//!         .with_chunk_size(chunk_size),
//! );
//! server.register_library(library).await;
//! ```

pub mod error;
pub mod library;
pub mod password;
pub mod server_ext;
pub mod track;

pub use error::LibraryError;
pub use library::{DEFAULT_CHUNK_SIZE, Library};
pub use password::PasswordVerifier;
pub use server_ext::{ApiDoc, LibraryExt, MAX_UPLOAD_FILES, create_router};
pub use track::{TrackInfo, TrackSummary, music_url};
