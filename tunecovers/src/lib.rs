//! # tunecovers - Cache des pochettes d'albums
//!
//! Les pochettes sont extraites des tags des fichiers audio au premier
//! accès puis servies depuis le disque :
//!
//! ```text
//! cache_covers/
//! ├── covers.db                        # table `covers` (nom, type MIME, taille)
//! ├── 3f2a…c1.orig.img                 # image originale
//! └── 3f2a…c1.256.webp                 # vignette 256×256
//! ```
//!
//! La clé disque est [`tunestore::cache_key`] du nom de fichier.
//!
//! ## Features
//!
//! - `server` : routes `GET /api/cover/{name}[/{size}]` via [`CoversExt`]
//! - `config` : [`CoversConfigExt`] pour `tuneconfig::Config`
//!
//! ```rust,ignore
//! use tunecovers::{CoversConfigExt, CoversExt};
//!
//! let covers = tuneconfig::get_config()
//!     .create_cover_cache(store.clone(), extractor.clone())
//!     .await?;
//! server.register_covers(covers.clone()).await;
//! ```

pub mod cache;
pub mod error;
pub mod webp;

#[cfg(feature = "config")]
pub mod config_ext;

#[cfg(feature = "server")]
pub mod server_ext;

pub use cache::{Cover, CoverCache, MAX_VARIANT_SIZE, MIN_VARIANT_SIZE};
pub use error::CoverError;

#[cfg(feature = "config")]
pub use config_ext::CoversConfigExt;

#[cfg(feature = "server")]
pub use server_ext::{ApiDoc, CoversExt, create_router};
