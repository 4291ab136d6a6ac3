//! # tuneserver - Serveur web haut niveau basé sur Axum
//!
//! Cette crate fournit le [`Server`] sur lequel les autres crates de TuneBox
//! greffent leurs routes, via des traits d'extension (`CoversExt`,
//! `HlsExt`, `LibraryExt`), ainsi que le système de logs :
//!
//! - [`logs`] : buffer circulaire alimenté par `tracing`, exposé en JSON et
//!   en Server-Sent Events, niveau modifiable à chaud
//! - [`ErrorResponse`] : corps JSON commun des erreurs HTTP
//! - [`streaming`] : réponses `206 Partial Content` pour les requêtes `Range`
//!
//! ```rust,no_run
//! use tuneserver::{Server, logs::LoggingOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = Server::new_configured();
//!     server.init_logging(LoggingOptions::from_config()).await;
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logs;
pub mod server;
pub mod streaming;

pub use error::{ErrorResponse, error_response};
pub use logs::{LogState, SseLayer, log_dump, log_sse};
pub use server::{Server, ServerInfo};
pub use streaming::{RangedResource, serve_range};
