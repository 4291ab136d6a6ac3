//! Extension pour intégrer le cache de pochettes dans tuneconfig
//!
//! Section `host.cover_cache` :
//!
//! ```yaml
//! host:
//!   cover_cache:
//!     directory: cache_covers
//! ```

use crate::CoverCache;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tunecache::{DB, MetadataExtractor};
use tuneconfig::Config;
use tunestore::ContentStore;

const DEFAULT_COVER_CACHE_DIR: &str = "cache_covers";

/// Trait d'extension de `tuneconfig::Config` pour le cache de pochettes
pub trait CoversConfigExt {
    /// Répertoire du cache (créé si besoin)
    fn get_covers_dir(&self) -> Result<String>;

    fn set_covers_dir(&self, directory: String) -> Result<()>;

    /// Crée le cache configuré, avec sa base SQLite `covers.db`
    async fn create_cover_cache(
        &self,
        store: Arc<dyn ContentStore>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Result<Arc<CoverCache>>;
}

impl CoversConfigExt for Config {
    fn get_covers_dir(&self) -> Result<String> {
        self.get_managed_dir(&["host", "cover_cache", "directory"], DEFAULT_COVER_CACHE_DIR)
    }

    fn set_covers_dir(&self, directory: String) -> Result<()> {
        self.set_managed_dir(&["host", "cover_cache", "directory"], directory)
    }

    async fn create_cover_cache(
        &self,
        store: Arc<dyn ContentStore>,
        extractor: Arc<dyn MetadataExtractor>,
    ) -> Result<Arc<CoverCache>> {
        let dir = self.get_covers_dir()?;
        let db = DB::init(&Path::new(&dir).join("covers.db"), "covers")?;
        let cache = CoverCache::new(&dir, store, extractor, Arc::new(db)).await?;
        Ok(Arc::new(cache))
    }
}
